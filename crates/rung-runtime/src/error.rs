//! Runtime errors

use thiserror::Error;

/// Reasons the engine refuses to run a program.
///
/// These are surfaced as state (`Engine::validity`), not panics: the engine
/// stays constructed so the editor surface can keep showing the program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("program has no nodes to evaluate")]
    EmptyProgram,

    #[error("evaluation order covers {ordered} of {total} nodes")]
    IncompleteOrder { ordered: usize, total: usize },
}
