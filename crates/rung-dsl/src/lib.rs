//! Rung DSL
//!
//! Front end for the Rung gate-logic language. Parses `.rung` source files
//! into a [`Program`]: a symbol table of dense signal ids, a node list in
//! source order, and exact token spans for editor highlighting.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod timefmt;

pub use ast::{Node, NodeKind, Program, SignalId, TokenSpan};
pub use lexer::{lex, LexError, Spanned, Token};
pub use parser::{parse_file, parse_source, ParseError};
pub use timefmt::{format_duration, parse_duration, DEFAULT_PRESET_SECS};
