//! Rung runtime
//!
//! Scan-cycle evaluator for parsed Rung programs. Holds double-buffered
//! signal state, steps the node list in a fixed evaluation order, and
//! commits staged external inputs at scan boundaries.

pub mod engine;
pub mod error;
pub mod order;
pub mod staging;
pub mod view;

pub use engine::{slider_to_hz, Engine, StepMode};
pub use error::Error;
pub use order::{OrderPolicy, ScanOrder};
pub use staging::InputStaging;
pub use view::SpanHighlight;
