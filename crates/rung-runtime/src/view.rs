//! Editor-facing view of live signal state.
//!
//! The rendering layer highlights every user-written name in the source by
//! the value of the signal behind it, plus the line currently being
//! evaluated. This module is that interface: token spans from the parse
//! joined with the committed snapshot.

use rung_dsl::TokenSpan;

use crate::engine::Engine;

/// One highlightable token with its live state
#[derive(Debug, Clone, PartialEq)]
pub struct SpanHighlight<'a> {
    pub span: &'a TokenSpan,
    /// Committed signal level behind the symbol (0 for unknown names)
    pub level: u8,
}

impl SpanHighlight<'_> {
    pub fn is_active(&self) -> bool {
        self.level != 0
    }
}

impl Engine {
    /// Live highlight state for every user-written token, in source order.
    ///
    /// Reads the committed snapshot only, so the view is stable between
    /// scans even while inputs are staged.
    pub fn span_highlights(&self) -> Vec<SpanHighlight<'_>> {
        self.program()
            .tokens
            .iter()
            .map(|span| SpanHighlight {
                level: self.committed_level(&span.symbol),
                span,
            })
            .collect()
    }
}
