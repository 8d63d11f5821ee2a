//! Program model for Rung source.
//!
//! A parsed program is a flat signal/node graph: every named symbol resolves
//! to a dense signal id, every gate line becomes one node (plus auxiliary
//! nodes for inline `NOT`/`PS`/`NS` arguments), and token spans remember
//! where each user-written name sits in the original source.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

/// Dense signal identifier, `0..Program::signal_count()`.
///
/// Aliases map a second symbol onto an existing id, so the symbol table may
/// hold more entries than there are signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gate kinds of the language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    And,
    Or,
    Xor,
    Not,
    /// Rising-edge detector (positive signal)
    Ps,
    /// Falling-edge detector (negative signal)
    Ns,
    /// Set-dominant bistable
    Sr,
    /// Reset-dominant bistable
    Rs,
    /// On-delay timer
    Ton,
    /// Off-delay timer
    Tof,
    /// Up counter
    Ctu,
    /// Down counter
    Ctd,
    Lt,
    Gt,
    Eq,
    /// User-driven boolean source with momentary and latched sub-states
    Btn,
}

impl NodeKind {
    /// Resolve a gate keyword. Case-sensitive, as the language requires.
    pub fn from_keyword(word: &str) -> Option<NodeKind> {
        Some(match word {
            "AND" => NodeKind::And,
            "OR" => NodeKind::Or,
            "XOR" => NodeKind::Xor,
            "NOT" => NodeKind::Not,
            "PS" => NodeKind::Ps,
            "NS" => NodeKind::Ns,
            "SR" => NodeKind::Sr,
            "RS" => NodeKind::Rs,
            "TON" => NodeKind::Ton,
            "TOF" => NodeKind::Tof,
            "CTU" => NodeKind::Ctu,
            "CTD" => NodeKind::Ctd,
            "LT" => NodeKind::Lt,
            "GT" => NodeKind::Gt,
            "EQ" => NodeKind::Eq,
            "BTN" => NodeKind::Btn,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            NodeKind::And => "AND",
            NodeKind::Or => "OR",
            NodeKind::Xor => "XOR",
            NodeKind::Not => "NOT",
            NodeKind::Ps => "PS",
            NodeKind::Ns => "NS",
            NodeKind::Sr => "SR",
            NodeKind::Rs => "RS",
            NodeKind::Ton => "TON",
            NodeKind::Tof => "TOF",
            NodeKind::Ctu => "CTU",
            NodeKind::Ctd => "CTD",
            NodeKind::Lt => "LT",
            NodeKind::Gt => "GT",
            NodeKind::Eq => "EQ",
            NodeKind::Btn => "BTN",
        }
    }

    pub fn is_comparator(self) -> bool {
        matches!(self, NodeKind::Lt | NodeKind::Gt | NodeKind::Eq)
    }

    pub fn is_timer(self) -> bool {
        matches!(self, NodeKind::Ton | NodeKind::Tof)
    }

    pub fn is_counter(self) -> bool {
        matches!(self, NodeKind::Ctu | NodeKind::Ctd)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One computational unit of the program
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    pub inputs: Vec<SignalId>,
    pub outputs: Vec<SignalId>,
    /// 0-based source line the node originated on
    pub line: usize,
    /// Hard-coded preset time in seconds (timers, from a literal first argument)
    pub preset_time: Option<f32>,
    /// Hard-coded preset count (counters, from a literal first argument)
    pub preset_count: Option<i32>,
    /// Current-value output of a counter (second output name), analog
    pub cv_output: Option<SignalId>,
    /// True for auxiliary nodes generated from inline `NOT`/`PS`/`NS`
    pub synthetic: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, name: String, line: usize) -> Self {
        Self {
            kind,
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            line,
            preset_time: None,
            preset_count: None,
            cv_output: None,
            synthetic: false,
        }
    }
}

/// Source position of one user-written name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan {
    /// 0-based line index into [`Program::source_lines`]
    pub line: usize,
    pub col_start: usize,
    pub col_end: usize,
    pub symbol: String,
}

/// The immutable parse artifact
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Boolean input names in declaration order (alias wins as public name)
    pub inputs: Vec<String>,
    /// Boolean output names in declaration order
    pub outputs: Vec<String>,
    /// Analog input names in declaration order
    pub analog_inputs: Vec<String>,
    /// Analog output names in declaration order
    pub analog_outputs: Vec<String>,
    /// Symbol table; aliases share the id of the symbol they alias
    pub symbols: IndexMap<String, SignalId>,
    /// Signals carrying 0..=255 analog values rather than 0/1
    pub analog: IndexSet<SignalId>,
    /// Constant signals introduced by comparator literals
    pub constants: IndexMap<SignalId, u8>,
    /// Spans of every user-written name, in encounter order
    pub tokens: Vec<TokenSpan>,
    /// Nodes in source order, auxiliary nodes before their enclosing gate
    pub nodes: Vec<Node>,
    /// Raw source lines, for span lookups and the editor surface
    pub source_lines: Vec<String>,
    pub(crate) signal_count: usize,
}

impl Program {
    /// Number of distinct signals (dense ids `0..n`)
    pub fn signal_count(&self) -> usize {
        self.signal_count
    }

    /// Look up a symbol (name or alias)
    pub fn signal(&self, name: &str) -> Option<SignalId> {
        self.symbols.get(name).copied()
    }

    pub fn is_analog(&self, id: SignalId) -> bool {
        self.analog.contains(&id)
    }

    /// Value of a constant signal, if `id` is one
    pub fn constant_value(&self, id: SignalId) -> Option<u8> {
        self.constants.get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// True for generated names (`_not_*`, `_ps_*`, `_ns_*`, `_const_*`).
///
/// These never appear in the token-span table or user-facing views.
pub fn is_synthetic_name(name: &str) -> bool {
    name.starts_with("_not_")
        || name.starts_with("_ps_")
        || name.starts_with("_ns_")
        || name.starts_with("_const_")
}
