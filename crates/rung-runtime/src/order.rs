//! Evaluation order resolver.
//!
//! Two policies exist. Source order is the shipped default: nodes run in the
//! exact order they appear in the file, which is what a PLC programmer
//! reading the source expects; a forward reference costs one scan of lag.
//! The Kahn policy reorders by dependency instead, with BTN nodes as
//! sources, and appends cycle members at the tail in source-line order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rung_dsl::{NodeKind, Program};

/// Which resolver builds the scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    #[default]
    SourceOrder,
    Kahn,
}

/// Per-scan evaluation order over node indices
#[derive(Debug, Clone)]
pub struct ScanOrder {
    indices: Vec<usize>,
    forward_refs: bool,
    cycles: bool,
}

impl ScanOrder {
    pub fn build(program: &Program, policy: OrderPolicy) -> ScanOrder {
        match policy {
            OrderPolicy::SourceOrder => ScanOrder::source(program),
            OrderPolicy::Kahn => ScanOrder::kahn(program),
        }
    }

    /// Source-order policy: indices `0..n`, plus a forward-reference flag
    /// for informational use.
    pub fn source(program: &Program) -> ScanOrder {
        let producers = producer_map(program);

        let mut forward_refs = false;
        'scan: for (i, node) in program.nodes.iter().enumerate() {
            for input in &node.inputs {
                if let Some(prods) = producers.get(&input.index()) {
                    let produced_earlier = prods.iter().any(|&p| p <= i);
                    if !produced_earlier && prods.iter().any(|&p| p > i) {
                        forward_refs = true;
                        break 'scan;
                    }
                }
            }
        }

        ScanOrder {
            indices: (0..program.nodes.len()).collect(),
            forward_refs,
            cycles: false,
        }
    }

    /// Kahn topological policy. BTN nodes are sources (their inputs are
    /// user-controlled); ties break by source line then node index; cycle
    /// members are appended at the tail in source-line order.
    pub fn kahn(program: &Program) -> ScanOrder {
        let node_count = program.nodes.len();
        if node_count == 0 {
            return ScanOrder {
                indices: Vec::new(),
                forward_refs: false,
                cycles: false,
            };
        }

        let producers = producer_map(program);

        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        let mut in_degree = vec![0usize; node_count];
        for (i, node) in program.nodes.iter().enumerate() {
            if node.kind == NodeKind::Btn {
                continue;
            }
            for input in &node.inputs {
                let Some(prods) = producers.get(&input.index()) else {
                    continue;
                };
                for &p in prods {
                    if p == i {
                        continue;
                    }
                    adj[p].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        // min-heap keyed by (source line, index) keeps the order stable
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
        for (i, node) in program.nodes.iter().enumerate() {
            if in_degree[i] == 0 {
                ready.push(Reverse((node.line, i)));
            }
        }

        let mut indices = Vec::with_capacity(node_count);
        while let Some(Reverse((_, u))) = ready.pop() {
            indices.push(u);
            for &v in &adj[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    ready.push(Reverse((program.nodes[v].line, v)));
                }
            }
        }

        let mut cycles = false;
        if indices.len() < node_count {
            cycles = true;
            let mut remainder: Vec<usize> = (0..node_count)
                .filter(|i| !indices.contains(i))
                .collect();
            remainder.sort_by_key(|&i| (program.nodes[i].line, i));
            indices.extend(remainder);
        }

        ScanOrder {
            indices,
            forward_refs: false,
            cycles,
        }
    }

    /// Node indices in evaluation order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether any node reads a signal only produced later in the order
    pub fn has_forward_refs(&self) -> bool {
        self.forward_refs
    }

    /// Whether the Kahn pass found a dependency cycle
    pub fn has_cycles(&self) -> bool {
        self.cycles
    }
}

/// signal index -> producing node indices
fn producer_map(program: &Program) -> HashMap<usize, Vec<usize>> {
    let mut producers: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, node) in program.nodes.iter().enumerate() {
        for output in &node.outputs {
            producers.entry(output.index()).or_default().push(i);
        }
        if let Some(cv) = node.cv_output {
            producers.entry(cv.index()).or_default().push(i);
        }
    }
    producers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rung_dsl::parse_source;

    #[test]
    fn test_source_order_is_file_order() {
        let prog = parse_source("IN A\nOUT Y\nNOT n1(A) -> T\nNOT n2(T) -> Y\n").unwrap();
        let order = ScanOrder::source(&prog);
        assert_eq!(order.indices(), &[0, 1]);
        assert!(!order.has_forward_refs());
    }

    #[test]
    fn test_source_order_flags_forward_reference() {
        // n1 reads T, which only n2 (later) produces
        let prog = parse_source("IN A\nOUT Y\nNOT n1(T) -> Y\nNOT n2(A) -> T\n").unwrap();
        let order = ScanOrder::source(&prog);
        assert_eq!(order.indices(), &[0, 1]);
        assert!(order.has_forward_refs());
    }

    #[test]
    fn test_self_feedback_is_not_a_forward_reference() {
        let prog = parse_source("IN S\nOUT Q\nAND g(Q, S) -> Q\n").unwrap();
        let order = ScanOrder::source(&prog);
        assert!(!order.has_forward_refs());
    }

    #[test]
    fn test_kahn_reorders_forward_reference() {
        let prog = parse_source("IN A\nOUT Y\nNOT n1(T) -> Y\nNOT n2(A) -> T\n").unwrap();
        let order = ScanOrder::kahn(&prog);
        assert_eq!(order.indices(), &[1, 0]);
        assert!(!order.has_cycles());
    }

    #[test]
    fn test_kahn_appends_cycle_in_line_order() {
        // n1 and n2 feed each other
        let prog = parse_source("OUT Y\nNOT n1(B) -> A\nNOT n2(A) -> B\nBTN b() -> Y\n").unwrap();
        let order = ScanOrder::kahn(&prog);
        assert!(order.has_cycles());
        assert_eq!(order.len(), 3);
        // the BTN source schedules first, the cycle tail keeps line order
        assert_eq!(order.indices(), &[2, 0, 1]);
    }

    #[test]
    fn test_both_policies_cover_all_nodes() {
        let prog =
            parse_source("IN A, B\nOUT Y\nAND g(A, NOT(B)) -> T\nOR o(T, A) -> Y\n").unwrap();
        assert_eq!(ScanOrder::source(&prog).len(), prog.nodes.len());
        assert_eq!(ScanOrder::kahn(&prog).len(), prog.nodes.len());
    }
}
