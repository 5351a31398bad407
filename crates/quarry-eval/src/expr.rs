//! Lazily evaluated expression trees.
//!
//! Every node carries a `ready` flag and a result value. The protocol:
//!
//! - [`Node::reset`] clears `ready` (recursively) and rewinds cursors;
//!   constants ignore it.
//! - [`Node::eval`] advances the node toward readiness; it may be called
//!   repeatedly and is a no-op once `ready` is set.
//! - [`Node::result`] is meaningful only while `ready` holds.
//!
//! The one resumable node is `Exists`: each `eval` advances a cursor
//! through the event's flattened leaves and only becomes ready once the
//! cursor is exhausted, so a relational parent can iterate candidate
//! matches. That retry protocol is consumed exclusively by the relational
//! operator's nested loops; all other extractors are single-shot.

use std::cmp::Ordering;

use quarry_parser::{CompareOp, Value, ValueKind};

use crate::event::Event;

/// A node of a compiled expression tree.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    ready: bool,
    result: Value,
}

/// The closed set of node variants.
#[derive(Debug)]
enum NodeKind {
    TimestampExtractor,
    NameExtractor,
    IdExtractor,
    OffsetExtractor {
        offsets: Vec<usize>,
    },
    Exists {
        wanted: ValueKind,
        current: usize,
        flat_size: usize,
    },
    Constant,
    Conjunction {
        operands: Vec<Node>,
    },
    Disjunction {
        operands: Vec<Node>,
    },
    Relational {
        op: CompareOp,
        operands: Vec<Node>,
    },
}

impl Node {
    pub fn timestamp_extractor() -> Self {
        Node::new(NodeKind::TimestampExtractor)
    }

    pub fn name_extractor() -> Self {
        Node::new(NodeKind::NameExtractor)
    }

    pub fn id_extractor() -> Self {
        Node::new(NodeKind::IdExtractor)
    }

    pub fn offset_extractor(offsets: Vec<usize>) -> Self {
        debug_assert!(!offsets.is_empty());
        Node::new(NodeKind::OffsetExtractor { offsets })
    }

    pub fn exists(wanted: ValueKind) -> Self {
        Node::new(NodeKind::Exists {
            wanted,
            current: 0,
            flat_size: 0,
        })
    }

    /// A constant is ready from construction and ignores `reset`/`eval`.
    pub fn constant(value: Value) -> Self {
        Node {
            kind: NodeKind::Constant,
            ready: true,
            result: value,
        }
    }

    pub fn conjunction() -> Self {
        Node::new(NodeKind::Conjunction {
            operands: Vec::new(),
        })
    }

    pub fn disjunction() -> Self {
        Node::new(NodeKind::Disjunction {
            operands: Vec::new(),
        })
    }

    pub fn relational(op: CompareOp) -> Self {
        Node::new(NodeKind::Relational {
            op,
            operands: Vec::new(),
        })
    }

    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            ready: false,
            result: Value::Invalid,
        }
    }

    /// Append an operand to a conjunction, disjunction or relational node.
    pub fn add(&mut self, operand: Node) {
        match &mut self.kind {
            NodeKind::Conjunction { operands }
            | NodeKind::Disjunction { operands }
            | NodeKind::Relational { operands, .. } => operands.push(operand),
            _ => debug_assert!(false, "only operator nodes take operands"),
        }
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// The current result. Meaningful only while [`ready`](Node::ready).
    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn operands(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Conjunction { operands }
            | NodeKind::Disjunction { operands }
            | NodeKind::Relational { operands, .. } => operands,
            _ => &[],
        }
    }

    pub(crate) fn child_mut(&mut self, index: usize) -> &mut Node {
        match &mut self.kind {
            NodeKind::Conjunction { operands }
            | NodeKind::Disjunction { operands }
            | NodeKind::Relational { operands, .. } => &mut operands[index],
            _ => panic!("leaf nodes have no children"),
        }
    }

    pub fn is_extractor(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::TimestampExtractor
                | NodeKind::NameExtractor
                | NodeKind::IdExtractor
                | NodeKind::OffsetExtractor { .. }
                | NodeKind::Exists { .. }
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    /// Paths (child-index sequences) of all extractor nodes reachable from
    /// this node, in depth-first order.
    pub fn extractor_paths(&self) -> Vec<Vec<usize>> {
        fn walk(node: &Node, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if node.is_extractor() {
                out.push(prefix.clone());
            }
            for (i, child) in node.operands().iter().enumerate() {
                prefix.push(i);
                walk(child, prefix, out);
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }

    /// Feed every extractor reachable from this node. Compiled
    /// expressions feed through their flat extractor list instead; this
    /// walk serves hand-built trees.
    pub fn feed_all(&mut self, event: &Event) {
        if self.is_extractor() {
            self.feed(event);
            return;
        }
        match &mut self.kind {
            NodeKind::Conjunction { operands }
            | NodeKind::Disjunction { operands }
            | NodeKind::Relational { operands, .. } => {
                for operand in operands {
                    operand.feed_all(event);
                }
            }
            _ => {}
        }
    }

    /// Re-arm an extractor for a new event. The exists cursor restarts at
    /// the first leaf.
    pub fn feed(&mut self, event: &Event) {
        match &mut self.kind {
            NodeKind::Exists {
                current, flat_size, ..
            } => {
                *current = 0;
                *flat_size = event.flat_size();
                self.ready = false;
            }
            NodeKind::TimestampExtractor
            | NodeKind::NameExtractor
            | NodeKind::IdExtractor
            | NodeKind::OffsetExtractor { .. } => self.ready = false,
            _ => debug_assert!(false, "only extractors are fed"),
        }
    }

    /// Clear `ready` here and below. Constants stay ready.
    pub fn reset(&mut self) {
        match &mut self.kind {
            NodeKind::Constant => {}
            NodeKind::Exists { current, .. } => {
                *current = 0;
                self.ready = false;
            }
            NodeKind::Conjunction { operands }
            | NodeKind::Disjunction { operands }
            | NodeKind::Relational { operands, .. } => {
                for operand in operands {
                    operand.reset();
                }
                self.ready = false;
            }
            _ => self.ready = false,
        }
    }

    fn result_is_true(&self) -> bool {
        // Non-boolean results (notably the invalid value) count as false.
        matches!(self.result, Value::Bool(true))
    }

    /// Advance this node toward readiness against the given event.
    pub fn eval(&mut self, event: &Event) {
        if self.ready {
            return;
        }
        match &mut self.kind {
            NodeKind::Constant => {}

            NodeKind::TimestampExtractor => {
                self.result = Value::Timestamp(event.timestamp());
                self.ready = true;
            }

            NodeKind::NameExtractor => {
                self.result = Value::String(event.name().to_string());
                self.ready = true;
            }

            NodeKind::IdExtractor => {
                self.result = Value::Int(event.id() as i64);
                self.ready = true;
            }

            NodeKind::OffsetExtractor { offsets } => {
                self.result = if event.is_empty() {
                    Value::Invalid
                } else {
                    walk_offsets(event.record(), offsets)
                };
                self.ready = true;
            }

            NodeKind::Exists {
                wanted,
                current,
                flat_size,
            } => {
                while *current < *flat_size {
                    let arg = event.flat_at(*current);
                    *current += 1;
                    if arg.which() == *wanted {
                        self.result = arg.clone();
                        // Stay not-ready while more leaves remain, so the
                        // relational parent can ask for the next candidate.
                        if *current == *flat_size {
                            self.ready = true;
                        }
                        return;
                    }
                }
                // No more leaves: the result keeps its previous setting.
                self.ready = true;
            }

            NodeKind::Conjunction { operands } => {
                let mut all_ready = true;
                let mut result = true;
                for operand in operands.iter_mut() {
                    if !operand.ready {
                        operand.eval(event);
                    }
                    if !operand.ready {
                        all_ready = false;
                    }
                    if !operand.result_is_true() {
                        result = false;
                        break;
                    }
                }
                self.result = Value::Bool(result);
                self.ready = all_ready;
            }

            NodeKind::Disjunction { operands } => {
                let mut all_ready = true;
                let mut result = false;
                for operand in operands.iter_mut() {
                    if !operand.ready {
                        operand.eval(event);
                    }
                    if !operand.ready {
                        all_ready = false;
                    }
                    if operand.result_is_true() {
                        result = true;
                        break;
                    }
                }
                self.result = Value::Bool(result);
                // A true disjunct settles the verdict even with
                // not-yet-ready siblings.
                self.ready = all_ready || result;
            }

            NodeKind::Relational { op, operands } => {
                debug_assert_eq!(operands.len(), 2);
                let op = *op;
                let (lhs, rhs) = operands.split_at_mut(1);
                let lhs = &mut lhs[0];
                let rhs = &mut rhs[0];

                let mut matched = false;
                loop {
                    if !lhs.ready {
                        lhs.eval(event);
                    }
                    loop {
                        if !rhs.ready {
                            rhs.eval(event);
                        }
                        if test_op(op, &lhs.result, &rhs.result) {
                            matched = true;
                            break;
                        }
                        if rhs.ready {
                            break;
                        }
                    }
                    if matched || lhs.ready {
                        break;
                    }
                }
                self.result = Value::Bool(matched);
                self.ready = true;
            }
        }
    }
}

fn walk_offsets(mut record: &[Value], offsets: &[usize]) -> Value {
    let Some((&last, walk)) = offsets.split_last() else {
        return Value::Invalid;
    };
    for &off in walk {
        if off >= record.len() {
            return Value::Invalid;
        }
        match record[off].as_record() {
            Some(nested) => record = nested,
            None => return Value::Invalid,
        }
    }
    if last < record.len() {
        record[last].clone()
    } else {
        Value::Invalid
    }
}

/// The relational operator table.
///
/// Type mismatches yield `false` for the match and membership families
/// (including their negated forms); the equality family uses per-tag
/// equality with the invalid value unequal to everything; the order family
/// uses the deterministic total order of [`Value::total_cmp`].
pub fn test_op(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Match => match (lhs, rhs) {
            (Value::String(s), Value::Regex(re)) => re.matches(s),
            _ => false,
        },
        CompareOp::NotMatch => match (lhs, rhs) {
            (Value::String(s), Value::Regex(re)) => !re.matches(s),
            _ => false,
        },
        CompareOp::In => match (lhs, rhs) {
            (Value::String(s), Value::Regex(re)) => re.search(s),
            (Value::Addr(a), Value::Subnet(n)) => n.contains(a),
            _ => false,
        },
        CompareOp::NotIn => match (lhs, rhs) {
            (Value::String(s), Value::Regex(re)) => !re.search(s),
            (Value::Addr(a), Value::Subnet(n)) => !n.contains(a),
            _ => false,
        },
        CompareOp::Equal => lhs == rhs,
        CompareOp::NotEqual => lhs != rhs,
        CompareOp::Less => lhs.total_cmp(rhs) == Ordering::Less,
        CompareOp::LessEqual => lhs.total_cmp(rhs) != Ordering::Greater,
        CompareOp::Greater => lhs.total_cmp(rhs) == Ordering::Greater,
        CompareOp::GreaterEqual => lhs.total_cmp(rhs) != Ordering::Less,
    }
}
