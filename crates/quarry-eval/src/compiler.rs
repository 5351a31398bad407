//! Compile query text into executable expression trees.
//!
//! The pipeline: parse → validate → normalize to disjunctive normal form →
//! lower each clause into extractor + constant + relational subtrees,
//! collecting the extractor nodes into a flat list for event feeding.
//!
//! Normalization happens in two steps. Negations are first pushed down to
//! the clauses (De Morgan, with double negations cancelling); a negation
//! arriving at a clause is consumed by replacing the relational operator
//! with its logical inverse. The negation-free tree is then distributed
//! into an OR of ANDs. A query without `||` compiles to a single
//! conjunction at the root.

use log::warn;

use quarry_parser::{Clause, CompareOp, Expr, TagField, Value, ValueKind, fold};

use crate::error::Result;
use crate::event::Event;
use crate::expr::Node;
use crate::schema::Schema;

// =============================================================================
// Options
// =============================================================================

/// How an event clause resolves the offset of its value predicate.
///
/// The default reads the first record field; resolving the named field
/// through the schema is available behind this switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOffsetMode {
    /// Always use offset `[0]`.
    #[default]
    Fixed,
    /// Resolve the field named in the clause through the schema, falling
    /// back to `[0]` when the lookup fails.
    Schema,
}

/// Compile-time switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub event_offsets: EventOffsetMode,
}

// =============================================================================
// Expression
// =============================================================================

/// A path of child indices from the root to a node.
pub type NodePath = Vec<usize>;

/// A compiled, evaluatable query.
///
/// Holds the source text, the schema snapshot, the operator tree and the
/// flat catalogue of extractor positions. Cloning recompiles from the
/// source text: per-evaluation node state is not worth deep-cloning.
///
/// A single expression is not safe to evaluate from two threads at once
/// (nodes carry mutable ready/result/cursor state); independent clones
/// are fully isolated.
#[derive(Debug)]
pub struct Expression {
    source: String,
    schema: Schema,
    options: CompileOptions,
    root: Node,
    extractors: Vec<NodePath>,
}

impl Expression {
    /// Compile a query against a schema with default options.
    pub fn compile(source: &str, schema: Schema) -> Result<Self> {
        Self::compile_with(source, schema, CompileOptions::default())
    }

    /// Compile a query against a schema.
    pub fn compile_with(
        source: &str,
        schema: Schema,
        options: CompileOptions,
    ) -> Result<Self> {
        let ast = quarry_parser::parse_query(source)?;
        quarry_parser::validate(source, &ast)?;

        let dnf = to_dnf(to_nnf(&ast, false));
        debug_assert!(!dnf.is_empty());

        let lowerer = Lowerer {
            schema: &schema,
            options,
        };

        let (root, extractors) = if dnf.len() == 1 {
            // Without `||`, the root is a single conjunction.
            lowerer.lower_conjunction(&dnf[0])?
        } else {
            let mut disjunction = Node::disjunction();
            let mut extractors = Vec::new();
            for group in &dnf {
                let index = disjunction.operands().len();
                if let [only] = group.as_slice()
                    && !matches!(only.clause, Clause::Event { .. })
                {
                    // A one-clause group hangs its relational directly
                    // under the disjunction.
                    extractors.push(vec![index, 0]);
                    disjunction.add(lowerer.lower_relation(only)?);
                } else {
                    let (conjunction, paths) = lowerer.lower_conjunction(group)?;
                    extractors.extend(paths.into_iter().map(|mut p| {
                        p.insert(0, index);
                        p
                    }));
                    disjunction.add(conjunction);
                }
            }
            (disjunction, extractors)
        };

        debug_assert!(!extractors.is_empty());

        Ok(Expression {
            source: source.to_string(),
            schema,
            options,
            root,
            extractors,
        })
    }

    /// Evaluate one event: feed all extractors, pump the root until it is
    /// ready, read the boolean verdict, reset the tree.
    pub fn eval(&mut self, event: &Event) -> bool {
        for path in &self.extractors {
            node_at(&mut self.root, path).feed(event);
        }

        while !self.root.ready() {
            self.root.eval(event);
        }

        debug_assert_eq!(self.root.result().which(), ValueKind::Bool);
        let verdict = matches!(self.root.result(), Value::Bool(true));

        self.root.reset();
        verdict
    }

    /// The query text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// The root of the operator tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Positions of every extractor node, as collected during lowering.
    pub fn extractor_paths(&self) -> &[NodePath] {
        &self.extractors
    }
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        Expression::compile_with(&self.source, self.schema.clone(), self.options)
            .expect("recompiling previously compiled query text cannot fail")
    }
}

fn node_at<'a>(mut node: &'a mut Node, path: &[usize]) -> &'a mut Node {
    for &index in path {
        node = node.child_mut(index);
    }
    node
}

// =============================================================================
// Normalization
// =============================================================================

/// A clause plus its pending inversion, produced by pushing `!` down to
/// the leaves. The flag is consumed during lowering by negating the
/// relational operator.
#[derive(Clone, Copy)]
struct NormClause<'a> {
    clause: &'a Clause,
    negated: bool,
}

enum Nnf<'a> {
    Leaf(NormClause<'a>),
    And(Vec<Nnf<'a>>),
    Or(Vec<Nnf<'a>>),
}

/// Push negations down to the clauses: `!(a && b)` becomes `!a || !b`,
/// `!!a` becomes `a`.
fn to_nnf(expr: &Expr, negated: bool) -> Nnf<'_> {
    match expr {
        Expr::Clause(clause) => Nnf::Leaf(NormClause { clause, negated }),
        Expr::Not(inner) => to_nnf(inner, !negated),
        Expr::And(children) => {
            let children = children.iter().map(|c| to_nnf(c, negated)).collect();
            if negated {
                Nnf::Or(children)
            } else {
                Nnf::And(children)
            }
        }
        Expr::Or(children) => {
            let children = children.iter().map(|c| to_nnf(c, negated)).collect();
            if negated {
                Nnf::And(children)
            } else {
                Nnf::Or(children)
            }
        }
    }
}

/// Distribute a negation-free tree into an OR of ANDs.
fn to_dnf<'a>(nnf: Nnf<'a>) -> Vec<Vec<NormClause<'a>>> {
    match nnf {
        Nnf::Leaf(leaf) => vec![vec![leaf]],
        Nnf::Or(children) => children.into_iter().flat_map(to_dnf).collect(),
        Nnf::And(children) => {
            let mut groups: Vec<Vec<NormClause<'a>>> = vec![Vec::new()];
            for child in children {
                let child_groups = to_dnf(child);
                let mut next = Vec::with_capacity(groups.len() * child_groups.len());
                for group in &groups {
                    for child_group in &child_groups {
                        let mut combined = group.clone();
                        combined.extend_from_slice(child_group);
                        next.push(combined);
                    }
                }
                groups = next;
            }
            groups
        }
    }
}

// =============================================================================
// Lowering
// =============================================================================

struct Lowerer<'a> {
    schema: &'a Schema,
    options: CompileOptions,
}

impl Lowerer<'_> {
    /// Lower one DNF group into a conjunction node, returning extractor
    /// paths relative to that node.
    fn lower_conjunction(&self, group: &[NormClause]) -> Result<(Node, Vec<NodePath>)> {
        let mut conjunction = Node::conjunction();
        let mut paths = Vec::new();
        for norm in group {
            match norm.clause {
                Clause::Event { pattern, .. } => {
                    // The name match lands in the enclosing conjunction,
                    // untouched by the inversion flag.
                    paths.push(vec![conjunction.operands().len(), 0]);
                    conjunction.add(self.name_match(pattern)?);

                    paths.push(vec![conjunction.operands().len(), 0]);
                    conjunction.add(self.lower_event_relation(norm)?);
                }
                _ => {
                    paths.push(vec![conjunction.operands().len(), 0]);
                    conjunction.add(self.lower_relation(norm)?);
                }
            }
        }
        Ok((conjunction, paths))
    }

    /// Lower a tag, type or offset clause into
    /// `relational(op, extractor, constant)`.
    fn lower_relation(&self, norm: &NormClause) -> Result<Node> {
        let lhs = match norm.clause {
            Clause::Tag {
                field: TagField::Name,
                ..
            } => Node::name_extractor(),
            Clause::Tag {
                field: TagField::Time,
                ..
            } => Node::timestamp_extractor(),
            Clause::Tag {
                field: TagField::Id,
                ..
            } => Node::id_extractor(),
            Clause::Type { kind, .. } => Node::exists(*kind),
            Clause::Offset { offsets, .. } => Node::offset_extractor(offsets.clone()),
            Clause::Event { .. } => unreachable!("event clauses lower separately"),
        };
        self.relation_with(norm, lhs)
    }

    /// Lower the value predicate of an event clause. In schema mode the
    /// named field resolves through the schema; otherwise (and on lookup
    /// failure) the offset is the fixed `[0]`.
    fn lower_event_relation(&self, norm: &NormClause) -> Result<Node> {
        let Clause::Event { pattern, field, .. } = norm.clause else {
            unreachable!("caller dispatched on the event variant");
        };

        let offsets = match (self.options.event_offsets, field) {
            (EventOffsetMode::Schema, Some(field)) => self
                .schema
                .resolve_offsets(pattern, field)
                .unwrap_or_else(|| {
                    warn!("no field `{field}` in schema for `{pattern}`, using offset 0");
                    vec![0]
                }),
            _ => vec![0],
        };

        self.relation_with(norm, Node::offset_extractor(offsets))
    }

    fn relation_with(&self, norm: &NormClause, lhs: Node) -> Result<Node> {
        // A pushed-down negation is consumed here, by the operator.
        let op = if norm.negated {
            norm.clause.op().negate()
        } else {
            norm.clause.op()
        };

        let rhs = Node::constant(fold(norm.clause.rhs())?);

        let mut relation = Node::relational(op);
        relation.add(lhs);
        relation.add(rhs);
        Ok(relation)
    }

    /// The name-match half of an event clause: a glob regex when the
    /// pattern carries wildcards, plain equality otherwise.
    fn name_match(&self, pattern: &str) -> Result<Node> {
        let glob = pattern.contains(['*', '?']);

        let mut relation = Node::relational(if glob {
            CompareOp::Match
        } else {
            CompareOp::Equal
        });
        relation.add(Node::name_extractor());
        relation.add(Node::constant(if glob {
            Value::Regex(quarry_parser::Regexp::glob(pattern)?)
        } else {
            Value::String(pattern.to_string())
        }));
        Ok(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quarry_parser::Value;

    fn event(name: &str, id: u64, record: Vec<Value>) -> Event {
        let ts = Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap();
        Event::new(id, ts, name, record)
    }

    fn compile(query: &str) -> Expression {
        Expression::compile(query, Schema::default()).unwrap()
    }

    #[test]
    fn root_is_conjunction_without_or() {
        let expr = compile(r#"name == "http""#);
        // conjunction → relational → [extractor, constant]
        assert_eq!(expr.root().operands().len(), 1);
        let relation = &expr.root().operands()[0];
        assert_eq!(relation.operands().len(), 2);
        assert!(relation.operands()[0].is_extractor());
        assert!(relation.operands()[1].is_constant());
    }

    #[test]
    fn disjunction_root_with_or() {
        let expr = compile(r#"name == "http" || id == 1"#);
        assert_eq!(expr.root().operands().len(), 2);
    }

    #[test]
    fn extractor_list_matches_reachable_set() {
        for query in [
            r#"name == "http""#,
            r#"name == "http" && id == 1"#,
            r#"name == "a" || id == 1 && time > 2011-01-01"#,
            r#":addr in 10.0.0.0/8 || conn* : == 443"#,
            r#"!(name == "a" && @0.1 < 5)"#,
        ] {
            let expr = compile(query);
            let mut collected: Vec<_> = expr.extractor_paths().to_vec();
            let mut reachable = expr.root().extractor_paths();
            collected.sort();
            reachable.sort();
            assert_eq!(collected, reachable, "for query {query}");
        }
    }

    #[test]
    fn eval_feeds_pumps_and_resets() {
        let mut expr = compile(r#"name == "http""#);
        let e = event("http", 1, vec![]);
        assert!(expr.eval(&e));
        // All non-constant nodes are left not-ready.
        fn check(node: &Node) {
            if node.is_constant() {
                assert!(node.ready());
            } else {
                assert!(!node.ready());
            }
            for child in node.operands() {
                check(child);
            }
        }
        check(expr.root());
    }

    #[test]
    fn negated_group_inverts_operators() {
        // !(id == 7) must hold exactly when id != 7.
        let mut expr = compile("!(id == 7)");
        assert!(!expr.eval(&event("x", 7, vec![])));
        assert!(expr.eval(&event("x", 8, vec![])));
    }

    #[test]
    fn double_negation_cancels() {
        let mut expr = compile("!!(id == 7)");
        assert!(expr.eval(&event("x", 7, vec![])));
        assert!(!expr.eval(&event("x", 8, vec![])));
    }

    #[test]
    fn distribution_over_parenthesized_or() {
        // (a || b) && c normalizes to (a && c) || (b && c): two groups.
        let expr = compile(r#"(name == "a" || name == "b") && id == 1"#);
        assert_eq!(expr.root().operands().len(), 2);
        assert_eq!(expr.root().operands()[0].operands().len(), 2);
    }

    #[test]
    fn event_clause_builds_name_match_and_offset_relation() {
        let mut expr = compile(r#"conn* : == 443"#);
        // Single group: conjunction root with two relationals.
        assert_eq!(expr.root().operands().len(), 2);

        assert!(expr.eval(&event("conn1", 1, vec![Value::Int(443)])));
        assert!(!expr.eval(&event("conn1", 1, vec![Value::Int(80)])));
        assert!(!expr.eval(&event("dns", 1, vec![Value::Int(443)])));
    }

    #[test]
    fn event_clause_exact_name_uses_equality() {
        let mut expr = compile(r#"conn : == 443"#);
        assert!(expr.eval(&event("conn", 1, vec![Value::Int(443)])));
        assert!(!expr.eval(&event("conn2", 1, vec![Value::Int(443)])));
    }

    #[test]
    fn singleton_event_group_in_disjunction_gets_a_conjunction() {
        let mut expr = compile(r#"id == 9 || conn : == 443"#);
        assert_eq!(expr.root().operands().len(), 2);
        // The event group is a conjunction of two relationals.
        assert_eq!(expr.root().operands()[1].operands().len(), 2);

        assert!(expr.eval(&event("conn", 1, vec![Value::Int(443)])));
        assert!(expr.eval(&event("dns", 9, vec![])));
        assert!(!expr.eval(&event("dns", 1, vec![Value::Int(443)])));
    }

    #[test]
    fn event_clause_schema_mode_resolves_field() {
        use crate::schema::{EventDecl, Field, Type};

        let schema = Schema::new(vec![EventDecl::new(
            "conn",
            vec![
                Field::new("proto", Type::String),
                Field::new("resp_port", Type::Int),
            ],
        )]);
        let options = CompileOptions {
            event_offsets: EventOffsetMode::Schema,
        };
        let mut expr =
            Expression::compile_with("conn : resp_port == 443", schema.clone(), options)
                .unwrap();
        let record = vec![Value::String("tcp".into()), Value::Int(443)];
        assert!(expr.eval(&event("conn", 1, record)));

        // Fixed mode ignores the field and reads offset 0.
        let mut fixed = Expression::compile("conn : resp_port == 443", schema).unwrap();
        let record = vec![Value::Int(443), Value::Int(9)];
        assert!(fixed.eval(&event("conn", 1, record)));
    }

    #[test]
    fn clone_recompiles_and_agrees() {
        let mut expr = compile(r#"name == "http" && !(id == 7)"#);
        let mut copy = expr.clone();
        assert_eq!(expr.source(), copy.source());
        for e in [
            event("http", 1, vec![]),
            event("http", 7, vec![]),
            event("dns", 1, vec![]),
        ] {
            assert_eq!(expr.eval(&e), copy.eval(&e));
        }
    }

    #[test]
    fn expression_is_reusable_across_events() {
        let mut expr = compile("id >= 5");
        for i in 0..10 {
            assert_eq!(expr.eval(&event("x", i, vec![])), i >= 5);
        }
    }
}
