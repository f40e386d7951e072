//! Boolean expressions over relations.
//!
//! A [`RelationContext`] is a tree: leaves are relations or callbacks,
//! internal nodes apply one of the fixed logical operators. Evaluation is
//! pull-based, so an expression always reflects the current truth of the
//! relations it reads.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::relation::{RelationId, TruthCallback};
use crate::truth::{TruthState, TruthValue};

/// Supplies the current truth of a relation to an expression.
pub trait TruthResolver {
    /// Resolves the truth of `relation`. Unknown relations resolve to UNKNOWN.
    fn resolve_relation(&self, relation: RelationId) -> TruthValue;
}

/// The fixed set of logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Not,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl LogicOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Not => "NOT",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Nand => "NAND",
            Self::Nor => "NOR",
            Self::Xnor => "XNOR",
        }
    }

    fn check_arity(self, actual: usize) -> Result<(), ValidationError> {
        let ok = match self {
            Self::Not => actual == 1,
            _ => actual >= 2,
        };
        if ok {
            return Ok(());
        }
        Err(ValidationError::InvalidArity {
            operator: self.as_str().to_string(),
            expected: if self == Self::Not { "exactly 1" } else { "at least 2" },
            actual,
        })
    }

    /// Applies the operator to already-evaluated operands.
    #[must_use]
    pub fn apply(self, values: &[TruthValue]) -> TruthValue {
        match self {
            Self::Not => values.first().map_or(TruthValue::UNKNOWN, TruthValue::not),
            Self::And => TruthValue::and_all(values),
            Self::Or => TruthValue::or_all(values),
            Self::Xor => TruthValue::xor_all(values),
            Self::Nand => TruthValue::and_all(values).not(),
            Self::Nor => TruthValue::or_all(values).not(),
            Self::Xnor => TruthValue::xor_all(values).not(),
        }
    }
}

impl FromStr for LogicOp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NOT" => Ok(Self::Not),
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            "XOR" => Ok(Self::Xor),
            "NAND" => Ok(Self::Nand),
            "NOR" => Ok(Self::Nor),
            "XNOR" => Ok(Self::Xnor),
            _ => Err(ValidationError::UnknownOperator {
                operator: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A boolean expression tree over relations.
///
/// # Examples
///
/// ```
/// use logos_ontology::{RelationContext, RelationId, TruthResolver, TruthState, TruthValue};
/// use std::collections::HashMap;
///
/// struct Facts(HashMap<RelationId, TruthValue>);
///
/// impl TruthResolver for Facts {
///     fn resolve_relation(&self, id: RelationId) -> TruthValue {
///         self.0.get(&id).copied().unwrap_or_default()
///     }
/// }
///
/// let (a, b, c) = (RelationId::new(), RelationId::new(), RelationId::new());
/// let facts = Facts(HashMap::from([
///     (a, TruthValue::TRUE),
///     (b, TruthValue::TRUE),
///     (c, TruthValue::FALSE),
/// ]));
///
/// let expr = RelationContext::relation(a)
///     & (!RelationContext::relation(c) | RelationContext::relation(b));
/// assert_eq!(expr.evaluate(&facts).evaluate(), TruthState::True);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RelationContext {
    /// Reads the truth of a relation.
    Relation(RelationId),
    /// Reads a callback.
    Callback(TruthCallback),
    /// Applies an operator to sub-expressions.
    Node {
        op: LogicOp,
        operands: Vec<RelationContext>,
    },
}

impl RelationContext {
    #[must_use]
    pub const fn relation(id: RelationId) -> Self {
        Self::Relation(id)
    }

    pub fn callback(f: impl Fn() -> TruthState + Send + Sync + 'static) -> Self {
        Self::Callback(TruthCallback::new(f))
    }

    /// Builds an operator node.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidArity` if NOT does not get exactly one
    /// operand or another operator gets fewer than two.
    pub fn node(op: LogicOp, operands: Vec<Self>) -> Result<Self, ValidationError> {
        op.check_arity(operands.len())?;
        Ok(Self::Node { op, operands })
    }

    /// Builds an operator node from an operator name.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownOperator` for a name outside the fixed
    /// set and `ValidationError::InvalidArity` for a bad operand count.
    pub fn from_operator(operator: &str, operands: Vec<Self>) -> Result<Self, ValidationError> {
        Self::node(operator.parse()?, operands)
    }

    fn binary(op: LogicOp, left: Self, right: Self) -> Self {
        Self::Node {
            op,
            operands: vec![left, right],
        }
    }

    #[must_use]
    pub fn nand(self, other: Self) -> Self {
        Self::binary(LogicOp::Nand, self, other)
    }

    #[must_use]
    pub fn nor(self, other: Self) -> Self {
        Self::binary(LogicOp::Nor, self, other)
    }

    #[must_use]
    pub fn xnor(self, other: Self) -> Self {
        Self::binary(LogicOp::Xnor, self, other)
    }

    /// Evaluates the expression against the current state of `resolver`.
    pub fn evaluate<R: TruthResolver + ?Sized>(&self, resolver: &R) -> TruthValue {
        match self {
            Self::Relation(id) => resolver.resolve_relation(*id),
            Self::Callback(callback) => TruthValue::from_state(callback.call()),
            Self::Node { op, operands } => {
                let values: Vec<TruthValue> =
                    operands.iter().map(|o| o.evaluate(resolver)).collect();
                op.apply(&values)
            }
        }
    }

    /// Relation leaves in first-seen order, without duplicates.
    #[must_use]
    pub fn relations(&self) -> Vec<RelationId> {
        let mut out = Vec::new();
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations(&self, out: &mut Vec<RelationId>) {
        match self {
            Self::Relation(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Self::Callback(_) => {}
            Self::Node { operands, .. } => {
                for operand in operands {
                    operand.collect_relations(out);
                }
            }
        }
    }

    /// Returns true if any leaf is a callback.
    #[must_use]
    pub fn has_callback(&self) -> bool {
        match self {
            Self::Relation(_) => false,
            Self::Callback(_) => true,
            Self::Node { operands, .. } => operands.iter().any(Self::has_callback),
        }
    }
}

impl From<RelationId> for RelationContext {
    fn from(id: RelationId) -> Self {
        Self::Relation(id)
    }
}

impl Not for RelationContext {
    type Output = Self;

    fn not(self) -> Self {
        Self::Node {
            op: LogicOp::Not,
            operands: vec![self],
        }
    }
}

impl BitAnd for RelationContext {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self::binary(LogicOp::And, self, rhs)
    }
}

impl BitOr for RelationContext {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::binary(LogicOp::Or, self, rhs)
    }
}

impl BitXor for RelationContext {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self::binary(LogicOp::Xor, self, rhs)
    }
}

impl fmt::Display for RelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relation(id) => write!(f, "{id}"),
            Self::Callback(_) => write!(f, "<callback>"),
            Self::Node { op: LogicOp::Not, operands } => match operands.first() {
                Some(inner) => write!(f, "NOT {inner}"),
                None => write!(f, "NOT ()"),
            },
            Self::Node { op, operands } => {
                let parts: Vec<String> = operands.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(&format!(" {op} ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Facts(HashMap<RelationId, TruthValue>);

    impl Facts {
        fn set(&mut self, id: RelationId, value: TruthValue) {
            self.0.insert(id, value);
        }
    }

    impl TruthResolver for Facts {
        fn resolve_relation(&self, relation: RelationId) -> TruthValue {
            self.0.get(&relation).copied().unwrap_or_default()
        }
    }

    fn abc() -> (Facts, RelationId, RelationId, RelationId) {
        let (a, b, c) = (RelationId::new(), RelationId::new(), RelationId::new());
        let mut facts = Facts::default();
        facts.set(a, TruthValue::TRUE);
        facts.set(b, TruthValue::TRUE);
        facts.set(c, TruthValue::FALSE);
        (facts, a, b, c)
    }

    fn leaf(id: RelationId) -> RelationContext {
        RelationContext::relation(id)
    }

    #[test]
    fn test_truth_table_initial() {
        let (facts, a, b, c) = abc();
        let eval = |expr: RelationContext| expr.evaluate(&facts).evaluate();

        assert_eq!(eval(leaf(a) & leaf(b)), TruthState::True);
        assert_eq!(eval(leaf(a) | leaf(c)), TruthState::True);
        assert_eq!(eval(!leaf(c)), TruthState::True);
        assert_eq!(eval(leaf(a) ^ leaf(c)), TruthState::True);
        assert_eq!(eval(leaf(a).nand(leaf(b))), TruthState::False);
        assert_eq!(eval(leaf(a).nor(leaf(b))), TruthState::False);
        assert_eq!(eval(leaf(a).xnor(leaf(c))), TruthState::False);
        assert_eq!(eval(leaf(a) & (!leaf(c) | leaf(b))), TruthState::True);
    }

    #[test]
    fn test_truth_table_after_flip() {
        let (mut facts, a, b, c) = abc();
        facts.set(a, TruthValue::FALSE);
        facts.set(b, TruthValue::FALSE);
        let eval = |expr: RelationContext| expr.evaluate(&facts).evaluate();

        assert_eq!(eval(leaf(a) & leaf(b)), TruthState::False);
        assert_eq!(eval(leaf(a) | leaf(c)), TruthState::False);
        assert_eq!(eval(!leaf(c)), TruthState::True);
        assert_eq!(eval(leaf(a) ^ leaf(c)), TruthState::False);
        assert_eq!(eval(leaf(a).nand(leaf(b))), TruthState::True);
        assert_eq!(eval(leaf(a).nor(leaf(b))), TruthState::True);
        assert_eq!(eval(leaf(a).xnor(leaf(c))), TruthState::True);
        assert_eq!(eval(leaf(a) & (!leaf(c) | leaf(b))), TruthState::False);
    }

    #[test]
    fn test_unknown_leaf() {
        let (facts, a, _, c) = abc();
        let missing = RelationId::new();
        let eval = |expr: RelationContext| expr.evaluate(&facts).evaluate();

        assert_eq!(eval(leaf(a) & leaf(missing)), TruthState::Unknown);
        assert_eq!(eval(leaf(c) & leaf(missing)), TruthState::False);
        assert_eq!(eval(leaf(a) | leaf(missing)), TruthState::True);
        assert_eq!(eval(leaf(a) ^ leaf(missing)), TruthState::Unknown);
        assert_eq!(eval(!leaf(missing)), TruthState::Unknown);
    }

    #[test]
    fn test_superposition_leaf() {
        let (mut facts, a, _, c) = abc();
        let maybe = RelationId::new();
        facts.set(maybe, TruthValue::superposition(0.4).unwrap());

        let and = (leaf(a) & leaf(maybe)).evaluate(&facts);
        assert_eq!(and.evaluate(), TruthState::Superposition);
        assert!((and.probability().unwrap() - 0.4).abs() < 1e-9);

        assert_eq!(
            (leaf(c) & leaf(maybe)).evaluate(&facts).evaluate(),
            TruthState::False
        );
        assert_eq!(
            (leaf(a) | leaf(maybe)).evaluate(&facts).evaluate(),
            TruthState::True
        );
    }

    #[test]
    fn test_callback_leaf() {
        let (facts, a, _, _) = abc();
        let expr = leaf(a) & RelationContext::callback(|| TruthState::False);
        assert_eq!(expr.evaluate(&facts).evaluate(), TruthState::False);
        assert!(expr.has_callback());
        assert_eq!(expr.relations(), vec![a]);
    }

    #[test]
    fn test_from_operator() {
        let (facts, a, b, _) = abc();
        let expr = RelationContext::from_operator("nand", vec![leaf(a), leaf(b)]).unwrap();
        assert_eq!(expr.evaluate(&facts).evaluate(), TruthState::False);

        let err = RelationContext::from_operator("IMPLIES", vec![leaf(a), leaf(b)]);
        assert!(matches!(err, Err(ValidationError::UnknownOperator { .. })));
    }

    #[test]
    fn test_arity_checked() {
        let (_, a, b, _) = abc();
        assert!(matches!(
            RelationContext::node(LogicOp::Not, vec![leaf(a), leaf(b)]),
            Err(ValidationError::InvalidArity { .. })
        ));
        assert!(matches!(
            RelationContext::node(LogicOp::And, vec![leaf(a)]),
            Err(ValidationError::InvalidArity { .. })
        ));
        assert!(RelationContext::node(LogicOp::Or, vec![leaf(a), leaf(b), leaf(a)]).is_ok());
    }

    #[test]
    fn test_structural_equality() {
        let (_, a, b, _) = abc();
        assert_eq!(leaf(a) & leaf(b), leaf(a) & leaf(b));
        assert_ne!(leaf(a) & leaf(b), leaf(b) & leaf(a));
    }

    #[test]
    fn test_display() {
        let (_, a, b, _) = abc();
        let shown = (leaf(a) & !leaf(b)).to_string();
        assert!(shown.contains(" AND "));
        assert!(shown.contains("NOT "));
    }
}
