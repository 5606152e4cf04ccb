//! Reaction records broadcast to observers.

use std::fmt;

use serde::Serialize;

use crate::expression::Expression;

/// The three elementary reaction families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Reduce,
    Break,
    Combine,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Reduce => "reduce",
            ReactionKind::Break => "break",
            ReactionKind::Combine => "combine",
        }
    }

    fn tag(self) -> char {
        match self {
            ReactionKind::Reduce => 'R',
            ReactionKind::Break => 'B',
            ReactionKind::Combine => 'C',
        }
    }
}

/// One candidate or committed reaction: what goes in, what comes out.
///
/// Created per reactor step and discarded after being broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub reactives: Vec<Expression>,
    pub products: Vec<Expression>,
}

impl Reaction {
    pub fn new(kind: ReactionKind, reactives: Vec<Expression>, products: Vec<Expression>) -> Self {
        Self {
            kind,
            reactives,
            products,
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |exprs: &[Expression]| {
            exprs
                .iter()
                .map(Expression::to_string)
                .collect::<Vec<_>>()
                .join(" + ")
        };
        write!(
            f,
            "[{}] {}->{}",
            self.kind.tag(),
            side(&self.reactives),
            side(&self.products)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Expression {
        Expression::parse(s).unwrap()
    }

    #[test]
    fn test_display() {
        let reaction = Reaction::new(
            ReactionKind::Break,
            vec![p("KS")],
            vec![p("K"), p("S")],
        );
        assert_eq!(reaction.to_string(), "[B] (KS)->K + S");
    }

    #[test]
    fn test_serializes_expressions_as_surface_syntax() {
        let reaction = Reaction::new(ReactionKind::Combine, vec![p("K"), p("S")], vec![p("KS")]);
        let json = serde_json::to_value(&reaction).unwrap();
        assert_eq!(json["kind"], "combine");
        assert_eq!(json["reactives"][0], "K");
        assert_eq!(json["products"][0], "(KS)");
    }
}
