//! The six fixed rewrite generators of the chemistry.
//!
//! Each combinator carries a minimum arity and a pure rewrite over its
//! argument list. Rules know nothing about the reactor; the only
//! pool-awareness is the S-rule's catalyst check, expressed through the
//! narrow [`Reservoir`] trait.

use std::fmt;

use crate::expression::Expression;

/// Source of live molecule copies consulted by pool-aware rules.
///
/// The S-rule duplicates its third argument, and duplication costs one
/// physical copy: the rule only fires when the reservoir can supply it.
pub trait Reservoir {
    /// Whether a copy of `expr` is currently available, either live or
    /// synthesizable from the food set.
    fn contains(&self, expr: &Expression) -> bool;
}

/// One of the six rewrite generators. Identity is the symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Combinator {
    S,
    K,
    I,
    B,
    C,
    W,
}

/// Result of firing a combinator rule over an argument list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    /// The rewritten expression, untouched tail included.
    pub result: Expression,
    /// Pool copies the rule consumed beyond the redex itself.
    pub consumed: Vec<Expression>,
    /// Expressions the rule released back to the pool.
    pub released: Vec<Expression>,
}

impl Combinator {
    pub const ALL: [Combinator; 6] = [
        Combinator::S,
        Combinator::K,
        Combinator::I,
        Combinator::B,
        Combinator::C,
        Combinator::W,
    ];

    pub fn symbol(self) -> char {
        match self {
            Combinator::S => 'S',
            Combinator::K => 'K',
            Combinator::I => 'I',
            Combinator::B => 'B',
            Combinator::C => 'C',
            Combinator::W => 'W',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Combinator> {
        match symbol {
            'S' => Some(Combinator::S),
            'K' => Some(Combinator::K),
            'I' => Some(Combinator::I),
            'B' => Some(Combinator::B),
            'C' => Some(Combinator::C),
            'W' => Some(Combinator::W),
            _ => None,
        }
    }

    /// Minimum number of arguments before the rule can fire.
    pub fn min_args(self) -> usize {
        match self {
            Combinator::I => 1,
            Combinator::K | Combinator::W => 2,
            Combinator::S | Combinator::B | Combinator::C => 3,
        }
    }

    /// Arity gate, plus the S-rule's catalyst check when a pool is given.
    pub fn can_reduce(self, args: &[Expression], pool: Option<&dyn Reservoir>) -> bool {
        if args.len() < self.min_args() {
            return false;
        }
        match self {
            Combinator::S => pool.map_or(true, |p| p.contains(&args[2])),
            _ => true,
        }
    }

    /// Fire the rule over `args`.
    ///
    /// # Panics
    ///
    /// Panics if `can_reduce` does not hold; that is a caller bug, not a
    /// recoverable condition.
    pub fn reduce(self, args: &[Expression], pool: Option<&dyn Reservoir>) -> Rewrite {
        assert!(
            self.can_reduce(args, pool),
            "{} rule fired without its preconditions",
            self
        );
        match self {
            // I x ... -> x
            Combinator::I => Rewrite {
                result: Expression::splice_onto(args[0].clone(), &args[1..]),
                consumed: vec![],
                released: vec![],
            },
            // K x y ... -> x, discarding y back into the pool
            Combinator::K => Rewrite {
                result: Expression::splice_onto(args[0].clone(), &args[2..]),
                consumed: vec![],
                released: vec![args[1].clone()],
            },
            // S x y z ... -> x z (y z), the duplicated z paid for by the pool
            Combinator::S => {
                let (x, y, z) = (args[0].clone(), args[1].clone(), args[2].clone());
                let yz = y.join(z.clone());
                let head = Expression::node(vec![x, z.clone(), yz]);
                Rewrite {
                    result: Expression::splice_onto(head, &args[3..]),
                    consumed: vec![z],
                    released: vec![],
                }
            }
            // B f g x ... -> f (g x)
            Combinator::B => {
                let (f, g, x) = (&args[0], &args[1], &args[2]);
                let head = f.apply(&g.apply(x));
                Rewrite {
                    result: Expression::splice_onto(head, &args[3..]),
                    consumed: vec![],
                    released: vec![],
                }
            }
            // C f g x ... -> f x g
            Combinator::C => {
                let head = Expression::splice_onto(
                    args[0].clone(),
                    &[args[2].clone(), args[1].clone()],
                );
                Rewrite {
                    result: Expression::splice_onto(head, &args[3..]),
                    consumed: vec![],
                    released: vec![],
                }
            }
            // W x y ... -> x y y, one y drawn from the pool and one returned
            Combinator::W => {
                let (x, y) = (args[0].clone(), args[1].clone());
                let head = Expression::splice_onto(x, &[y.clone(), y.clone()]);
                Rewrite {
                    result: Expression::splice_onto(head, &args[2..]),
                    consumed: vec![y.clone()],
                    released: vec![y],
                }
            }
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl Reservoir for Empty {
        fn contains(&self, _expr: &Expression) -> bool {
            false
        }
    }

    fn p(s: &str) -> Expression {
        Expression::parse(s).unwrap()
    }

    #[test]
    fn test_arity_gates() {
        let args = [p("K"), p("S")];
        assert!(Combinator::I.can_reduce(&args, None));
        assert!(Combinator::K.can_reduce(&args, None));
        assert!(Combinator::W.can_reduce(&args, None));
        assert!(!Combinator::S.can_reduce(&args, None));
        assert!(!Combinator::B.can_reduce(&args, None));
        assert!(!Combinator::C.can_reduce(&args, None));
    }

    #[test]
    fn test_s_requires_catalyst() {
        let args = [p("K"), p("I"), p("K")];
        assert!(Combinator::S.can_reduce(&args, None));
        assert!(!Combinator::S.can_reduce(&args, Some(&Empty)));
    }

    #[test]
    fn test_k_releases_discarded_argument() {
        let args = [p("S"), p("I"), p("K")];
        let rewrite = Combinator::K.reduce(&args, None);
        assert_eq!(rewrite.result, p("SK"));
        assert!(rewrite.consumed.is_empty());
        assert_eq!(rewrite.released, vec![p("I")]);
    }

    #[test]
    fn test_s_consumes_duplicated_argument() {
        let args = [p("K"), p("I"), p("K")];
        let rewrite = Combinator::S.reduce(&args, None);
        assert_eq!(rewrite.result.to_surface_normal_form(), p("KK(IK)"));
        assert_eq!(rewrite.consumed, vec![p("K")]);
        assert!(rewrite.released.is_empty());
    }

    #[test]
    fn test_w_duplicates_through_the_pool() {
        let args = [p("K"), p("S")];
        let rewrite = Combinator::W.reduce(&args, None);
        assert_eq!(rewrite.result, p("KSS"));
        assert_eq!(rewrite.consumed, vec![p("S")]);
        assert_eq!(rewrite.released, vec![p("S")]);
    }

    #[test]
    fn test_b_and_c_rearrange() {
        let args = [p("K"), p("S"), p("I")];
        assert_eq!(Combinator::B.reduce(&args, None).result, p("K(SI)"));
        assert_eq!(Combinator::C.reduce(&args, None).result, p("KIS"));
    }

    #[test]
    #[should_panic]
    fn test_underapplied_rule_panics() {
        Combinator::K.reduce(&[p("S")], None);
    }
}
