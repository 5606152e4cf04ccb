//! Surface syntax for expressions.
//!
//! Juxtaposition is left-associative application, parentheses group and
//! whitespace separates. `Display` on [`Expression`] prints the fully
//! parenthesized form, which parses back to an equal expression.

use nom::{
    branch::alt,
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map, map_opt},
    multi::many1,
    sequence::delimited,
    IResult,
};
use thiserror::Error;

use crate::combinator::Combinator;
use crate::expression::Expression;

/// A rejected surface string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed expression: {0}")]
pub struct ParseError(pub String);

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn atom(input: &str) -> IResult<&str, Expression> {
    map_opt(one_of("SKIBCW"), |symbol| {
        Combinator::from_symbol(symbol).map(Expression::Leaf)
    })(input)
}

fn group(input: &str) -> IResult<&str, Expression> {
    delimited(char('('), expression, char(')'))(input)
}

fn term(input: &str) -> IResult<&str, Expression> {
    ws(alt((atom, group)))(input)
}

// Juxtaposition folds left-associatively; flattening once per level keeps
// the parse tree in surface normal form all the way up.
fn expression(input: &str) -> IResult<&str, Expression> {
    map(many1(term), |terms| {
        Expression::node(terms).to_surface_normal_form()
    })(input)
}

/// Parse a complete surface string into an expression.
pub fn parse_expression(input: &str) -> Result<Expression, ParseError> {
    match all_consuming(expression)(input) {
        Ok((_, expr)) => Ok(expr),
        Err(err) => Err(ParseError(format!("{input:?}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unbalanced() {
        assert!(parse_expression("(SK").is_err());
        assert!(parse_expression("SK)").is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("   ").is_err());
        assert!(parse_expression("()").is_err());
    }

    #[test]
    fn test_rejects_unknown_symbols() {
        assert!(parse_expression("SKX").is_err());
        assert!(parse_expression("s").is_err());
    }

    #[test]
    fn test_accepts_all_combinators() {
        let t = parse_expression("SKIBCW").unwrap();
        assert_eq!(t.size(), 6);
        assert_eq!(t.to_string(), "(SKIBCW)");
    }
}
