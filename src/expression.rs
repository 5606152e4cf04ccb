//! Application trees over combinators and the reduction engine.
//!
//! Expressions are immutable values: size and hash are fixed at construction
//! and every rewrite produces fresh instances. Reduction keeps the surface
//! normal form invariant (a node's head is never an unflattened node) and
//! enumerates redexes in a fixed outer-first, left-to-right order, so a
//! seeded run is reproducible.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::combinator::{Combinator, Reservoir};
use crate::parser::{self, ParseError};

/// A molecule of the chemistry: an atomic combinator or an application node.
#[derive(Clone, Debug, Eq)]
pub enum Expression {
    Leaf(Combinator),
    Node(Application),
}

/// The compound variant: a nonempty ordered sequence of children with size
/// and hash precomputed at construction.
#[derive(Clone, Debug, Eq)]
pub struct Application {
    children: Vec<Expression>,
    size: usize,
    cached_hash: u64,
}

impl Application {
    #[inline]
    pub fn children(&self) -> &[Expression] {
        &self.children
    }
}

/// One enumerated reduction candidate: the path of child indices leading to
/// the redex, or the stay-put candidate of an irreducible expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redex {
    At(Vec<usize>),
    Stay,
}

/// What a fired reduction hands back to the reactor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduction {
    /// The rewritten molecule.
    pub expression: Expression,
    /// Pool copies consumed beyond the reduced molecule itself.
    pub reactives: Vec<Expression>,
    /// Molecules released back to the pool, the spent head combinator
    /// included.
    pub biproducts: Vec<Expression>,
}

fn hash_children(children: &[Expression]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for child in children {
        hasher.write_u64(child.hash_value());
    }
    hasher.finish()
}

impl Expression {
    /// Build a raw application node. No normalization is applied; use
    /// [`to_surface_normal_form`](Self::to_surface_normal_form) or the
    /// splicing helpers for canonical trees.
    pub fn node(children: Vec<Expression>) -> Expression {
        assert!(!children.is_empty(), "application node needs a child");
        let size = children.iter().map(Expression::size).sum();
        let cached_hash = hash_children(&children);
        Expression::Node(Application {
            children,
            size,
            cached_hash,
        })
    }

    /// Parse the surface syntax: left-associative juxtaposition over
    /// `S K I B C W`, grouped by parentheses, whitespace ignored.
    pub fn parse(input: &str) -> Result<Expression, ParseError> {
        parser::parse_expression(input)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Expression::Leaf(_))
    }

    /// Number of atoms in the tree.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            Expression::Leaf(_) => 1,
            Expression::Node(app) => app.size,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Expression::Leaf(_) => 1,
            Expression::Node(app) => {
                1 + app.children.iter().map(Expression::depth).max().unwrap_or(0)
            }
        }
    }

    /// The atomic combinators of the tree, left to right.
    pub fn atoms(&self) -> Vec<Combinator> {
        match self {
            Expression::Leaf(c) => vec![*c],
            Expression::Node(app) => app.children.iter().flat_map(Expression::atoms).collect(),
        }
    }

    /// Children of a compound expression.
    ///
    /// # Panics
    ///
    /// Panics on a leaf; structural access on an atom is a caller bug.
    pub fn children(&self) -> &[Expression] {
        match self {
            Expression::Node(app) => &app.children,
            Expression::Leaf(_) => panic!("structural access on an atomic expression"),
        }
    }

    pub fn head(&self) -> &Expression {
        &self.children()[0]
    }

    pub fn tail(&self) -> &[Expression] {
        &self.children()[1..]
    }

    /// The combinator of an atomic expression.
    ///
    /// # Panics
    ///
    /// Panics on a compound expression.
    pub fn combinator(&self) -> Combinator {
        match self {
            Expression::Leaf(c) => *c,
            Expression::Node(_) => panic!("combinator access on a compound expression"),
        }
    }

    fn hash_value(&self) -> u64 {
        match self {
            Expression::Leaf(c) => c.symbol() as u64,
            Expression::Node(app) => app.cached_hash,
        }
    }

    /// One flattening pass: a single child collapses to itself, a compound
    /// head is absorbed into the parent. Idempotent on trees built through
    /// the splicing helpers.
    pub fn to_surface_normal_form(&self) -> Expression {
        match self {
            Expression::Leaf(_) => self.clone(),
            Expression::Node(app) => {
                if app.children.len() == 1 {
                    return app.children[0].clone();
                }
                match &app.children[0] {
                    Expression::Node(head) => {
                        let mut children = head.children.clone();
                        children.extend_from_slice(&app.children[1..]);
                        Expression::node(children)
                    }
                    Expression::Leaf(_) => self.clone(),
                }
            }
        }
    }

    /// Recursive flattening, for canonical parse trees and fixtures.
    pub fn to_normal_form(&self) -> Expression {
        match self {
            Expression::Leaf(_) => self.clone(),
            Expression::Node(app) => {
                let normalized: Vec<Expression> =
                    app.children.iter().map(Expression::to_normal_form).collect();
                match &normalized[0] {
                    Expression::Node(head) => {
                        let mut children = head.children.clone();
                        children.extend_from_slice(&normalized[1..]);
                        Expression::node(children)
                    }
                    Expression::Leaf(_) => Expression::node(normalized),
                }
            }
        }
    }

    pub fn is_normal_form(&self) -> bool {
        match self {
            Expression::Leaf(_) => true,
            Expression::Node(app) => {
                app.children[0].is_leaf()
                    && app.children[1..].iter().all(Expression::is_normal_form)
            }
        }
    }

    /// Append `other` at this hierarchy level.
    pub fn join(self, other: Expression) -> Expression {
        Expression::node(vec![self, other]).to_surface_normal_form()
    }

    /// Application: `self(other)`.
    pub fn apply(&self, other: &Expression) -> Expression {
        self.clone().join(other.clone())
    }

    /// Fold a sequence of expressions at the same hierarchy level. The empty
    /// sequence has no molecule to offer, hence the explicit identity.
    pub fn concat(parts: impl IntoIterator<Item = Expression>) -> Option<Expression> {
        parts.into_iter().reduce(Expression::join)
    }

    pub(crate) fn splice_onto(first: Expression, rest: &[Expression]) -> Expression {
        rest.iter().cloned().fold(first, Expression::join)
    }

    /// Reinsert this expression between `left` and `right` siblings,
    /// reflattening at the splice point.
    pub fn infix(&self, left: &[Expression], right: &[Expression]) -> Expression {
        let mut children = Vec::with_capacity(left.len() + 1 + right.len());
        children.extend_from_slice(left);
        children.push(self.clone());
        children.extend_from_slice(right);
        Expression::node(children).to_surface_normal_form()
    }

    /// Split off the last child: `(rest, last)`.
    pub fn top_break(&self) -> (Expression, Expression) {
        let children = self.children();
        let n = children.len();
        (
            Expression::node(children[..n - 1].to_vec()).to_surface_normal_form(),
            Expression::node(vec![children[n - 1].clone()]).to_surface_normal_form(),
        )
    }

    /// Split at a uniformly random internal boundary.
    pub fn random_break(&self, rng: &mut StdRng) -> (Expression, Expression) {
        let children = self.children();
        let at = rng.gen_range(1..children.len());
        (
            Expression::node(children[..at].to_vec()).to_surface_normal_form(),
            Expression::node(children[at..].to_vec()).to_surface_normal_form(),
        )
    }

    /// Whether the head combinator can fire over the tail.
    pub fn is_surface_reducible(&self, pool: Option<&dyn Reservoir>) -> bool {
        match self {
            Expression::Leaf(_) => false,
            Expression::Node(app) => match &app.children[0] {
                Expression::Leaf(c) => c.can_reduce(&app.children[1..], pool),
                Expression::Node(_) => false,
            },
        }
    }

    /// Fire the head combinator. The spent head always joins the biproducts.
    pub fn surface_reduce(&self, pool: Option<&dyn Reservoir>) -> Reduction {
        let children = self.children();
        let rewrite = children[0].combinator().reduce(&children[1..], pool);
        let mut biproducts = rewrite.released;
        biproducts.push(children[0].clone());
        Reduction {
            expression: rewrite.result.to_surface_normal_form(),
            reactives: rewrite.consumed,
            biproducts,
        }
    }

    /// Whether any redex exists anywhere in the tree.
    pub fn is_reducible(&self, pool: Option<&dyn Reservoir>) -> bool {
        if self.is_surface_reducible(pool) {
            return true;
        }
        match self {
            Expression::Leaf(_) => false,
            Expression::Node(app) => app
                .children
                .iter()
                .any(|child| !child.is_leaf() && child.is_reducible(pool)),
        }
    }

    /// Deterministic single step: the root if surface-reducible, otherwise
    /// the first reducible child depth-first left to right, its result
    /// spliced back in place. `None` when irreducible.
    pub fn reduce_first(&self, pool: Option<&dyn Reservoir>) -> Option<Reduction> {
        if self.is_leaf() {
            return None;
        }
        if self.is_surface_reducible(pool) {
            return Some(self.surface_reduce(pool));
        }
        let children = self.children();
        for (i, child) in children.iter().enumerate() {
            if child.is_leaf() {
                continue;
            }
            if let Some(reduction) = child.reduce_first(pool) {
                return Some(Reduction {
                    expression: reduction
                        .expression
                        .infix(&children[..i], &children[i + 1..]),
                    ..reduction
                });
            }
        }
        None
    }

    /// One deterministic step, or the expression itself when irreducible.
    pub fn dreduce(&self) -> Expression {
        match self.reduce_first(None) {
            Some(reduction) => reduction.expression,
            None => self.clone(),
        }
    }

    /// Enumerate every reducible site, root candidate first, then each
    /// reducible child's candidates recursively. Truncation by
    /// `max_reductions` is positional (outer/left before inner), which biases
    /// the sampling distribution of [`sreduce`](Self::sreduce) whenever the
    /// cap binds. An irreducible expression yields the single [`Redex::Stay`]
    /// candidate, so the result is never empty.
    pub fn all_reductions(
        &self,
        pool: Option<&dyn Reservoir>,
        max_reductions: Option<usize>,
    ) -> Vec<Redex> {
        let mut redexes: Vec<Redex> = self
            .redexes_aux(pool, max_reductions)
            .into_iter()
            .map(Redex::At)
            .collect();
        if redexes.is_empty() {
            redexes.push(Redex::Stay);
        }
        redexes
    }

    fn redexes_aux(
        &self,
        pool: Option<&dyn Reservoir>,
        max_reductions: Option<usize>,
    ) -> Vec<Vec<usize>> {
        let mut sites = Vec::new();
        if max_reductions.map_or(true, |m| m > 0) && !self.is_leaf() {
            if self.is_surface_reducible(pool) {
                sites.push(Vec::new());
            }
            let children = self.children();
            for (i, child) in children.iter().enumerate() {
                if child.is_leaf() {
                    continue;
                }
                let remaining = max_reductions.map(|m| m - sites.len());
                for sub in child.redexes_aux(pool, remaining) {
                    let mut path = Vec::with_capacity(sub.len() + 1);
                    path.push(i);
                    path.extend(sub);
                    sites.push(path);
                }
            }
        }
        sites
    }

    /// Evaluate one enumerated candidate.
    pub fn apply_redex(&self, redex: &Redex, pool: Option<&dyn Reservoir>) -> Reduction {
        match redex {
            Redex::Stay => Reduction {
                expression: self.clone(),
                reactives: vec![],
                biproducts: vec![],
            },
            Redex::At(path) => self.reduce_at(path, pool),
        }
    }

    fn reduce_at(&self, path: &[usize], pool: Option<&dyn Reservoir>) -> Reduction {
        if path.is_empty() {
            return self.surface_reduce(pool);
        }
        let children = self.children();
        let i = path[0];
        let reduction = children[i].reduce_at(&path[1..], pool);
        Reduction {
            expression: reduction
                .expression
                .infix(&children[..i], &children[i + 1..]),
            ..reduction
        }
    }

    /// Uniformly sample one candidate from `all_reductions` and evaluate it.
    pub fn sreduce(
        &self,
        pool: Option<&dyn Reservoir>,
        max_reductions: Option<usize>,
        rng: &mut StdRng,
    ) -> Reduction {
        let redexes = self.all_reductions(pool, max_reductions);
        let pick = rng.gen_range(0..redexes.len());
        self.apply_redex(&redexes[pick], pool)
    }

    /// Deterministic goal search: does the leftmost-outermost trajectory
    /// reach `goal` within `timeout` steps?
    pub fn reduces_to(&self, goal: &Expression, timeout: usize) -> bool {
        let mut current = self.clone();
        for _ in 0..timeout {
            if &current == goal {
                return true;
            }
            match current.reduce_first(None) {
                Some(reduction) => current = reduction.expression,
                None => break,
            }
        }
        false
    }

    /// Monte-Carlo goal search over `tryouts` stochastic trajectories of at
    /// most `timeout` steps each.
    pub fn stochastically_reduces_to(
        &self,
        goal: &Expression,
        timeout: usize,
        tryouts: usize,
        rng: &mut StdRng,
    ) -> bool {
        for _ in 0..tryouts {
            let mut current = self.clone();
            for _ in 0..timeout {
                if &current == goal {
                    return true;
                }
                let next = current.sreduce(None, None, rng).expression;
                if next == current {
                    break;
                }
                current = next;
            }
        }
        false
    }

    /// Self-replication detector: the deterministic reduct stochastically
    /// reduces back to the expression itself.
    pub fn is_egocentric(&self, timeout: usize, tryouts: usize, rng: &mut StdRng) -> bool {
        self.is_reducible(None)
            && self
                .dreduce()
                .stochastically_reduces_to(self, timeout, tryouts, rng)
    }

    /// Size of the shared structural prefix with `other`.
    pub fn prefix_length(&self, other: &Expression) -> usize {
        if self.is_leaf() || other.is_leaf() {
            return usize::from(self == other);
        }
        let (a, b) = (self.children(), other.children());
        let mut length = 0;
        for i in 0..a.len() {
            if i >= b.len() {
                break;
            }
            if a[i] == b[i] {
                length += a[i].size();
            } else {
                length += a[i].prefix_length(&b[i]);
                break;
            }
        }
        length
    }

    /// Near-quine test: shared prefix at least `tolerance` atoms long.
    pub fn approx(&self, other: &Expression, tolerance: usize) -> bool {
        self.prefix_length(other) >= tolerance
    }

    /// Walk both deterministic trajectories in lockstep until the terms are
    /// approximately equal, for recursion detection.
    pub fn are_approx_coreducing(
        &self,
        other: &Expression,
        timeout: usize,
        tolerance: usize,
    ) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        for _ in 0..timeout {
            if left.approx(&right, tolerance) {
                return true;
            }
            left = left.dreduce();
            right = right.dreduce();
        }
        false
    }

    /// All expressions over `primitives` by increasing size, without end.
    pub fn enumerate(primitives: Vec<Combinator>) -> impl Iterator<Item = Expression> {
        (1usize..).flat_map(move |size| Expression::enumerate_of_size(&primitives, size))
    }

    fn enumerate_of_size(primitives: &[Combinator], size: usize) -> Vec<Expression> {
        if size == 1 {
            return primitives.iter().copied().map(Expression::Leaf).collect();
        }
        let mut out = Vec::new();
        for left_size in 1..size {
            for left in Expression::enumerate_of_size(primitives, left_size) {
                for right in Expression::enumerate_of_size(primitives, size - left_size) {
                    out.push(Expression::node(vec![left.clone(), right]).to_normal_form());
                }
            }
        }
        out
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self.cached_hash == other.cached_hash
            && self.children == other.children
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Leaf(a), Expression::Leaf(b)) => a == b,
            (Expression::Node(a), Expression::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Leaf(c) => write!(f, "{}", c),
            Expression::Node(app) => {
                write!(f, "(")?;
                for child in &app.children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Expression::parse(&text).map_err(de::Error::custom)
    }
}
