use std::collections::VecDeque;
use std::fmt;

use cached::{Cached, SizedCache};
use itertools::Itertools;

use crate::atom::Atom;
use crate::config::Config;
use crate::eapi::Eapi;
use crate::set::FlagSet;
use crate::Error;

mod reduce;

pub use self::reduce::{use_reduce, use_reduce_with};

/// Token substituted for an any-of group left empty by conditional evaluation in EAPIs where
/// empty groups aren't automatically satisfied.
pub const EMPTY_ANY_OF: &str = "__const__/empty-any-of";

/// Conversion hook applied to plain tokens in a dependency string.
pub trait DepToken: fmt::Display + fmt::Debug + Clone + PartialEq + Sized {
    /// Tokens are stored as written, allowing SRC_URI entries.
    const PLAIN_TEXT: bool = false;

    /// Convert a raw token, optionally validating any flags it references.
    fn from_token(
        token: &str,
        eapi: &'static Eapi,
        is_valid_flag: Option<&dyn Fn(&str) -> bool>,
    ) -> crate::Result<Self>;

    /// Resolve any parent-dependent state against the enabled flags.
    fn evaluate(self, _use_flags: &FlagSet) -> Self {
        self
    }

    /// Render the token as it was written before evaluation.
    fn unevaluated(&self) -> String {
        self.to_string()
    }
}

impl DepToken for String {
    const PLAIN_TEXT: bool = true;

    fn from_token(
        token: &str,
        _eapi: &'static Eapi,
        _is_valid_flag: Option<&dyn Fn(&str) -> bool>,
    ) -> crate::Result<Self> {
        Ok(token.to_string())
    }
}

impl DepToken for Atom {
    fn from_token(
        token: &str,
        eapi: &'static Eapi,
        is_valid_flag: Option<&dyn Fn(&str) -> bool>,
    ) -> crate::Result<Self> {
        let atom = Atom::new(token, eapi)?;
        if let Some(f) = is_valid_flag {
            atom.validate_flags(f)?;
        }
        Ok(atom)
    }

    fn evaluate(self, use_flags: &FlagSet) -> Self {
        self.evaluate_conditionals(use_flags)
    }

    fn unevaluated(&self) -> String {
        Atom::unevaluated(self).to_string()
    }
}

/// Node of a dependency tree.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DepNode<T> {
    Token(T),
    /// The `||` operator, followed by its group or leading it in opconvert layout.
    AnyOf,
    /// SRC_URI rename arrow.
    Arrow,
    /// USE conditional such as `foo?` or `!foo?`, only present in unreduced trees.
    Conditional(String),
    Group(Vec<DepNode<T>>),
}

impl<T> DepNode<T> {
    pub fn is_any_of(&self) -> bool {
        matches!(self, Self::AnyOf)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::Conditional(_))
    }

    pub fn as_token(&self) -> Option<&T> {
        match self {
            Self::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&[DepNode<T>]> {
        match self {
            Self::Group(vals) => Some(vals),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for DepNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Token(t) => write!(f, "{t}"),
            Self::AnyOf => write!(f, "||"),
            Self::Arrow => write!(f, "->"),
            Self::Conditional(c) => write!(f, "{c}"),
            Self::Group(vals) => write!(f, "( {} )", vals.iter().join(" ")),
        }
    }
}

/// Dependency tree with an implicit conjunction at the top level.
///
/// In the default layout an any-of group is the `||` node followed by a group node. In
/// opconvert layout it's a single group node with `||` as its first element.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DepTree<T> {
    nodes: Vec<DepNode<T>>,
    opconvert: bool,
}

impl<T> Default for DepTree<T> {
    fn default() -> Self {
        Self { nodes: vec![], opconvert: false }
    }
}

impl<T> DepTree<T> {
    pub fn new(nodes: Vec<DepNode<T>>, opconvert: bool) -> Self {
        Self { nodes, opconvert }
    }

    pub fn nodes(&self) -> &[DepNode<T>] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<DepNode<T>> {
        self.nodes
    }

    /// Return true if any-of groups use the opconvert layout.
    pub fn opconvert(&self) -> bool {
        self.opconvert
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<DepNode<T>> {
        self.nodes.iter()
    }

    /// Iterate over all tokens in the tree, ignoring its structure.
    pub fn flatten(&self) -> DepTreeFlattenIter<T> {
        DepTreeFlattenIter(self.nodes.iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a DepTree<T> {
    type Item = &'a DepNode<T>;
    type IntoIter = std::slice::Iter<'a, DepNode<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl<T: DepToken> DepTree<T> {
    /// Serialize the tree, optionally rendering tokens in their unevaluated form.
    pub fn paren_enclose(&self, unevaluated: bool) -> String {
        paren_enclose(&self.nodes, unevaluated, self.opconvert)
    }
}

impl<T: DepToken> fmt::Display for DepTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.paren_enclose(false))
    }
}

macro_rules! extend_left {
    ($vec:expr, $func:expr) => {
        for x in $func.rev() {
            $vec.push_front(x);
        }
    };
}

#[derive(Debug)]
pub struct DepTreeFlattenIter<'a, T>(VecDeque<&'a DepNode<T>>);

impl<'a, T> Iterator for DepTreeFlattenIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.0.pop_front() {
            match node {
                DepNode::Token(val) => return Some(val),
                DepNode::Group(vals) => extend_left!(self.0, vals.iter()),
                _ => (),
            }
        }
        None
    }
}

/// Serialize a list of nodes into a dependency string.
///
/// With `opconvert`, groups starting with `||` are rendered as `|| ( ... )`.
pub fn paren_enclose<T: DepToken>(
    nodes: &[DepNode<T>],
    unevaluated: bool,
    opconvert: bool,
) -> String {
    nodes
        .iter()
        .map(|node| match node {
            DepNode::Group(vals) => match vals.split_first() {
                Some((DepNode::AnyOf, rest)) if opconvert => {
                    format!("|| ( {} )", paren_enclose(rest, unevaluated, true))
                }
                _ => format!("( {} )", paren_enclose(vals, unevaluated, opconvert)),
            },
            DepNode::Token(t) if unevaluated => t.unevaluated(),
            node => node.to_string(),
        })
        .join(" ")
}

/// Split a dependency string into nested groups without evaluating conditionals.
///
/// Redundant brackets are removed while conditionals and their operands are kept.
pub fn parse_tree(s: &str) -> crate::Result<DepTree<String>> {
    let malformed = || Error::malformed(format!("malformed syntax: '{s}'"));
    let mut stack: Vec<Vec<DepNode<String>>> = vec![vec![]];
    let mut need_bracket = false;

    let ends_in_any_of = |stack: &[Vec<DepNode<String>>], k: Option<usize>| {
        k.and_then(|k| stack[k].last()).map_or(false, DepNode::is_any_of)
    };
    let ends_in_operator = |stack: &[Vec<DepNode<String>>], k: usize| {
        stack[k]
            .last()
            .map_or(false, |n| n.is_any_of() || n.is_conditional())
    };

    for token in s.split_whitespace() {
        match token {
            "(" => {
                need_bracket = false;
                stack.push(vec![]);
            }
            ")" => {
                if need_bracket {
                    return Err(malformed());
                }
                let l = match stack.pop() {
                    Some(l) if !stack.is_empty() => l,
                    _ => return Err(malformed()),
                };
                let level = stack.len() - 1;
                let is_single = l.len() == 1
                    || (l.len() == 2 && (l[0].is_any_of() || l[0].is_conditional()));

                let special_append = |stack: &mut Vec<Vec<DepNode<String>>>, l: Vec<_>| {
                    let parent = &mut stack[level];
                    if is_single && !parent.last().map_or(false, DepNode::is_conditional) {
                        match <[_; 1]>::try_from(l) {
                            Ok([DepNode::Group(vals)]) => parent.extend(vals),
                            Ok([node]) => parent.push(node),
                            Err(l) => parent.extend(l),
                        }
                    } else {
                        parent.push(DepNode::Group(l));
                    }
                };

                if l.is_empty() {
                    if ends_in_operator(&stack, level) {
                        stack[level].pop();
                    }
                } else if !ends_in_any_of(&stack, level.checked_sub(1))
                    && !ends_in_operator(&stack, level)
                {
                    stack[level].extend(l);
                } else if stack[level].is_empty() {
                    special_append(&mut stack, l);
                } else if l.len() == 1 && ends_in_any_of(&stack, Some(level)) {
                    stack[level].pop();
                    special_append(&mut stack, l);
                } else if l.len() == 2
                    && (l[0].is_any_of() || l[0].is_conditional())
                    && stack[level]
                        .last()
                        .map_or(false, |last| last == &l[0] || last.is_any_of())
                {
                    stack[level].pop();
                    special_append(&mut stack, l);
                } else {
                    special_append(&mut stack, l);
                }
            }
            _ => {
                if need_bracket {
                    return Err(malformed());
                }
                let node = match token {
                    "||" => DepNode::AnyOf,
                    "->" => DepNode::Arrow,
                    s if s.ends_with('?') => DepNode::Conditional(s.to_string()),
                    s => DepNode::Token(s.to_string()),
                };
                need_bracket = node.is_any_of() || node.is_conditional();
                if let Some(level) = stack.last_mut() {
                    level.push(node);
                }
            }
        }
    }

    match stack.pop() {
        Some(nodes) if stack.is_empty() && !need_bracket => Ok(DepTree::new(nodes, false)),
        _ => Err(malformed()),
    }
}

/// Options controlling dependency string reduction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReduceOptions {
    /// Enabled USE flags.
    pub use_flags: FlagSet,
    /// Masked flags, conditionals on them only hold when negated.
    pub masked: FlagSet,
    /// Treat all conditionals as enabled.
    pub matchall: bool,
    /// Treat all conditionals as disabled.
    pub matchnone: bool,
    /// Flags whose negated conditionals never hold.
    pub excludeall: FlagSet,
    /// Parse as SRC_URI, allowing rename arrows and forbidding any-of groups.
    pub src_uri: bool,
    /// Produce any-of groups in opconvert layout.
    pub opconvert: bool,
    /// Flatten all groups into a single list.
    pub flat: bool,
    /// Restrict the tree to branches under conditionals on these flags.
    pub subset: Option<FlagSet>,
    pub eapi: &'static Eapi,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            use_flags: FlagSet::new(),
            masked: FlagSet::new(),
            matchall: false,
            matchnone: false,
            excludeall: FlagSet::new(),
            src_uri: false,
            opconvert: false,
            flat: false,
            subset: None,
            eapi: Default::default(),
        }
    }
}

impl ReduceOptions {
    pub fn new(eapi: &'static Eapi) -> Self {
        Self { eapi, ..Default::default() }
    }

    pub fn use_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_flags = flags.into_iter().collect();
        self
    }
}

/// Bounded memoization of reduction results, owned by the caller.
pub struct ReduceCache<T> {
    cache: SizedCache<(String, ReduceOptions), crate::Result<DepTree<T>>>,
}

impl<T: DepToken> Default for ReduceCache<T> {
    fn default() -> Self {
        Self::new(Config::current().cache.reduce_cache_size)
    }
}

impl<T: DepToken> ReduceCache<T> {
    pub fn new(size: usize) -> Self {
        Self { cache: SizedCache::with_size(size.max(1)) }
    }

    /// Reduce a dependency string, reusing cached results for identical inputs.
    pub fn reduce(&mut self, s: &str, opts: &ReduceOptions) -> crate::Result<DepTree<T>> {
        let key = (s.to_string(), opts.clone());
        if let Some(result) = self.cache.cache_get(&key) {
            return result.clone();
        }
        let result = use_reduce(s, opts);
        self.cache.cache_set(key, result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.cache.cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> Option<u64> {
        self.cache.cache_hits()
    }

    pub fn clear(&mut self) {
        self.cache.cache_clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::eapi::{EAPI0, EAPI2, EAPI_PKGDEP};
    use crate::macros::assert_err_re;

    use super::*;

    pub(super) fn repr<T: fmt::Display>(nodes: &[DepNode<T>]) -> String {
        let vals = nodes.iter().map(|n| match n {
            DepNode::Group(vals) => repr(vals),
            n => n.to_string(),
        });
        format!("[{}]", vals.format(", "))
    }

    #[test]
    fn test_parse_tree() {
        for (s, expected) in [
            ("", "[]"),
            ("foobar foo? ( bar baz )", "[foobar, foo?, [bar, baz]]"),
            ("( A )", "[A]"),
            ("( ( A B ) )", "[A, B]"),
            ("|| ( A B )", "[||, [A, B]]"),
            ("|| ( A )", "[A]"),
            ("|| ( || ( A B ) )", "[||, [A, B]]"),
            ("a? ( a? ( A ) )", "[a?, [A]]"),
            ("|| ( ( A B ) C )", "[||, [[A, B], C]]"),
            ("foo? ( )", "[]"),
            ("uri -> file", "[uri, ->, file]"),
        ] {
            let tree = parse_tree(s).unwrap();
            assert_eq!(repr(tree.nodes()), expected, "{s:?} failed");
        }

        for s in ["(", ")", "( A", "A )", "|| A", "a? b", "foo?", "|| ( A ) )"] {
            assert_err_re!(parse_tree(s), format!("^malformed syntax: '{}'$", regex::escape(s)));
        }
    }

    #[test]
    fn test_paren_enclose() {
        let tree = parse_tree("foobar foo? ( bar baz ) || ( a ( b c ) )").unwrap();
        assert_eq!(tree.to_string(), "foobar foo? ( bar baz ) || ( a ( b c ) )");

        let opts = ReduceOptions { opconvert: true, ..Default::default() };
        let tree: DepTree<String> = use_reduce("a || ( b c ) || ( ( d e ) f )", &opts).unwrap();
        assert_eq!(repr(tree.nodes()), "[a, [||, b, c], [||, [d, e], f]]");
        assert_eq!(tree.to_string(), "a || ( b c ) || ( ( d e ) f )");
        assert_eq!(paren_enclose(tree.nodes(), false, false), "a ( || b c ) ( || ( d e ) f )");
    }

    #[test]
    fn test_unevaluated() {
        let opts = ReduceOptions::default().use_flags(["a"]);
        let tree: DepTree<Atom> = use_reduce("cat/pkg[a?] || ( cat/b[!a?] cat/c )", &opts).unwrap();
        assert_eq!(tree.to_string(), "cat/pkg[a] || ( cat/b cat/c )");
        assert_eq!(tree.paren_enclose(true), "cat/pkg[a?] || ( cat/b[!a?] cat/c )");
    }

    #[test]
    fn test_flatten() {
        let tree: DepTree<String> =
            use_reduce("a || ( b ( c d ) ) e", &ReduceOptions::default()).unwrap();
        assert_eq!(tree.flatten().collect::<Vec<_>>(), ["a", "b", "c", "d", "e"]);
        assert!(DepTree::<String>::default().flatten().next().is_none());
    }

    #[test]
    fn test_cache() {
        let mut cache = ReduceCache::<String>::new(2);
        assert!(cache.is_empty());
        let opts = ReduceOptions::new(&EAPI0).use_flags(["a"]);
        let s = "a? ( b ) c";
        let tree = cache.reduce(s, &opts).unwrap();
        assert_eq!(repr(tree.nodes()), "[b, c]");
        assert_eq!(cache.reduce(s, &opts).unwrap(), tree);
        assert_eq!(cache.hits(), Some(1));

        // different options are cached separately
        let opts = ReduceOptions::new(&EAPI0);
        assert_eq!(repr(cache.reduce(s, &opts).unwrap().nodes()), "[c]");
        assert_eq!(cache.len(), 2);

        // errors are cached as well
        let opts = ReduceOptions::new(&EAPI0);
        assert!(cache.reduce("uri -> file", &opts).is_err());
        assert!(cache.reduce("uri -> file", &opts).is_err());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_atom_tokens() {
        let opts = ReduceOptions::new(&EAPI2);
        let tree: DepTree<Atom> = use_reduce(">=cat/pkg-1 !cat/b", &opts).unwrap();
        let atoms: Vec<_> = tree.flatten().map(|a| a.cp()).collect();
        assert_eq!(atoms, ["cat/pkg", "cat/b"]);

        // EAPI features are enforced on atoms
        let opts = ReduceOptions::new(&EAPI0);
        assert_err_re!(use_reduce::<Atom>("cat/pkg[a]", &opts), "token 1$");
        let opts = ReduceOptions::new(&EAPI_PKGDEP);
        assert!(use_reduce::<Atom>("cat/pkg::repo", &opts).is_ok());
    }
}
