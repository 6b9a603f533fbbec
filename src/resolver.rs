use std::fmt;

use itertools::Itertools;
use tracing::debug;

use crate::atom::Atom;
use crate::config::ResolverConfig;
use crate::depset::{use_reduce, DepNode, DepTree, ReduceOptions};
use crate::pkg::{Cpv, Package};

mod choice;
mod dnf;

pub use self::choice::zap_deps;
pub use self::dnf::{dnf_convert, overlap_dnf};

/// Source of packages available for installation.
pub trait PackageDatabase {
    /// Return the packages matching an atom in ascending order.
    fn match_pkgs(&self, atom: &Atom) -> Vec<Package>;

    /// Return true if any version of a package exists.
    fn cp_list(&self, cp: &str) -> bool;
}

/// Installed package state.
pub trait InstalledDatabase {
    fn match_installed(&self, atom: &Atom) -> Vec<Cpv>;
}

/// State of the dependency graph being built by the caller.
pub trait GraphContext {
    /// Return true if a package has been added to the graph.
    fn in_graph(&self, pkg: &Package) -> bool;

    /// Return true if the parent wants the package updated.
    fn want_update(&self, parent: &Package, pkg: &Package) -> bool;

    /// Return the package that replaces a child of the parent matching the atom, if any.
    fn will_replace_child(&self, parent: &Package, root: &str, atom: &Atom) -> Option<Package>;

    /// Return true if downgrading to the package is acceptable.
    fn downgrade_probe(&self, pkg: &Package) -> bool;

    /// Return the graph packages matching an atom in ascending order.
    fn graph_match(&self, atom: &Atom) -> Vec<Package>;

    /// Return the package whose dependencies are being resolved.
    fn parent(&self) -> Option<&Package>;

    /// Return the packages known to be circular dependencies of the parent.
    fn circular_dependency(&self, parent: &Package) -> Vec<Package>;

    /// Return the virtual package being expanded on behalf of the parent, if any.
    fn virt_parent(&self) -> Option<&Package> {
        None
    }

    /// Return true if only the dependencies of the parent are being merged.
    fn onlydeps(&self) -> bool {
        false
    }

    /// Return true if packages are being removed rather than merged.
    fn removal_action(&self) -> bool {
        false
    }
}

/// Collaborators used when choosing between any-of branches.
#[derive(Clone, Copy)]
pub struct ResolverContext<'a> {
    pub root: &'a str,
    pub available: &'a dyn PackageDatabase,
    /// Without installed state the first branch of each any-of group is chosen.
    pub installed: Option<&'a dyn InstalledDatabase>,
    pub graph: Option<&'a dyn GraphContext>,
    /// Prefer branches pulling in the fewest new slots over the given order.
    pub minimize_slots: bool,
}

impl<'a> ResolverContext<'a> {
    pub fn new(available: &'a dyn PackageDatabase) -> Self {
        Self {
            root: "/",
            available,
            installed: None,
            graph: None,
            minimize_slots: false,
        }
    }

    pub fn installed(mut self, installed: &'a dyn InstalledDatabase) -> Self {
        self.installed = Some(installed);
        self
    }

    pub fn graph(mut self, graph: &'a dyn GraphContext) -> Self {
        self.graph = Some(graph);
        self
    }
}

/// Normalized boolean dependency expression.
///
/// Conjunctions never directly contain conjunctions and disjunctions never directly contain
/// disjunctions.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DepExpr<T> {
    Leaf(T),
    AllOf(Vec<DepExpr<T>>),
    AnyOf(Vec<DepExpr<T>>),
}

impl DepExpr<Atom> {
    /// Convert a reduced tree in either plain or opconvert layout.
    ///
    /// Panics if the tree still contains conditionals or SRC_URI arrows.
    pub fn from_tree(tree: &DepTree<Atom>) -> Self {
        Self::AllOf(Self::conjunction(tree.nodes()))
    }

    fn node(node: &DepNode<Atom>, nodes: &mut std::slice::Iter<DepNode<Atom>>) -> Self {
        match node {
            DepNode::Token(atom) => Self::Leaf(atom.clone()),
            DepNode::AnyOf => match nodes.next() {
                Some(DepNode::Group(vals)) => Self::AnyOf(Self::disjunction(vals)),
                n => panic!("any-of operator without group: {n:?}"),
            },
            DepNode::Group(vals) => match vals.split_first() {
                Some((DepNode::AnyOf, rest)) => Self::AnyOf(Self::disjunction(rest)),
                _ => Self::AllOf(Self::conjunction(vals)),
            },
            n => panic!("unreduced dependency node: {n}"),
        }
    }

    fn conjunction(nodes: &[DepNode<Atom>]) -> Vec<Self> {
        let mut exprs = vec![];
        let mut iter = nodes.iter();
        while let Some(node) = iter.next() {
            match Self::node(node, &mut iter) {
                Self::AllOf(vals) => exprs.extend(vals),
                expr => exprs.push(expr),
            }
        }
        exprs
    }

    fn disjunction(nodes: &[DepNode<Atom>]) -> Vec<Self> {
        let mut exprs = vec![];
        let mut iter = nodes.iter();
        while let Some(node) = iter.next() {
            match Self::node(node, &mut iter) {
                Self::AnyOf(vals) => exprs.extend(vals),
                expr => exprs.push(expr),
            }
        }
        exprs
    }
}

impl<T> DepExpr<T> {
    /// Map every leaf, preserving structure.
    pub fn map<U, F: Fn(&T) -> U>(&self, func: &F) -> DepExpr<U> {
        match self {
            Self::Leaf(val) => DepExpr::Leaf(func(val)),
            Self::AllOf(vals) => DepExpr::AllOf(vals.iter().map(|x| x.map(func)).collect()),
            Self::AnyOf(vals) => DepExpr::AnyOf(vals.iter().map(|x| x.map(func)).collect()),
        }
    }

    /// Return all leaves in order.
    pub fn leaves(&self) -> Vec<&T> {
        let mut leaves = vec![];
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a T>) {
        match self {
            Self::Leaf(val) => leaves.push(val),
            Self::AllOf(vals) | Self::AnyOf(vals) => {
                for x in vals {
                    x.collect_leaves(leaves);
                }
            }
        }
    }

    pub fn is_any_of(&self) -> bool {
        matches!(self, Self::AnyOf(_))
    }
}

impl<T: fmt::Display> fmt::Display for DepExpr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Leaf(val) => write!(f, "{val}"),
            Self::AllOf(vals) => write!(f, "( {} )", vals.iter().join(" ")),
            Self::AnyOf(vals) => write!(f, "|| ( {} )", vals.iter().join(" ")),
        }
    }
}

/// Map each atom to whether it's already satisfied by installed packages.
///
/// Blockers are never satisfied.
pub fn dep_wordreduce(
    expr: &DepExpr<Atom>,
    installed: Option<&dyn InstalledDatabase>,
) -> DepExpr<bool> {
    expr.map(&|atom: &Atom| {
        atom.blocker().is_none()
            && installed.map_or(false, |db| !db.match_installed(atom).is_empty())
    })
}

/// Evaluate a satisfaction tree.
///
/// Empty any-of groups are satisfied.
pub fn dep_eval(expr: &DepExpr<bool>) -> bool {
    match expr {
        DepExpr::Leaf(val) => *val,
        DepExpr::AllOf(vals) => vals.iter().all(dep_eval),
        DepExpr::AnyOf(vals) => vals.is_empty() || vals.iter().any(dep_eval),
    }
}

/// Reduce a dependency string and select the atoms required to satisfy it.
///
/// Satisfied atoms are omitted and any-of groups are replaced by their preferred branch.
pub fn dep_check(
    s: &str,
    opts: &ReduceOptions,
    ctx: &ResolverContext,
    config: &ResolverConfig,
) -> crate::Result<Vec<Atom>> {
    let opts = ReduceOptions {
        opconvert: true,
        flat: false,
        ..opts.clone()
    };
    let tree: DepTree<Atom> = use_reduce(s, &opts)?;
    if tree.is_empty() {
        return Ok(vec![]);
    }

    let mut expr = DepExpr::from_tree(&tree);
    let mut ctx = ResolverContext {
        minimize_slots: config.minimize_slots,
        ..*ctx
    };

    if config.overlap_dnf {
        if let DepExpr::AllOf(deps) = &expr {
            if let Some(dnf) = overlap_dnf(deps) {
                let dnf = DepExpr::AllOf(dnf);
                debug!("converted overlapping any-of groups: {dnf}");
                expr = dnf;
                ctx.minimize_slots = true;
            }
        }
    }

    let satisfied = dep_wordreduce(&expr, ctx.installed);
    zap_deps(&expr, &satisfied, &ctx)
}
