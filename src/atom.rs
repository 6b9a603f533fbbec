use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

pub use self::matcher::{best_match_to_list, extended_cp_match, match_from_list, match_to_list};
pub(crate) use self::use_dep::valid_flag;
pub use self::use_dep::{Conditionals, UseDep, UseDepDefault, UseDepKind, UseDeps};
pub use self::version::{Revision, Version};
use crate::eapi::{Eapi, EAPI_PKGDEP};
use crate::macros::cmp_not_equal;
use crate::set::FlagSet;
use crate::Error;

mod matcher;
pub(crate) mod parse;
mod use_dep;
mod version;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub enum Blocker {
    Strong, // !!cat/pkg
    Weak,   // !cat/pkg
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Blocker::Weak => write!(f, "!"),
            Blocker::Strong => write!(f, "!!"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub enum Operator {
    Less,           // <cat/pkg-1
    LessOrEqual,    // <=cat/pkg-1
    Equal,          // =cat/pkg-1
    EqualGlob,      // =cat/pkg-1*
    Approximate,    // ~cat/pkg-1
    GreaterOrEqual, // >=cat/pkg-1
    Greater,        // >cat/pkg-1
}

impl Operator {
    fn as_str(&self) -> &str {
        match self {
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal | Operator::EqualGlob => "=",
            Operator::Approximate => "~",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub enum SlotOperator {
    Equal, // cat/pkg:=
    Star,  // cat/pkg:*
}

impl fmt::Display for SlotOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SlotOperator::Equal => write!(f, "="),
            SlotOperator::Star => write!(f, "*"),
        }
    }
}

/// Options controlling which optional atom syntax is accepted.
///
/// Repo and build id support default to what the EAPI allows when unset.
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
pub struct ParseOptions {
    pub allow_wildcard: bool,
    pub allow_repo: Option<bool>,
    pub allow_build_id: Option<bool>,
}

/// Package dependency atom.
#[derive(Debug, Clone)]
pub struct Atom {
    full: String,
    blocker: Option<Blocker>,
    op: Option<Operator>,
    category: String,
    package: String,
    version: Option<Version>,
    wildcard_version: Option<String>,
    build_id: Option<u64>,
    slot: Option<String>,
    subslot: Option<String>,
    slot_op: Option<SlotOperator>,
    repo: Option<String>,
    use_deps: Option<UseDeps>,
    extended: bool,
    unevaluated: Option<Arc<Atom>>,
}

impl Atom {
    /// Parse an atom using the default options for a given EAPI.
    pub fn new(s: &str, eapi: &'static Eapi) -> crate::Result<Self> {
        parse::dep(s, eapi, &ParseOptions::default())
    }

    /// Parse an atom with explicit syntax options.
    pub fn parse(s: &str, eapi: &'static Eapi, opts: ParseOptions) -> crate::Result<Self> {
        parse::dep(s, eapi, &opts)
    }

    /// Return the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Return the category/package key.
    pub fn cp(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    /// Return the category/package-version string, falling back to the key when unversioned.
    pub fn cpv(&self) -> String {
        match &self.version {
            Some(ver) => format!("{}/{}-{ver}", self.category, self.package),
            None => self.cp(),
        }
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn op(&self) -> Option<Operator> {
        self.op
    }

    pub fn blocker(&self) -> Option<Blocker> {
        self.blocker
    }

    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    pub fn subslot(&self) -> Option<&str> {
        self.subslot.as_deref()
    }

    pub fn slot_op(&self) -> Option<SlotOperator> {
        self.slot_op
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn use_deps(&self) -> Option<&UseDeps> {
        self.use_deps.as_ref()
    }

    pub fn build_id(&self) -> Option<u64> {
        self.build_id
    }

    /// Return true if the atom was parsed using the wildcard grammar.
    pub fn extended_syntax(&self) -> bool {
        self.extended
    }

    /// Return the `*ver*` pattern of an extended `=cat/pkg-*ver*` atom.
    pub fn wildcard_version(&self) -> Option<&str> {
        self.wildcard_version.as_deref()
    }

    /// Return the atom as it was before any USE evaluation.
    pub fn unevaluated(&self) -> &Atom {
        self.unevaluated.as_deref().unwrap_or(self)
    }

    /// Return true for a slot operator dependency with a bound subslot, e.g. `cat/pkg:0/1=`.
    pub fn slot_operator_built(&self) -> bool {
        self.slot_op == Some(SlotOperator::Equal) && self.subslot.is_some()
    }

    /// Return a copy of the atom with its fields updated and text rerendered.
    fn derive<F: FnOnce(&mut Atom)>(&self, func: F) -> Atom {
        let mut atom = self.clone();
        func(&mut atom);
        if atom.use_deps.as_ref().map_or(false, |u| u.is_empty()) {
            atom.use_deps = None;
        }
        atom.full = atom.render();
        atom
    }

    /// Return a derived atom with USE deps evaluated, tracking the original form.
    fn evaluated(&self, use_deps: UseDeps) -> Atom {
        let unevaluated = self
            .unevaluated
            .clone()
            .unwrap_or_else(|| Arc::new(self.clone()));
        self.derive(|a| {
            a.use_deps = Some(use_deps);
            a.unevaluated = Some(unevaluated);
        })
    }

    pub fn without_use(&self) -> Atom {
        if self.use_deps.is_none() {
            return self.clone();
        }
        self.derive(|a| {
            a.use_deps = None;
            a.unevaluated = None;
        })
    }

    pub fn without_repo(&self) -> Atom {
        if self.repo.is_none() {
            return self.clone();
        }
        self.derive(|a| {
            a.repo = None;
            a.unevaluated = None;
        })
    }

    pub fn without_slot(&self) -> Atom {
        if self.slot.is_none() && self.slot_op.is_none() {
            return self.clone();
        }
        self.derive(|a| {
            a.slot = None;
            a.subslot = None;
            a.slot_op = None;
            a.unevaluated = None;
        })
    }

    /// Return a copy with the given repo qualifier, replacing any existing one.
    pub fn with_repo(&self, repo: &str) -> crate::Result<Atom> {
        let repo = parse::repo(repo)?;
        Ok(self.derive(|a| {
            a.repo = Some(repo.to_string());
            a.unevaluated = None;
        }))
    }

    /// Return a copy with the given slot string, e.g. `0`, `0/1`, or `0=`.
    pub fn with_slot(&self, slot: &str) -> crate::Result<Atom> {
        let s = self.without_slot().without_repo().without_use().render_dep();
        let opts = ParseOptions {
            allow_wildcard: self.extended,
            allow_repo: Some(true),
            allow_build_id: Some(true),
        };
        let slotted = Atom::parse(&format!("{s}:{slot}"), &EAPI_PKGDEP, opts)?;
        Ok(self.derive(|a| {
            a.slot = slotted.slot;
            a.subslot = slotted.subslot;
            a.slot_op = slotted.slot_op;
            a.unevaluated = None;
        }))
    }

    /// Evaluate conditional USE deps against the enabled flags of a parent package.
    pub fn evaluate_conditionals(&self, parent_use: &FlagSet) -> Atom {
        match &self.use_deps {
            Some(deps) if deps.has_conditionals() => {
                self.evaluated(deps.evaluate_conditionals(parent_use))
            }
            _ => self.clone(),
        }
    }

    /// Return an atom holding only the USE deps not satisfied by `other_use`.
    pub fn violated_conditionals(
        &self,
        other_use: &FlagSet,
        is_valid_flag: &dyn Fn(&str) -> bool,
        parent_use: Option<&FlagSet>,
    ) -> crate::Result<Atom> {
        match &self.use_deps {
            Some(deps) => {
                let violated = deps.violated_conditionals(other_use, is_valid_flag, parent_use)?;
                Ok(self.evaluated(violated))
            }
            None => Ok(self.clone()),
        }
    }

    /// Evaluate conditional USE deps for all states allowed by use.mask and use.force.
    pub fn eval_qa_conditionals(&self, use_mask: &FlagSet, use_force: &FlagSet) -> Atom {
        match &self.use_deps {
            Some(deps) if deps.has_conditionals() => {
                self.evaluated(deps.eval_qa_conditionals(use_mask, use_force))
            }
            _ => self.clone(),
        }
    }

    /// Verify all flags referenced by conditional USE deps are valid.
    pub fn validate_flags(&self, is_valid_flag: &dyn Fn(&str) -> bool) -> crate::Result<()> {
        let conditionals = self.use_deps.as_ref().and_then(|u| u.conditional());
        for (cond, flag) in conditionals.into_iter().flat_map(|c| c.iter()) {
            if !is_valid_flag(flag) {
                return Err(Error::UnknownFlag(format!(
                    "USE flag '{flag}' referenced in conditional '{cond}' in atom '{self}' is not in IUSE"
                )));
            }
        }
        Ok(())
    }

    /// Determine if two atoms can match the same package.
    pub fn intersects(&self, other: &Atom) -> bool {
        if self == other {
            return true;
        }

        if self.category != other.category
            || self.package != other.package
            || self.use_deps != other.use_deps
            || self.op != other.op
            || self.cpv() != other.cpv()
        {
            return false;
        }

        match (self.slot(), other.slot()) {
            (Some(s1), Some(s2)) => s1 == s2,
            _ => true,
        }
    }

    /// Render the atom without blocker, slot, repo, or USE deps.
    fn render_dep(&self) -> String {
        let cp = self.cp();
        match (self.op, &self.version, &self.wildcard_version) {
            (Some(_), _, Some(wildcard)) => format!("={cp}-{wildcard}"),
            (Some(op), Some(ver), None) => {
                let mut s = format!("{}{cp}-{ver}", op.as_str());
                if let Some(id) = self.build_id {
                    s.push_str(&format!("-{id}"));
                }
                if op == Operator::EqualGlob {
                    s.push('*');
                }
                s
            }
            _ => cp,
        }
    }

    fn render(&self) -> String {
        let mut s = String::new();

        if let Some(blocker) = self.blocker {
            s.push_str(&blocker.to_string());
        }

        s.push_str(&self.render_dep());

        match (self.slot(), self.subslot(), self.slot_op) {
            (Some(slot), Some(subslot), op) => {
                s.push_str(&format!(":{slot}/{subslot}"));
                if let Some(op) = op {
                    s.push_str(&op.to_string());
                }
            }
            (Some(slot), None, op) => {
                s.push_str(&format!(":{slot}"));
                if let Some(op) = op {
                    s.push_str(&op.to_string());
                }
            }
            (None, _, Some(op)) => s.push_str(&format!(":{op}")),
            _ => (),
        }

        if let Some(repo) = &self.repo {
            s.push_str(&format!("::{repo}"));
        }

        if let Some(use_deps) = &self.use_deps {
            s.push_str(&use_deps.to_string());
        }

        s
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.full == other.full
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full.hash(state);
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_not_equal!(&self.category, &other.category);
        cmp_not_equal!(&self.package, &other.package);
        cmp_not_equal!(&self.version, &other.version);
        cmp_not_equal!(&self.op, &other.op);
        cmp_not_equal!(&self.blocker, &other.blocker);
        cmp_not_equal!(&self.slot, &other.slot);
        cmp_not_equal!(&self.subslot, &other.subslot);
        cmp_not_equal!(&self.slot_op, &other.slot_op);
        cmp_not_equal!(&self.repo, &other.repo);
        self.full.cmp(&other.full)
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl FromStr for Atom {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Atom::new(s, Default::default())
    }
}
