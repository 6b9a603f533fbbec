use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use itertools::Itertools;

use crate::set::FlagSet;
use crate::Error;

peg::parser!(grammar usedep() for str {
    rule flag() -> &'input str
        = s:$(quiet!{
            ['a'..='z' | 'A'..='Z' | '0'..='9']
            ['a'..='z' | 'A'..='Z' | '0'..='9' | '+' | '_' | '@' | '-']*
        } / expected!("USE flag name"))
        { s }

    rule default() -> UseDepDefault
        = "(+)" { UseDepDefault::Enabled }
        / "(-)" { UseDepDefault::Disabled }

    pub(super) rule flag_name() -> &'input str
        = flag()

    pub(super) rule token() -> (&'input str, &'input str, Option<UseDepDefault>, &'input str)
        = prefix:$(['!' | '-']?) flag:flag() default:default()? suffix:$(['?' | '=']?)
        { (prefix, flag, default, suffix) }
});

/// Return true if a string is a valid USE flag name.
pub(crate) fn valid_flag(s: &str) -> bool {
    usedep::flag_name(s).is_ok()
}

/// Default applied to a flag missing from a package's IUSE.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub enum UseDepDefault {
    Enabled,  // flag(+)
    Disabled, // flag(-)
}

impl fmt::Display for UseDepDefault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "(+)"),
            Self::Disabled => write!(f, "(-)"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub enum UseDepKind {
    Enabled,             // flag
    Disabled,            // -flag
    Equal,               // flag=
    NotEqual,            // !flag=
    EnabledConditional,  // flag?
    DisabledConditional, // !flag?
}

impl UseDepKind {
    fn is_conditional(&self) -> bool {
        !matches!(self, Self::Enabled | Self::Disabled)
    }
}

/// A single USE dependency token.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct UseDep {
    kind: UseDepKind,
    flag: String,
    default: Option<UseDepDefault>,
}

impl UseDep {
    fn new(kind: UseDepKind, flag: &str, default: Option<UseDepDefault>) -> Self {
        Self {
            kind,
            flag: flag.to_string(),
            default,
        }
    }

    pub fn kind(&self) -> UseDepKind {
        self.kind
    }

    pub fn flag(&self) -> &str {
        &self.flag
    }

    pub fn default(&self) -> Option<UseDepDefault> {
        self.default
    }
}

impl FromStr for UseDep {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let invalid = || Error::InvalidValue(format!("invalid use dep: {s:?}"));
        let (prefix, flag, default, suffix) = usedep::token(s).map_err(|_| invalid())?;
        use UseDepKind::*;
        let kind = match (prefix, suffix) {
            ("", "") => Enabled,
            ("-", "") => Disabled,
            ("", "?") => EnabledConditional,
            ("", "=") => Equal,
            ("!", "=") => NotEqual,
            ("!", "?") => DisabledConditional,
            _ => return Err(invalid()),
        };
        Ok(UseDep::new(kind, flag, default))
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let default = self.default.map(|d| d.to_string()).unwrap_or_default();
        let flag = &self.flag;
        match self.kind {
            UseDepKind::Enabled => write!(f, "{flag}{default}"),
            UseDepKind::Disabled => write!(f, "-{flag}{default}"),
            UseDepKind::Equal => write!(f, "{flag}{default}="),
            UseDepKind::NotEqual => write!(f, "!{flag}{default}="),
            UseDepKind::EnabledConditional => write!(f, "{flag}{default}?"),
            UseDepKind::DisabledConditional => write!(f, "!{flag}{default}?"),
        }
    }
}

/// Conditional USE dependency flags split by operator.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Conditionals {
    pub enabled: FlagSet,
    pub disabled: FlagSet,
    pub equal: FlagSet,
    pub not_equal: FlagSet,
}

impl Conditionals {
    fn add(&mut self, kind: UseDepKind, flag: &str) {
        match kind {
            UseDepKind::EnabledConditional => self.enabled.insert(flag),
            UseDepKind::DisabledConditional => self.disabled.insert(flag),
            UseDepKind::Equal => self.equal.insert(flag),
            UseDepKind::NotEqual => self.not_equal.insert(flag),
            UseDepKind::Enabled | UseDepKind::Disabled => false,
        };
    }

    fn is_empty(&self) -> bool {
        self.enabled.is_empty()
            && self.disabled.is_empty()
            && self.equal.is_empty()
            && self.not_equal.is_empty()
    }

    /// Iterate over all conditional flags paired with their rendered conditional.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        let enabled = self.enabled.iter().map(|f| (format!("{f}?"), f.as_str()));
        let disabled = self.disabled.iter().map(|f| (format!("!{f}?"), f.as_str()));
        let equal = self.equal.iter().map(|f| (format!("{f}="), f.as_str()));
        let not_equal = self.not_equal.iter().map(|f| (format!("!{f}="), f.as_str()));
        enabled.chain(disabled).chain(equal).chain(not_equal)
    }
}

/// Parsed set of USE dependencies attached to an atom.
#[derive(Debug, Clone)]
pub struct UseDeps {
    tokens: Vec<UseDep>,
    enabled: FlagSet,
    disabled: FlagSet,
    missing_enabled: FlagSet,
    missing_disabled: FlagSet,
    required: FlagSet,
    conditional: Option<Conditionals>,
}

impl PartialEq for UseDeps {
    fn eq(&self, other: &Self) -> bool {
        self.tokens == other.tokens
    }
}

impl Eq for UseDeps {}

impl Hash for UseDeps {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tokens.hash(state);
    }
}

impl UseDeps {
    /// Parse USE dependency tokens, verifying defaults don't conflict.
    pub fn new<I, S>(tokens: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut deps = UseDeps {
            tokens: vec![],
            enabled: FlagSet::new(),
            disabled: FlagSet::new(),
            missing_enabled: FlagSet::new(),
            missing_disabled: FlagSet::new(),
            required: FlagSet::new(),
            conditional: None,
        };
        let mut conditional = Conditionals::default();

        for s in tokens {
            let s = s.as_ref();
            let dep: UseDep = s.parse()?;
            let flag = dep.flag.as_str();
            match dep.kind {
                UseDepKind::Enabled => deps.enabled.insert(flag),
                UseDepKind::Disabled => deps.disabled.insert(flag),
                kind => {
                    conditional.add(kind, flag);
                    true
                }
            };

            let conflict = match dep.default {
                Some(UseDepDefault::Enabled) => {
                    let conflict =
                        deps.missing_disabled.contains(flag) || deps.required.contains(flag);
                    deps.missing_enabled.insert(flag);
                    conflict
                }
                Some(UseDepDefault::Disabled) => {
                    let conflict =
                        deps.missing_enabled.contains(flag) || deps.required.contains(flag);
                    deps.missing_disabled.insert(flag);
                    conflict
                }
                None => {
                    let conflict = deps.missing_enabled.contains(flag)
                        || deps.missing_disabled.contains(flag);
                    deps.required.insert(flag);
                    conflict
                }
            };

            if conflict {
                return Err(Error::InvalidValue(format!("invalid use dep: {s:?}")));
            }

            deps.tokens.push(dep);
        }

        if !conditional.is_empty() {
            deps.conditional = Some(conditional);
        }

        Ok(deps)
    }

    /// Create evaluated USE deps, keeping the defaults of the source instance.
    fn evaluated(&self, tokens: Vec<UseDep>, enabled: FlagSet, disabled: FlagSet) -> Self {
        UseDeps {
            tokens,
            enabled,
            disabled,
            missing_enabled: self.missing_enabled.clone(),
            missing_disabled: self.missing_disabled.clone(),
            required: self.required.clone(),
            conditional: None,
        }
    }

    pub fn tokens(&self) -> &[UseDep] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn enabled(&self) -> &FlagSet {
        &self.enabled
    }

    pub fn disabled(&self) -> &FlagSet {
        &self.disabled
    }

    /// Flags that count as enabled when missing from IUSE.
    pub fn missing_enabled(&self) -> &FlagSet {
        &self.missing_enabled
    }

    /// Flags that count as disabled when missing from IUSE.
    pub fn missing_disabled(&self) -> &FlagSet {
        &self.missing_disabled
    }

    /// Flags without a default that must exist in IUSE.
    pub fn required(&self) -> &FlagSet {
        &self.required
    }

    pub fn conditional(&self) -> Option<&Conditionals> {
        self.conditional.as_ref()
    }

    /// Resolve conditional tokens against the enabled flags of a parent package.
    pub fn evaluate_conditionals(&self, parent_use: &FlagSet) -> Self {
        let mut enabled = self.enabled.clone();
        let mut disabled = self.disabled.clone();
        let mut tokens = vec![];

        for dep in &self.tokens {
            let flag = dep.flag.as_str();
            let set = parent_use.contains(flag);
            let mut enable = |tokens: &mut Vec<UseDep>| {
                enabled.insert(flag);
                tokens.push(UseDep::new(UseDepKind::Enabled, flag, dep.default));
            };
            match dep.kind {
                UseDepKind::EnabledConditional => {
                    if set {
                        enable(&mut tokens);
                    }
                }
                UseDepKind::Equal | UseDepKind::NotEqual => {
                    if set == (dep.kind == UseDepKind::Equal) {
                        enable(&mut tokens);
                    } else {
                        disabled.insert(flag);
                        tokens.push(UseDep::new(UseDepKind::Disabled, flag, dep.default));
                    }
                }
                UseDepKind::DisabledConditional => {
                    if !set {
                        disabled.insert(flag);
                        tokens.push(UseDep::new(UseDepKind::Disabled, flag, dep.default));
                    }
                }
                UseDepKind::Enabled | UseDepKind::Disabled => tokens.push(dep.clone()),
            }
        }

        self.evaluated(tokens, enabled, disabled)
    }

    /// Return the subset of tokens not satisfied by the given enabled flags.
    ///
    /// Flags invalid for the package (per `is_valid_flag`) without a default are always
    /// considered violated. Conditional tokens require the enabled flags of the parent.
    pub fn violated_conditionals(
        &self,
        other_use: &FlagSet,
        is_valid_flag: &dyn Fn(&str) -> bool,
        parent_use: Option<&FlagSet>,
    ) -> crate::Result<Self> {
        let empty = FlagSet::new();
        let parent_use = match (parent_use, &self.conditional) {
            (Some(parent), _) => parent,
            (None, None) => &empty,
            (None, Some(_)) => {
                return Err(Error::InvalidValue(
                    "violated conditionals require parent USE for conditional flags".to_string(),
                ))
            }
        };

        let mut enabled = FlagSet::new();
        let mut disabled = FlagSet::new();
        let mut conditional = Conditionals::default();
        let mut tokens = vec![];

        for dep in &self.tokens {
            let flag = dep.flag.as_str();
            let valid = is_valid_flag(flag);
            let missing_enabled = self.missing_enabled.contains(flag);
            let missing_disabled = self.missing_disabled.contains(flag);
            let in_other = other_use.contains(flag);
            let in_parent = parent_use.contains(flag);

            let violated = if !(valid || missing_enabled || missing_disabled) {
                true
            } else {
                match dep.kind {
                    UseDepKind::Enabled => !in_other && (valid || missing_disabled),
                    UseDepKind::Disabled => {
                        if in_other {
                            true
                        } else {
                            !valid && missing_enabled
                        }
                    }
                    UseDepKind::EnabledConditional => {
                        in_parent && !in_other && (valid || missing_disabled)
                    }
                    UseDepKind::Equal => {
                        if in_parent && !in_other {
                            valid || missing_disabled
                        } else if !in_parent {
                            in_other || (!valid && missing_enabled)
                        } else {
                            false
                        }
                    }
                    UseDepKind::NotEqual => {
                        if !in_parent && !in_other {
                            valid || missing_disabled
                        } else if in_parent {
                            in_other || (!valid && missing_enabled)
                        } else {
                            false
                        }
                    }
                    UseDepKind::DisabledConditional => {
                        if in_parent {
                            false
                        } else if in_other {
                            true
                        } else {
                            !valid && missing_enabled
                        }
                    }
                }
            };

            if violated {
                match dep.kind {
                    UseDepKind::Enabled => enabled.insert(flag),
                    UseDepKind::Disabled => disabled.insert(flag),
                    kind => {
                        conditional.add(kind, flag);
                        true
                    }
                };
                tokens.push(dep.clone());
            }
        }

        let mut deps = self.evaluated(tokens, enabled, disabled);
        if !conditional.is_empty() {
            deps.conditional = Some(conditional);
        }
        Ok(deps)
    }

    /// Evaluate every combination permitted by the given masked and forced flags.
    ///
    /// The resulting enabled and disabled sets may overlap.
    pub fn eval_qa_conditionals(&self, use_mask: &FlagSet, use_force: &FlagSet) -> Self {
        let mut enabled = self.enabled.clone();
        let mut disabled = self.disabled.clone();
        let mut tokens = vec![];

        for dep in &self.tokens {
            let flag = dep.flag.as_str();
            let (can_enable, can_disable) = match dep.kind {
                UseDepKind::EnabledConditional => (!use_mask.contains(flag), false),
                UseDepKind::Equal => (!use_mask.contains(flag), !use_force.contains(flag)),
                UseDepKind::NotEqual => (!use_force.contains(flag), !use_mask.contains(flag)),
                UseDepKind::DisabledConditional => (false, !use_force.contains(flag)),
                UseDepKind::Enabled | UseDepKind::Disabled => {
                    tokens.push(dep.clone());
                    continue;
                }
            };
            if can_enable {
                enabled.insert(flag);
                tokens.push(UseDep::new(UseDepKind::Enabled, flag, dep.default));
            }
            if can_disable {
                disabled.insert(flag);
                tokens.push(UseDep::new(UseDepKind::Disabled, flag, dep.default));
            }
        }

        self.evaluated(tokens, enabled, disabled)
    }

    /// Return true if any token is conditional.
    pub fn has_conditionals(&self) -> bool {
        self.tokens.iter().any(|t| t.kind.is_conditional())
    }
}

impl fmt::Display for UseDeps {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.tokens.is_empty() {
            return Ok(());
        }
        write!(f, "[{}]", self.tokens.iter().join(","))
    }
}
