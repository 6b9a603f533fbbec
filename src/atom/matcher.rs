use std::cmp::Ordering;

use cached::{proc_macro::cached, SizedCache};
use indexmap::IndexSet;
use regex::Regex;

use super::version::glob_normalize;
use super::{Atom, Operator};
use crate::pkg::{Candidate, Package, UNKNOWN_REPO};
use crate::restrict::Restriction;
use crate::set::FlagSet;

#[cached(
    type = "SizedCache<String, Option<Regex>>",
    create = "{ SizedCache::with_size(100) }",
    convert = r#"{ pattern.to_string() }"#
)]
fn glob_regex(pattern: &str) -> Option<Regex> {
    let re = regex::escape(pattern).replace(r"\*", "[^/]*");
    Regex::new(&format!("^{re}$")).ok()
}

/// Determine if a category/package key matches a wildcard key, e.g. `*/foo` or `dev-*/*`.
pub fn extended_cp_match(extended_cp: &str, other_cp: &str) -> bool {
    glob_regex(extended_cp).map_or(false, |re| re.is_match(other_cp))
}

/// Compare the cpv of a `=cat/pkg-ver*` atom as a literal prefix of a candidate's cpv.
fn glob_match(atom: &Atom, candidate: &Candidate) -> bool {
    let (Some(ver), cpv) = (atom.version(), candidate.cpv()) else {
        return false;
    };

    let normalize = |cp: String, base: &str, full: &str| {
        format!("{cp}-{}{}", glob_normalize(base), &full[base.len()..])
    };
    let prefix = normalize(atom.cp(), ver.base(), ver.as_str());
    let x_ver = cpv.version();
    let target = normalize(cpv.cp(), x_ver.base(), x_ver.as_str());

    let Some(remaining) = target.strip_prefix(&prefix) else {
        return false;
    };

    // only match on boundaries between version components so 1* doesn't match 10
    match (prefix.chars().last(), remaining.chars().next()) {
        (_, None) => true,
        (_, Some('.' | '_' | '-')) => true,
        (Some(last), Some(next)) => last.is_ascii_digit() != next.is_ascii_digit(),
        (None, Some(_)) => false,
    }
}

/// Match the version component of an atom.
fn version_match(atom: &Atom, candidate: &Candidate) -> bool {
    let cpv = candidate.cpv();

    if atom.extended_syntax() {
        if !extended_cp_match(&atom.cp(), &cpv.cp()) {
            return false;
        }
        return match atom.wildcard_version() {
            Some(wildcard) => {
                let ver = &wildcard[1..wildcard.len() - 1];
                cpv.version().as_str().contains(ver)
            }
            None => true,
        };
    }

    if cpv.category() != atom.category() || cpv.package() != atom.package() {
        return false;
    }

    let (Some(op), Some(ver)) = (atom.op(), atom.version()) else {
        return true;
    };

    let x_ver = cpv.version();
    match op {
        Operator::Equal => {
            x_ver == ver
                && atom
                    .build_id()
                    .map_or(true, |id| candidate.build_id() == Some(id))
        }
        Operator::EqualGlob => glob_match(atom, candidate),
        Operator::Approximate => x_ver.cmp_base(ver) == Ordering::Equal,
        Operator::Less => x_ver < ver,
        Operator::LessOrEqual => x_ver <= ver,
        Operator::GreaterOrEqual => x_ver >= ver,
        Operator::Greater => x_ver > ver,
    }
}

/// Match slot and subslot, bare identifiers lacking slot metadata always match.
fn slot_match(atom: &Atom, candidate: &Candidate) -> bool {
    let Some(slot) = atom.slot() else {
        return true;
    };

    match (candidate.slot(), candidate.subslot()) {
        (Some(x_slot), Some(x_subslot)) => {
            x_slot == slot && atom.subslot().map_or(true, |s| s == x_subslot)
        }
        _ => true,
    }
}

/// Match USE dependencies against a package's IUSE and enabled flags.
fn use_match(atom: &Atom, pkg: &Package) -> bool {
    let Some(unevaluated) = atom.unevaluated().use_deps() else {
        return true;
    };

    if !unevaluated.required().iter().all(|f| pkg.iuse_valid(f)) {
        return false;
    }

    let Some(deps) = atom.use_deps() else {
        return true;
    };

    let missing = |flags: &FlagSet| -> FlagSet {
        flags.iter().filter(|f| !pkg.iuse_valid(f)).cloned().collect()
    };
    let missing_enabled = missing(deps.missing_enabled());
    let missing_disabled = missing(deps.missing_disabled());
    let enabled = pkg.use_flags();

    if !deps.enabled().is_empty() {
        if deps.enabled().iter().any(|f| missing_disabled.contains(f)) {
            return false;
        }
        let mut need_enabled = deps.enabled().iter().filter(|f| !enabled.contains(*f));
        if need_enabled.any(|f| !missing_enabled.contains(f)) {
            return false;
        }
    }

    if !deps.disabled().is_empty() {
        if deps.disabled().iter().any(|f| missing_enabled.contains(f)) {
            return false;
        }
        let mut need_disabled = deps.disabled().iter().filter(|f| enabled.contains(*f));
        if need_disabled.any(|f| !missing_disabled.contains(f)) {
            return false;
        }
    }

    true
}

/// Match a repo dependency, packages from unknown repos always match.
fn repo_match(atom: &Atom, candidate: &Candidate) -> bool {
    match (atom.repo(), candidate.repo()) {
        (Some(repo), Some(x_repo)) => x_repo == UNKNOWN_REPO || x_repo == repo,
        _ => true,
    }
}

impl Restriction<Candidate<'_>> for Atom {
    fn matches(&self, candidate: Candidate<'_>) -> bool {
        // blockers match the packages they block
        version_match(self, &candidate)
            && slot_match(self, &candidate)
            && candidate.into_pkg().map_or(true, |pkg| use_match(self, pkg))
            && repo_match(self, &candidate)
    }
}

impl Atom {
    /// Determine if a package or bare identifier satisfies the atom.
    pub fn matches<'a, C: Into<Candidate<'a>>>(&self, candidate: C) -> bool {
        Restriction::<Candidate>::matches(self, candidate.into())
    }
}

/// Return the candidates matching an atom, preserving their order.
pub fn match_from_list<'a, I, C>(atom: &Atom, candidates: I) -> Vec<C>
where
    I: IntoIterator<Item = C>,
    C: Into<Candidate<'a>> + Copy,
{
    candidates
        .into_iter()
        .filter(|c| atom.matches(*c))
        .collect()
}

/// Return the unique atoms from a list that match a package.
pub fn match_to_list<'a, 'b, C, I>(pkg: C, atoms: I) -> Vec<&'b Atom>
where
    C: Into<Candidate<'a>>,
    I: IntoIterator<Item = &'b Atom>,
{
    let candidate = pkg.into();
    let atoms: IndexSet<_> = atoms.into_iter().collect();
    atoms
        .into_iter()
        .filter(|a| a.matches(candidate))
        .collect()
}

/// Rank how specifically an atom targets a package.
fn specificity(atom: &Atom) -> i32 {
    if atom.extended_syntax() {
        return match (atom.op(), atom.slot()) {
            (Some(Operator::EqualGlob), _) => 0,
            (_, Some(_)) => -1,
            _ => -2,
        };
    }

    let value = match atom.op() {
        Some(Operator::Equal) => 6,
        Some(Operator::Approximate) => 5,
        Some(Operator::EqualGlob) => 4,
        Some(_) => 2,
        None => 1,
    };

    if atom.slot().is_some() {
        value.max(3)
    } else {
        value
    }
}

/// Return the most specific atom from a list matching a package.
///
/// Ties between relational atoms prefer the version closest to the package.
pub fn best_match_to_list<'a, 'b, C, I>(pkg: C, atoms: I) -> Option<&'b Atom>
where
    C: Into<Candidate<'a>>,
    I: IntoIterator<Item = &'b Atom>,
{
    let candidate = pkg.into();
    let pkg_ver = candidate.cpv().version();
    let mut best: Option<(&Atom, i32)> = None;

    for atom in match_to_list(candidate, atoms) {
        let value = specificity(atom);
        match best {
            None => best = Some((atom, value)),
            Some((_, max)) if value > max => best = Some((atom, value)),
            Some((prev, max)) if value == max && value == 2 => {
                let (Some(prev_ver), Some(ver)) = (prev.version(), atom.version()) else {
                    continue;
                };
                if prev_ver == pkg_ver || prev_ver == ver {
                    continue;
                }
                if ver == pkg_ver {
                    best = Some((atom, value));
                    continue;
                }
                // the new atom wins when it sits between the package and the previous best
                let mut versions = [prev_ver, pkg_ver, ver];
                versions.sort();
                let ends = [versions[0], versions[2]];
                if ends.iter().any(|v| std::ptr::eq(*v, pkg_ver))
                    && std::ptr::eq(versions[1], ver)
                {
                    best = Some((atom, value));
                }
            }
            _ => (),
        }
    }

    best.map(|(atom, _)| atom)
}
