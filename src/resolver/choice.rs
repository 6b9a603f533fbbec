use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use strum::{AsRefStr, EnumCount, EnumIter, IntoEnumIterator};
use tracing::{debug, warn};

use crate::atom::Atom;
use crate::pkg::Package;

use super::{dep_eval, DepExpr, GraphContext, InstalledDatabase, ResolverContext};

/// Preference bins for any-of branches, best first.
///
/// Branches fully in the graph, fully installed in the same slots, and installed in any slot
/// share the first bin and are ordered by promotion.
#[derive(AsRefStr, EnumCount, EnumIter, Debug, PartialEq, Eq, Copy, Clone)]
#[strum(serialize_all = "kebab-case")]
enum Bin {
    Preferred,
    PreferredNonInstalled,
    UnsatUseInGraph,
    UnsatUseInstalled,
    UnsatUseNonInstalled,
    OtherInstalled,
    OtherInstalledSome,
    OtherInstalledAnySlot,
    Other,
}

#[derive(Debug)]
struct DepChoice {
    id: usize,
    atoms: Vec<Atom>,
    cp_map: IndexMap<String, Package>,
    all_available: bool,
    all_installed_slots: bool,
    new_slot_count: usize,
    want_update: bool,
    all_in_graph: bool,
}

impl DepChoice {
    /// Determine if this choice should be moved in front of another in the same bin.
    fn promote_over(&self, other: &Self) -> bool {
        if self.all_installed_slots && !other.all_installed_slots && !other.want_update {
            return true;
        }

        let mut has_upgrade = false;
        let mut has_downgrade = false;
        for (cp, pkg) in &self.cp_map {
            if let Some(other_pkg) = other.cp_map.get(cp) {
                match pkg.version().cmp(other_pkg.version()) {
                    Ordering::Greater => has_upgrade = true,
                    Ordering::Less => has_downgrade = true,
                    Ordering::Equal => (),
                }
            }
        }

        (has_upgrade && !has_downgrade)
            || (self.all_in_graph && !other.all_in_graph && !(has_downgrade && !has_upgrade))
    }
}

fn slot_atom(cp: &str, slot: &str) -> crate::Result<Atom> {
    Atom::new(&format!("{cp}:{slot}"), Default::default())
}

fn cp_atom(cp: &str) -> crate::Result<Atom> {
    Atom::new(cp, Default::default())
}

/// Return a non-blocker atom that would pull in the parent or one of its circular children.
///
/// Circular children of the virtual parent, if one is being expanded, are also checked.
fn circular_atom<'a>(
    atoms: &[&'a Atom],
    graph: &dyn GraphContext,
    parent: &Package,
    is_installed: &dyn Fn(&Atom) -> bool,
) -> Option<&'a Atom> {
    if graph.onlydeps() {
        let cp = parent.cp();
        for &atom in atoms {
            if is_installed(atom) || atom.cp() != cp {
                continue;
            }
            if atom.matches(parent) {
                return Some(atom);
            }
        }
    }

    let virt_children = graph.virt_parent().map(|p| graph.circular_dependency(p));
    for child in graph
        .circular_dependency(parent)
        .into_iter()
        .chain(virt_children.into_iter().flatten())
    {
        if let Some(&atom) = atoms.iter().find(|a| a.matches(&child)) {
            return Some(atom);
        }
    }

    None
}

/// Determine the preference bin and properties of a single any-of branch.
fn classify(
    id: usize,
    atoms: Vec<Atom>,
    installed: &dyn InstalledDatabase,
    ctx: &ResolverContext,
) -> crate::Result<(Bin, DepChoice)> {
    let graph = ctx.graph;
    let parent = graph.and_then(|g| g.parent());
    let is_installed = |atom: &Atom| !installed.match_installed(atom).is_empty();

    let mut all_available = true;
    let mut all_use_satisfied = true;
    let mut all_use_unmasked = true;
    let mut conflict_downgrade = false;
    let mut installed_downgrade = false;
    let mut slot_atoms: IndexMap<Atom, Vec<Atom>> = IndexMap::new();
    let mut slot_map: IndexMap<Atom, Package> = IndexMap::new();
    let mut cp_map: IndexMap<String, Package> = IndexMap::new();

    for atom in atoms.iter().filter(|a| a.blocker().is_none()) {
        // it's not a downgrade if the parent is replacing the child
        let replacing = match (graph, parent) {
            (Some(g), Some(p)) => g.will_replace_child(p, ctx.root, atom),
            _ => None,
        };

        // USE deps are ignored so flag settings don't skew the preference order
        let mut avail = match ctx.available.cp_list(&atom.cp()) {
            true => ctx.available.match_pkgs(&atom.without_use()),
            false => vec![],
        };
        let mut avail_pkg = match avail.pop().or_else(|| replacing.clone()) {
            Some(pkg) => pkg,
            None => {
                all_available = false;
                all_use_satisfied = false;
                break;
            }
        };
        let mut avail_slot = slot_atom(&atom.cp(), avail_pkg.slot())?;

        if let (None, Some(g)) = (&replacing, graph) {
            let slot_matches = g.graph_match(&avail_slot);
            if let Some(highest) = slot_matches.last() {
                if slot_matches.len() > 1
                    && avail_pkg.cpv() < highest.cpv()
                    && !g.downgrade_probe(&avail_pkg)
                {
                    conflict_downgrade = true;
                }
            }
        }

        if atom.use_deps().is_some() {
            match ctx.available.match_pkgs(atom).pop() {
                Some(pkg) => {
                    avail_pkg = pkg;
                    avail_slot = slot_atom(&atom.cp(), avail_pkg.slot())?;
                }
                None => {
                    all_use_satisfied = false;
                    // prefer choices that don't require changes to use.mask or use.force
                    let violated = atom.violated_conditionals(
                        avail_pkg.use_flags(),
                        &|f| avail_pkg.iuse_valid(f),
                        None,
                    )?;
                    if let Some(deps) = violated.use_deps() {
                        let (mask, force) = (avail_pkg.use_mask(), avail_pkg.use_force());
                        if deps.enabled().iter().any(|f| mask.contains(f))
                            || deps
                                .disabled()
                                .iter()
                                .any(|f| force.contains(f) && !mask.contains(f))
                        {
                            all_use_unmasked = false;
                        }
                    }
                }
            }
        }

        if let (None, Some(g)) = (&replacing, graph) {
            if let Some(highest) = ctx.available.match_pkgs(&avail_slot).pop() {
                if avail_pkg.cpv() < highest.cpv()
                    && !g.downgrade_probe(&avail_pkg)
                    && (highest.installed() || g.in_graph(&highest))
                {
                    installed_downgrade = true;
                }
            }
        }

        slot_map.insert(avail_slot.clone(), avail_pkg.clone());
        let matching = slot_atoms.entry(avail_slot).or_default();
        matching.push(atom.clone());

        let cp = avail_pkg.cp();
        let highest = cp_map.get(&cp);
        let mut all_match_current = false;
        let mut all_match_previous = false;
        if let Some(highest) = highest.filter(|p| p.slot() == avail_pkg.slot()) {
            // keep the selection consistent with all atoms matching the same slot
            all_match_current = matching.iter().all(|a| a.matches(&avail_pkg));
            all_match_previous = matching.iter().all(|a| a.matches(highest));
            if all_match_previous && !all_match_current {
                continue;
            }
        }

        let current_higher = highest.map_or(true, |p| avail_pkg.version() > p.version());
        if current_higher || (all_match_current && !all_match_previous) {
            cp_map.insert(cp, avail_pkg);
        }
    }

    let mut want_update = false;
    let new_slot_count = match graph {
        Some(g) if !g.removal_action() => {
            let mut count = 0;
            for (slot_atom, pkg) in &slot_map {
                if parent.map_or(false, |p| g.want_update(p, pkg)) {
                    want_update = true;
                }
                if slot_atom.category() != "virtual" && g.graph_match(slot_atom).is_empty() {
                    count += 1;
                }
            }
            count
        }
        _ => slot_map.len(),
    };

    let deps: Vec<_> = atoms.iter().filter(|a| a.blocker().is_none()).collect();
    let mut all_installed_slots = false;
    let mut all_in_graph = false;

    let bin = if all_available {
        // any installed version counts, virtuals have zero cost
        let mut all_installed = true;
        let cps: IndexSet<_> = deps.iter().map(|a| a.cp()).collect();
        for cp in &cps {
            if !cp.starts_with("virtual/") && !is_installed(&cp_atom(cp)?) {
                all_installed = false;
                break;
            }
        }
        all_installed_slots = all_installed
            && slot_map
                .keys()
                .all(|a| a.category() == "virtual" || is_installed(a));

        match graph {
            None if all_use_satisfied && all_installed => Bin::Preferred,
            None if all_use_satisfied => Bin::PreferredNonInstalled,
            None if !all_use_unmasked => Bin::Other,
            None if all_installed_slots => Bin::UnsatUseInstalled,
            None => Bin::UnsatUseNonInstalled,
            Some(_) if conflict_downgrade || installed_downgrade => Bin::Other,
            Some(g) => {
                all_in_graph = deps
                    .iter()
                    .filter(|a| a.category() != "virtual")
                    .all(|a| g.graph_match(a).iter().any(|p| g.in_graph(p)));

                let circular = parent.and_then(|p| circular_atom(&deps, g, p, &is_installed));
                if let Some(atom) = circular {
                    debug!("avoiding circular dependency: {atom}");
                    Bin::Other
                } else if all_use_satisfied {
                    if all_in_graph || all_installed {
                        Bin::Preferred
                    } else {
                        Bin::PreferredNonInstalled
                    }
                } else if !all_use_unmasked {
                    Bin::Other
                } else if all_in_graph {
                    Bin::UnsatUseInGraph
                } else if all_installed_slots {
                    Bin::UnsatUseInstalled
                } else {
                    Bin::UnsatUseNonInstalled
                }
            }
        }
    } else {
        let mut all_installed = true;
        let mut some_installed = false;
        for &atom in &deps {
            if is_installed(atom) {
                some_installed = true;
            } else {
                all_installed = false;
            }
        }

        if all_installed {
            all_installed_slots = true;
            Bin::OtherInstalled
        } else if some_installed {
            Bin::OtherInstalledSome
        } else {
            // fuzzy match since the whole atom may be too specific
            let mut any_slot = false;
            for atom in &deps {
                if is_installed(&cp_atom(&atom.cp())?) {
                    any_slot = true;
                    break;
                }
            }
            if any_slot {
                Bin::OtherInstalledAnySlot
            } else {
                Bin::Other
            }
        }
    };

    let choice = DepChoice {
        id,
        atoms,
        cp_map,
        all_available,
        all_installed_slots,
        new_slot_count,
        want_update,
        all_in_graph,
    };
    Ok((bin, choice))
}

/// Reorder choices within a bin, preferring upgrades and already installed slots.
fn promote(choices: &mut Vec<DepChoice>, minimize_slots: bool) {
    if choices.len() < 2 {
        return;
    }

    if minimize_slots {
        choices.sort_by_key(|c| c.new_slot_count);
    }

    let ids: Vec<_> = choices.iter().skip(1).map(|c| c.id).collect();
    for id in ids {
        let Some(pos_1) = choices.iter().position(|c| c.id == id) else {
            continue;
        };
        for pos_2 in 0..pos_1 {
            if choices[pos_1].promote_over(&choices[pos_2]) {
                let choice = choices.remove(pos_1);
                debug!("promoting choice: {}", choice.atoms.iter().join(" "));
                choices.insert(pos_2, choice);
                break;
            }
        }
    }
}

/// Select the preferred branch of an any-of group.
fn choose(
    deps: &[DepExpr<Atom>],
    satisfied: &[DepExpr<bool>],
    ctx: &ResolverContext,
) -> crate::Result<Vec<Atom>> {
    let mut bins: [Vec<DepChoice>; Bin::COUNT] = std::array::from_fn(|_| vec![]);

    for (id, (dep, sat)) in deps.iter().zip(satisfied).enumerate() {
        let atoms = match dep {
            DepExpr::Leaf(atom) => vec![atom.clone()],
            _ => zap_deps(dep, sat, ctx)?,
        };

        let Some(installed) = ctx.installed else {
            return Ok(atoms);
        };

        let (bin, choice) = classify(id, atoms, installed, ctx)?;
        debug!("{} choice: {}", bin.as_ref(), choice.atoms.iter().join(" "));
        bins[bin as usize].push(choice);
    }

    for choices in bins.iter_mut() {
        promote(choices, ctx.minimize_slots);
    }

    for (bin, choices) in Bin::iter().zip(&bins) {
        if let Some(choice) = choices.iter().find(|c| c.all_available) {
            debug!("selected {} choice: {}", bin.as_ref(), choice.atoms.iter().join(" "));
            return Ok(choice.atoms.clone());
        }
    }

    // fall back to the least bad unavailable choice for error reporting
    let Some(choice) = bins.iter().flatten().next() else {
        unreachable!("any-of group without choices");
    };
    warn!("no available choice, selecting: {}", choice.atoms.iter().join(" "));
    Ok(choice.atoms.clone())
}

/// Return the atoms required to satisfy an unsatisfied dependency expression.
///
/// Panics if the satisfaction tree doesn't mirror the expression.
pub fn zap_deps(
    unreduced: &DepExpr<Atom>,
    reduced: &DepExpr<bool>,
    ctx: &ResolverContext,
) -> crate::Result<Vec<Atom>> {
    if dep_eval(reduced) {
        return Ok(vec![]);
    }

    match (unreduced, reduced) {
        (DepExpr::Leaf(atom), DepExpr::Leaf(_)) => Ok(vec![atom.clone()]),
        (DepExpr::AllOf(deps), DepExpr::AllOf(satisfied)) => {
            let mut unresolved = vec![];
            for (dep, sat) in deps.iter().zip(satisfied) {
                unresolved.extend(zap_deps(dep, sat, ctx)?);
            }
            Ok(unresolved)
        }
        (DepExpr::AnyOf(deps), DepExpr::AnyOf(satisfied)) => choose(deps, satisfied, ctx),
        _ => panic!("mismatched satisfaction tree for: {unreduced}"),
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use crate::depset::{use_reduce, ReduceOptions};
    use crate::eapi::EAPI_PKGDEP;
    use crate::macros::assert_logs_re;
    use crate::resolver::dep_wordreduce;
    use crate::test::{FakeGraph, FakeRepo};

    use super::*;

    fn resolve(s: &str, ctx: &ResolverContext) -> Vec<String> {
        let opts = ReduceOptions::new(&EAPI_PKGDEP);
        let e = DepExpr::from_tree(&use_reduce(s, &opts).unwrap());
        let satisfied = dep_wordreduce(&e, None);
        zap_deps(&e, &satisfied, ctx)
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    fn pkg(cpv: &str, slot: &str) -> Package {
        Package::new(cpv).unwrap().with_slot(slot)
    }

    #[test]
    fn test_installed_preferred() {
        let repo = FakeRepo::new(["dev-libs/foo-1", "dev-libs/bar-1"]);
        let none = FakeRepo::default();
        let installed = FakeRepo::new(["dev-libs/bar-1"]);
        let s = "|| ( dev-libs/foo dev-libs/bar )";

        let ctx = ResolverContext::new(&repo).installed(&none);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);

        let ctx = ResolverContext::new(&repo).installed(&installed);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);
    }

    #[traced_test]
    #[test]
    fn test_unavailable() {
        let repo = FakeRepo::new(["dev-libs/bar-1"]);
        let none = FakeRepo::default();
        let ctx = ResolverContext::new(&repo).installed(&none);
        assert_eq!(resolve("|| ( dev-libs/foo dev-libs/bar )", &ctx), ["dev-libs/bar"]);

        // the first unavailable choice is returned when nothing is available
        let empty = FakeRepo::default();
        let ctx = ResolverContext::new(&empty).installed(&none);
        assert_eq!(resolve("|| ( dev-libs/foo dev-libs/bar )", &ctx), ["dev-libs/foo"]);
        assert_logs_re!("no available choice, selecting: dev-libs/foo");

        // unavailable choices installed in another slot rank above other unavailable ones
        let installed = FakeRepo::new(["dev-libs/bar-1"]);
        let ctx = ResolverContext::new(&empty).installed(&installed);
        assert_eq!(resolve("|| ( dev-libs/foo dev-libs/bar:1 )", &ctx), ["dev-libs/bar:1"]);
    }

    #[test]
    fn test_nested() {
        let repo = FakeRepo::new(["dev-libs/a-1", "dev-libs/b-1", "dev-libs/c-1"]);
        let installed = FakeRepo::new(["dev-libs/b-1", "dev-libs/c-1"]);
        let ctx = ResolverContext::new(&repo).installed(&installed);
        let s = "|| ( ( dev-libs/a dev-libs/b ) ( dev-libs/b dev-libs/c ) )";
        assert_eq!(resolve(s, &ctx), ["dev-libs/b", "dev-libs/c"]);
    }

    #[test]
    fn test_slot_upgrade() {
        let repo = FakeRepo::from_pkgs([pkg("dev-libs/foo-1", "1"), pkg("dev-libs/foo-2", "2")]);
        let none = FakeRepo::default();
        let ctx = ResolverContext::new(&repo).installed(&none);
        assert_eq!(resolve("|| ( dev-libs/foo:1 dev-libs/foo:2 )", &ctx), ["dev-libs/foo:2"]);

        // installed slots win over upgrades
        let installed = FakeRepo::from_pkgs([pkg("dev-libs/foo-1", "1")]);
        let ctx = ResolverContext::new(&repo).installed(&installed);
        assert_eq!(resolve("|| ( dev-libs/foo:2 dev-libs/foo:1 )", &ctx), ["dev-libs/foo:1"]);
    }

    #[test]
    fn test_use_deps() {
        let repo = FakeRepo::from_pkgs([
            Package::new("dev-libs/foo-1").unwrap().with_iuse(["ssl"]).with_use_mask(["ssl"]),
            Package::new("dev-libs/bar-1").unwrap().with_iuse(["ssl"]),
            Package::new("dev-libs/baz-1").unwrap(),
        ]);
        let none = FakeRepo::default();
        let ctx = ResolverContext::new(&repo).installed(&none);

        // unsatisfied USE ranks below satisfied choices
        assert_eq!(resolve("|| ( dev-libs/bar[ssl] dev-libs/baz )", &ctx), ["dev-libs/baz"]);
        // masked flags rank below flags that can be changed
        assert_eq!(resolve("|| ( dev-libs/foo[ssl] dev-libs/bar[ssl] )", &ctx), ["dev-libs/bar[ssl]"]);
    }

    #[test]
    fn test_installed_downgrade() {
        let repo = FakeRepo::from_pkgs([
            Package::new("dev-libs/foo-1").unwrap(),
            Package::new("dev-libs/foo-2").unwrap().with_installed(true),
            Package::new("dev-libs/bar-1").unwrap(),
        ]);
        let installed = FakeRepo::new(["dev-libs/foo-2"]);
        let graph = FakeGraph::default();
        let ctx = ResolverContext::new(&repo).installed(&installed).graph(&graph);
        assert_eq!(resolve("|| ( <dev-libs/foo-2 dev-libs/bar )", &ctx), ["dev-libs/bar"]);

        // without graph context downgrades aren't detected
        let ctx = ResolverContext::new(&repo).installed(&installed);
        assert_eq!(resolve("|| ( <dev-libs/foo-2 dev-libs/bar )", &ctx), ["<dev-libs/foo-2"]);
    }

    #[test]
    fn test_want_update() {
        let repo = FakeRepo::new(["dev-libs/foo-1", "dev-libs/bar-1"]);
        let installed = FakeRepo::new(["dev-libs/bar-1"]);
        let parent = pkg("dev-libs/app-1", "0");
        let s = "|| ( dev-libs/foo dev-libs/bar )";

        // installed slots are promoted over choices already in the graph
        let graph = FakeGraph::new(["dev-libs/foo-1"]).parent(parent.clone());
        let ctx = ResolverContext::new(&repo).installed(&installed).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);

        // unless the parent wants the other choice updated
        let graph = FakeGraph::new(["dev-libs/foo-1"])
            .parent(parent)
            .updates(["dev-libs/foo-1"]);
        let ctx = ResolverContext::new(&repo).installed(&installed).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);
    }

    #[test]
    fn test_replacing_child() {
        let repo = FakeRepo::new(["dev-libs/bar-1"]);
        let none = FakeRepo::default();
        let parent = pkg("dev-libs/app-1", "0");
        let s = "|| ( dev-libs/foo dev-libs/bar )";

        let graph = FakeGraph::default().parent(parent.clone());
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);

        // a replacement package makes an otherwise unavailable choice available
        let graph = FakeGraph::default().parent(parent).replacing(["dev-libs/foo-2"]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);
    }

    #[test]
    fn test_downgrade_probe() {
        let repo = FakeRepo::from_pkgs([
            Package::new("dev-libs/foo-1").unwrap(),
            Package::new("dev-libs/foo-2").unwrap().with_installed(true),
            Package::new("dev-libs/bar-1").unwrap(),
        ]);
        let installed = FakeRepo::new(["dev-libs/foo-2"]);
        let s = "|| ( <dev-libs/foo-2 dev-libs/bar )";

        // acceptable downgrades aren't penalized
        let graph = FakeGraph::default().downgrades(["dev-libs/foo-1"]);
        let ctx = ResolverContext::new(&repo).installed(&installed).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["<dev-libs/foo-2"]);

        // neither are children being replaced by the parent
        let graph = FakeGraph::default()
            .parent(pkg("dev-libs/app-1", "0"))
            .replacing(["dev-libs/foo-1"]);
        let ctx = ResolverContext::new(&repo).installed(&installed).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["<dev-libs/foo-2"]);
    }

    #[test]
    fn test_conflict_downgrade() {
        let repo = FakeRepo::new(["dev-libs/foo-1", "dev-libs/bar-1"]);
        let none = FakeRepo::default();
        let s = "|| ( dev-libs/foo dev-libs/bar )";

        let graph = FakeGraph::new(["dev-libs/foo-1"]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);

        // a higher version already pulled into the same slot makes the choice a downgrade
        let graph = FakeGraph::new(["dev-libs/foo-1", "dev-libs/foo-2"]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);

        let graph =
            FakeGraph::new(["dev-libs/foo-1", "dev-libs/foo-2"]).downgrades(["dev-libs/foo-1"]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);
    }

    #[traced_test]
    #[test]
    fn test_circular() {
        let repo = FakeRepo::new(["dev-libs/foo-1", "dev-libs/bar-1"]);
        let none = FakeRepo::default();
        let s = "|| ( dev-libs/foo dev-libs/bar )";

        let graph = FakeGraph::default().parent(pkg("dev-libs/foo-1", "0")).onlydeps(true);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);
        assert_logs_re!("avoiding circular dependency: dev-libs/foo");

        let parent = pkg("dev-libs/baz-1", "0");
        let graph = FakeGraph::default()
            .parent(parent.clone())
            .circular(parent.clone(), [pkg("dev-libs/foo-1", "0")]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);

        // circular children of other packages are ignored
        let virt = pkg("virtual/baz-1", "0");
        let graph = FakeGraph::default()
            .parent(parent.clone())
            .circular(virt.clone(), [pkg("dev-libs/foo-1", "0")]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);

        // unless they belong to the virtual being expanded for the parent
        let graph = FakeGraph::default()
            .parent(parent)
            .virt_parent(virt.clone())
            .circular(virt, [pkg("dev-libs/foo-1", "0")]);
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/bar"]);

        // without a parent nothing is circular
        let graph = FakeGraph::default();
        let ctx = ResolverContext::new(&repo).installed(&none).graph(&graph);
        assert_eq!(resolve(s, &ctx), ["dev-libs/foo"]);
    }

    #[test]
    fn test_minimize_slots() {
        let repo = FakeRepo::new(["dev-libs/a-1", "dev-libs/b-1", "dev-libs/c-1"]);
        let none = FakeRepo::default();
        let mut ctx = ResolverContext::new(&repo).installed(&none);
        let s = "|| ( ( dev-libs/a dev-libs/b ) dev-libs/c )";
        assert_eq!(resolve(s, &ctx), ["dev-libs/a", "dev-libs/b"]);

        ctx.minimize_slots = true;
        assert_eq!(resolve(s, &ctx), ["dev-libs/c"]);
    }

    #[test]
    fn test_blockers() {
        let repo = FakeRepo::new(["dev-libs/foo-1"]);
        let none = FakeRepo::default();
        let ctx = ResolverContext::new(&repo).installed(&none);
        assert_eq!(resolve("dev-libs/foo !dev-libs/bar", &ctx), ["dev-libs/foo", "!dev-libs/bar"]);
        // blocker-only branches need nothing installed
        assert_eq!(resolve("|| ( !dev-libs/bar dev-libs/foo )", &ctx), ["!dev-libs/bar"]);
    }
}
