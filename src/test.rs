use crate::atom::Atom;
use crate::pkg::{Cpv, Package};
use crate::resolver::{GraphContext, InstalledDatabase, PackageDatabase};

pub(crate) static VER_CMP_DATA: &[&str] = &[
    // simple major versions
    "0 == 0",
    "0 != 1",
    // equal due to integer coercion and "-r0" being the revision default
    "0 == 0-r0",
    "1 == 01",
    "01 == 001",
    "1.00 == 1.0",
    "1.0100 == 1.010",
    "01.01 == 1.01",
    "0001.1 == 1.1",
    "1.2 == 001.2",
    "1.0.2 == 1.0.2-r0",
    "1.0.2-r0 == 1.000.2",
    "1.000.2 == 1.00.2-r0",
    "0-r0 == 0-r00",
    "0_beta01 == 0_beta001",
    "1.2_pre08-r09 == 1.2_pre8-r9",
    "1.010.02 != 1.01.2",
    // minor versions
    "0.1 < 0.11",
    "0.01 > 0.001",
    "1.0 > 1",
    "1.0_alpha > 1_alpha",
    "1.0_alpha > 1",
    "1.0_alpha < 1.0",
    // version letter suffix
    "0a < 0b",
    "1.1z > 1.1a",
    // release types
    "1_alpha < 1_beta",
    "1_beta < 1_pre",
    "1_pre < 1_rc",
    "1_rc < 1",
    "1 < 1_p",
    // release suffix vs non-suffix
    "1.2.3_alpha < 1.2.3",
    "1.2.3_beta < 1.2.3",
    "1.2.3_pre < 1.2.3",
    "1.2.3_rc < 1.2.3",
    "1.2.3_p > 1.2.3",
    // release suffix version
    "0_alpha1 < 0_alpha2",
    "0_alpha2-r1 > 0_alpha1-r2",
    "0_p1 < 0_p2",
    // last release suffix
    "0_alpha_rc_p > 0_alpha_rc",
    // revision
    "0-r2 > 0-r1",
    "1.0.2_pre01-r2 > 1.00.2_pre001-r1",
];

/// Package database backed by a sorted list, usable as both available and installed state.
#[derive(Debug, Default)]
pub(crate) struct FakeRepo {
    pkgs: Vec<Package>,
}

impl FakeRepo {
    pub(crate) fn new<'a, I: IntoIterator<Item = &'a str>>(cpvs: I) -> Self {
        Self::from_pkgs(cpvs.into_iter().map(|s| Package::new(s).unwrap()))
    }

    pub(crate) fn from_pkgs<I: IntoIterator<Item = Package>>(pkgs: I) -> Self {
        let mut pkgs: Vec<_> = pkgs.into_iter().collect();
        pkgs.sort();
        Self { pkgs }
    }
}

impl PackageDatabase for FakeRepo {
    fn match_pkgs(&self, atom: &Atom) -> Vec<Package> {
        self.pkgs.iter().filter(|p| atom.matches(*p)).cloned().collect()
    }

    fn cp_list(&self, cp: &str) -> bool {
        self.pkgs.iter().any(|p| p.cp() == cp)
    }
}

impl InstalledDatabase for FakeRepo {
    fn match_installed(&self, atom: &Atom) -> Vec<Cpv> {
        self.pkgs
            .iter()
            .filter(|p| atom.matches(*p))
            .map(|p| p.cpv().clone())
            .collect()
    }
}

/// Dependency graph state with a configurable parent.
#[derive(Debug, Default)]
pub(crate) struct FakeGraph {
    pkgs: Vec<Package>,
    parent: Option<Package>,
    virt_parent: Option<Package>,
    onlydeps: bool,
    circular: Vec<(Package, Vec<Package>)>,
    updates: Vec<Package>,
    replacing: Vec<Package>,
    downgrades: Vec<Package>,
}

fn pkgs<'a, I: IntoIterator<Item = &'a str>>(cpvs: I) -> Vec<Package> {
    let mut pkgs: Vec<_> = cpvs.into_iter().map(|s| Package::new(s).unwrap()).collect();
    pkgs.sort();
    pkgs
}

impl FakeGraph {
    pub(crate) fn new<'a, I: IntoIterator<Item = &'a str>>(cpvs: I) -> Self {
        Self { pkgs: pkgs(cpvs), ..Default::default() }
    }

    pub(crate) fn parent(mut self, pkg: Package) -> Self {
        self.parent = Some(pkg);
        self
    }

    pub(crate) fn onlydeps(mut self, value: bool) -> Self {
        self.onlydeps = value;
        self
    }

    pub(crate) fn virt_parent(mut self, pkg: Package) -> Self {
        self.virt_parent = Some(pkg);
        self
    }

    /// Register circular children for a package.
    pub(crate) fn circular<I>(mut self, pkg: Package, children: I) -> Self
    where
        I: IntoIterator<Item = Package>,
    {
        self.circular.push((pkg, children.into_iter().collect()));
        self
    }

    /// Packages the parent wants updated to.
    pub(crate) fn updates<'a, I: IntoIterator<Item = &'a str>>(mut self, cpvs: I) -> Self {
        self.updates = pkgs(cpvs);
        self
    }

    /// Packages replacing the parent's existing children matching an atom.
    pub(crate) fn replacing<'a, I: IntoIterator<Item = &'a str>>(mut self, cpvs: I) -> Self {
        self.replacing = pkgs(cpvs);
        self
    }

    /// Packages that are acceptable downgrade targets.
    pub(crate) fn downgrades<'a, I: IntoIterator<Item = &'a str>>(mut self, cpvs: I) -> Self {
        self.downgrades = pkgs(cpvs);
        self
    }
}

impl GraphContext for FakeGraph {
    fn in_graph(&self, pkg: &Package) -> bool {
        self.pkgs.contains(pkg)
    }

    fn want_update(&self, _parent: &Package, pkg: &Package) -> bool {
        self.updates.iter().any(|p| p.cpv() == pkg.cpv())
    }

    fn will_replace_child(&self, _parent: &Package, _root: &str, atom: &Atom) -> Option<Package> {
        self.replacing.iter().find(|p| atom.matches(*p)).cloned()
    }

    fn downgrade_probe(&self, pkg: &Package) -> bool {
        self.downgrades.iter().any(|p| p.cpv() == pkg.cpv())
    }

    fn graph_match(&self, atom: &Atom) -> Vec<Package> {
        self.pkgs.iter().filter(|p| atom.matches(*p)).cloned().collect()
    }

    fn parent(&self) -> Option<&Package> {
        self.parent.as_ref()
    }

    fn circular_dependency(&self, parent: &Package) -> Vec<Package> {
        self.circular
            .iter()
            .filter(|(pkg, _)| pkg == parent)
            .flat_map(|(_, children)| children.clone())
            .collect()
    }

    fn virt_parent(&self) -> Option<&Package> {
        self.virt_parent.as_ref()
    }

    fn onlydeps(&self) -> bool {
        self.onlydeps
    }
}
