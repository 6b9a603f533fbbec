use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use enum_as_inner::EnumAsInner;

use crate::atom::{parse, Version};
use crate::macros::cmp_not_equal;
use crate::set::FlagSet;
use crate::Error;

/// Repo name used for packages of unknown origin, matching any repo dependency.
pub const UNKNOWN_REPO: &str = "__unknown__";

/// Versioned package identifier without any metadata.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Cpv {
    category: String,
    package: String,
    version: Version,
}

impl Cpv {
    pub fn new(s: &str) -> crate::Result<Self> {
        parse::cpv(s)
    }

    pub(crate) fn from_parts(category: &str, package: &str, version: Version) -> Self {
        Cpv {
            category: category.to_string(),
            package: package.to_string(),
            version,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn cp(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl Ord for Cpv {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_not_equal!(&self.category, &other.category);
        cmp_not_equal!(&self.package, &other.package);
        self.version.cmp(&other.version)
    }
}

impl PartialOrd for Cpv {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}-{}", self.category, self.package, self.version)
    }
}

impl FromStr for Cpv {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Cpv::new(s)
    }
}

/// Package with the metadata used for dependency matching.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Package {
    cpv: Cpv,
    slot: String,
    subslot: Option<String>,
    repo: Option<String>,
    build_id: Option<u64>,
    iuse: FlagSet,
    use_flags: FlagSet,
    use_mask: FlagSet,
    use_force: FlagSet,
    installed: bool,
}

impl Package {
    /// Create a package in slot 0 with no USE metadata.
    pub fn new(cpv: &str) -> crate::Result<Self> {
        Ok(Package {
            cpv: cpv.parse()?,
            slot: "0".to_string(),
            subslot: None,
            repo: None,
            build_id: None,
            iuse: FlagSet::new(),
            use_flags: FlagSet::new(),
            use_mask: FlagSet::new(),
            use_force: FlagSet::new(),
            installed: false,
        })
    }

    /// Set the slot from a `slot[/subslot]` string.
    pub fn with_slot(mut self, s: &str) -> Self {
        match s.split_once('/') {
            Some((slot, subslot)) => {
                self.slot = slot.to_string();
                self.subslot = Some(subslot.to_string());
            }
            None => {
                self.slot = s.to_string();
                self.subslot = None;
            }
        }
        self
    }

    pub fn with_repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.to_string());
        self
    }

    pub fn with_build_id(mut self, id: u64) -> Self {
        self.build_id = Some(id);
        self
    }

    /// Set IUSE, stripping any `+`/`-` default prefixes.
    pub fn with_iuse<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.iuse = flags
            .into_iter()
            .map(|s| s.as_ref().trim_start_matches(['+', '-']).to_string())
            .collect();
        self
    }

    /// Set the enabled USE flags.
    pub fn with_use<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_flags = flags.into_iter().collect();
        self
    }

    pub fn with_use_mask<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_mask = flags.into_iter().collect();
        self
    }

    pub fn with_use_force<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_force = flags.into_iter().collect();
        self
    }

    pub fn with_installed(mut self, installed: bool) -> Self {
        self.installed = installed;
        self
    }

    pub fn cpv(&self) -> &Cpv {
        &self.cpv
    }

    pub fn cp(&self) -> String {
        self.cpv.cp()
    }

    pub fn version(&self) -> &Version {
        self.cpv.version()
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Return the subslot, defaulting to the slot when unset.
    pub fn subslot(&self) -> &str {
        self.subslot.as_deref().unwrap_or(&self.slot)
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn build_id(&self) -> Option<u64> {
        self.build_id
    }

    pub fn iuse(&self) -> &FlagSet {
        &self.iuse
    }

    pub fn use_flags(&self) -> &FlagSet {
        &self.use_flags
    }

    pub fn use_mask(&self) -> &FlagSet {
        &self.use_mask
    }

    pub fn use_force(&self) -> &FlagSet {
        &self.use_force
    }

    pub fn installed(&self) -> bool {
        self.installed
    }

    /// Return true if a flag is declared in IUSE.
    pub fn iuse_valid(&self, flag: &str) -> bool {
        self.iuse.contains(flag)
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_not_equal!(&self.cpv, &other.cpv);
        cmp_not_equal!(&self.slot, &other.slot);
        cmp_not_equal!(&self.repo, &other.repo);
        self.build_id.cmp(&other.build_id)
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.cpv, self.slot)?;
        if let Some(subslot) = &self.subslot {
            write!(f, "/{subslot}")?;
        }
        if let Some(repo) = &self.repo {
            write!(f, "::{repo}")?;
        }
        Ok(())
    }
}

/// Matching target, either a bare identifier or a package with metadata.
#[derive(EnumAsInner, Debug, PartialEq, Eq, Copy, Clone)]
pub enum Candidate<'a> {
    Cpv(&'a Cpv),
    Pkg(&'a Package),
}

impl<'a> Candidate<'a> {
    pub fn cpv(&self) -> &'a Cpv {
        match *self {
            Self::Cpv(cpv) => cpv,
            Self::Pkg(pkg) => pkg.cpv(),
        }
    }

    pub fn slot(&self) -> Option<&'a str> {
        self.into_pkg().ok().map(|p| p.slot())
    }

    pub fn subslot(&self) -> Option<&'a str> {
        self.into_pkg().ok().map(|p| p.subslot())
    }

    pub fn repo(&self) -> Option<&'a str> {
        self.into_pkg().ok().and_then(|p| p.repo())
    }

    pub fn build_id(&self) -> Option<u64> {
        self.into_pkg().ok().and_then(|p| p.build_id())
    }
}

impl<'a> From<&'a Cpv> for Candidate<'a> {
    fn from(cpv: &'a Cpv) -> Self {
        Candidate::Cpv(cpv)
    }
}

impl<'a> From<&'a Package> for Candidate<'a> {
    fn from(pkg: &'a Package) -> Self {
        Candidate::Pkg(pkg)
    }
}

impl fmt::Display for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cpv(cpv) => write!(f, "{cpv}"),
            Self::Pkg(pkg) => write!(f, "{pkg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpv() {
        let cpv: Cpv = "cat/pkg-1.2-r3".parse().unwrap();
        assert_eq!(cpv.category(), "cat");
        assert_eq!(cpv.package(), "pkg");
        assert_eq!(cpv.cp(), "cat/pkg");
        assert_eq!(cpv.version().base(), "1.2");
        assert_eq!(cpv.to_string(), "cat/pkg-1.2-r3");
        assert!("cat/pkg".parse::<Cpv>().is_err());
    }

    #[test]
    fn test_sorting() {
        let mut cpvs: Vec<Cpv> = ["a/b-2", "a/b-1_p1", "a/a-3", "a/b-1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        cpvs.sort();
        let sorted: Vec<_> = cpvs.iter().map(|c| c.to_string()).collect();
        assert_eq!(sorted, ["a/a-3", "a/b-1", "a/b-1_p1", "a/b-2"]);
    }

    #[test]
    fn test_package() {
        let pkg = Package::new("cat/pkg-1")
            .unwrap()
            .with_slot("2/3")
            .with_repo("gentoo")
            .with_iuse(["+a", "-b", "c"])
            .with_use(["a"]);
        assert_eq!(pkg.slot(), "2");
        assert_eq!(pkg.subslot(), "3");
        assert!(pkg.iuse_valid("b"));
        assert!(!pkg.iuse_valid("-b"));
        assert_eq!(pkg.to_string(), "cat/pkg-1:2/3::gentoo");

        // subslot defaults to slot
        let pkg = pkg.with_slot("4");
        assert_eq!(pkg.subslot(), "4");

        let candidate = Candidate::from(&pkg);
        assert_eq!(candidate.slot(), Some("4"));
        assert_eq!(candidate.repo(), Some("gentoo"));
        let candidate = Candidate::from(pkg.cpv());
        assert_eq!(candidate.slot(), None);
        assert_eq!(candidate.to_string(), "cat/pkg-1");
    }
}
