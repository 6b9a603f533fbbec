use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

use crate::Error;

/// Bitset of the features enabled for an EAPI.
///
/// Used as the key for all per-EAPI caches so EAPIs sharing the same dependency syntax share
/// cached parsing results.
pub type Attrs = u16;

/// Features that relate to differentiation between EAPIs in dependency syntax.
#[derive(AsRefStr, EnumIter, EnumString, Debug, PartialEq, Eq, Hash, Copy, Clone)]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    // EAPI 1
    /// slot deps -- cat/pkg:0
    SlotDeps,

    // EAPI 2
    /// use deps -- cat/pkg[use]
    UseDeps,
    /// strong blockers -- !!cat/pkg
    StrongBlocks,
    /// SRC_URI renames -- uri -> file
    SrcUriArrows,

    // EAPI 4
    /// use dep defaults -- cat/pkg[use(+)] and cat/pkg[use(-)]
    UseDepDefaults,
    /// REQUIRED_USE support
    RequiredUse,

    // EAPI 5
    /// slot operators and subslots -- cat/pkg:=, cat/pkg:*, cat/pkg:0/4=
    SlotOps,
    /// REQUIRED_USE at-most-one-of groups -- ?? ( a b )
    RequiredUseAtMostOneOf,

    // EAPI 0-6
    /// empty groups such as `|| ( )` are always true
    EmptyGroupsAlwaysTrue,

    // EAPI 8
    /// SRC_URI supports fetch+ and mirror+ prefixes
    SelectiveSrcUriRestriction,

    // EAPI EXTENDED
    /// repo deps -- cat/pkg::repo
    RepoIds,
    /// binary package build ids -- =cat/pkg-1-2
    BuildIds,
}

impl Feature {
    fn bit(self) -> Attrs {
        1 << (self as Attrs)
    }
}

/// EAPI object.
#[derive(Default, Clone)]
pub struct Eapi {
    id: String,
    features: HashSet<Feature>,
}

impl PartialEq for Eapi {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Eapi {}

impl Hash for Eapi {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Borrow<str> for &'static Eapi {
    fn borrow(&self) -> &str {
        &self.id
    }
}

impl Ord for Eapi {
    fn cmp(&self, other: &Self) -> Ordering {
        let self_index = EAPIS.get_index_of(self.id.as_str());
        let other_index = EAPIS.get_index_of(other.id.as_str());
        self_index.cmp(&other_index)
    }
}

impl PartialOrd for Eapi {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Eapi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for Eapi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Eapi {{ id: {} }}", self.id)
    }
}

impl FromStr for &'static Eapi {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match EAPIS.get(s) {
            Some(eapi) => Ok(eapi),
            None => Err(Error::InvalidValue(format!("unknown EAPI: {s:?}"))),
        }
    }
}

// use the extended EAPI for the Default trait
impl Default for &'static Eapi {
    fn default() -> &'static Eapi {
        &EAPI_PKGDEP
    }
}

impl TryFrom<&str> for &'static Eapi {
    type Error = Error;

    fn try_from(value: &str) -> crate::Result<&'static Eapi> {
        value.parse()
    }
}

impl TryFrom<Option<&str>> for &'static Eapi {
    type Error = Error;

    fn try_from(value: Option<&str>) -> crate::Result<&'static Eapi> {
        value.map_or_else(|| Ok(Default::default()), |s| s.parse())
    }
}

impl Eapi {
    /// Create a new Eapi given an identifier and optional Eapi to inherit from.
    fn new(id: &str, eapi: Option<&'static Eapi>) -> Self {
        let mut eapi = eapi.cloned().unwrap_or_default();
        eapi.id = id.to_string();
        eapi
    }

    /// Return the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Check if an EAPI has a given feature.
    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Return the bitset of enabled features.
    pub fn attrs(&self) -> Attrs {
        self.features.iter().fold(0, |bits, f| bits | f.bit())
    }

    /// Parse a package atom using a specific EAPI.
    pub fn atom<S: AsRef<str>>(&'static self, s: S) -> crate::Result<crate::atom::Atom> {
        crate::atom::Atom::new(s.as_ref(), self)
    }

    /// Enable features during Eapi registration.
    fn enable_features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = Feature>,
    {
        for f in features {
            if !self.features.insert(f) {
                unreachable!("EAPI {self}: enabling set feature: {f:?}");
            }
        }
        self
    }

    /// Disable inherited features during Eapi registration.
    fn disable_features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = Feature>,
    {
        for f in features {
            if !self.features.remove(&f) {
                unreachable!("EAPI {self}: disabling unset feature: {f:?}");
            }
        }
        self
    }
}

pub static EAPI0: Lazy<Eapi> =
    Lazy::new(|| Eapi::new("0", None).enable_features([Feature::EmptyGroupsAlwaysTrue]));

pub static EAPI1: Lazy<Eapi> =
    Lazy::new(|| Eapi::new("1", Some(&EAPI0)).enable_features([Feature::SlotDeps]));

pub static EAPI2: Lazy<Eapi> = Lazy::new(|| {
    use Feature::*;
    Eapi::new("2", Some(&EAPI1)).enable_features([UseDeps, StrongBlocks, SrcUriArrows])
});

pub static EAPI3: Lazy<Eapi> = Lazy::new(|| Eapi::new("3", Some(&EAPI2)));

pub static EAPI4: Lazy<Eapi> = Lazy::new(|| {
    use Feature::*;
    Eapi::new("4", Some(&EAPI3)).enable_features([UseDepDefaults, RequiredUse])
});

pub static EAPI5: Lazy<Eapi> = Lazy::new(|| {
    use Feature::*;
    Eapi::new("5", Some(&EAPI4)).enable_features([SlotOps, RequiredUseAtMostOneOf])
});

pub static EAPI6: Lazy<Eapi> = Lazy::new(|| Eapi::new("6", Some(&EAPI5)));

pub static EAPI7: Lazy<Eapi> = Lazy::new(|| {
    Eapi::new("7", Some(&EAPI6)).disable_features([Feature::EmptyGroupsAlwaysTrue])
});

pub static EAPI8: Lazy<Eapi> = Lazy::new(|| {
    Eapi::new("8", Some(&EAPI7)).enable_features([Feature::SelectiveSrcUriRestriction])
});

/// Reference to the most recent, official EAPI.
pub static EAPI_LATEST: Lazy<&'static Eapi> = Lazy::new(|| &EAPI8);

/// The latest EAPI with extensions on top.
pub static EAPI_PKGDEP: Lazy<Eapi> = Lazy::new(|| {
    use Feature::*;
    Eapi::new("pkgdep", Some(&EAPI_LATEST)).enable_features([RepoIds, BuildIds])
});

/// Ordered mapping of all known EAPIs.
pub static EAPIS: Lazy<IndexMap<&'static str, &'static Eapi>> = Lazy::new(|| {
    [
        &*EAPI0,
        &*EAPI1,
        &*EAPI2,
        &*EAPI3,
        &*EAPI4,
        &*EAPI5,
        &*EAPI6,
        &*EAPI7,
        &*EAPI8,
        &*EAPI_PKGDEP,
    ]
    .into_iter()
    .map(|e| (e.as_str(), e))
    .collect()
});

/// Ordered mapping of official EAPIs.
pub static EAPIS_OFFICIAL: Lazy<IndexMap<&'static str, &'static Eapi>> = Lazy::new(|| {
    EAPIS
        .iter()
        .filter(|(id, _)| **id != EAPI_PKGDEP.as_str())
        .map(|(id, e)| (*id, *e))
        .collect()
});

/// Return all features, primarily used for documentation and tests.
pub fn features() -> impl Iterator<Item = Feature> {
    Feature::iter()
}
