use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use strum::EnumString;

use super::parse;
use crate::macros::cmp_not_equal;
use crate::Error;

/// Release suffix ordering from earliest to latest relative to the bare version.
#[derive(EnumString, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

fn parse_int(kind: &str, s: &str) -> crate::Result<u64> {
    s.parse()
        .map_err(|e| Error::Overflow(format!("invalid {kind}: {e}: {s}")))
}

/// Dotted version component retaining its raw form for zero-prefixed comparisons.
#[derive(Debug, Clone)]
struct Component {
    raw: String,
    value: u64,
}

impl Component {
    fn new(s: &str) -> crate::Result<Self> {
        Ok(Self {
            raw: s.to_string(),
            value: parse_int("version", s)?,
        })
    }

    /// Components after the first compare as stripped strings when either has a leading zero.
    fn fractional(&self) -> Option<&str> {
        self.raw
            .starts_with('0')
            .then(|| self.raw.trim_end_matches('0'))
    }

    fn cmp_fractional(&self, other: &Self) -> Ordering {
        if self.raw == other.raw {
            return Ordering::Equal;
        }
        match (self.fractional(), other.fractional()) {
            (None, None) => self.value.cmp(&other.value),
            _ => self
                .raw
                .trim_end_matches('0')
                .cmp(other.raw.trim_end_matches('0')),
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct Release {
    suffix: Suffix,
    // a missing number is equivalent to zero
    num: u64,
}

#[derive(Debug, Default, Clone)]
pub struct Revision {
    value: Option<String>,
    int: u64,
}

impl Revision {
    fn new(rev: Option<&str>) -> crate::Result<Self> {
        let Some(s) = rev else {
            return Ok(Self::default());
        };
        Ok(Self {
            value: Some(s.to_string()),
            int: parse_int("revision", s)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.value.as_deref().unwrap_or("0")
    }

    /// Return true if the revision was explicitly specified.
    pub fn is_explicit(&self) -> bool {
        self.value.is_some()
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.int == other.int
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.int.hash(state);
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.int.cmp(&other.int)
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Borrowed version pieces produced by the grammar.
#[derive(Debug)]
pub(crate) struct ParsedVersion<'a> {
    pub(crate) start: usize,
    pub(crate) end_base: usize,
    pub(crate) end: usize,
    pub(crate) numbers: Vec<&'a str>,
    pub(crate) letter: Option<char>,
    pub(crate) suffixes: Vec<(&'a str, Option<&'a str>)>,
    pub(crate) revision: Option<&'a str>,
}

impl ParsedVersion<'_> {
    pub(crate) fn into_owned(self, input: &str) -> crate::Result<Version> {
        let components = self
            .numbers
            .iter()
            .map(|s| Component::new(s))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut releases = Vec::with_capacity(self.suffixes.len());
        for (name, num) in &self.suffixes {
            let suffix = name
                .parse()
                .map_err(|_| Error::InvalidValue(format!("invalid suffix: {name}")))?;
            let num = num.map(|s| parse_int("version", s)).transpose()?;
            releases.push(Release { suffix, num: num.unwrap_or_default() });
        }

        Ok(Version {
            base_len: self.end_base - self.start,
            full: input[self.start..self.end].to_string(),
            components,
            letter: self.letter,
            releases,
            revision: Revision::new(self.revision)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    base_len: usize,
    full: String,
    components: Vec<Component>,
    letter: Option<char>,
    releases: Vec<Release>,
    revision: Revision,
}

impl Version {
    /// Create a new Version from a given string.
    pub fn new(s: &str) -> crate::Result<Self> {
        parse::version(s)
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Return a version's base, all components except the revision.
    pub fn base(&self) -> &str {
        &self.full[..self.base_len]
    }

    /// Compare versions ignoring revisions.
    pub(crate) fn cmp_base(&self, other: &Self) -> Ordering {
        if self.base() == other.base() {
            return Ordering::Equal;
        }

        // the grammar guarantees at least one component
        cmp_not_equal!(&self.components[0].value, &other.components[0].value);
        for (c1, c2) in self.components[1..].iter().zip(&other.components[1..]) {
            cmp_not_equal!(c1.cmp_fractional(c2));
        }
        cmp_not_equal!(&self.components.len(), &other.components.len());
        cmp_not_equal!(&self.letter, &other.letter);

        for (r1, r2) in self.releases.iter().zip(&other.releases) {
            cmp_not_equal!(&r1.suffix, &r2.suffix);
            cmp_not_equal!(&r1.num, &r2.num);
        }

        // the first unmatched suffix decides, only _p sorts above the bare version
        let shared = self.releases.len().min(other.releases.len());
        match (self.releases.get(shared), other.releases.get(shared)) {
            (Some(r), None) if r.suffix == Suffix::P => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, Some(r)) if r.suffix == Suffix::P => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (i, c) in self.components.iter().enumerate() {
            match c.fractional() {
                Some(s) if i > 0 => s.hash(state),
                _ => c.value.hash(state),
            }
        }
        self.letter.hash(state);
        for r in &self.releases {
            r.suffix.hash(state);
            r.num.hash(state);
        }
        self.revision.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_not_equal!(self.cmp_base(other));
        self.revision.cmp(&other.revision)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse::version(s)
    }
}

/// Strip leading zeros from the first version component for literal prefix matching.
///
/// An empty or non-digit result gets a single zero prepended, mirroring how
/// `=cat/pkg-0*` style globs are compared.
pub(crate) fn glob_normalize(ver: &str) -> String {
    let stripped = ver.trim_start_matches('0');
    match stripped.chars().next() {
        Some(c) if c.is_ascii_digit() => stripped.to_string(),
        _ => format!("0{stripped}"),
    }
}
