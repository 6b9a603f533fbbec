use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use indexmap::IndexSet;
use itertools::Itertools;

/// Set of USE flag names with a canonical order.
///
/// Flags are kept sorted so equal sets hash and compare identically regardless of the
/// order they were supplied in, allowing them to be used in cache keys.
#[derive(Debug, Default, Clone)]
pub struct FlagSet(IndexSet<String>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag, returning true if it wasn't already present.
    pub fn insert<S: Into<String>>(&mut self, flag: S) -> bool {
        let flag = flag.into();
        let pos = match self.search(&flag) {
            Ok(_) => return false,
            Err(pos) => pos,
        };
        // appended flags are shifted back into their sorted slot
        let (mut idx, _) = self.0.insert_full(flag);
        while idx > pos {
            self.0.swap_indices(idx - 1, idx);
            idx -= 1;
        }
        true
    }

    /// Binary search for a flag, returning its index or the index it would be inserted at.
    fn search(&self, flag: &str) -> Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.0.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.0.get_index(mid).map(|f| f.as_str().cmp(flag)) {
                Some(Ordering::Less) => lo = mid + 1,
                Some(Ordering::Greater) => hi = mid,
                _ => return Ok(mid),
            }
        }
        Err(lo)
    }
}

impl Hash for FlagSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for e in &self.0 {
            e.hash(state);
        }
    }
}

impl Ord for FlagSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().cmp(other.0.iter())
    }
}

impl PartialOrd for FlagSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FlagSet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FlagSet {}

impl<S: Into<String>> FromIterator<S> for FlagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iterable: I) -> Self {
        let mut set: IndexSet<String> = iterable.into_iter().map(Into::into).collect();
        set.sort();
        Self(set)
    }
}

impl<'a> IntoIterator for &'a FlagSet {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for FlagSet {
    type Item = String;
    type IntoIter = indexmap::set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Deref for FlagSet {
    type Target = IndexSet<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_canonical_order() {
        let s1: FlagSet = ["b", "a", "c"].into_iter().collect();
        let s2: FlagSet = ["c", "b", "a"].into_iter().collect();
        assert_eq!(s1, s2);
        assert_eq!(s1.to_string(), "a b c");

        let set = HashSet::from([s1, s2]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_insert() {
        let mut flags = FlagSet::new();
        assert!(flags.insert("b"));
        assert!(flags.insert("a"));
        assert!(!flags.insert("a"));
        assert_eq!(flags.iter().collect::<Vec<_>>(), ["a", "b"]);

        // front, middle and back insertions keep the canonical order
        for flag in ["d", "0", "c", "aa", "e"] {
            assert!(flags.insert(flag));
        }
        assert!(!flags.insert("c"));
        assert_eq!(flags.to_string(), "0 a aa b c d e");
        let collected: FlagSet = ["e", "d", "c", "b", "aa", "a", "0"].into_iter().collect();
        assert_eq!(flags, collected);
        assert!(flags.contains("aa"));
    }
}
