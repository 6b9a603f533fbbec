use std::fmt;

use crate::pkg::{Candidate, Cpv, Package};

/// Matching hook implemented by objects that can filter packages.
pub trait Restriction<T>: fmt::Debug {
    fn matches(&self, object: T) -> bool;

    /// Return the objects from an iterable that match, preserving order.
    fn filter<I>(&self, objects: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        T: Copy,
    {
        objects.into_iter().filter(|x| self.matches(*x)).collect()
    }
}

impl<'a, R> Restriction<&'a Package> for R
where
    R: for<'b> Restriction<Candidate<'b>>,
{
    fn matches(&self, pkg: &'a Package) -> bool {
        Restriction::<Candidate>::matches(self, Candidate::Pkg(pkg))
    }
}

impl<'a, R> Restriction<&'a Cpv> for R
where
    R: for<'b> Restriction<Candidate<'b>>,
{
    fn matches(&self, cpv: &'a Cpv) -> bool {
        Restriction::<Candidate>::matches(self, Candidate::Cpv(cpv))
    }
}
