use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;

use crate::atom::Atom;

use super::DepExpr;

fn contains_disjunction<T>(expr: &DepExpr<T>) -> bool {
    match expr {
        DepExpr::Leaf(_) => false,
        DepExpr::AnyOf(_) => true,
        DepExpr::AllOf(vals) => vals.iter().any(contains_disjunction),
    }
}

/// Convert a normalized conjunction to disjunctive normal form.
///
/// The result is either the unchanged conjunction when it has no disjunctions or a single
/// disjunction of conjunctions.
pub fn dnf_convert<T: Clone>(conjunction: Vec<DepExpr<T>>) -> Vec<DepExpr<T>> {
    let mut disjunctions = vec![];
    let mut plain = vec![];

    for expr in conjunction {
        match expr {
            DepExpr::AnyOf(vals) => {
                let mut dnf = vec![];
                for val in vals {
                    match val {
                        DepExpr::AllOf(vals) => {
                            let converted = dnf_convert(vals);
                            if converted.iter().any(contains_disjunction) {
                                match <[_; 1]>::try_from(converted) {
                                    Ok([DepExpr::AnyOf(vals)]) => dnf.extend(vals),
                                    _ => panic!("invalid DNF conversion result"),
                                }
                            } else {
                                dnf.push(DepExpr::AllOf(converted));
                            }
                        }
                        val => dnf.push(val),
                    }
                }
                disjunctions.push(dnf);
            }
            expr => plain.push(expr),
        }
    }

    if disjunctions.is_empty() {
        return plain;
    }

    let products = disjunctions
        .into_iter()
        .map(|x| x.into_iter())
        .multi_cartesian_product()
        .map(|choices| {
            let mut conjunction = plain.clone();
            for choice in choices {
                match choice {
                    DepExpr::AllOf(vals) => conjunction.extend(vals),
                    val => conjunction.push(val),
                }
            }
            DepExpr::AllOf(conjunction)
        })
        .collect();

    vec![DepExpr::AnyOf(products)]
}

/// Combine any-of groups sharing packages into disjunctive normal form.
///
/// Only overlapping groups are converted to avoid exponential growth. Returns `None` when no
/// groups overlap.
pub fn overlap_dnf(conjunction: &[DepExpr<Atom>]) -> Option<Vec<DepExpr<Atom>>> {
    if !conjunction.iter().any(contains_disjunction) {
        return None;
    }

    // map package keys to the disjunctions containing them
    let mut cp_map: IndexMap<String, Vec<usize>> = IndexMap::new();
    // undirected graph linking keys found in the same disjunction
    let mut overlap: IndexMap<String, IndexSet<String>> = IndexMap::new();
    let mut result = vec![];

    for (i, expr) in conjunction.iter().enumerate() {
        if !expr.is_any_of() {
            result.push(expr.clone());
            continue;
        }

        let mut prev_cp: Option<String> = None;
        for atom in expr.leaves().into_iter().filter(|a| a.blocker().is_none()) {
            let cp = atom.cp();
            cp_map.entry(cp.clone()).or_default().push(i);
            overlap.entry(cp.clone()).or_default();
            if let Some(prev) = prev_cp {
                if let Some(edges) = overlap.get_mut(&prev) {
                    edges.insert(cp.clone());
                }
                if let Some(edges) = overlap.get_mut(&cp) {
                    edges.insert(prev);
                }
            }
            prev_cp = Some(cp);
        }

        // groups with only blockers pass through
        if prev_cp.is_none() {
            result.push(expr.clone());
        }
    }

    let mut traversed: IndexSet<&String> = IndexSet::new();
    let mut converted = false;
    for cp in overlap.keys() {
        if traversed.contains(&cp) {
            continue;
        }

        let mut disjunctions = BTreeSet::new();
        let mut stack = vec![cp];
        while let Some(cp) = stack.pop() {
            traversed.insert(cp);
            disjunctions.extend(cp_map.get(cp).into_iter().flatten().copied());
            for other in overlap.get(cp).into_iter().flatten() {
                if !traversed.contains(&other) {
                    stack.push(other);
                }
            }
        }

        let mut exprs: Vec<_> = disjunctions.into_iter().map(|i| conjunction[i].clone()).collect();
        if exprs.len() > 1 {
            converted = true;
            result.extend(dnf_convert(exprs));
        } else {
            result.append(&mut exprs);
        }
    }

    converted.then_some(result)
}

#[cfg(test)]
mod tests {
    use crate::depset::{use_reduce, ReduceOptions};
    use crate::eapi::EAPI_PKGDEP;

    use super::*;

    fn conjunction(s: &str) -> Vec<DepExpr<Atom>> {
        let opts = ReduceOptions::new(&EAPI_PKGDEP);
        match DepExpr::from_tree(&use_reduce(s, &opts).unwrap()) {
            DepExpr::AllOf(vals) => vals,
            expr => panic!("invalid expression: {expr}"),
        }
    }

    fn render(exprs: Vec<DepExpr<Atom>>) -> String {
        DepExpr::AllOf(exprs).to_string()
    }

    #[test]
    fn test_dnf_convert() {
        for (s, expected) in [
            ("a/b c/d", "( a/b c/d )"),
            ("|| ( a/b c/d ) e/f", "( || ( ( e/f a/b ) ( e/f c/d ) ) )"),
            (
                "|| ( a/b c/d ) || ( e/f g/h )",
                "( || ( ( a/b e/f ) ( a/b g/h ) ( c/d e/f ) ( c/d g/h ) ) )",
            ),
            (
                "|| ( a/b ( c/d || ( e/f g/h ) ) )",
                "( || ( ( a/b ) ( c/d e/f ) ( c/d g/h ) ) )",
            ),
        ] {
            assert_eq!(render(dnf_convert(conjunction(s))), expected, "{s:?}");
        }
    }

    #[test]
    fn test_overlap_dnf() {
        // no overlap
        assert!(overlap_dnf(&conjunction("a/a b/b")).is_none());
        assert!(overlap_dnf(&conjunction("|| ( a/a b/b ) c/c || ( d/d e/e )")).is_none());

        let dnf = overlap_dnf(&conjunction("|| ( a/a b/b ) || ( b/b c/c )")).unwrap();
        assert_eq!(
            render(dnf),
            "( || ( ( a/a b/b ) ( a/a c/c ) ( b/b b/b ) ( b/b c/c ) ) )"
        );

        // non-overlapping groups and plain atoms pass through
        let s = "x/x || ( a/a b/b ) || ( d/d e/e ) || ( b/b c/c ) || ( !f/f !g/g )";
        let dnf = overlap_dnf(&conjunction(s)).unwrap();
        assert_eq!(
            render(dnf),
            "( x/x || ( !f/f !g/g ) || ( ( a/a b/b ) ( a/a c/c ) ( b/b b/b ) ( b/b c/c ) ) || ( d/d e/e ) )"
        );
    }
}
