use criterion::Criterion;

use pkgdep::atom::{Atom, Version};
use pkgdep::eapi::EAPI_LATEST;
use pkgdep::pkg::Package;

pub fn bench_atoms(c: &mut Criterion) {
    c.bench_function("atom-unversioned", |b| b.iter(|| Atom::new("cat/pkg", *EAPI_LATEST)));

    c.bench_function("atom-slotdep", |b| b.iter(|| Atom::new("cat/pkg:0", *EAPI_LATEST)));

    c.bench_function("atom-versioned-slotdep", |b| {
        b.iter(|| Atom::new(">=cat/pkg-4-r1:0=", *EAPI_LATEST))
    });

    c.bench_function("atom-usedeps", |b| {
        b.iter(|| Atom::new(">=cat/pkg-4-r1:0=[a,b=,!c=,d?,!e?,-f]", *EAPI_LATEST))
    });

    c.bench_function("atom-long-usedeps", |b| {
        let flags: Vec<String> = (0..100).map(|s| format!("u{s}")).collect();
        let s = format!("cat/pkg[{}]", flags.join(","));
        b.iter(|| Atom::new(&s, *EAPI_LATEST));
    });

    c.bench_function("atom-sorting", |b| {
        let mut atoms: Vec<Atom> = (0..100)
            .map(|s| format!("=cat/pkg-{s}").parse().unwrap())
            .collect();
        b.iter(|| atoms.sort());
    });

    c.bench_function("atom-match", |b| {
        let atom: Atom = ">=cat/pkg-1:0[ssl]".parse().unwrap();
        let pkgs: Vec<Package> = (0..100)
            .map(|s| {
                Package::new(&format!("cat/pkg-{s}"))
                    .unwrap()
                    .with_iuse(["ssl"])
                    .with_use(["ssl"])
            })
            .collect();
        b.iter(|| pkgs.iter().filter(|p| atom.matches(*p)).count());
    });
}

pub fn bench_versions(c: &mut Criterion) {
    c.bench_function("version-parse", |b| b.iter(|| Version::new("1.2.3_alpha4_p5-r6")));

    c.bench_function("version-cmp", |b| {
        let v1 = Version::new("1.2.3_alpha4_p5-r6").unwrap();
        let v2 = Version::new("1.2.3_alpha4_p5-r7").unwrap();
        b.iter(|| v1 < v2);
    });
}
