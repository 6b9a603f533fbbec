use criterion::Criterion;

use pkgdep::atom::Atom;
use pkgdep::config::ResolverConfig;
use pkgdep::depset::ReduceOptions;
use pkgdep::eapi::EAPI_LATEST;
use pkgdep::pkg::{Cpv, Package};
use pkgdep::resolver::{dep_check, InstalledDatabase, PackageDatabase, ResolverContext};

struct Repo(Vec<Package>);

impl PackageDatabase for Repo {
    fn match_pkgs(&self, atom: &Atom) -> Vec<Package> {
        self.0.iter().filter(|p| atom.matches(*p)).cloned().collect()
    }

    fn cp_list(&self, cp: &str) -> bool {
        self.0.iter().any(|p| p.cp() == cp)
    }
}

impl InstalledDatabase for Repo {
    fn match_installed(&self, atom: &Atom) -> Vec<Cpv> {
        self.0
            .iter()
            .filter(|p| atom.matches(*p))
            .map(|p| p.cpv().clone())
            .collect()
    }
}

pub fn bench_dep_check(c: &mut Criterion) {
    let pkgs = (0..20)
        .flat_map(|i| (1..4).map(move |v| Package::new(&format!("dev-libs/p{i}-{v}")).unwrap()))
        .collect();
    let repo = Repo(pkgs);
    let installed = Repo(vec![Package::new("dev-libs/p3-1").unwrap()]);
    let ctx = ResolverContext::new(&repo).installed(&installed);
    let opts = ReduceOptions::new(*EAPI_LATEST);
    let s = "|| ( dev-libs/p1 dev-libs/p2 dev-libs/p3 ) || ( dev-libs/p2 dev-libs/p4 ) \
        || ( ( dev-libs/p5 dev-libs/p6 ) dev-libs/p7 )";

    c.bench_function("dep-check", |b| {
        let config = ResolverConfig::default();
        b.iter(|| dep_check(s, &opts, &ctx, &config))
    });

    c.bench_function("dep-check-dnf", |b| {
        let config = ResolverConfig { overlap_dnf: true, ..Default::default() };
        b.iter(|| dep_check(s, &opts, &ctx, &config))
    });
}
