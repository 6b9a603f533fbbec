use cached::{proc_macro::cached, SizedCache};

use super::version::{ParsedVersion, Version};
use super::{Atom, Blocker, Operator, ParseOptions, SlotOperator, UseDeps};
use crate::config::Config;
use crate::eapi::{Attrs, Eapi, Feature};
use crate::peg::peg_error;
use crate::pkg::Cpv;
use crate::Error;

#[derive(Debug)]
pub(super) struct ParsedAtom<'a> {
    blocker: Option<Blocker>,
    op: Option<Operator>,
    category: &'a str,
    package: &'a str,
    version: Option<ParsedVersion<'a>>,
    wildcard_version: Option<&'a str>,
    build_id: Option<&'a str>,
    slot: Option<&'a str>,
    subslot: Option<&'a str>,
    slot_op: Option<SlotOperator>,
    repo: Option<&'a str>,
    use_deps: Option<Vec<&'a str>>,
    extended: bool,
}

type SlotParts<'a> = (Option<&'a str>, Option<&'a str>, Option<SlotOperator>);

peg::parser!(grammar depspec() for str {
    rule word_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

    rule pkg_char() = word_char() / "+"

    // Categories must not begin with a hyphen or dot.
    pub(super) rule category() -> &'input str
        = s:$(quiet!{
            pkg_char() (pkg_char() / ['.' | '-'])*
        } / expected!("category name"))
        { s }

    // Trailing text that would make a preceding hyphen start a version.
    rule version_tail() = version() ("-" version())? !(pkg_char() / "-")

    // Packages must not begin with a hyphen and must not end in a hyphen followed by
    // anything matching a version.
    pub(super) rule package() -> &'input str
        = s:$(quiet!{
            pkg_char() (pkg_char() / ("-" !version_tail()))*
        } / expected!("package name"))
        { s }

    rule version_suffix() -> (&'input str, Option<&'input str>)
        = "_" suffix:$("alpha" / "beta" / "pre" / "rc" / "p") ver:$(['0'..='9']+)?
        { (suffix, ver) }

    rule revision() -> &'input str
        = "-r" s:$(quiet!{['0'..='9']+} / expected!("revision"))
        { s }

    pub(super) rule version() -> ParsedVersion<'input>
        = start:position!() numbers:$(['0'..='9']+) ++ "." letter:['a'..='z']?
                suffixes:version_suffix()* end_base:position!()
                revision:revision()? end:position!() {
            ParsedVersion { start, end_base, end, numbers, letter, suffixes, revision }
        }

    rule build_id(allowed: bool) -> &'input str
        = "-" s:$(['0'..='9']+) {?
            if !allowed {
                Err("build ids aren't allowed")
            } else if s.len() > 1 && s.starts_with('0') {
                Err("build ids can't have leading zeros")
            } else {
                Ok(s)
            }
        }

    rule blocker() -> Blocker
        = "!!" { Blocker::Strong }
        / "!" { Blocker::Weak }

    rule operator() -> &'input str
        = $(("<" "="?) / "=" / "~" / (">" "="?))

    rule cpv_dep(allow_build_id: bool) -> ParsedAtom<'input>
        = op:operator() category:category() "/" package:package() "-" ver:version()
                build_id:build_id(allow_build_id)? glob:"*"? {?
            use Operator::*;
            let op = match (op, glob, build_id) {
                ("<", None, _) => Less,
                ("<=", None, _) => LessOrEqual,
                ("=", None, _) => Equal,
                ("=", Some(_), None) => EqualGlob,
                ("~", None, _) => match ver.revision {
                    None => Approximate,
                    Some(_) => return Err("~ version operator can't be used with a revision"),
                },
                (">=", None, _) => GreaterOrEqual,
                (">", None, _) => Greater,
                _ => return Err("invalid version operator"),
            };
            let mut atom = ParsedAtom::new(category, package);
            atom.op = Some(op);
            atom.version = Some(ver);
            atom.build_id = build_id;
            Ok(atom)
        }

    rule cp_dep() -> ParsedAtom<'input>
        = category:category() "/" package:package()
        { ParsedAtom::new(category, package) }

    // Slot names must not begin with a hyphen or dot.
    rule slot_name() -> &'input str
        = s:$(quiet!{
            pkg_char() (pkg_char() / ['.' | '-'])*
        } / expected!("slot name"))
        { s }

    rule slot_op() -> SlotOperator
        = "=" { SlotOperator::Equal }
        / "*" { SlotOperator::Star }

    pub(super) rule slot_dep() -> SlotParts<'input>
        = slot:slot_name() "/" subslot:slot_name() op:"="? {
            (Some(slot), Some(subslot), op.map(|_| SlotOperator::Equal))
        } / slot:slot_name()? op:slot_op() {?
            if slot.is_some() && op == SlotOperator::Star {
                return Err("slot operator '*' can't be used with a slot");
            }
            Ok((slot, None, Some(op)))
        } / slot:slot_name() {
            (Some(slot), None, None)
        }

    pub(super) rule repo() -> &'input str
        = s:$(quiet!{
            word_char() (word_char() / "-")*
        } / expected!("repo name"))
        { s }

    rule repo_dep(allowed: bool) -> &'input str
        = "::" repo:repo() {?
            if !allowed {
                return Err("repo deps aren't allowed");
            }
            Ok(repo)
        }

    rule use_dep() -> &'input str
        = $((!['[' | ']' | ','] [_])*)

    rule use_deps() -> Vec<&'input str>
        = "[" use_deps:use_dep() ++ "," "]"
        { use_deps }

    pub(super) rule cpv() -> (&'input str, &'input str, ParsedVersion<'input>)
        = category:category() "/" package:package() "-" ver:version()
        { (category, package, ver) }

    pub(super) rule dep(allow_repo: bool, allow_build_id: bool) -> ParsedAtom<'input>
        = blocker:blocker()? atom:(cpv_dep(allow_build_id) / cp_dep())
                slot:(":" s:slot_dep() { s })? repo:repo_dep(allow_repo)?
                use_deps:use_deps()? {
            let mut atom = atom;
            atom.blocker = blocker;
            (atom.slot, atom.subslot, atom.slot_op) = slot.unwrap_or_default();
            atom.repo = repo;
            atom.use_deps = use_deps;
            atom
        }
});

peg::parser!(grammar wildcard() for str {
    rule word_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

    rule pkg_char() = word_char() / ['+' | '*']

    rule category() -> &'input str
        = s:$(quiet!{
            pkg_char() (pkg_char() / ['.' | '-'])*
        } / expected!("extended category name"))
        { s }

    rule version() = ['0'..='9']+ ("." ['0'..='9']+)* ['a'..='z']?
        ("_" ("alpha" / "beta" / "pre" / "rc" / "p") ['0'..='9']*)*
        ("-r" ['0'..='9']+)?

    rule wildcard_version() -> &'input str
        = $("*" word_char()+ "*")

    rule end() = !(pkg_char() / "-")

    // Hyphens are allowed unless they start a trailing version or wildcard version.
    rule package() -> &'input str
        = s:$(quiet!{
            pkg_char() (pkg_char() / ("-" !(wildcard_version() end()) !(version() end())))*
        } / expected!("extended package name"))
        { s }

    rule blocker() -> Blocker
        = "!!" { Blocker::Strong }
        / "!" { Blocker::Weak }

    rule star_dep() -> ParsedAtom<'input>
        = "=" category:category() "/" package:package() "-" ver:wildcard_version() {
            let mut atom = ParsedAtom::new(category, package);
            atom.op = Some(Operator::EqualGlob);
            atom.wildcard_version = Some(ver);
            atom
        }

    rule cp_dep() -> ParsedAtom<'input>
        = category:category() "/" package:package()
        { ParsedAtom::new(category, package) }

    rule slot() -> SlotParts<'input>
        = ":" s:$((!"::" [_])+) {? depspec::slot_dep(s).map_err(|_| "invalid slot") }

    rule repo(allowed: bool) -> &'input str
        = "::" s:$([_]+) {?
            if !allowed {
                return Err("repo deps aren't allowed");
            }
            depspec::repo(s).map_err(|_| "invalid repo")
        }

    pub(super) rule dep(allow_repo: bool) -> ParsedAtom<'input>
        = blocker:blocker()? atom:(star_dep() / cp_dep()) slot:slot()? repo:repo(allow_repo)? {?
            let mut atom = atom;
            if atom.category.contains("**") || atom.package.contains("**") {
                return Err("consecutive wildcards aren't allowed");
            }
            atom.blocker = blocker;
            (atom.slot, atom.subslot, atom.slot_op) = slot.unwrap_or_default();
            atom.repo = repo;
            atom.extended = true;
            Ok(atom)
        }
});

impl<'a> ParsedAtom<'a> {
    fn new(category: &'a str, package: &'a str) -> Self {
        ParsedAtom {
            blocker: None,
            op: None,
            category,
            package,
            version: None,
            wildcard_version: None,
            build_id: None,
            slot: None,
            subslot: None,
            slot_op: None,
            repo: None,
            use_deps: None,
            extended: false,
        }
    }

    fn into_owned(self, input: &str, eapi: &Eapi) -> crate::Result<Atom> {
        let invalid = |err: String| Error::InvalidAtom {
            atom: input.to_string(),
            err,
        };
        let policy = |msg: &str| Error::Eapi(format!("invalid atom: {input:?}: {msg}"));

        let version = self.version.map(|v| v.into_owned(input)).transpose()?;
        let build_id = self
            .build_id
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| Error::Overflow(format!("invalid build id: {e}: {input}")))?;
        let use_deps = self
            .use_deps
            .map(UseDeps::new)
            .transpose()
            .map_err(|e| invalid(e.to_string()))?;

        if self.slot.is_some() && !eapi.has(Feature::SlotDeps) {
            return Err(policy("slot deps are supported in >= EAPI 1"));
        }
        if (self.subslot.is_some() || self.slot_op.is_some()) && !eapi.has(Feature::SlotOps) {
            return Err(policy("slot operators and subslots are supported in >= EAPI 5"));
        }
        if self.blocker == Some(Blocker::Strong) && !eapi.has(Feature::StrongBlocks) {
            return Err(policy("strong blockers are supported in >= EAPI 2"));
        }
        if let Some(deps) = &use_deps {
            if !eapi.has(Feature::UseDeps) {
                return Err(policy("use deps are supported in >= EAPI 2"));
            }
            let defaults = !deps.missing_enabled().is_empty() || !deps.missing_disabled().is_empty();
            if defaults && !eapi.has(Feature::UseDepDefaults) {
                return Err(policy("use dep defaults are supported in >= EAPI 4"));
            }
        }

        Ok(Atom {
            full: input.to_string(),
            blocker: self.blocker,
            op: self.op,
            category: self.category.to_string(),
            package: self.package.to_string(),
            version,
            wildcard_version: self.wildcard_version.map(|s| s.to_string()),
            build_id,
            slot: self.slot.map(|s| s.to_string()),
            subslot: self.subslot.map(|s| s.to_string()),
            slot_op: self.slot_op,
            repo: self.repo.map(|s| s.to_string()),
            use_deps,
            extended: self.extended,
            unevaluated: None,
        })
    }
}

#[cached(
    type = "SizedCache<String, crate::Result<Version>>",
    create = "{ SizedCache::with_size(1000) }",
    convert = r#"{ s.to_string() }"#
)]
pub(super) fn version(s: &str) -> crate::Result<Version> {
    let parsed = depspec::version(s).map_err(|e| peg_error(format!("invalid version: {s:?}"), s, e))?;
    parsed.into_owned(s)
}

pub(crate) fn cpv(s: &str) -> crate::Result<Cpv> {
    let (category, package, ver) =
        depspec::cpv(s).map_err(|e| peg_error(format!("invalid cpv: {s:?}"), s, e))?;
    Ok(Cpv::from_parts(category, package, ver.into_owned(s)?))
}

/// Verify a string represents a valid repo name.
pub(crate) fn repo(s: &str) -> crate::Result<&str> {
    depspec::repo(s).map_err(|e| peg_error(format!("invalid repo name: {s:?}"), s, e))
}

/// Parse an atom, memoized per EAPI feature set and parsing options.
///
/// Strict parsing is attempted first with the wildcard grammar as an optional fallback.
#[cached(
    type = "SizedCache<(String, Attrs, ParseOptions), crate::Result<Atom>>",
    create = "{ SizedCache::with_size(Config::current().cache.atom_cache_size) }",
    convert = r#"{ (s.to_string(), eapi.attrs(), *opts) }"#
)]
pub(super) fn dep(s: &str, eapi: &'static Eapi, opts: &ParseOptions) -> crate::Result<Atom> {
    let allow_repo = opts.allow_repo.unwrap_or_else(|| eapi.has(Feature::RepoIds));
    let allow_build_id = opts
        .allow_build_id
        .unwrap_or_else(|| eapi.has(Feature::BuildIds));

    match depspec::dep(s, allow_repo, allow_build_id) {
        Ok(atom) => atom.into_owned(s, eapi),
        Err(e) if opts.allow_wildcard => match wildcard::dep(s, allow_repo) {
            Ok(atom) => atom.into_owned(s, eapi),
            Err(_) => Err(peg_error(format!("invalid atom: {s:?}"), s, e)),
        },
        Err(e) => Err(peg_error(format!("invalid atom: {s:?}"), s, e)),
    }
}

#[cfg(test)]
mod tests {
    use crate::eapi::{self, EAPIS, EAPI_PKGDEP};
    use crate::macros::assert_err_re;

    use super::*;

    fn parse(s: &str, opts: ParseOptions) -> crate::Result<Atom> {
        dep(s, &EAPI_PKGDEP, &opts)
    }

    #[test]
    fn test_invalid() {
        let opts = ParseOptions::default();
        for s in [
            // bad/missing category and/or package names
            "",
            "a",
            "portage",
            "=portage",
            "~portage-2.1",
            ".a/b",
            "-a/b",
            "a/-b",
            "###cat/foo-1.0",
            // package names can't end in a hyphen followed by anything matching a version
            "foo/bar-1",
            "foo/bar-123",
            "foo/bar-123-r1",
            "app-doc/php-docs-20071125-r2",
            "=foo/bar-baz-1--r1",
            "=foo/bar-1-r1-1-r1",
            // operators require a version and vice versa
            "~sys-apps/portage",
            ">=null/portage",
            "=null/portage*",
            "null/portage-2.1*",
            "sys-apps/portage-2.1:foo",
            // invalid operators
            ">~category/foo-1.0",
            "<~category/foo-1.0",
            // '~' can't be used with a revision
            "~a/b-1-r1",
            // '*' suffix can only be used with the '=' operator
            ">=a/b-0*",
            "~a/b-0*",
            // build ids can't be globbed or have leading zeros
            "=a/b-1-1*",
            "=a/b-1-01",
            // invalid slots
            "a/b:",
            "a/b:0/53*",
            "a/b:0*",
            "a/b:/0",
            "a/b:0//1",
            "a/b:.a",
            // invalid repos
            "a/b::",
            "a/b:::repo",
            "a/b::-repo",
            // invalid use deps
            "a/b[]",
            "a/b[!doc]",
            "a/b[-doc?]",
            "a/b[bar][doc,build]",
            "a/b[a(+),a(-)]",
            // use deps come last
            "a/b[a]:0",
            // invalid blockers
            "!!!a/b",
        ] {
            assert!(parse(s, opts).is_err(), "{s:?} didn't fail");
        }
    }

    #[test]
    fn test_valid() {
        let opts = ParseOptions::default();
        for (s, cp, op, ver) in [
            ("sys-apps/portage", "sys-apps/portage", None, None),
            ("=sys-apps/portage-2.1", "sys-apps/portage", Some(Operator::Equal), Some("2.1")),
            ("=sys-apps/portage-2.1*", "sys-apps/portage", Some(Operator::EqualGlob), Some("2.1")),
            ("~null/portage-2.1", "null/portage", Some(Operator::Approximate), Some("2.1")),
            ("<=a/b-1_p1-r2", "a/b", Some(Operator::LessOrEqual), Some("1_p1-r2")),
            ("=foo/bar--baz-1-r1", "foo/bar--baz", Some(Operator::Equal), Some("1-r1")),
            ("=foo/bar-baz---1", "foo/bar-baz--", Some(Operator::Equal), Some("1")),
            ("=dev-libs/poppler-qt3-0.11*", "dev-libs/poppler-qt3", Some(Operator::EqualGlob), Some("0.11")),
            ("=media-libs/x264-20060810", "media-libs/x264", Some(Operator::Equal), Some("20060810")),
            ("app-text/7plus", "app-text/7plus", None, None),
            ("foo/666", "foo/666", None, None),
            ("foo/bar-1a-b", "foo/bar-1a-b", None, None),
            ("+a/+b", "+a/+b", None, None),
        ] {
            let atom = parse(s, opts).unwrap();
            assert_eq!(atom.cp(), cp);
            assert_eq!(atom.op(), op);
            assert_eq!(atom.version().map(|v| v.as_str()), ver);
            assert_eq!(atom.to_string(), s);
        }
    }

    #[test]
    fn test_slots() {
        let opts = ParseOptions::default();
        for (s, slot, subslot, slot_op) in [
            ("a/b:0", Some("0"), None, None),
            ("a/b:a+b_c.d-e", Some("a+b_c.d-e"), None, None),
            ("a/b:0/53", Some("0"), Some("53"), None),
            ("a/b:0/53=", Some("0"), Some("53"), Some(SlotOperator::Equal)),
            ("a/b:=", None, None, Some(SlotOperator::Equal)),
            ("a/b:0=", Some("0"), None, Some(SlotOperator::Equal)),
            ("a/b:*", None, None, Some(SlotOperator::Star)),
        ] {
            let atom = parse(s, opts).unwrap();
            assert_eq!(atom.slot(), slot, "{s}");
            assert_eq!(atom.subslot(), subslot, "{s}");
            assert_eq!(atom.slot_op(), slot_op, "{s}");
            assert_eq!(atom.to_string(), s);
        }
    }

    #[test]
    fn test_eapi_policy() {
        for (s, feature) in [
            ("a/b:0", Feature::SlotDeps),
            ("a/b:0/1", Feature::SlotOps),
            ("a/b:=", Feature::SlotOps),
            ("!!a/b", Feature::StrongBlocks),
            ("a/b[c]", Feature::UseDeps),
            ("a/b[c(+)]", Feature::UseDepDefaults),
        ] {
            for eapi in EAPIS.values() {
                let result = dep(s, eapi, &ParseOptions::default());
                if eapi.has(feature) {
                    assert!(result.is_ok(), "{s:?} failed for EAPI {eapi}");
                } else {
                    let err = result.unwrap_err();
                    assert!(err.is_eapi(), "{s:?} not an EAPI error for EAPI {eapi}: {err}");
                }
            }
        }

        // weak blockers are allowed everywhere
        for eapi in EAPIS.values() {
            assert!(dep("!a/b", eapi, &ParseOptions::default()).is_ok());
        }
    }

    #[test]
    fn test_repos() {
        let allow = ParseOptions { allow_repo: Some(true), ..Default::default() };
        let deny = ParseOptions { allow_repo: Some(false), ..Default::default() };
        for s in ["=sys-apps/portage-2.1::repo", "sys-apps/portage:foo::repo", "a/b::repo[c]"] {
            let atom = parse(s, allow).unwrap();
            assert_eq!(atom.repo(), Some("repo"));
            assert_eq!(atom.to_string(), s);
            assert!(parse(s, deny).is_err(), "{s:?} didn't fail");
        }

        // repo deps default to being allowed only for the extended EAPI
        let opts = ParseOptions::default();
        assert!(dep("a/b::repo", &eapi::EAPI8, &opts).is_err());
        assert!(dep("a/b::repo", &EAPI_PKGDEP, &opts).is_ok());
    }

    #[test]
    fn test_build_ids() {
        let allow = ParseOptions { allow_build_id: Some(true), ..Default::default() };
        let deny = ParseOptions { allow_build_id: Some(false), ..Default::default() };
        for (s, cpv, build_id) in [
            ("=foo/bar-123-1", "foo/bar-123", 1),
            ("=foo/bar-1.2-r3-0", "foo/bar-1.2-r3", 0),
            ("<foo/bar-1-10", "foo/bar-1", 10),
        ] {
            let atom = parse(s, allow).unwrap();
            assert_eq!(atom.cpv(), cpv);
            assert_eq!(atom.build_id(), Some(build_id));
            assert_eq!(atom.to_string(), s);
            assert!(parse(s, deny).is_err(), "{s:?} didn't fail");
        }
        assert!(parse("=foo/bar-1-01", allow).is_err());
        assert!(dep("=foo/bar-1-1", &eapi::EAPI8, &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_wildcards() {
        let opts = ParseOptions { allow_wildcard: true, ..Default::default() };
        for (s, cp, wildcard_version) in [
            ("*/*", "*/*", None),
            ("sys-*/*", "sys-*/*", None),
            ("*/portage", "*/portage", None),
            ("*/portage:0", "*/portage", None),
            ("!*/portage::repo", "*/portage", None),
            ("=*/*-*9999*", "*/*", Some("*9999*")),
            ("=sys-apps/portage-*9999*", "sys-apps/portage", Some("*9999*")),
            ("*/foo-bar*", "*/foo-bar*", None),
        ] {
            let atom = parse(s, opts).unwrap();
            assert!(atom.extended_syntax(), "{s}");
            assert_eq!(atom.cp(), cp);
            assert_eq!(atom.wildcard_version(), wildcard_version);
            assert_eq!(atom.to_string(), s);
            // wildcards require explicit support
            assert!(parse(s, ParseOptions::default()).is_err(), "{s:?} didn't fail");
        }

        for s in ["*/portage-2.1", "**/portage", "*/**", "=*/*-*9999", "*/*[use]", "*/*:"] {
            assert!(parse(s, opts).is_err(), "{s:?} didn't fail");
        }

        // regular atoms never use the wildcard grammar
        let atom = parse("=a/b-1*", opts).unwrap();
        assert!(!atom.extended_syntax());
    }

    #[test]
    fn test_errors() {
        let opts = ParseOptions::default();
        assert_err_re!(parse("a/b[-doc?]", opts), r#"^invalid atom: "a/b\[-doc\?\]": invalid use dep: "-doc\?"$"#);
        assert_err_re!(parse("", opts), r#"^invalid atom: "": empty string$"#);
        assert_err_re!(parse("a/b-1", opts), "^parsing failure: invalid atom:");
        let err = parse("a/b-1", opts).unwrap_err();
        match err {
            Error::PegParse(e) => {
                assert_eq!(e.input(), "a/b-1");
                assert!(e.offset() <= e.input().len());
                assert!(!e.expected().is_empty());
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_cpv() {
        let cpv = cpv("cat/pkg-1.2-r3").unwrap();
        assert_eq!(cpv.cp(), "cat/pkg");
        assert_eq!(cpv.version().as_str(), "1.2-r3");
        for s in ["cat/pkg", "cat/pkg-1*", "=cat/pkg-1", "cat/pkg-1:0"] {
            assert!(super::cpv(s).is_err(), "{s:?} didn't fail");
        }
    }
}
