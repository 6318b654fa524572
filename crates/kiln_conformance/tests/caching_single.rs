//! Single-file caching: content-keyed reuse across targets, cycles and
//! restarts.

use kiln_conformance::{header, package, plugin, Outcome, Sandbox};

const ARCHS: &[&str] = &["web.browser", "web.browser.legacy", "os"];

fn coffee_app() -> Sandbox {
    let mut config = header(ARCHS);
    config.push_str(&plugin("coffeescript", "coffeescript", "copy", &["coffee"]));
    config.push_str("options = { prefix = \"// \" }\n\n");
    config.push_str(&package("app", ".", &["f1.coffee", "f2.coffee", "f3.coffee"]));
    config.push_str(&package("local-pack", "packages/local-pack", &["p.coffee"]));

    let s = Sandbox::new(&config);
    s.write("f1.coffee", "share.X = 'X is 2'\n");
    s.write("f2.coffee", "share.Y = 'Y is 1'\n");
    s.write("f3.coffee", "console.log share.X, share.Y, FromPackage\n");
    s.write("packages/local-pack/p.coffee", "FromPackage = 'FromPackage is 4'");
    s
}

fn ran(n: u64, files: &str, arch: &str) -> String {
    format!("CACHE(coffeescript): Ran (#{n}) on: {files} [\"{arch}\"]")
}

fn assert_ran(outcome: &Outcome, first: u64, files: &str) {
    assert!(outcome.is_success(), "{:?}", outcome.errors());
    assert_eq!(
        outcome.ran_lines(),
        vec![
            ran(first, files, "web.browser"),
            ran(first + 1, "[]", "web.browser.legacy"),
            ran(first + 2, "[]", "os"),
        ]
    );
}

#[test]
fn first_target_compiles_everything_and_others_reuse_it() {
    let mut s = coffee_app();
    let outcome = s.cycle();
    assert_ran(
        &outcome,
        1,
        r#"["/f1.coffee","/f2.coffee","/f3.coffee","/packages/local-pack/p.coffee"]"#,
    );
    for arch in ARCHS {
        assert_eq!(
            outcome.code(arch, "/f2.coffee").as_deref(),
            Some("// share.Y = 'Y is 1'\n")
        );
    }
    assert!(outcome.loaded_lines().is_empty());
}

#[test]
fn edits_recompile_only_the_changed_file() {
    let mut s = coffee_app();
    s.cycle();

    s.write("f2.coffee", "share.Y = 'Y is 3'\n");
    let outcome = s.cycle();
    assert_ran(&outcome, 4, r#"["/f2.coffee"]"#);
    assert_eq!(
        outcome.code("os", "/f2.coffee").as_deref(),
        Some("// share.Y = 'Y is 3'\n")
    );

    // A rebuild with no content change compiles nothing.
    s.append("packages/local-pack/package.txt", "\n// foo\n");
    assert_ran(&s.cycle(), 7, "[]");

    s.write("packages/local-pack/p.coffee", "FromPackage = 'FromPackage is 5'");
    let outcome = s.cycle();
    assert_ran(&outcome, 10, r#"["/packages/local-pack/p.coffee"]"#);
    assert!(outcome.loaded_lines().is_empty());
}

#[test]
fn restart_loads_unchanged_files_from_disk() {
    let mut s = coffee_app();
    s.cycle();
    s.write("f2.coffee", "share.Y = 'Y is 3'\n");
    s.cycle();

    s.restart();
    s.write("f2.coffee", "share.Y = 'Y is edited'\n");
    let outcome = s.cycle();

    let mut loaded = outcome.loaded_lines();
    loaded.sort_unstable();
    assert_eq!(
        loaded,
        vec![
            "CACHE(coffeescript): Loaded /f1.coffee",
            "CACHE(coffeescript): Loaded /f3.coffee",
            "CACHE(coffeescript): Loaded /packages/local-pack/p.coffee",
        ]
    );
    assert_ran(&outcome, 1, r#"["/f2.coffee"]"#);
    assert_eq!(
        outcome.code("web.browser", "/f2.coffee").as_deref(),
        Some("// share.Y = 'Y is edited'\n")
    );
}

#[test]
fn reverting_a_file_reuses_the_earlier_result() {
    let mut s = coffee_app();
    s.cycle();
    s.write("f2.coffee", "share.Y = 'Y is 3'\n");
    s.cycle();

    s.write("f2.coffee", "share.Y = 'Y is 1'\n");
    assert_ran(&s.cycle(), 7, "[]");
}

#[test]
fn architecture_dependent_plugin_compiles_per_target() {
    let mut config = header(&["web.browser", "os"]);
    config.push_str(&plugin("printer", "printer", "copy", &["printme"]));
    config.push_str("architecture_independent = false\n\n");
    config.push_str(&package("app", ".", &["a.printme"]));
    let mut s = Sandbox::new(&config);
    s.write("a.printme", "hello");

    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![
            r#"CACHE(printer): Ran (#1) on: ["/a.printme"] ["web.browser"]"#,
            r#"CACHE(printer): Ran (#2) on: ["/a.printme"] ["os"]"#,
        ]
    );
    assert_eq!(
        s.cycle().ran_lines(),
        vec![
            r#"CACHE(printer): Ran (#3) on: [] ["web.browser"]"#,
            r#"CACHE(printer): Ran (#4) on: [] ["os"]"#,
        ]
    );
}

#[test]
fn disabled_cache_never_loads() {
    let mut config = header(&["os"]);
    config.push_str("[cache]\nenabled = false\n\n");
    config.push_str(&plugin("printer", "printer", "copy", &["printme"]));
    config.push_str(&package("app", ".", &["a.printme"]));
    let mut s = Sandbox::new(&config);
    s.write("a.printme", "hello");
    s.cycle();

    s.restart();
    let outcome = s.cycle();
    assert!(outcome.loaded_lines().is_empty());
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printer): Ran (#1) on: ["/a.printme"] ["os"]"#]
    );
    assert!(!s.root().join(".kiln/cache").exists());
}
