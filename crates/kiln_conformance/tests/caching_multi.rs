//! Multi-file caching: roots are reused until they or anything they
//! imported changes.

use kiln_conformance::{header, package, plugin, Sandbox};
use kiln_plugin::PluginKey;

const ARCHS: &[&str] = &["web.browser", "web.browser.legacy", "os"];

fn config(app_sources: &[&str]) -> String {
    let mut config = header(ARCHS);
    config.push_str(&plugin("less", "less", "include", &["less"]));
    config.push_str("arch_matching = \"web\"\n\n");
    config.push_str(&package("app", ".", app_sources));
    config.push_str(&package("local-pack", "packages/local-pack", &["_p.less"]));
    config
}

const SOURCES: &[&str] = &[
    "top.less",
    "subdir/nested-root.less",
    "subdir/_dotted.less",
    "imports/dotdot.less",
];

fn sources_with(extra: &str) -> Vec<&str> {
    let mut sources = SOURCES.to_vec();
    sources.push(extra);
    sources
}

fn less_app() -> Sandbox {
    let s = Sandbox::new(&config(SOURCES));
    s.write(
        "top.less",
        "@import \"/packages/local-pack/_p.less\";\n.el4 { border-style: @el4-style; }\n",
    );
    s.write("subdir/nested-root.less", ".el0 { border-style: dashed; }\n");
    s.write(
        "imports/dotdot.less",
        "@import \"../subdir/_dotted.less\";\n.el2 { border-style: solid; }\n",
    );
    s.write("subdir/_dotted.less", ".el1 { border-style: dotted; }\n");
    s.write("packages/local-pack/_p.less", "@el4-style: ridge;\n");
    s
}

fn ran(n: u64, files: &str, arch: &str) -> String {
    format!("CACHE(less): Ran (#{n}) on: {files} [\"{arch}\"]")
}

fn less_key() -> PluginKey {
    PluginKey {
        package: "less".into(),
        family: "less".to_string(),
    }
}

#[test]
fn web_targets_only_and_roots_compiled_once() {
    let mut s = less_app();
    let outcome = s.cycle();
    assert!(outcome.is_success(), "{:?}", outcome.errors());
    assert_eq!(
        outcome.ran_lines(),
        vec![
            ran(
                1,
                r#"["/imports/dotdot.less","/subdir/nested-root.less","/top.less"]"#,
                "web.browser"
            ),
            ran(2, "[]", "web.browser.legacy"),
        ]
    );
    assert_eq!(
        outcome.code("web.browser", "/top.less").as_deref(),
        Some("@el4-style: ridge;\n.el4 { border-style: @el4-style; }\n")
    );
    assert_eq!(
        outcome.code("web.browser", "/imports/dotdot.less").as_deref(),
        Some(".el1 { border-style: dotted; }\n.el2 { border-style: solid; }\n")
    );
    assert!(outcome.result.target("os").unwrap().compiled.is_empty());

    let instance = s.engine().plugins().instance(&less_key()).unwrap();
    assert_eq!(
        instance.imports_of("/top.less"),
        Some(vec!["/packages/local-pack/_p.less".to_string()])
    );
}

#[test]
fn import_changes_recompile_only_dependent_roots() {
    let mut s = less_app();
    s.cycle();
    assert_eq!(
        s.cycle().ran_lines(),
        vec![ran(3, "[]", "web.browser"), ran(4, "[]", "web.browser.legacy")]
    );

    s.write("packages/local-pack/_p.less", "@el4-style: inset;\n");
    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![
            ran(5, r#"["/top.less"]"#, "web.browser"),
            ran(6, "[]", "web.browser.legacy"),
        ]
    );
    assert!(outcome
        .code("web.browser.legacy", "/top.less")
        .unwrap()
        .starts_with("@el4-style: inset;"));

    s.write("subdir/nested-root.less", ".el0 { border-style: double; }\n");
    assert_eq!(
        s.cycle().ran_lines(),
        vec![
            ran(7, r#"["/subdir/nested-root.less"]"#, "web.browser"),
            ran(8, "[]", "web.browser.legacy"),
        ]
    );

    s.write("yet-another-root.less", ".el6 { border-style: solid; }\n");
    s.write("kiln.toml", &config(&sources_with("yet-another-root.less")));
    assert_eq!(
        s.cycle().ran_lines(),
        vec![
            ran(9, r#"["/yet-another-root.less"]"#, "web.browser"),
            ran(10, "[]", "web.browser.legacy"),
        ]
    );
}

#[test]
fn restart_loads_every_root_then_recompiles_stale_ones() {
    let mut s = less_app();
    let first = s.cycle();
    assert!(first.loaded_lines().is_empty());

    s.restart();
    s.write("packages/local-pack/_p.less", "@el4-style: double;\n");
    let outcome = s.cycle();
    assert_eq!(
        outcome.loaded_lines(),
        vec![
            "CACHE(less): Loaded /imports/dotdot.less",
            "CACHE(less): Loaded /subdir/nested-root.less",
            "CACHE(less): Loaded /top.less",
        ]
    );
    assert_eq!(
        outcome.ran_lines(),
        vec![
            ran(1, r#"["/top.less"]"#, "web.browser"),
            ran(2, "[]", "web.browser.legacy"),
        ]
    );
    assert!(outcome
        .code("web.browser", "/top.less")
        .unwrap()
        .starts_with("@el4-style: double;"));
}

#[test]
fn unknown_import_blocks_with_location() {
    let mut s = less_app();
    s.write("kiln.toml", &config(&sources_with("bad-import.less")));
    s.write("bad-import.less", "@import \"/foo/bad.less\";\n");

    let outcome = s.cycle();
    assert!(outcome.is_blocked());
    assert!(outcome.has_error("/bad-import.less:1: Unknown import: /foo/bad.less"));
    assert_eq!(outcome.errors().len(), 1);

    // The other roots were still committed.
    s.remove("bad-import.less");
    s.write("kiln.toml", &config(SOURCES));
    let outcome = s.cycle();
    assert!(outcome.is_success());
    assert_eq!(
        outcome.ran_lines(),
        vec![ran(3, "[]", "web.browser"), ran(4, "[]", "web.browser.legacy")]
    );
}

#[test]
fn import_cycle_is_reported() {
    let mut s = less_app();
    s.write("kiln.toml", &config(&["a.less", "b.less"]));
    s.write("a.less", "@import \"b.less\";\n");
    s.write("b.less", "\n@import \"a.less\";\n");

    let outcome = s.cycle();
    assert!(outcome.is_blocked());
    assert!(outcome.has_error("import cycle"));
}
