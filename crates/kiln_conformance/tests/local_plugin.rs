//! Plugin lifecycle: instances survive unrelated rebuilds and are replaced,
//! together with their cache, when the plugin itself changes.

use kiln_conformance::{header, Sandbox};

fn config(prefix: &str, sources: &[&str]) -> String {
    let sources = sources
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{header}
[[plugins]]
package = "local-plugin"
version = "0.0.1"
family = "printme"
kind = "copy"
extensions = ["printme"]
source = "packages/local-plugin/plugin.txt"
options = {{ prefix = "{prefix}" }}

[[packages]]
name = "app"
sources = [{sources}]
"#,
        header = header(&["os"]),
    )
}

fn printme_app() -> Sandbox {
    let s = Sandbox::new(&config("PMC: ", &["bar.printme", "foo.printme"]));
    s.write("packages/local-plugin/plugin.txt", "PrintmeCompiler v1\n");
    s.write("bar.printme", "Print out bar");
    s.write("foo.printme", "Print out foo");
    s
}

#[test]
fn instance_is_reused_across_cycles() {
    let mut s = printme_app();
    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#1) on: ["/bar.printme","/foo.printme"] ["os"]"#]
    );
    assert_eq!(outcome.code("os", "/foo.printme").as_deref(), Some("PMC: Print out foo\n"));

    s.write("quux.printme", "And print out quux");
    s.write(
        "kiln.toml",
        &config("PMC: ", &["bar.printme", "foo.printme", "quux.printme"]),
    );
    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#2) on: ["/quux.printme"] ["os"]"#]
    );
    assert_eq!(
        outcome.code("os", "/quux.printme").as_deref(),
        Some("PMC: And print out quux\n")
    );
    assert_eq!(outcome.code("os", "/bar.printme").as_deref(), Some("PMC: Print out bar\n"));
}

#[test]
fn restart_uses_the_disk_cache() {
    let mut s = printme_app();
    s.cycle();

    s.restart();
    let outcome = s.cycle();
    let mut loaded = outcome.loaded_lines();
    loaded.sort_unstable();
    assert_eq!(
        loaded,
        vec![
            "CACHE(printme): Loaded /bar.printme",
            "CACHE(printme): Loaded /foo.printme",
        ]
    );
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#1) on: [] ["os"]"#]
    );
    assert_eq!(outcome.code("os", "/bar.printme").as_deref(), Some("PMC: Print out bar\n"));
}

#[test]
fn editing_the_plugin_source_starts_over() {
    let mut s = printme_app();
    s.cycle();
    s.cycle();
    assert_eq!(s.engine().plugins().store().stats().live_scopes, 1);

    s.write("packages/local-plugin/plugin.txt", "PrintmeCompiler v2\n");
    let outcome = s.cycle();
    assert!(outcome.loaded_lines().is_empty());
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#1) on: ["/bar.printme","/foo.printme"] ["os"]"#]
    );

    // The previous instance's scope is gone from disk as well.
    let stats = s.engine().plugins().store().stats();
    assert_eq!(stats.live_scopes, 1);
    assert_eq!(stats.orphaned_scopes, 0);
    assert_eq!(stats.entries, 2);
}

#[test]
fn changing_plugin_options_changes_output() {
    let mut s = printme_app();
    s.cycle();

    s.write("kiln.toml", &config("pmc: ", &["bar.printme", "foo.printme"]));
    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#1) on: ["/bar.printme","/foo.printme"] ["os"]"#]
    );
    assert_eq!(outcome.code("os", "/foo.printme").as_deref(), Some("pmc: Print out foo\n"));
    assert_eq!(outcome.code("os", "/bar.printme").as_deref(), Some("pmc: Print out bar\n"));
}

#[test]
fn unrelated_config_edits_keep_the_instance() {
    let mut s = printme_app();
    s.cycle();
    s.append("kiln.toml", "\n# touched\n");
    let outcome = s.cycle();
    assert_eq!(
        outcome.ran_lines(),
        vec![r#"CACHE(printme): Ran (#2) on: [] ["os"]"#]
    );
}
