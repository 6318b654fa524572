//! `kiln build`: one build cycle over the project.
//!
//! 1. Find the project root and load `kiln.toml`
//! 2. Read plugins, declarations and files
//! 3. Run the cycle (blocked early on declaration errors)
//! 4. Render diagnostics
//! 5. Write each target's output under `<output_dir>/<arch>/`

use std::fs;
use std::path::Path;

use kiln_diagnostics::{
    Diagnostic, DiagnosticRenderer, JsonRenderer, Severity, TerminalRenderer,
};
use kiln_plugin::{BuildEngine, CancelToken, CycleResult, CycleStatus, PluginError, Project};

use crate::{resolve_project_root, BuildArgs, GlobalArgs, ReportFormat};

/// Printed when a cycle is blocked by errors.
pub const BLOCKED_MESSAGE: &str = "Errors prevented startup";

/// Runs the `kiln build` command.
///
/// Returns exit code 0 when the build succeeded, 1 when errors blocked it.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let project = Project::load(&project_dir)?;

    if !global.quiet {
        eprintln!("   Building {}", project.config.project.name);
    }

    let mut snapshot = project.snapshot()?;
    if !args.archs.is_empty() {
        snapshot
            .targets
            .retain(|t| args.archs.iter().any(|a| a == t.arch.as_str()));
    }

    let result = if snapshot.errors.is_empty() {
        let mut engine = BuildEngine::new(project.engine_options(None));
        engine.sync_plugins(snapshot.definitions);
        engine.run_cycle(&snapshot.targets, &CancelToken::new())
    } else {
        CycleResult {
            status: CycleStatus::Blocked,
            targets: Vec::new(),
            diagnostics: snapshot.errors.iter().map(PluginError::to_diagnostic).collect(),
        }
    };

    render(&result.diagnostics, args.format, global);

    if result.status != CycleStatus::Success {
        if args.format == ReportFormat::Text {
            eprintln!("{BLOCKED_MESSAGE}");
        }
        return Ok(1);
    }

    let written = write_outputs(&project.output_dir(), &result)?;
    tracing::info!(files = written, dir = %project.output_dir().display(), "wrote build outputs");
    if !global.quiet && args.format == ReportFormat::Text {
        eprintln!(
            "   Finished {} target(s), {} file(s) written",
            result.targets.len(),
            written
        );
    }
    Ok(0)
}

fn render(diagnostics: &[Diagnostic], format: ReportFormat, global: &GlobalArgs) {
    match format {
        ReportFormat::Text => {
            let renderer = TerminalRenderer::new(global.color);
            for diag in diagnostics {
                eprintln!("{}", renderer.render(diag));
            }
            let errors = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count();
            if !global.quiet && !diagnostics.is_empty() {
                eprintln!(
                    "   Result: {} error(s), {} warning(s)",
                    errors,
                    diagnostics.len() - errors
                );
            }
        }
        ReportFormat::Json => {
            for diag in diagnostics {
                println!("{}", JsonRenderer.render(diag));
            }
        }
    }
}

/// Writes compiled files and assets of every target, replacing what a
/// previous build left. Returns the number of files written.
///
/// Compiled code keeps its source path under `<arch>/`; source maps sit next
/// to it with a `.map` suffix; static assets go under `<arch>/assets/`.
pub fn write_outputs(output_dir: &Path, result: &CycleResult) -> std::io::Result<usize> {
    let mut written = 0;
    for target in &result.targets {
        let arch_dir = output_dir.join(target.arch.as_str());
        if arch_dir.exists() {
            fs::remove_dir_all(&arch_dir)?;
        }
        for file in &target.compiled {
            let path = arch_dir.join(file.path.trim_start_matches('/'));
            write_file(&path, file.artifact.code.as_bytes())?;
            written += 1;
            if let Some(map) = &file.artifact.source_map {
                let mut map_path = path.into_os_string();
                map_path.push(".map");
                write_file(Path::new(&map_path), map.as_bytes())?;
                written += 1;
            }
        }
        let assets_dir = arch_dir.join("assets");
        for asset in &target.assets {
            write_file(&assets_dir.join(asset.path.trim_start_matches('/')), &asset.data)?;
            written += 1;
        }
    }
    Ok(written)
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
[project]
name = "myapp"

[build]
architectures = ["web.browser", "os"]

[[plugins]]
package = "local-plugin"
version = "0.0.1"
family = "printme"
kind = "copy"
extensions = ["printme"]
options = { prefix = "PMC: " }

[[packages]]
name = "app"
sources = ["foo.printme"]
assets = [{ path = "logo.txt", environments = ["client"] }]
"#;

    fn setup(config: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("kiln.toml"), config).unwrap();
        fs::write(tmp.path().join("foo.printme"), "Print out foo").unwrap();
        fs::write(tmp.path().join("logo.txt"), "logo").unwrap();
        tmp
    }

    fn global(dir: &TempDir) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            color: false,
            config: Some(dir.path().to_str().unwrap().to_string()),
        }
    }

    fn args() -> BuildArgs {
        BuildArgs {
            format: ReportFormat::Text,
            archs: Vec::new(),
        }
    }

    #[test]
    fn build_writes_outputs() {
        let tmp = setup(PROJECT);
        assert_eq!(run(&args(), &global(&tmp)).unwrap(), 0);

        let out = tmp.path().join(".kiln/build");
        let web = fs::read_to_string(out.join("web.browser/foo.printme")).unwrap();
        assert_eq!(web, "PMC: Print out foo\n");
        assert!(out.join("os/foo.printme").exists());
        assert!(out.join("web.browser/assets/logo.txt").exists());
        assert!(!out.join("os/assets/logo.txt").exists());
    }

    #[test]
    fn build_restricted_to_one_arch() {
        let tmp = setup(PROJECT);
        let args = BuildArgs {
            format: ReportFormat::Text,
            archs: vec!["os".to_string()],
        };
        assert_eq!(run(&args, &global(&tmp)).unwrap(), 0);
        let out = tmp.path().join(".kiln/build");
        assert!(out.join("os/foo.printme").exists());
        assert!(!out.join("web.browser").exists());
    }

    #[test]
    fn missing_plugin_blocks_build() {
        let tmp = setup(PROJECT);
        fs::write(tmp.path().join("bar.unknown"), "x").unwrap();
        let config = PROJECT.replace(
            r#"sources = ["foo.printme"]"#,
            r#"sources = ["foo.printme", "bar.unknown"]"#,
        );
        fs::write(tmp.path().join("kiln.toml"), config).unwrap();
        assert_eq!(run(&args(), &global(&tmp)).unwrap(), 1);
        assert!(!tmp.path().join(".kiln/build").exists());
    }

    #[test]
    fn declaration_errors_block_build() {
        let tmp = setup(PROJECT);
        let config = PROJECT.replace(
            r#"sources = ["foo.printme"]"#,
            r#"sources = ["foo.printme", "foo.printme"]"#,
        );
        fs::write(tmp.path().join("kiln.toml"), config).unwrap();
        assert_eq!(run(&args(), &global(&tmp)).unwrap(), 1);
    }

    #[test]
    fn missing_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(run(&args(), &global(&tmp)).is_err());
    }
}
