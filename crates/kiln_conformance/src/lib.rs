//! Scenario harness for the Kiln compiler-plugin engine.
//!
//! A [`Sandbox`] is a throwaway project directory plus a long-lived
//! [`BuildEngine`], standing in for a watching build process: tests edit
//! files, run cycles, and assert on diagnostics, outputs and the cache
//! debug lines each cycle printed. [`Sandbox::restart`] drops the engine
//! (and with it every in-memory cache) while keeping the disk cache.

#![warn(missing_docs)]

use std::path::Path;

use kiln_diagnostics::{Diagnostic, Severity};
use kiln_plugin::{
    BuildEngine, CancelToken, CycleResult, CycleStatus, EventLog, PluginError, Project,
};
use tempfile::TempDir;

/// The result of one cycle as a test sees it.
pub struct Outcome {
    /// The engine's result.
    pub result: CycleResult,
    /// Cache debug lines printed during the cycle, in order.
    pub lines: Vec<String>,
}

impl Outcome {
    /// Returns `true` if the cycle succeeded.
    pub fn is_success(&self) -> bool {
        self.result.status == CycleStatus::Success
    }

    /// Returns `true` if errors blocked the cycle.
    pub fn is_blocked(&self) -> bool {
        self.result.status == CycleStatus::Blocked
    }

    /// Every error diagnostic as `location: message`.
    pub fn errors(&self) -> Vec<String> {
        self.result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(ToString::to_string)
            .collect()
    }

    /// Returns `true` if some error message contains `needle`.
    pub fn has_error(&self, needle: &str) -> bool {
        self.errors().iter().any(|m| m.contains(needle))
    }

    /// Generated code for `path` on `arch`.
    pub fn code(&self, arch: &str, path: &str) -> Option<String> {
        self.result
            .target(arch)?
            .compiled
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.artifact.code.clone())
    }

    /// Contents of the static asset `path` on `arch`.
    pub fn asset(&self, arch: &str, path: &str) -> Option<Vec<u8>> {
        self.result
            .target(arch)?
            .assets
            .iter()
            .find(|a| a.path == path)
            .map(|a| a.data.to_vec())
    }

    /// Lines beginning with `CACHE(family): Ran`.
    pub fn ran_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.contains("): Ran "))
            .map(String::as_str)
            .collect()
    }

    /// Lines beginning with `CACHE(family): Loaded`.
    pub fn loaded_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.contains("): Loaded "))
            .map(String::as_str)
            .collect()
    }
}

/// A project directory and the engine building it.
pub struct Sandbox {
    dir: TempDir,
    log: EventLog,
    engine: BuildEngine,
}

impl Sandbox {
    /// Creates a project whose `kiln.toml` is `config`.
    pub fn new(config: &str) -> Self {
        let dir = tempfile::tempdir().expect("create sandbox directory");
        std::fs::write(dir.path().join(kiln_config::CONFIG_FILE), config)
            .expect("write kiln.toml");
        let log = EventLog::new();
        let engine = start_engine(dir.path(), &log);
        Self { dir, log, engine }
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `text` to `path`, creating parent directories.
    pub fn write(&self, path: &str, text: &str) {
        let full = self.root().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("create parent directory");
        }
        std::fs::write(full, text).expect("write sandbox file");
    }

    /// Appends `text` to `path`, creating it if needed.
    pub fn append(&self, path: &str, text: &str) {
        let mut current =
            std::fs::read_to_string(self.root().join(path)).unwrap_or_default();
        current.push_str(text);
        self.write(path, &current);
    }

    /// Reads `path` as text.
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.root().join(path)).expect("read sandbox file")
    }

    /// Deletes `path`.
    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.root().join(path)).expect("remove sandbox file");
    }

    /// The running engine.
    pub fn engine(&self) -> &BuildEngine {
        &self.engine
    }

    /// Re-reads the project and runs one cycle.
    pub fn cycle(&mut self) -> Outcome {
        self.cycle_with(&CancelToken::new())
    }

    /// Like [`cycle`](Self::cycle), with a caller-controlled cancel token.
    pub fn cycle_with(&mut self, cancel: &CancelToken) -> Outcome {
        self.log.take();
        let project = Project::load(self.root()).expect("load sandbox project");
        let snapshot = project.snapshot().expect("read sandbox project");
        self.engine.sync_plugins(snapshot.definitions);
        let result = if snapshot.errors.is_empty() {
            self.engine.run_cycle(&snapshot.targets, cancel)
        } else {
            CycleResult {
                status: CycleStatus::Blocked,
                targets: Vec::new(),
                diagnostics: snapshot
                    .errors
                    .iter()
                    .map(PluginError::to_diagnostic)
                    .collect::<Vec<Diagnostic>>(),
            }
        };
        Outcome {
            result,
            lines: self.log.lines(),
        }
    }

    /// Simulates a process restart: a fresh engine over the same directory.
    pub fn restart(&mut self) {
        self.log.take();
        self.engine = start_engine(self.root(), &self.log);
    }
}

fn start_engine(root: &Path, log: &EventLog) -> BuildEngine {
    let project = Project::load(root).expect("load sandbox project");
    BuildEngine::new(project.engine_options(Some(log.clone())))
}

/// Builds a `[[plugins]]` table.
pub fn plugin(package: &str, family: &str, kind: &str, extensions: &[&str]) -> String {
    format!(
        "[[plugins]]\npackage = \"{package}\"\nversion = \"0.0.1\"\nfamily = \"{family}\"\nkind = \"{kind}\"\nextensions = [{}]\n",
        quoted(extensions)
    )
}

/// Builds a `[[packages]]` table declaring `sources` for every architecture.
pub fn package(name: &str, dir: &str, sources: &[&str]) -> String {
    format!(
        "[[packages]]\nname = \"{name}\"\ndir = \"{dir}\"\nsources = [{}]\n",
        quoted(sources)
    )
}

/// The `[project]`, `[build]` and `[debug]` header shared by scenarios.
pub fn header(architectures: &[&str]) -> String {
    format!(
        "[project]\nname = \"myapp\"\n\n[build]\narchitectures = [{}]\n\n[debug]\nfamilies = [\"*\"]\n\n",
        quoted(architectures)
    )
}

fn quoted(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("\"{item}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
