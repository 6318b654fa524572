//! One rebuild cycle across every build target.
//!
//! A cycle routes each target's sources to plugins, refuses to compile
//! anything while structural errors exist, runs one batch per plugin per
//! target, and then either commits every instance's new results or, if the
//! cycle was cancelled, discards them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_cache::CacheStore;
use kiln_common::PackageId;
use kiln_diagnostics::{code, Diagnostic, DiagnosticSink};

use crate::arch::Arch;
use crate::artifact::{CompiledFile, StaticAsset};
use crate::debug::{DebugFilter, EventLog};
use crate::error::{MissingPluginReason, PluginError};
use crate::gate::CycleId;
use crate::input::{FileSet, InputFile};
use crate::lifecycle::{PluginDefinition, PluginManager};
use crate::registry::{Handle, PluginKey};

/// Cooperative cancellation flag shared with a running cycle.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The files one architecture needs built.
#[derive(Clone, Debug)]
pub struct BuildTarget {
    /// Target architecture.
    pub arch: Arch,
    /// Files to compile.
    pub sources: Vec<InputFile>,
    /// Files to copy verbatim.
    pub assets: Vec<StaticAsset>,
    /// Per package, extensions that had a plugin when it was published.
    pub published_with: BTreeMap<PackageId, Vec<String>>,
}

impl BuildTarget {
    /// Creates an empty target.
    pub fn new(arch: impl Into<Arch>) -> Self {
        Self {
            arch: arch.into(),
            sources: Vec::new(),
            assets: Vec::new(),
            published_with: BTreeMap::new(),
        }
    }

    /// Adds a source file.
    pub fn with_source(mut self, file: InputFile) -> Self {
        self.sources.push(file);
        self
    }

    /// Adds a static asset.
    pub fn with_asset(mut self, asset: StaticAsset) -> Self {
        self.assets.push(asset);
        self
    }
}

/// What a cycle delivered to one target.
#[derive(Clone, Debug)]
pub struct TargetOutput {
    /// Target architecture.
    pub arch: Arch,
    /// Compiled files, grouped by plugin and ordered by path.
    pub compiled: Vec<CompiledFile>,
    /// Package assets followed by compiler-declared assets.
    pub assets: Vec<StaticAsset>,
}

/// How a cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStatus {
    /// Every file compiled.
    Success,
    /// Errors were reported; see the diagnostics.
    Blocked,
    /// The cycle was cancelled and nothing was committed.
    Cancelled,
}

/// The aggregate result of a cycle.
#[derive(Debug)]
pub struct CycleResult {
    /// Outcome.
    pub status: CycleStatus,
    /// Per-target output, in target order. Empty unless compilation ran.
    pub targets: Vec<TargetOutput>,
    /// Every diagnostic reported by the cycle.
    pub diagnostics: Vec<Diagnostic>,
}

impl CycleResult {
    fn blocked(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            status: CycleStatus::Blocked,
            targets: Vec::new(),
            diagnostics,
        }
    }

    /// Returns `true` if the cycle succeeded.
    pub fn is_success(&self) -> bool {
        self.status == CycleStatus::Success
    }

    /// Returns the output for `arch`, if built.
    pub fn target(&self, arch: &str) -> Option<&TargetOutput> {
        self.targets.iter().find(|t| t.arch.as_str() == arch)
    }
}

/// Settings for a [`BuildEngine`].
#[derive(Clone, Default)]
pub struct EngineOptions {
    /// Persisted cache handle.
    pub cache: Option<CacheStore>,
    /// Families that print debug lines.
    pub debug: DebugFilter,
    /// Captures debug events.
    pub log: Option<EventLog>,
    /// Worker threads; `None` uses the global pool.
    pub jobs: Option<usize>,
}

/// Entry point for the orchestrator.
pub struct BuildEngine {
    plugins: PluginManager,
    pool: Option<rayon::ThreadPool>,
}

impl BuildEngine {
    /// Creates an engine with no plugins.
    pub fn new(options: EngineOptions) -> Self {
        let pool = options.jobs.and_then(|jobs| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| tracing::warn!(error = %e, "falling back to the global thread pool"))
                .ok()
        });
        let cache = options.cache.unwrap_or_else(CacheStore::disabled);
        Self {
            plugins: PluginManager::new(cache, options.debug, options.log),
            pool,
        }
    }

    /// Replaces the plugin definitions. Returns diagnostics for conflicts and
    /// initialization failures.
    pub fn sync_plugins(&mut self, definitions: Vec<PluginDefinition>) -> Vec<Diagnostic> {
        self.plugins
            .sync(definitions)
            .iter()
            .map(PluginError::to_diagnostic)
            .collect()
    }

    /// The plugin manager.
    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// Runs one cycle over `targets`, in order.
    pub fn run_cycle(&self, targets: &[BuildTarget], cancel: &CancelToken) -> CycleResult {
        match &self.pool {
            Some(pool) => pool.install(|| self.cycle(targets, cancel)),
            None => self.cycle(targets, cancel),
        }
    }

    fn cycle(&self, targets: &[BuildTarget], cancel: &CancelToken) -> CycleResult {
        if !self.plugins.errors().is_empty() {
            return CycleResult::blocked(
                self.plugins.errors().iter().map(PluginError::to_diagnostic).collect(),
            );
        }

        let (routes, structural) = self.route(targets);
        if !structural.is_empty() {
            return CycleResult::blocked(structural.iter().map(PluginError::to_diagnostic).collect());
        }

        let cycle = CycleId::next();
        let sink = DiagnosticSink::new();
        let mut outputs = Vec::with_capacity(targets.len());
        for (target, batches) in targets.iter().zip(routes) {
            if cancel.is_cancelled() {
                break;
            }
            let mut output = TargetOutput {
                arch: target.arch.clone(),
                compiled: Vec::new(),
                assets: target.assets.clone(),
            };
            for (key, files) in batches {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(instance) = self.plugins.instance(&key) else {
                    continue;
                };
                let batch = instance.process_batch(cycle, &files, &target.arch, cancel);
                sink.extend(batch.errors.iter().map(|e| e.to_diagnostic()));
                output.compiled.extend(batch.compiled);
            }
            output.assets.extend(declared_assets(&output.compiled));
            outputs.push(output);
        }

        if cancel.is_cancelled() {
            for instance in self.plugins.instances() {
                instance.abandon_cycle(cycle);
            }
            tracing::info!("build cycle cancelled; results discarded");
            return CycleResult {
                status: CycleStatus::Cancelled,
                targets: Vec::new(),
                diagnostics: sink.take_all(),
            };
        }

        for instance in self.plugins.instances() {
            for err in instance.commit_cycle(cycle) {
                tracing::warn!(plugin = %instance.key(), error = %err, "failed to persist cache entry");
                sink.emit(Diagnostic::warning(code::W100, format!("cache write failed: {err}")));
            }
        }

        let status = if sink.has_errors() {
            CycleStatus::Blocked
        } else {
            CycleStatus::Success
        };
        CycleResult {
            status,
            targets: outputs,
            diagnostics: sink.take_all(),
        }
    }

    /// Groups each target's sources by plugin. Files whose plugin does not
    /// build for the target architecture are skipped; files with no plugin
    /// are reported once each.
    fn route(&self, targets: &[BuildTarget]) -> (Vec<BTreeMap<PluginKey, FileSet>>, Vec<PluginError>) {
        let registry = self.plugins.registry();
        let mut reported = BTreeSet::new();
        let mut errors = Vec::new();
        let mut routes = Vec::with_capacity(targets.len());

        for target in targets {
            let mut batches: BTreeMap<PluginKey, FileSet> = BTreeMap::new();
            for file in &target.sources {
                match registry.resolve(file) {
                    Some((_, registration)) => {
                        if registration.applies_to(&target.arch) {
                            batches
                                .entry(registration.plugin.clone())
                                .or_default()
                                .insert(file.clone());
                        }
                    }
                    None => {
                        if reported.insert((file.package.clone(), file.path.clone())) {
                            errors.push(PluginError::MissingPlugin {
                                file: file.path.clone(),
                                package: file.package.clone(),
                                reason: self.missing_reason(target, file),
                            });
                        }
                    }
                }
            }
            routes.push(batches);
        }
        (routes, errors)
    }

    fn missing_reason(&self, target: &BuildTarget, file: &InputFile) -> MissingPluginReason {
        let published = target
            .published_with
            .get(&file.package)
            .and_then(|exts| file.extensions().find(|ext| exts.iter().any(|e| e == ext)))
            .map(|ext| Handle::Extension(ext.to_string()));
        match published.or_else(|| self.plugins.registry().previously_handled(file)) {
            Some(handle) => MissingPluginReason::NoLongerSupported { handle },
            None => MissingPluginReason::NeverSupported,
        }
    }
}

fn declared_assets(compiled: &[CompiledFile]) -> Vec<StaticAsset> {
    compiled
        .iter()
        .flat_map(|file| {
            file.artifact.assets.iter().map(|asset| StaticAsset {
                path: asset.path.clone(),
                package: file.package.clone(),
                data: asset.data.clone().into(),
            })
        })
        .collect()
}
