//! Plugin definitions and the manager that keeps instances in step with them.
//!
//! The orchestrator hands over the full set of plugin definitions whenever
//! any of them may have changed. An instance survives a sync only if its
//! identity and source fingerprint are unchanged; otherwise it is replaced,
//! which drops its in-memory cache, retires its disk scope and restarts its
//! invocation counter. Disk scopes of plugins no longer defined are left for
//! cache garbage collection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use kiln_cache::CacheStore;
use kiln_common::{ContentHash, PluginIdentity};

use crate::compiler::Compiler;
use crate::debug::{CacheDebug, DebugFilter, EventLog};
use crate::error::PluginError;
use crate::instance::PluginInstance;
use crate::registry::{Handle, PluginKey, PluginRegistry, Registration};

/// Builds a plugin's compiler. An `Err` is reported as a plugin
/// initialization failure.
pub type CompilerFactory = Arc<dyn Fn() -> Result<Compiler, String> + Send + Sync>;

/// Wraps a closure as a [`CompilerFactory`].
pub fn factory<F>(f: F) -> CompilerFactory
where
    F: Fn() -> Result<Compiler, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Everything needed to instantiate a plugin.
#[derive(Clone)]
pub struct PluginDefinition {
    /// Identity of the defining package.
    pub identity: PluginIdentity,
    /// Debug family.
    pub family: String,
    /// Fingerprint of the defining source.
    pub source_hash: ContentHash,
    /// Extensions and file names claimed.
    pub handles: Vec<Handle>,
    /// Environment the plugin is restricted to.
    pub arch_matching: Option<String>,
    /// Where the plugin is defined, for error messages.
    pub location: String,
    /// Creates the compiler.
    pub factory: CompilerFactory,
}

impl PluginDefinition {
    /// Creates a definition with no handles.
    pub fn new(
        identity: PluginIdentity,
        family: impl Into<String>,
        source_hash: ContentHash,
        factory: CompilerFactory,
    ) -> Self {
        let location = format!("packages/{}", identity.package);
        Self {
            identity,
            family: family.into(),
            source_hash,
            handles: Vec::new(),
            arch_matching: None,
            location,
            factory,
        }
    }

    /// Claims extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handles
            .extend(extensions.into_iter().map(|e| Handle::Extension(e.into())));
        self
    }

    /// Claims exact file names.
    pub fn with_filenames<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handles
            .extend(names.into_iter().map(|n| Handle::Filename(n.into())));
        self
    }

    /// Restricts the plugin to architectures matching `environment`.
    pub fn matching(mut self, environment: impl Into<String>) -> Self {
        self.arch_matching = Some(environment.into());
        self
    }

    /// Sets the location used in initialization errors.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// The key this definition's instance is stored under.
    pub fn key(&self) -> PluginKey {
        PluginKey {
            package: self.identity.package.clone(),
            family: self.family.clone(),
        }
    }
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("identity", &self.identity)
            .field("family", &self.family)
            .field("source_hash", &self.source_hash)
            .field("handles", &self.handles)
            .field("arch_matching", &self.arch_matching)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Owns plugin instances and the registry that routes files to them.
pub struct PluginManager {
    store: CacheStore,
    debug: DebugFilter,
    log: Option<EventLog>,
    instances: BTreeMap<PluginKey, Arc<PluginInstance>>,
    registry: PluginRegistry,
    errors: Vec<PluginError>,
}

impl PluginManager {
    /// Creates a manager with no plugins.
    pub fn new(store: CacheStore, debug: DebugFilter, log: Option<EventLog>) -> Self {
        Self {
            store,
            debug,
            log,
            instances: BTreeMap::new(),
            registry: PluginRegistry::new(),
            errors: Vec::new(),
        }
    }

    /// Brings instances and registrations in line with `definitions`.
    ///
    /// Unchanged plugins keep their instance, caches and counter. Changed
    /// plugins are reinstantiated; removed plugins are dropped. Conflicts and
    /// initialization failures are returned and also kept until the next
    /// sync, during which time every cycle is blocked.
    pub fn sync(&mut self, definitions: Vec<PluginDefinition>) -> &[PluginError] {
        self.errors.clear();
        self.registry.clear();
        let mut previous = std::mem::take(&mut self.instances);
        let defined: BTreeSet<PluginKey> = definitions.iter().map(PluginDefinition::key).collect();

        for definition in definitions {
            let key = definition.key();
            let instance = match previous.remove(&key) {
                Some(existing)
                    if existing.source_hash() == definition.source_hash
                        && existing.identity() == &definition.identity =>
                {
                    existing
                }
                replaced => {
                    if replaced.is_some() {
                        tracing::info!(plugin = %key, "plugin source changed; reinstantiating");
                    }
                    match self.instantiate(&definition) {
                        Ok(instance) => Arc::new(instance),
                        Err(err) => {
                            self.errors.push(err);
                            continue;
                        }
                    }
                }
            };
            for handle in &definition.handles {
                let registration = Registration {
                    plugin: key.clone(),
                    arch_matching: definition.arch_matching.clone(),
                };
                if let Err(err) = self.registry.register(handle.clone(), registration) {
                    self.errors.push(err);
                }
            }
            self.instances.insert(key, instance);
        }

        for key in previous.keys() {
            tracing::debug!(plugin = %key, "plugin removed");
        }
        self.store.retain_scopes(|record| {
            defined.contains(&PluginKey {
                package: record.identity.package.clone(),
                family: record.family.clone(),
            })
        });
        &self.errors
    }

    fn instantiate(&self, definition: &PluginDefinition) -> Result<PluginInstance, PluginError> {
        let compiler = (definition.factory)().map_err(|message| PluginError::PluginInitialization {
            package: definition.identity.package.clone(),
            location: definition.location.clone(),
            message,
        })?;
        let debug = CacheDebug::new(self.debug.is_enabled(&definition.family), self.log.clone());
        tracing::debug!(plugin = %definition.key(), "instantiated plugin");
        Ok(PluginInstance::new(definition, compiler, &self.store, debug))
    }

    /// Errors from the last sync.
    pub fn errors(&self) -> &[PluginError] {
        &self.errors
    }

    /// The routing table.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Looks up a live instance.
    pub fn instance(&self, key: &PluginKey) -> Option<&Arc<PluginInstance>> {
        self.instances.get(key)
    }

    /// Iterates live instances.
    pub fn instances(&self) -> impl Iterator<Item = &Arc<PluginInstance>> {
        self.instances.values()
    }

    /// The injected cache handle.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}
