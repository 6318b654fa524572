//! The opt-in cache debug channel.
//!
//! Each plugin family can print one line per batch it processes and one line
//! per entry it loads from disk:
//!
//! ```text
//! CACHE(coffeescript): Ran (#4) on: ["/f2.coffee"] ["web.browser"]
//! CACHE(less): Loaded /top.less
//! ```
//!
//! Lines go to `tracing` at debug level on the `kiln::cache` target. An
//! [`EventLog`] can additionally capture the structured events.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arch::Arch;

/// Target used for debug-channel lines.
pub const DEBUG_TARGET: &str = "kiln::cache";

/// One debug-channel event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// A batch ran; `files` are the files actually compiled.
    Ran {
        /// Plugin family.
        family: String,
        /// Invocation number of the plugin instance.
        invocation: u64,
        /// Compiled files, sorted.
        files: Vec<String>,
        /// Target architecture.
        arch: Arch,
    },
    /// An entry was loaded from disk.
    Loaded {
        /// Plugin family.
        family: String,
        /// Path of the file the entry belongs to.
        path: String,
    },
}

impl CacheEvent {
    /// The plugin family that produced the event.
    pub fn family(&self) -> &str {
        match self {
            CacheEvent::Ran { family, .. } | CacheEvent::Loaded { family, .. } => family,
        }
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Ran {
                family,
                invocation,
                files,
                arch,
            } => {
                let files = serde_json::to_string(files).map_err(|_| fmt::Error)?;
                let arch = serde_json::to_string(&[arch.as_str()]).map_err(|_| fmt::Error)?;
                write!(f, "CACHE({family}): Ran (#{invocation}) on: {files} {arch}")
            }
            CacheEvent::Loaded { family, path } => write!(f, "CACHE({family}): Loaded {path}"),
        }
    }
}

/// Shared in-memory record of debug events.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<CacheEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: CacheEvent) {
        self.events.lock().push(event);
    }

    /// Returns a snapshot of all events.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().clone()
    }

    /// Returns the events rendered as debug lines.
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(ToString::to_string).collect()
    }

    /// Removes and returns all events.
    pub fn take(&self) -> Vec<CacheEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// Which families print debug lines.
#[derive(Clone, Debug, Default)]
pub enum DebugFilter {
    /// No family.
    #[default]
    Off,
    /// Every family.
    All,
    /// The named families.
    Families(BTreeSet<String>),
}

impl DebugFilter {
    /// Builds a filter for the named families.
    pub fn families<I, S>(families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DebugFilter::Families(families.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if `family` prints debug lines.
    pub fn is_enabled(&self, family: &str) -> bool {
        match self {
            DebugFilter::Off => false,
            DebugFilter::All => true,
            DebugFilter::Families(set) => set.contains(family),
        }
    }
}

/// The debug channel of one plugin instance.
#[derive(Clone, Default)]
pub struct CacheDebug {
    enabled: bool,
    log: Option<EventLog>,
}

impl CacheDebug {
    /// Creates a channel; `log` captures events whether or not lines are
    /// printed.
    pub fn new(enabled: bool, log: Option<EventLog>) -> Self {
        Self { enabled, log }
    }

    /// Returns `true` if lines are printed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emits an event.
    pub fn emit(&self, event: CacheEvent) {
        if self.enabled {
            tracing::debug!(target: DEBUG_TARGET, "{event}");
        }
        if let Some(log) = &self.log {
            log.push(event);
        }
    }
}
