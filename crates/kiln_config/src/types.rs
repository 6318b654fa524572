//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct KilnConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Build targets and parallelism.
    #[serde(default)]
    pub build: BuildConfig,
    /// Persisted cache location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-family cache debug output.
    #[serde(default)]
    pub debug: DebugConfig,
    /// Compiler plugins defined by packages in this project.
    #[serde(default)]
    pub plugins: Vec<PluginDecl>,
    /// Packages and the files they declare.
    #[serde(default)]
    pub packages: Vec<PackageDecl>,
}

/// Core project metadata.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// Build settings.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Architectures built on every cycle, in build order.
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,
    /// Worker threads for compilation; `None` uses one per CPU.
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Output directory relative to the project root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            architectures: default_architectures(),
            jobs: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_architectures() -> Vec<String> {
    vec![
        "web.browser".to_string(),
        "web.browser.legacy".to_string(),
        "os".to_string(),
    ]
}

fn default_output_dir() -> String {
    ".kiln/build".to_string()
}

/// Persisted cache settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Whether compile results are persisted across runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    ".kiln/cache".to_string()
}

fn default_true() -> bool {
    true
}

/// Selects which plugin families print cache debug lines.
#[derive(Debug, Default, Deserialize)]
pub struct DebugConfig {
    /// Family names, or `"*"` for all families.
    #[serde(default)]
    pub families: Vec<String>,
}

impl DebugConfig {
    /// Returns `true` if debug output is requested for `family`, either in
    /// the configuration or through `KILN_<FAMILY>_CACHE_DEBUG`.
    pub fn is_enabled(&self, family: &str) -> bool {
        if self.families.iter().any(|f| f == family || f == "*") {
            return true;
        }
        std::env::var(debug_env_var(family)).is_ok_and(|v| !v.is_empty())
    }
}

/// The environment variable that enables debug output for `family`.
pub fn debug_env_var(family: &str) -> String {
    let upper: String = family
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("KILN_{upper}_CACHE_DEBUG")
}

/// A compiler plugin registered by a package.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginDecl {
    /// The package that defines the plugin.
    pub package: String,
    /// Version of the defining package.
    #[serde(default)]
    pub version: String,
    /// Family name used in debug output; defaults to the package name.
    #[serde(default)]
    pub family: Option<String>,
    /// Built-in compiler kind (`copy` or `include`).
    pub kind: String,
    /// File extensions handled, without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Exact file names handled regardless of extension.
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Restricts the plugin to architectures matching this environment
    /// (`client`, `server`, or an architecture prefix).
    #[serde(default)]
    pub arch_matching: Option<String>,
    /// Whether output is identical for every architecture.
    #[serde(default = "default_true")]
    pub architecture_independent: bool,
    /// Optional file holding the plugin's defining source; its bytes are part
    /// of the plugin fingerprint.
    #[serde(default)]
    pub source: Option<String>,
    /// Kind-specific options.
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

impl PluginDecl {
    /// Returns the debug family name.
    pub fn family(&self) -> &str {
        self.family.as_deref().unwrap_or(&self.package)
    }
}

/// A package and the files it declares.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDecl {
    /// The package name.
    pub name: String,
    /// Directory of the package relative to the project root.
    #[serde(default = "default_package_dir")]
    pub dir: String,
    /// Files added as sources, in declaration order.
    #[serde(default)]
    pub sources: Vec<SourceDecl>,
    /// Files added as static assets, in declaration order.
    #[serde(default)]
    pub assets: Vec<AssetDecl>,
    /// Extensions that had an active compiler when this package was
    /// published.
    #[serde(default)]
    pub published_with: Vec<String>,
}

fn default_package_dir() -> String {
    ".".to_string()
}

/// A source declaration: a bare path, or a table with environments and the
/// legacy `is_asset` flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceDecl {
    /// A path compiled for every architecture.
    Path(String),
    /// A path with explicit environments.
    Detailed {
        /// File path relative to the package directory.
        path: String,
        /// Environments (`client`, `server`, or architecture names).
        #[serde(default)]
        environments: Option<Vec<String>>,
        /// Legacy form of an asset declaration.
        #[serde(default)]
        is_asset: bool,
    },
}

impl SourceDecl {
    /// Returns the declared path.
    pub fn path(&self) -> &str {
        match self {
            SourceDecl::Path(path) => path,
            SourceDecl::Detailed { path, .. } => path,
        }
    }
}

/// A static asset declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetDecl {
    /// File path relative to the package directory.
    pub path: String,
    /// Environments the asset is served to; required.
    #[serde(default)]
    pub environments: Option<Vec<String>>,
}
