//! Turns a `kiln.toml` project into engine inputs.
//!
//! Plugin declarations become [`PluginDefinition`]s whose source
//! fingerprint covers the declaration itself and the bytes of the plugin's
//! source file, so editing either reinstantiates the plugin. Package
//! declarations are classified and read into one [`BuildTarget`] per
//! configured architecture.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use kiln_cache::CacheStore;
use kiln_common::{ContentHasher, PackageId, PluginIdentity};
use kiln_config::{ConfigError, KilnConfig, PackageDecl, PluginDecl, SourceDecl};

use crate::arch::Arch;
use crate::artifact::StaticAsset;
use crate::builtin;
use crate::classifier::{PackageManifest, PackageManifestBuilder};
use crate::coordinator::{BuildTarget, EngineOptions};
use crate::debug::{DebugFilter, EventLog};
use crate::error::PluginError;
use crate::input::InputFile;
use crate::lifecycle::{factory, PluginDefinition};

/// Version written into cache headers and the cache manifest.
pub const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that prevent a project from being read at all.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// `kiln.toml` is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A declared file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

/// Everything one cycle needs, read from disk at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    /// Declared plugins.
    pub definitions: Vec<PluginDefinition>,
    /// One target per configured architecture.
    pub targets: Vec<BuildTarget>,
    /// Invalid package declarations. A non-empty list blocks the build.
    pub errors: Vec<PluginError>,
}

/// A loaded project.
#[derive(Debug)]
pub struct Project {
    /// Project root directory.
    pub root: PathBuf,
    /// Parsed configuration.
    pub config: KilnConfig,
}

impl Project {
    /// Loads `kiln.toml` from `root`.
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let config = kiln_config::load_config(root)?;
        Ok(Self::new(root, config))
    }

    /// Wraps an already parsed configuration.
    pub fn new(root: &Path, config: KilnConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    /// Directory of the persisted cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.cache.dir)
    }

    /// Directory build outputs are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.output_dir)
    }

    /// Opens the cache, or a disabled handle if caching is off.
    pub fn open_cache(&self) -> CacheStore {
        if self.config.cache.enabled {
            CacheStore::open(&self.cache_dir(), KILN_VERSION)
        } else {
            CacheStore::disabled()
        }
    }

    /// Engine settings derived from the configuration.
    pub fn engine_options(&self, log: Option<EventLog>) -> EngineOptions {
        let families = self
            .config
            .plugins
            .iter()
            .map(PluginDecl::family)
            .filter(|family| self.config.debug.is_enabled(family))
            .map(str::to_string);
        EngineOptions {
            cache: Some(self.open_cache()),
            debug: DebugFilter::families(families),
            log,
            jobs: self.config.build.jobs,
        }
    }

    /// Reads plugins, declarations and files in one pass.
    pub fn snapshot(&self) -> Result<Snapshot, ProjectError> {
        let definitions = self.plugin_definitions()?;
        let (manifests, errors) = self.manifests();
        let targets = self.targets(&manifests)?;
        tracing::debug!(
            plugins = definitions.len(),
            targets = targets.len(),
            errors = errors.len(),
            "read project snapshot"
        );
        Ok(Snapshot {
            definitions,
            targets,
            errors,
        })
    }

    /// Builds a definition for every declared plugin.
    pub fn plugin_definitions(&self) -> Result<Vec<PluginDefinition>, ProjectError> {
        self.config
            .plugins
            .iter()
            .map(|decl| self.plugin_definition(decl))
            .collect()
    }

    fn plugin_definition(&self, decl: &PluginDecl) -> Result<PluginDefinition, ProjectError> {
        let mut hasher = ContentHasher::new();
        hasher
            .update_str(&decl.kind)
            .update_str(&decl.extensions.join(","))
            .update_str(&decl.filenames.join(","))
            .update_str(decl.arch_matching.as_deref().unwrap_or_default())
            .update(&[decl.architecture_independent as u8]);
        for (name, value) in &decl.options {
            hasher.update_str(name).update_str(&value.to_string());
        }
        let location = match &decl.source {
            Some(source) => {
                let path = self.root.join(source);
                let bytes = std::fs::read(&path).map_err(|e| ProjectError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                hasher.update(&bytes);
                source.clone()
            }
            None => kiln_config::CONFIG_FILE.to_string(),
        };

        let kind = decl.kind.clone();
        let options = decl.options.clone();
        let independent = decl.architecture_independent;
        let mut definition = PluginDefinition::new(
            PluginIdentity::new(decl.package.as_str(), decl.version.clone()),
            decl.family(),
            hasher.finish(),
            factory(move || builtin::instantiate(&kind, &options, independent)),
        )
        .with_extensions(decl.extensions.iter().cloned())
        .with_filenames(decl.filenames.iter().cloned())
        .at(location);
        if let Some(env) = &decl.arch_matching {
            definition = definition.matching(env.clone());
        }
        Ok(definition)
    }

    /// Classifies every package. Invalid declarations are reported and
    /// skipped.
    pub fn manifests(&self) -> (Vec<PackageManifest>, Vec<PluginError>) {
        let mut errors = Vec::new();
        let manifests = self
            .config
            .packages
            .iter()
            .map(|decl| classify(decl, &mut errors))
            .collect();
        (manifests, errors)
    }

    /// Reads declared files into one target per configured architecture.
    pub fn targets(&self, manifests: &[PackageManifest]) -> Result<Vec<BuildTarget>, ProjectError> {
        let dirs: HashMap<&str, &str> = self
            .config
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.dir.as_str()))
            .collect();
        let published: BTreeMap<PackageId, Vec<String>> = manifests
            .iter()
            .filter(|m| !m.published_with.is_empty())
            .map(|m| (m.package.clone(), m.published_with.clone()))
            .collect();

        let mut files: HashMap<String, InputFile> = HashMap::new();
        let mut targets = Vec::with_capacity(self.config.build.architectures.len());
        for name in &self.config.build.architectures {
            let arch = Arch::new(name.as_str());
            let mut target = BuildTarget::new(arch.clone());
            target.published_with = published.clone();
            for manifest in manifests {
                let dir = dirs.get(manifest.package.as_str()).copied().unwrap_or(".");
                for path in manifest.sources_for(&arch) {
                    let file = self.read(&mut files, &manifest.package, dir, path)?;
                    target.sources.push(file);
                }
                for path in manifest.assets_for(&arch) {
                    let file = self.read(&mut files, &manifest.package, dir, path)?;
                    target.assets.push(StaticAsset {
                        path: file.path,
                        package: file.package,
                        data: file.contents,
                    });
                }
            }
            targets.push(target);
        }
        Ok(targets)
    }

    fn read(
        &self,
        cache: &mut HashMap<String, InputFile>,
        package: &PackageId,
        dir: &str,
        path: &str,
    ) -> Result<InputFile, ProjectError> {
        let relative = project_path(dir, path);
        if let Some(file) = cache.get(&relative) {
            return Ok(file.clone());
        }
        let disk_path = self.root.join(&relative);
        let bytes = std::fs::read(&disk_path).map_err(|e| ProjectError::Io {
            path: disk_path,
            source: e,
        })?;
        let file = InputFile::new(package.clone(), relative.clone(), bytes);
        cache.insert(relative, file.clone());
        Ok(file)
    }
}

fn classify(decl: &PackageDecl, errors: &mut Vec<PluginError>) -> PackageManifest {
    let mut builder = PackageManifestBuilder::new(decl.name.as_str());
    for source in &decl.sources {
        let result = match source {
            SourceDecl::Path(path) => builder.add_files(path, None, false).map(drop),
            SourceDecl::Detailed {
                path,
                environments,
                is_asset,
            } => builder
                .add_files(path, environments.clone(), *is_asset)
                .map(drop),
        };
        if let Err(err) = result {
            errors.push(err);
        }
    }
    for asset in &decl.assets {
        if let Err(err) = builder.add_assets(&asset.path, asset.environments.clone()) {
            errors.push(err);
        }
    }
    builder.published_with(decl.published_with.iter().cloned());
    builder.build()
}

/// Joins a package directory and a package-relative path into a
/// project-relative path without `.` segments.
fn project_path(dir: &str, path: &str) -> String {
    dir.split('/')
        .chain(path.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
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
source = "packages/local-plugin/plugin.txt"
options = { prefix = "PMC: " }

[[packages]]
name = "app"
sources = ["foo.printme", { path = "server.printme", environments = ["server"] }]
assets = [{ path = "foo.txt", environments = ["client"] }]

[[packages]]
name = "local-pack"
dir = "packages/local-pack"
sources = ["p.printme"]
"#;

    fn write(root: &Path, path: &str, text: &str) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, text).unwrap();
    }

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "kiln.toml", CONFIG);
        write(dir.path(), "packages/local-plugin/plugin.txt", "v1");
        write(dir.path(), "foo.printme", "Print out foo");
        write(dir.path(), "server.printme", "server only");
        write(dir.path(), "foo.txt", "asset");
        write(dir.path(), "packages/local-pack/p.printme", "from package");
        let project = Project::load(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn targets_follow_environments() {
        let (_dir, project) = project();
        let (manifests, errors) = project.manifests();
        assert!(errors.is_empty());
        let targets = project.targets(&manifests).unwrap();
        assert_eq!(targets.len(), 2);

        let web: Vec<&str> = targets[0].sources.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(web, vec!["/foo.printme", "/packages/local-pack/p.printme"]);
        assert_eq!(targets[0].assets[0].path, "/foo.txt");

        let os: Vec<&str> = targets[1].sources.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            os,
            vec!["/foo.printme", "/server.printme", "/packages/local-pack/p.printme"]
        );
        assert!(targets[1].assets.is_empty());
    }

    #[test]
    fn snapshot_collects_everything() {
        let (_dir, project) = project();
        let snapshot = project.snapshot().unwrap();
        assert_eq!(snapshot.definitions.len(), 1);
        assert_eq!(snapshot.targets.len(), 2);
        assert!(snapshot.errors.is_empty());
    }

    #[test]
    fn plugin_fingerprint_tracks_source_file() {
        let (dir, project) = project();
        let before = project.plugin_definitions().unwrap()[0].source_hash;
        write(dir.path(), "packages/local-plugin/plugin.txt", "v2");
        let after = project.plugin_definitions().unwrap()[0].source_hash;
        assert_ne!(before, after);
    }

    #[test]
    fn definition_carries_location_and_handles() {
        let (_dir, project) = project();
        let definition = &project.plugin_definitions().unwrap()[0];
        assert_eq!(definition.family, "printme");
        assert_eq!(definition.location, "packages/local-plugin/plugin.txt");
        assert_eq!(definition.identity.to_string(), "local-plugin@0.0.1");
        assert!((definition.factory)().is_ok());
    }

    #[test]
    fn missing_plugin_source_is_io_error() {
        let (dir, project) = project();
        std::fs::remove_file(dir.path().join("packages/local-plugin/plugin.txt")).unwrap();
        assert!(matches!(
            project.plugin_definitions(),
            Err(ProjectError::Io { .. })
        ));
    }

    #[test]
    fn declaration_errors_are_collected() {
        let config = kiln_config::load_config_from_str(
            r#"
[project]
name = "a"

[[packages]]
name = "asset-and-source"
sources = ["asset-and-source.js", "asset-and-source.js"]
assets = [{ path = "x.js" }]
"#,
        )
        .unwrap();
        let project = Project::new(Path::new("/nonexistent"), config);
        let (_, errors) = project.manifests();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("Duplicate source file"));
        assert!(errors[1].to_string().contains("requires a second argument"));
    }

    #[test]
    fn project_paths() {
        assert_eq!(project_path(".", "foo.printme"), "foo.printme");
        assert_eq!(project_path("packages/local-pack", "p.less"), "packages/local-pack/p.less");
        assert_eq!(project_path("./sub/", "./x.less"), "sub/x.less");
    }
}
