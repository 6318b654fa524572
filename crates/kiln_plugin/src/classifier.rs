//! Classification of package files as sources, static assets, or both.

use std::collections::HashMap;

use kiln_common::PackageId;

use crate::arch::Arch;
use crate::error::{DeclarationRole, PluginError};

/// How a file participates in a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileRole {
    /// Processed by a compiler plugin.
    Source,
    /// Served verbatim.
    Asset,
    /// Both processed and served verbatim.
    Both,
}

/// Which architectures a declaration applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environments {
    /// Every architecture.
    All,
    /// Architectures matching any of these environments.
    Only(Vec<String>),
}

impl Environments {
    /// Returns `true` if `arch` is selected.
    pub fn includes(&self, arch: &Arch) -> bool {
        match self {
            Environments::All => true,
            Environments::Only(envs) => envs.iter().any(|env| arch.matches(env)),
        }
    }
}

/// One file's declarations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDeclaration {
    /// Path relative to the package directory.
    pub path: String,
    /// Source declaration, if any.
    pub source: Option<Environments>,
    /// Asset declaration, if any.
    pub asset: Option<Environments>,
}

impl FileDeclaration {
    /// The file's role.
    pub fn role(&self) -> FileRole {
        match (&self.source, &self.asset) {
            (Some(_), Some(_)) => FileRole::Both,
            (None, Some(_)) => FileRole::Asset,
            _ => FileRole::Source,
        }
    }
}

/// A validated description of a package's files.
#[derive(Clone, Debug)]
pub struct PackageManifest {
    /// The package.
    pub package: PackageId,
    /// Declarations in order of first mention.
    pub files: Vec<FileDeclaration>,
    /// Extensions that had a plugin when the package was published.
    pub published_with: Vec<String>,
}

impl PackageManifest {
    /// Returns the role of `path`, if declared.
    pub fn role(&self, path: &str) -> Option<FileRole> {
        self.files.iter().find(|f| f.path == path).map(FileDeclaration::role)
    }

    /// Paths compiled for `arch`.
    pub fn sources_for<'a>(&'a self, arch: &'a Arch) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .filter(move |f| f.source.as_ref().is_some_and(|envs| envs.includes(arch)))
            .map(|f| f.path.as_str())
    }

    /// Paths served verbatim to `arch`.
    pub fn assets_for<'a>(&'a self, arch: &'a Arch) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .filter(move |f| f.asset.as_ref().is_some_and(|envs| envs.includes(arch)))
            .map(|f| f.path.as_str())
    }
}

/// Builds a [`PackageManifest`], rejecting repeated declarations.
///
/// A file may be declared once as a source and once as an asset. Declaring
/// it twice in the same role, or declaring an asset without environments,
/// is an error.
#[derive(Debug)]
pub struct PackageManifestBuilder {
    package: PackageId,
    files: Vec<FileDeclaration>,
    index: HashMap<String, usize>,
    published_with: Vec<String>,
}

impl PackageManifestBuilder {
    /// Starts a manifest for `package`.
    pub fn new(package: impl Into<PackageId>) -> Self {
        Self {
            package: package.into(),
            files: Vec::new(),
            index: HashMap::new(),
            published_with: Vec::new(),
        }
    }

    /// Adds a source file. `environments` of `None` means every
    /// architecture.
    ///
    /// With `is_asset` set this is the legacy spelling of
    /// [`add_assets`](Self::add_assets).
    pub fn add_files(
        &mut self,
        path: &str,
        environments: Option<Vec<String>>,
        is_asset: bool,
    ) -> Result<&mut Self, PluginError> {
        if is_asset {
            return self.add_assets(path, environments);
        }
        let package = self.package.clone();
        let entry = self.entry(path);
        if entry.source.is_some() {
            return Err(PluginError::DuplicateDeclaration {
                role: DeclarationRole::Source,
                package,
                path: path.to_string(),
            });
        }
        entry.source = Some(environments.map_or(Environments::All, Environments::Only));
        Ok(self)
    }

    /// Adds a static asset served to `environments`, which is required.
    pub fn add_assets(
        &mut self,
        path: &str,
        environments: Option<Vec<String>>,
    ) -> Result<&mut Self, PluginError> {
        let Some(environments) = environments else {
            return Err(PluginError::MissingArgument {
                package: self.package.clone(),
                path: path.to_string(),
            });
        };
        let package = self.package.clone();
        let entry = self.entry(path);
        if entry.asset.is_some() {
            return Err(PluginError::DuplicateDeclaration {
                role: DeclarationRole::Asset,
                package,
                path: path.to_string(),
            });
        }
        entry.asset = Some(Environments::Only(environments));
        Ok(self)
    }

    /// Records the extensions that had a plugin at publish time.
    pub fn published_with(&mut self, extensions: impl IntoIterator<Item = String>) -> &mut Self {
        self.published_with.extend(extensions);
        self
    }

    fn entry(&mut self, path: &str) -> &mut FileDeclaration {
        let idx = match self.index.get(path) {
            Some(&idx) => idx,
            None => {
                self.files.push(FileDeclaration {
                    path: path.to_string(),
                    source: None,
                    asset: None,
                });
                let idx = self.files.len() - 1;
                self.index.insert(path.to_string(), idx);
                idx
            }
        };
        &mut self.files[idx]
    }

    /// Finishes the manifest.
    pub fn build(self) -> PackageManifest {
        PackageManifest {
            package: self.package,
            files: self.files,
            published_with: self.published_with,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envs(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn source_and_asset_once_each() {
        let mut builder = PackageManifestBuilder::new("asset-and-source");
        builder.add_files("asset-and-source.js", None, false).unwrap();
        builder
            .add_assets("asset-and-source.js", envs(&["client", "server"]))
            .unwrap();
        let manifest = builder.build();
        assert_eq!(manifest.role("asset-and-source.js"), Some(FileRole::Both));
        let os = Arch::new("os");
        assert_eq!(manifest.sources_for(&os).collect::<Vec<_>>(), vec!["asset-and-source.js"]);
        assert_eq!(manifest.assets_for(&os).collect::<Vec<_>>(), vec!["asset-and-source.js"]);
    }

    #[test]
    fn legacy_is_asset_form() {
        let mut builder = PackageManifestBuilder::new("asset-and-source");
        builder.add_files("asset-and-source.js", None, false).unwrap();
        builder
            .add_files("asset-and-source.js", envs(&["client", "server"]), true)
            .unwrap();
        assert_eq!(builder.build().role("asset-and-source.js"), Some(FileRole::Both));
    }

    #[test]
    fn duplicate_source_rejected() {
        let mut builder = PackageManifestBuilder::new("asset-and-source");
        builder.add_files("asset-and-source.js", None, false).unwrap();
        builder
            .add_assets("asset-and-source.js", envs(&["client", "server"]))
            .unwrap();
        let err = builder.add_files("asset-and-source.js", None, false).unwrap_err();
        assert!(err.to_string().contains("Duplicate source file"));
    }

    #[test]
    fn duplicate_asset_rejected() {
        let mut builder = PackageManifestBuilder::new("asset-and-source");
        builder.add_files("asset-and-source.js", None, false).unwrap();
        builder
            .add_assets("asset-and-source.js", envs(&["client", "server"]))
            .unwrap();
        let err = builder
            .add_assets("asset-and-source.js", envs(&["client", "server"]))
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::DuplicateDeclaration {
                role: DeclarationRole::Asset,
                ..
            }
        ));
    }

    #[test]
    fn asset_without_environments_rejected() {
        let mut builder = PackageManifestBuilder::new("asset-and-source");
        let err = builder.add_assets("asset-and-source.js", None).unwrap_err();
        assert!(err.to_string().contains("requires a second argument"));
        assert!(builder.build().files.is_empty());
    }

    #[test]
    fn environments_select_architectures() {
        let mut builder = PackageManifestBuilder::new("app");
        builder.add_files("client.js", envs(&["client"]), false).unwrap();
        builder.add_files("server.js", envs(&["server"]), false).unwrap();
        builder.add_files("shared.js", None, false).unwrap();
        let manifest = builder.build();
        let web = Arch::new("web.browser.legacy");
        assert_eq!(
            manifest.sources_for(&web).collect::<Vec<_>>(),
            vec!["client.js", "shared.js"]
        );
        let os = Arch::new("os");
        assert_eq!(
            manifest.sources_for(&os).collect::<Vec<_>>(),
            vec!["server.js", "shared.js"]
        );
    }

    #[test]
    fn declaration_order_is_kept() {
        let mut builder = PackageManifestBuilder::new("app");
        builder
            .add_files("b.js", None, false)
            .unwrap()
            .add_files("a.js", None, false)
            .unwrap();
        builder.published_with(["sourcish".to_string()]);
        let manifest = builder.build();
        let paths: Vec<&str> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["b.js", "a.js"]);
        assert_eq!(manifest.published_with, vec!["sourcish"]);
    }
}
