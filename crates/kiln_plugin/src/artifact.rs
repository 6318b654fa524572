//! Compiled output.

use std::sync::Arc;

use kiln_common::PackageId;
use serde::{Deserialize, Serialize};

/// The result of compiling one file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Generated code.
    pub code: String,
    /// Source map for `code`, if the compiler produced one.
    pub source_map: Option<String>,
    /// Static assets the compiler declared alongside the code.
    pub assets: Vec<AssetOutput>,
}

impl Artifact {
    /// Creates an artifact holding only code.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Attaches a source map.
    pub fn with_source_map(mut self, map: impl Into<String>) -> Self {
        self.source_map = Some(map.into());
        self
    }

    /// Declares a static asset.
    pub fn with_asset(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.assets.push(AssetOutput {
            path: path.into(),
            data: data.into(),
        });
        self
    }
}

/// A static asset declared by a compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOutput {
    /// Project-relative serve path.
    pub path: String,
    /// Asset bytes.
    pub data: Vec<u8>,
}

/// A compiled file as delivered to one target.
///
/// The artifact is shared between every target that reused it.
#[derive(Clone, Debug)]
pub struct CompiledFile {
    /// Path of the input file.
    pub path: String,
    /// Package that declared the input file.
    pub package: PackageId,
    /// The compiled output.
    pub artifact: Arc<Artifact>,
}

/// A package file declared as a static asset, copied to the output verbatim.
#[derive(Clone, Debug)]
pub struct StaticAsset {
    /// Project-relative path.
    pub path: String,
    /// Package that declared the asset.
    pub package: PackageId,
    /// Asset bytes.
    pub data: Arc<[u8]>,
}
