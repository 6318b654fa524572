//! Files handed to compilers and the per-target sets they are drawn from.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_common::{ContentHash, PackageId};

/// A file routed to a compiler plugin.
///
/// `path` is relative to the project root and always starts with `/`
/// (`/f1.coffee`, `/packages/local-pack/p.coffee`). Package metadata is not
/// part of the fingerprint, so touching a package description never
/// invalidates its files.
#[derive(Clone, Debug)]
pub struct InputFile {
    /// Project-relative path with a leading slash.
    pub path: String,
    /// The package that declared the file.
    pub package: PackageId,
    /// File bytes.
    pub contents: Arc<[u8]>,
    /// Fingerprint of `contents`.
    pub fingerprint: ContentHash,
}

impl InputFile {
    /// Creates an input file, fingerprinting its contents.
    pub fn new(
        package: impl Into<PackageId>,
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        let bytes: Vec<u8> = contents.into();
        let contents: Arc<[u8]> = bytes.into();
        let fingerprint = ContentHash::from_bytes(&contents);
        Self {
            path,
            package: package.into(),
            contents,
            fingerprint,
        }
    }

    /// Returns the final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns the directory part of the path, with a trailing slash.
    pub fn dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..=idx],
            None => "/",
        }
    }

    /// Candidate extensions, longest first: `a.b.c` yields `b.c`, then `c`.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        let name = self.file_name();
        name.match_indices('.')
            .map(move |(idx, _)| &name[idx + 1..])
            .filter(|ext| !ext.is_empty())
    }

    /// Returns the contents as UTF-8, if valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

/// The files one plugin sees for one target, keyed by path.
///
/// Multi-file compilers resolve imports against this set; anything outside
/// it is an unknown import.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: BTreeMap<String, InputFile>,
}

impl FileSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any file with the same path.
    pub fn insert(&mut self, file: InputFile) {
        self.files.insert(file.path.clone(), file);
    }

    /// Looks up a file by path.
    pub fn get(&self, path: &str) -> Option<&InputFile> {
        self.files.get(path)
    }

    /// Iterates files in path order.
    pub fn iter(&self) -> impl Iterator<Item = &InputFile> {
        self.files.values()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<InputFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = InputFile>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for file in iter {
            set.insert(file);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_gets_leading_slash() {
        let file = InputFile::new("app", "f1.coffee", "x = 1");
        assert_eq!(file.path, "/f1.coffee");
        assert_eq!(file.file_name(), "f1.coffee");
        assert_eq!(file.dir(), "/");
    }

    #[test]
    fn nested_dir() {
        let file = InputFile::new("local-pack", "/packages/local-pack/p.less", "");
        assert_eq!(file.dir(), "/packages/local-pack/");
        assert_eq!(file.file_name(), "p.less");
    }

    #[test]
    fn extensions_longest_first() {
        let file = InputFile::new("app", "/dir.v2/main.import.less", "");
        let exts: Vec<&str> = file.extensions().collect();
        assert_eq!(exts, vec!["import.less", "less"]);
    }

    #[test]
    fn no_extension() {
        let file = InputFile::new("app", "/Dockerfile", "");
        assert_eq!(file.extensions().count(), 0);
    }

    #[test]
    fn fingerprint_depends_only_on_contents() {
        let a = InputFile::new("app", "/a.coffee", "same");
        let b = InputFile::new("other", "/b.coffee", "same");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn file_set_lookup() {
        let set: FileSet = [
            InputFile::new("app", "/top.less", "a"),
            InputFile::new("app", "/_vars.less", "b"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert!(set.get("/top.less").is_some());
        assert!(set.get("/missing.less").is_none());
        let paths: Vec<&str> = set.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/_vars.less", "/top.less"]);
    }
}
