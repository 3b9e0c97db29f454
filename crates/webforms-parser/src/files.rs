//! File access for includes and registered user controls.
//!
//! Paths handed to a [`FileResolver`] are project-relative and
//! `/`-separated, as produced by [`resolve_reference`].

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

/// Read access to project files.
pub trait FileResolver: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn read_all_text(&self, path: &str) -> io::Result<String>;
}

/// Files under a project root directory.
#[derive(Debug, Clone)]
pub struct FsFileResolver {
    root: PathBuf,
}

impl FsFileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileResolver for FsFileResolver {
    fn exists(&self, path: &str) -> bool {
        self.full_path(path).is_file()
    }

    fn read_all_text(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.full_path(path))
    }
}

/// Map-backed files, handy for tests and editor buffers.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileResolver {
    files: HashMap<String, String>,
}

impl MemoryFileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: &str, text: impl Into<String>) {
        self.files.insert(resolve_reference("", path), text.into());
    }
}

impl FileResolver for MemoryFileResolver {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(&resolve_reference("", path))
    }

    fn read_all_text(&self, path: &str) -> io::Result<String> {
        self.files
            .get(&resolve_reference("", path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

/// Resolve `reference` as seen from `current_file`.
///
/// `~/` and `/` are relative to the project root; anything else is
/// relative to the directory of `current_file`. The result is normalized
/// and has no leading slash.
pub fn resolve_reference(current_file: &str, reference: &str) -> String {
    let reference = reference.trim().replace('\\', "/");
    let (base, rest) = if let Some(rest) = reference.strip_prefix("~/") {
        (String::new(), rest.to_string())
    } else if reference.starts_with('/') {
        (String::new(), reference)
    } else {
        let current = current_file.replace('\\', "/");
        let directory = current.rsplit_once('/').map_or("", |(dir, _)| dir);
        (directory.to_string(), reference)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(rest.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_to_current_directory() {
        assert_eq!(resolve_reference("Pages/Home.aspx", "Header.inc"), "Pages/Header.inc");
        assert_eq!(resolve_reference("Pages/Home.aspx", "../Shared/a.inc"), "Shared/a.inc");
        assert_eq!(resolve_reference("Home.aspx", "./a.inc"), "a.inc");
    }

    #[test]
    fn test_root_relative() {
        assert_eq!(resolve_reference("Pages/Home.aspx", "~/Controls/Nav.ascx"), "Controls/Nav.ascx");
        assert_eq!(resolve_reference("Pages/Home.aspx", "/Controls/Nav.ascx"), "Controls/Nav.ascx");
    }

    #[test]
    fn test_backslashes_and_excess_parents() {
        assert_eq!(resolve_reference("a\\b.aspx", "..\\..\\c.inc"), "c.inc");
    }

    #[test]
    fn test_memory_resolver() {
        let files = MemoryFileResolver::new().with("~/Shared/Footer.inc", "<p>bye</p>");
        assert!(files.exists("Shared/Footer.inc"));
        assert!(!files.exists("Footer.inc"));
        assert_eq!(files.read_all_text("/Shared/Footer.inc").unwrap(), "<p>bye</p>");
        assert_eq!(
            files.read_all_text("Missing.inc").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_fs_resolver() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Shared")).unwrap();
        std::fs::write(dir.path().join("Shared/Header.inc"), "<h1>Hi</h1>").unwrap();

        let files = FsFileResolver::new(dir.path());
        assert!(files.exists("Shared/Header.inc"));
        assert!(!files.exists("Shared"));
        assert_eq!(files.read_all_text("Shared/Header.inc").unwrap(), "<h1>Hi</h1>");
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
