//! Filesystem seam
//!
//! The emitter talks to storage through [`Filesystem`]: create directories
//! and files, open a file for writing, write bytes, close on drop. Both
//! implementations must produce identical bytes for identical emit input.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// An open write handle; closing happens on drop
pub trait FileHandle: Write {}

impl<T: Write> FileHandle for T {}

/// The four operations the emitter needs from a backing store
pub trait Filesystem {
    fn dir_create(&mut self, path: &str) -> io::Result<()>;
    fn file_create(&mut self, path: &str) -> io::Result<()>;
    fn open(&mut self, path: &str) -> io::Result<Box<dyn FileHandle>>;
}

//
// in-memory filesystem
//

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// Deterministic in-memory store, used by tests and embedders
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// UTF-8 contents of a file, if it exists
    pub fn contents(&self, path: &str) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every file path, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state.borrow().files.keys().cloned().collect()
    }

    pub fn dirs(&self) -> Vec<String> {
        self.state.borrow().dirs.iter().cloned().collect()
    }
}

struct MemoryHandle {
    path: String,
    state: Rc<RefCell<MemoryState>>,
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let file = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.path.clone()))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Filesystem for MemoryFs {
    fn dir_create(&mut self, path: &str) -> io::Result<()> {
        self.state.borrow_mut().dirs.insert(path.to_string());
        Ok(())
    }

    fn file_create(&mut self, path: &str) -> io::Result<()> {
        self.state
            .borrow_mut()
            .files
            .insert(path.to_string(), Vec::new());
        Ok(())
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn FileHandle>> {
        let state = self.state.borrow();
        if !state.files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }
        drop(state);
        Ok(Box::new(MemoryHandle {
            path: path.to_string(),
            state: Rc::clone(&self.state),
        }))
    }
}

//
// on-disk filesystem
//

/// Store rooted at a real directory
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl Filesystem for DiskFs {
    fn dir_create(&mut self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.resolve(path))
    }

    fn file_create(&mut self, path: &str) -> io::Result<()> {
        let full = self.resolve(path);
        ensure_parent(&full)?;
        File::create(full)?;
        Ok(())
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn FileHandle>> {
        let full = self.resolve(path);
        ensure_parent(&full)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(full)?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_round_trip() {
        let mut fs = MemoryFs::new();
        fs.dir_create("include").unwrap();
        fs.file_create("include/a.h").unwrap();

        let mut handle = fs.open("include/a.h").unwrap();
        handle.write_all(b"#pragma once\n").unwrap();
        drop(handle);

        assert_eq!(fs.contents("include/a.h").unwrap(), "#pragma once\n");
        assert_eq!(fs.paths(), vec!["include/a.h".to_string()]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut fs = MemoryFs::new();
        assert!(fs.open("nope.c").is_err());
    }

    #[test]
    fn test_create_truncates() {
        let mut fs = MemoryFs::new();
        fs.file_create("x.c").unwrap();
        fs.open("x.c").unwrap().write_all(b"old").unwrap();
        fs.file_create("x.c").unwrap();
        assert_eq!(fs.contents("x.c").unwrap(), "");
    }
}
