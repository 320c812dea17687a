// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Link(PathBuf),
}

/// In-memory tree with files, directories and symlinks.
///
/// Lookups follow symlinks the way the kernel does (relative targets resolve
/// against the link's directory), which is enough to model a sysfs tree.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.files.lock().unwrap();
        Self::ensure_dir_entry(&mut files, path);
    }

    pub fn add_link(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Link(target.as_ref().to_path_buf()));
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut files = self.files.lock().unwrap();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                Self::ensure_dir_entry(&mut files, parent);
                Self::register_child(&mut files, parent, path);
            }
        }
        files.insert(path.to_path_buf(), entry);
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && parent != path {
                Self::ensure_dir_entry(files, parent);
                Self::register_child(files, parent, path);
            }
        }
    }

    fn register_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, path: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }

    /// Resolve every symlink along `path`, returning the physical path.
    fn resolve(files: &HashMap<PathBuf, MockEntry>, path: &Path) -> Option<PathBuf> {
        let mut current = PathBuf::new();
        if path.is_absolute() {
            current.push("/");
        }
        let mut rest = components_reversed(path);
        let mut hops = 0;

        while let Some(part) = rest.pop() {
            if part == ".." {
                current.pop();
                continue;
            }
            current.push(&part);
            match files.get(&current) {
                Some(MockEntry::Link(target)) => {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return None;
                    }
                    current.pop();
                    if target.is_absolute() {
                        current = PathBuf::from("/");
                    }
                    rest.extend(components_reversed(target));
                }
                Some(_) => {}
                None => return None,
            }
        }
        Some(current)
    }

    /// Resolve all but the last component, so the final entry itself can be
    /// inspected without being followed.
    fn resolve_parent(files: &HashMap<PathBuf, MockEntry>, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => Self::resolve(files, p)?,
            _ => PathBuf::new(),
        };
        Some(parent.join(name))
    }

    fn lookup(&self, path: &Path) -> Option<(PathBuf, MockEntry)> {
        let files = self.files.lock().unwrap();
        let resolved = Self::resolve(&files, path)?;
        let entry = files.get(&resolved)?.clone();
        Some((resolved, entry))
    }
}

fn components_reversed(path: &Path) -> Vec<OsString> {
    let mut parts: Vec<OsString> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            _ => None,
        })
        .collect();
    parts.reverse();
    parts
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lookup(path) {
            Some((_, MockEntry::File(content))) => {
                String::from_utf8(content).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Some((_, MockEntry::File(_))))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Some((_, MockEntry::Dir(_))))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        Self::resolve_parent(&files, path)
            .and_then(|p| files.get(&p).cloned())
            .is_some_and(|e| matches!(e, MockEntry::Link(_)))
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let files = self.files.lock().unwrap();
        match Self::resolve_parent(&files, path).and_then(|p| files.get(&p)) {
            Some(MockEntry::Link(target)) => Ok(target.clone()),
            Some(_) => Err(anyhow!("Not a symlink: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.lookup(path)
            .map(|(resolved, _)| resolved)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lookup(path) {
            Some((_, MockEntry::Dir(children))) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
