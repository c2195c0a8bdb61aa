//! In-process inode table bridging FUSE's inode-keyed calling convention
//! to the peer's path-keyed wire protocol. Adapted from an on-disk
//! backing store's allocate-and-lookup pattern to a pure name/inode
//! bijection, since paths here are never stored locally.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use fuser::INodeNo;

struct Inner {
    path_to_ino: HashMap<PathBuf, u64>,
    ino_to_path: HashMap<u64, PathBuf>,
    next_ino: u64,
}

pub struct InodeTable {
    inner: Mutex<Inner>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut ino_to_path = HashMap::new();
        ino_to_path.insert(INodeNo::ROOT.0, PathBuf::from("/"));
        let mut path_to_ino = HashMap::new();
        path_to_ino.insert(PathBuf::from("/"), INodeNo::ROOT.0);

        InodeTable {
            inner: Mutex::new(Inner {
                path_to_ino,
                ino_to_path,
                next_ino: INodeNo::ROOT.0 + 1,
            }),
        }
    }

    /// Resolves `(parent, name)` to an inode number and path, assigning a
    /// fresh inode on first sight. The same `(parent, name)` pair always
    /// maps to the same inode for the lifetime of the process.
    pub fn resolve(&self, parent: INodeNo, name: &std::ffi::OsStr) -> Option<(u64, PathBuf)> {
        let mut inner = self.inner.lock().unwrap();
        let parent_path = inner.ino_to_path.get(&parent.0)?.clone();
        let child_path = join(&parent_path, name);

        if let Some(&ino) = inner.path_to_ino.get(&child_path) {
            return Some((ino, child_path));
        }

        let ino = inner.next_ino;
        inner.next_ino += 1;
        inner.path_to_ino.insert(child_path.clone(), ino);
        inner.ino_to_path.insert(ino, child_path.clone());
        Some((ino, child_path))
    }

    pub fn path_of(&self, ino: INodeNo) -> Option<PathBuf> {
        self.inner.lock().unwrap().ino_to_path.get(&ino.0).cloned()
    }

    pub fn remove_path(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ino) = inner.path_to_ino.remove(path) {
            inner.ino_to_path.remove(&ino);
        }
    }
}

fn join(parent: &Path, name: &std::ffi::OsStr) -> PathBuf {
    if parent == Path::new("/") {
        let mut p = PathBuf::from("/");
        p.push(name);
        p
    } else {
        parent.join(name)
    }
}
