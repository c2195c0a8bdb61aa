//! The FS Adapter: implements `fuser::Filesystem`, translating each bound
//! kernel callback into a request on the Multiplexer and the peer's
//! response back into the matching `Reply*` call.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use std::time::UNIX_EPOCH;

use fuser::Errno;
use fuser::FileAttr;
use fuser::FileHandle;
use fuser::FileType;
use fuser::Filesystem;
use fuser::FopenFlags;
use fuser::Generation;
use fuser::INodeNo;
use fuser::BsdFileFlags;
use fuser::OpenFlags;
use fuser::WriteFlags;
use fuser::ReplyAttr;
use fuser::ReplyCreate;
use fuser::ReplyData;
use fuser::ReplyDirectory;
use fuser::ReplyEmpty;
use fuser::ReplyEntry;
use fuser::ReplyOpen;
use fuser::ReplyWrite;
use fuser::Request;
use log::warn;

use crate::error::errno_from_raw;
use crate::inode::InodeTable;
use crate::multiplexer::Multiplexer;
use crate::wire::Request as WireRequest;
use crate::wire::Response;

/// Replies never expire locally; every attribute and entry comes straight
/// from the peer on every call, so caching it in the kernel would only
/// serve stale data.
const TTL: Duration = Duration::ZERO;

pub struct Bridge {
    multiplexer: Arc<Multiplexer>,
    inodes: InodeTable,
}

impl Bridge {
    pub fn new(multiplexer: Arc<Multiplexer>) -> Self {
        Bridge {
            multiplexer,
            inodes: InodeTable::new(),
        }
    }

    fn path_for(&self, ino: INodeNo) -> Option<std::path::PathBuf> {
        self.inodes.path_of(ino)
    }

    /// Converts the peer's `{st_mode, st_nlink, st_size}` triple into a
    /// `FileAttr`. The wire schema carries no timestamps, so they're
    /// pinned to the epoch, matching how `HELLO_DIR_ATTR`/`HELLO_TXT_ATTR`
    /// model a filesystem with no real timestamps.
    fn attr_from_response(&self, ino: INodeNo, resp: &Response) -> FileAttr {
        let mode = resp.st_mode.unwrap_or(0o100644);
        let kind = match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileType::Directory,
            m if m == libc::S_IFLNK as u32 => FileType::Symlink,
            _ => FileType::RegularFile,
        };

        FileAttr {
            ino,
            size: resp.st_size.unwrap_or(0),
            blocks: resp.st_size.unwrap_or(0).div_ceil(512),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind,
            perm: (mode & 0o7777) as u16,
            nlink: resp.st_nlink.unwrap_or(1),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            flags: 0,
            blksize: 4096,
        }
    }

    fn open_common(&self, ino: INodeNo, op: &'static str, flags: OpenFlags, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare(op, path_str(&path)).with_flags(flags.0);
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                let fh = resp.fh.unwrap_or(0);
                reply.opened(FileHandle(fh), FopenFlags::FOPEN_DIRECT_IO);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }
}

impl Filesystem for Bridge {
    fn lookup(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEntry) {
        let Some((ino, path)) = self.inodes.resolve(parent, name) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("getattr", path_str(&path));
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                let attr = self.attr_from_response(INodeNo(ino), &resp);
                reply.entry(&TTL, &attr, Generation(0));
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn getattr(&self, _req: &Request, ino: INodeNo, _fh: Option<FileHandle>, reply: ReplyAttr) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("getattr", path_str(&path));
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => reply.attr(&TTL, &self.attr_from_response(ino, &resp)),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn readlink(&self, _req: &Request, ino: INodeNo, reply: ReplyData) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("readlink", path_str(&path));
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => match resp.decode_buf() {
                Ok(mut buf) => {
                    // Low-level readlink has no kernel-visible size limit
                    // on this binding; PATH_MAX is a conservative bound on
                    // a link target's length.
                    buf.truncate(libc::PATH_MAX as usize - 1);
                    reply.data(&buf);
                }
                Err(_) => reply.error(Errno::EIO),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn open(&self, _req: &Request, ino: INodeNo, flags: OpenFlags, reply: ReplyOpen) {
        self.open_common(ino, "open", flags, reply);
    }

    fn opendir(&self, _req: &Request, ino: INodeNo, flags: OpenFlags, reply: ReplyOpen) {
        self.open_common(ino, "opendir", flags, reply);
    }

    fn read(
        &self,
        _req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        offset: u64,
        size: u32,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("read", path_str(&path))
            .with_size(size as u64)
            .with_offset(offset as i64)
            .with_fh(fh.0);

        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => match resp.decode_buf() {
                Ok(mut buf) => {
                    // An over-long response is truncated to what the
                    // kernel asked for, never treated as a protocol error.
                    buf.truncate(size as usize);
                    reply.data(&buf);
                }
                Err(_) => reply.error(Errno::EIO),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn write(
        &self,
        _req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        offset: u64,
        data: &[u8],
        _write_flags: WriteFlags,
        flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("write", path_str(&path))
            .with_buf(data)
            .with_offset(offset as i64)
            .with_fh(fh.0)
            .with_flags(flags.0);

        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                let written = resp.size.unwrap_or(0).min(data.len() as u64);
                reply.written(written as u32);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn release(
        &self,
        _req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.release_common(ino, "release", fh, reply);
    }

    fn releasedir(&self, _req: &Request, ino: INodeNo, fh: FileHandle, _flags: OpenFlags, reply: ReplyEmpty) {
        self.release_common(ino, "releasedir", fh, reply);
    }

    fn readdir(&self, _req: &Request, ino: INodeNo, fh: FileHandle, offset: u64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("readdir", path_str(&path))
            .with_offset(offset as i64)
            .with_fh(fh.0);

        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                let entries = resp.entries.unwrap_or_default();
                for (i, name) in entries.iter().enumerate() {
                    let next_offset = offset + i as u64 + 1;
                    let (child_ino, _) = match self.inodes.resolve(ino, OsStr::new(name)) {
                        Some(pair) => pair,
                        None => continue,
                    };
                    // Peer does not report per-entry kind; attributes are
                    // fetched lazily on the subsequent lookup/getattr.
                    if reply.add(INodeNo(child_ino), next_offset, FileType::RegularFile, OsStr::new(name)) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn setattr(
        &self,
        _req: &Request,
        ino: INodeNo,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<FileHandle>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<BsdFileFlags>,
        reply: ReplyAttr,
    ) {
        let Some(size) = size else {
            // Only the size-bearing case round-trips to the peer as a
            // truncate; every other attribute change has no peer verb and
            // is a no-op success, matching a read-only-metadata peer.
            match self.path_for(ino) {
                Some(path) => match self.multiplexer.call(WireRequest::bare("getattr", path_str(&path))) {
                    Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
                    Ok(resp) => reply.attr(&TTL, &self.attr_from_response(ino, &resp)),
                    Err(err) => reply.error(err.to_errno()),
                },
                None => reply.error(Errno::ENOENT),
            }
            return;
        };

        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("truncate", path_str(&path)).with_size(size);
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(_) => match self.multiplexer.call(WireRequest::bare("getattr", path_str(&path))) {
                Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
                Ok(resp) => reply.attr(&TTL, &self.attr_from_response(ino, &resp)),
                Err(err) => reply.error(err.to_errno()),
            },
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn unlink(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEmpty) {
        let Some((_, path)) = self.inodes.resolve(parent, name) else {
            reply.error(Errno::ENOENT);
            return;
        };

        match self.multiplexer.call(WireRequest::bare("unlink", path_str(&path))) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(_) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn mkdir(
        &self,
        _req: &Request,
        parent: INodeNo,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        self.create_common("mkdir", parent, name, mode, reply);
    }

    fn mknod(
        &self,
        _req: &Request,
        parent: INodeNo,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        self.create_common("mknod", parent, name, mode, reply);
    }

    fn create(
        &self,
        _req: &Request,
        parent: INodeNo,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some((ino, path)) = self.inodes.resolve(parent, name) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare("create", path_str(&path))
            .with_mode(mode)
            .with_flags(flags);

        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                // `fh` is optional in the create response; a missing one
                // just means "no meaningful handle", not an error.
                let fh = resp.fh.unwrap_or(0);
                let attr = self.attr_from_response(INodeNo(ino), &resp);
                reply.created(&TTL, &attr, Generation(0), FileHandle(fh), FopenFlags::empty());
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }
}

impl Bridge {
    fn release_common(&self, ino: INodeNo, op: &'static str, fh: FileHandle, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare(op, path_str(&path)).with_fh(fh.0);
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(_) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn create_common(&self, op: &'static str, parent: INodeNo, name: &OsStr, mode: u32, reply: ReplyEntry) {
        let Some((ino, path)) = self.inodes.resolve(parent, name) else {
            reply.error(Errno::ENOENT);
            return;
        };

        let request = WireRequest::bare(op, path_str(&path)).with_mode(mode);
        match self.multiplexer.call(request) {
            Ok(resp) if resp.is_error() => reply.error(errno_from_raw(resp.error)),
            Ok(resp) => {
                let attr = self.attr_from_response(INodeNo(ino), &resp);
                reply.entry(&TTL, &attr, Generation(0));
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }
}

fn path_str(path: &std::path::Path) -> String {
    match path.to_str() {
        Some(s) => s.to_string(),
        None => {
            warn!("non-UTF8 path {path:?}, lossily converting");
            path.to_string_lossy().into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::LoopbackSender;

    fn bridge() -> Bridge {
        let mux = Multiplexer::new(Arc::new(LoopbackSender::new()));
        Bridge::new(Arc::new(mux))
    }

    #[test]
    fn attr_from_response_picks_directory_kind_from_mode_bits() {
        let b = bridge();
        let resp = Response {
            st_mode: Some(libc::S_IFDIR | 0o755),
            st_nlink: Some(2),
            st_size: Some(0),
            ..Default::default()
        };
        let attr = b.attr_from_response(INodeNo::ROOT, &resp);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
    }

    #[test]
    fn attr_from_response_defaults_to_regular_file() {
        let b = bridge();
        let resp = Response {
            st_mode: Some(0o100644),
            st_size: Some(13),
            ..Default::default()
        };
        let attr = b.attr_from_response(INodeNo(2), &resp);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.size, 13);
    }
}
