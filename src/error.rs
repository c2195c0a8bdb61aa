use fuser::Errno;

/// Failures internal to the bridge that do not map cleanly onto a single
/// FUSE callback's reply. Transport and protocol errors are turned into
/// `fail_all`/process-exit actions higher up rather than a per-call errno.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport not connected")]
    NotConnected,
    #[error("request exceeds transport frame limit ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("peer connection closed")]
    ConnectionClosed,
    #[error("malformed response from peer: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Collapses a transport/protocol failure to the errno a blocked
    /// FUSE call should see. Used by `Multiplexer::fail_all` and by
    /// callers that give up waiting on a dead transport.
    pub fn to_errno(&self) -> Errno {
        match self {
            BridgeError::FrameTooLarge(_) => Errno::EMSGSIZE,
            _ => Errno::EIO,
        }
    }
}

/// Maps an arbitrary peer-supplied errno integer (the peer's `error` field
/// is a raw positive errno number, not validated against any fixed set)
/// onto the `fuser::Errno` the FUSE reply actually needs. Unknown values
/// fall back to `EIO` rather than panicking, since a misbehaving peer must
/// not be able to crash the bridge.
pub fn errno_from_raw(raw: i32) -> Errno {
    match raw {
        libc::EPERM => Errno::EPERM,
        libc::ENOENT => Errno::ENOENT,
        libc::EIO => Errno::EIO,
        libc::EBADF => Errno::EBADF,
        libc::EACCES => Errno::EACCES,
        libc::EEXIST => Errno::EEXIST,
        libc::EINVAL => Errno::EINVAL,
        libc::ENOTEMPTY => Errno::ENOTEMPTY,
        libc::ENAMETOOLONG => Errno::ENAMETOOLONG,
        libc::ENOSYS => Errno::ENOSYS,
        libc::ERANGE => Errno::ERANGE,
        libc::EFBIG => Errno::EFBIG,
        _ => Errno::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_raw_errno_falls_back_to_eio() {
        assert_eq!(errno_from_raw(i32::MAX).code(), Errno::EIO.code());
    }

    #[test]
    fn known_raw_errno_maps_through() {
        assert_eq!(errno_from_raw(libc::ENOENT).code(), Errno::ENOENT.code());
    }

    #[test]
    fn frame_too_large_maps_to_emsgsize() {
        assert_eq!(BridgeError::FrameTooLarge(2_000_000).to_errno().code(), Errno::EMSGSIZE.code());
    }
}
