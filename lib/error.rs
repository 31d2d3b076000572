use libc::{EBADF, EIO, ENOENT};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// remote open or read failed, the caller may retry the same operation
    #[error("remote io on {path}: {source}")]
    Transient {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// a complete sequential read did not hash to the declared checksum
    #[error("checksum mismatch on {path}: expected {expected} got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    /// the caller used a handle in a way its lifecycle forbids
    #[error("handle misuse on {path}: {what}")]
    Misuse { path: String, what: &'static str },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("bad metadata for {path}: {reason}")]
    Meta { path: String, reason: String },
}

impl Error {
    pub fn transient<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Error::Transient {
            path: path.into(),
            source,
        }
    }

    pub fn misuse<P: Into<String>>(path: P, what: &'static str) -> Self {
        Error::Misuse {
            path: path.into(),
            what,
        }
    }

    pub fn meta<P: Into<String>, R: ToString>(path: P, reason: R) -> Self {
        Error::Meta {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// errno replied to the kernel for this error
    pub fn errno(&self) -> libc::c_int {
        match self {
            Error::Transient { .. } | Error::Integrity { .. } | Error::Meta { .. } => EIO,
            Error::Misuse { .. } => EBADF,
            Error::NotFound(_) => ENOENT,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use std::io;

    #[test]
    fn test_errno() {
        let e = Error::transient("a", io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(e.is_transient());
        assert_eq!(e.errno(), libc::EIO);
        assert_eq!(Error::misuse("a", "double release").errno(), libc::EBADF);
        assert_eq!(Error::NotFound("a".into()).errno(), libc::ENOENT);
        assert!(e.to_string().contains("slow"));
    }
}
