//! Remote object store collaborators.
//!
//! The read handle only ever talks to a store through [`RemoteStore`] and the forward only
//! [`RemoteStream`] it opens. Opening a stream is the expensive part, a stream itself can only
//! move forward and may hand back fewer bytes than asked for at any point in the object.

mod hash;
mod local;
mod memory;
mod retry;

pub use hash::{Checksum, HashKind, Hasher};
pub use local::LocalStore;
pub use memory::MemStore;
pub use retry::Retrying;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Identity, size and declared checksum of one remote object, fixed while a handle is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub path: String,
    pub size: u64,
    pub checksum: Option<Checksum>,
}

impl RemoteObject {
    pub fn new<P: Into<String>>(path: P, size: u64, checksum: Option<Checksum>) -> Self {
        Self {
            path: path.into(),
            size,
            checksum,
        }
    }
}

/// One read from a remote stream. `eof` is only set once the stream has reached the end of
/// the object, a short `data` without `eof` just means "ask again".
#[derive(Debug, Default)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub eof: bool,
}

pub trait RemoteStream: Send {
    fn read(&mut self, max: usize) -> Result<Chunk>;

    fn close(&mut self);
}

pub trait RemoteStore: Send + Sync {
    fn list(&self) -> Result<Vec<RemoteObject>>;

    fn stat(&self, path: &str) -> Result<RemoteObject>;

    /// open a stream producing `[offset, obj.size)`
    fn open_at(&self, obj: &RemoteObject, offset: u64) -> Result<Box<dyn RemoteStream>>;
}
