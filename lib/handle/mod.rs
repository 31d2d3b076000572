//! Read path file handle.
//!
//! A [`ReadFileHandle`] is what one kernel `open` of a remote object turns into. It serves
//! random access reads from forward only remote streams, remembers whether everything handed
//! out so far was one gap free run from offset 0, and when the last reference goes away checks
//! that run against the object's declared checksum.
//!
//! Locking: `state` guards the cursor, the stream and the tracker and is held across remote
//! I/O. `refs` only guards the reference count, so dup and non final releases never wait for
//! a slow read. The final release takes `state` as well to close the stream and finalize.

mod cursor;
mod integrity;
mod stream;

pub use cursor::Cursor;
pub use integrity::{IntegrityTracker, SkipReason, Verdict};
pub use stream::{decide, StreamAction, StreamManager};

use crate::error::{Error, Result};
use crate::remote::{RemoteObject, RemoteStore};
use std::io::SeekFrom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct State {
    cursor: Cursor,
    streams: StreamManager,
    tracker: IntegrityTracker,
    finalized: bool,
}

struct Refs {
    count: usize,
    closed: bool,
}

struct Shared {
    object: Arc<RemoteObject>,
    state: Mutex<State>,
    refs: Mutex<Refs>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        log::debug!("drop read handle {}", self.object.path);
    }
}

/// One reference to a shared read handle. [`dup`](Self::dup) hands out more references to
/// the same state, each of which must be released exactly once.
pub struct ReadFileHandle {
    shared: Arc<Shared>,
    released: AtomicBool,
}

impl ReadFileHandle {
    /// Open `object` for reading. Nothing remote happens until the first read.
    pub fn open(store: Arc<dyn RemoteStore>, object: Arc<RemoteObject>, skip_gap: u64) -> Self {
        let kind = object.checksum.as_ref().map(|c| c.kind);
        let state = State {
            cursor: Cursor::new(object.size),
            streams: StreamManager::new(store, object.clone(), skip_gap),
            tracker: IntegrityTracker::new(kind),
            finalized: false,
        };
        log::debug!("open read handle {} size {}", object.path, object.size);
        Self {
            shared: Arc::new(Shared {
                object,
                state: Mutex::new(state),
                refs: Mutex::new(Refs {
                    count: 1,
                    closed: false,
                }),
            }),
            released: AtomicBool::new(false),
        }
    }

    pub fn object(&self) -> &RemoteObject {
        &self.shared.object
    }

    fn path(&self) -> &str {
        &self.shared.object.path
    }

    // state is only ever committed after a successful transfer, a panic mid read leaves it usable
    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refs(&self) -> MutexGuard<'_, Refs> {
        self.shared.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn misuse(&self, what: &'static str) -> Error {
        log::error!("{} on {}", what, self.path());
        Error::misuse(self.path(), what)
    }

    fn live_state(&self) -> Result<MutexGuard<'_, State>> {
        if self.released.load(Ordering::Acquire) {
            return Err(self.misuse("use of a released reference"));
        }
        let st = self.state();
        if st.finalized {
            return Err(self.misuse("use of a closed handle"));
        }
        Ok(st)
    }

    /// Another reference to the same open file.
    pub fn dup(&self) -> Result<ReadFileHandle> {
        if self.released.load(Ordering::Acquire) {
            return Err(self.misuse("dup of a released reference"));
        }
        let mut refs = self.refs();
        if refs.closed {
            return Err(self.misuse("dup of a closed handle"));
        }
        refs.count += 1;
        Ok(ReadFileHandle {
            shared: self.shared.clone(),
            released: AtomicBool::new(false),
        })
    }

    pub fn ref_count(&self) -> usize {
        self.refs().count
    }

    pub fn is_closed(&self) -> bool {
        self.refs().closed
    }

    pub fn position(&self) -> Result<u64> {
        Ok(self.live_state()?.cursor.pos())
    }

    /// bytes read in one run from offset 0, None once the run was broken
    pub fn sequential_bytes(&self) -> Result<Option<u64>> {
        Ok(self.live_state()?.tracker.sequential_bytes())
    }

    /// offset the open remote stream is positioned at, None when there is none
    pub fn stream_position(&self) -> Result<Option<u64>> {
        Ok(self.live_state()?.streams.position())
    }

    /// Move the cursor, clamped into `[0, size]`. The stream is left alone until the next read.
    ///
    /// The cursor is shared by every reference and lives under the same lock as the stream,
    /// so a seek waits for a read in flight on another reference to finish, retries and
    /// reopens included. It then lands after that read rather than in the middle of it.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut st = self.live_state()?;
        Ok(Self::seek_locked(&mut st, pos))
    }

    fn seek_locked(st: &mut State, pos: SeekFrom) -> u64 {
        let from = st.cursor.pos();
        let to = st.cursor.seek(pos);
        if to != from {
            st.tracker.disqualify(SkipReason::Seek { from, to });
        }
        to
    }

    /// Read up to `len` bytes at the cursor. Only the end of the object makes the result
    /// shorter than `len`; on error the cursor has not moved and the read can be retried.
    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        let mut st = self.live_state()?;
        Self::read_locked(&mut st, len)
    }

    /// Positioned read for the kernel: seek to `offset` and read, without letting another
    /// request on the same handle slip in between.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut st = self.live_state()?;
        Self::seek_locked(&mut st, SeekFrom::Start(offset));
        Self::read_locked(&mut st, len)
    }

    fn read_locked(st: &mut State, len: usize) -> Result<Vec<u8>> {
        let pos = st.cursor.pos();
        let want = (len as u64).min(st.cursor.remaining()) as usize;
        if want == 0 {
            return Ok(Vec::new());
        }
        st.streams.ensure_at(pos)?;
        let data = st.streams.fill(want)?;
        st.tracker.observe(pos, &data);
        st.cursor.advance(data.len() as u64);
        Ok(data)
    }

    /// Drop this reference. The call that drops the last one closes the handle and returns
    /// the verification verdict, or an integrity error when the checksum did not match.
    /// Other calls return `Ok(None)`.
    pub fn release(&self) -> Result<Option<Verdict>> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(self.misuse("release of a released reference"));
        }
        {
            let mut refs = self.refs();
            if refs.closed || refs.count == 0 {
                return Err(self.misuse("release of a closed handle"));
            }
            refs.count -= 1;
            if refs.count > 0 {
                log::debug!("release {} refs left {}", self.path(), refs.count);
                return Ok(None);
            }
            refs.closed = true;
        }
        self.finalize().map(Some)
    }

    fn finalize(&self) -> Result<Verdict> {
        let obj = &self.shared.object;
        let mut st = self.state();
        st.finalized = true;
        st.streams.discard();
        let verdict = st.tracker.finalize(obj.size, obj.checksum.as_ref());
        match &verdict {
            Verdict::Verified(sum) => log::info!("{} verified {}", obj.path, sum),
            Verdict::Skipped(reason) => log::info!("{} not verified: {:?}", obj.path, reason),
            Verdict::Mismatch { expected, actual } => {
                log::error!("{} checksum mismatch expected {} got {}", obj.path, expected, actual);
                return Err(Error::Integrity {
                    path: obj.path.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(verdict)
    }
}
