use crate::error::{Error, Result};
use crate::remote::{Chunk, RemoteObject, RemoteStore, RemoteStream};
use std::io;
use std::sync::Arc;

/// consecutive empty, non-final reads tolerated before a stream counts as stalled
const MAX_EMPTY_READS: usize = 8;
/// largest read issued while skipping a forward gap
const SKIP_CHUNK: u64 = 64 << 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Reuse,
    /// read and drop this many bytes from the open stream
    Discard(u64),
    Reopen,
}

/// What to do with a stream sitting at `current` (None when no stream is open) to serve a
/// read at `target`. Forward gaps up to `gap` are cheaper to read through than to reopen.
pub fn decide(current: Option<u64>, target: u64, gap: u64) -> StreamAction {
    match current {
        Some(cur) if cur == target => StreamAction::Reuse,
        Some(cur) if cur < target && target - cur <= gap => StreamAction::Discard(target - cur),
        _ => StreamAction::Reopen,
    }
}

/// Owns at most one remote stream for a handle and knows which object offset its next byte
/// belongs to. Any stream error drops the stream, the next request opens a fresh one.
pub struct StreamManager {
    store: Arc<dyn RemoteStore>,
    object: Arc<RemoteObject>,
    skip_gap: u64,
    stream: Option<Box<dyn RemoteStream>>,
    offset: u64,
    opened: u64,
}

impl StreamManager {
    pub fn new(store: Arc<dyn RemoteStore>, object: Arc<RemoteObject>, skip_gap: u64) -> Self {
        Self {
            store,
            object,
            skip_gap,
            stream: None,
            offset: 0,
            opened: 0,
        }
    }

    /// offset of the next byte the open stream yields
    pub fn position(&self) -> Option<u64> {
        self.stream.as_ref().map(|_| self.offset)
    }

    /// how many streams this manager has opened so far
    pub fn opened(&self) -> u64 {
        self.opened
    }

    pub fn ensure_at(&mut self, offset: u64) -> Result<()> {
        match decide(self.position(), offset, self.skip_gap) {
            StreamAction::Reuse => Ok(()),
            StreamAction::Discard(n) => {
                log::debug!("{} skip {} bytes from {} to {}", self.object.path, n, self.offset, offset);
                match self.skip(n) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        log::debug!("{} skip failed, reopen at {}: {}", self.object.path, offset, e);
                        self.reopen(offset)
                    }
                }
            }
            StreamAction::Reopen => self.reopen(offset),
        }
    }

    fn reopen(&mut self, offset: u64) -> Result<()> {
        if let Some(cur) = self.position() {
            log::debug!("{} reopen stream at {} (was at {})", self.object.path, offset, cur);
        }
        self.discard();
        let s = self.store.open_at(&self.object, offset).map_err(|e| {
            log::warn!("open {} at {} failed: {}", self.object.path, offset, e);
            e
        })?;
        self.stream = Some(s);
        self.offset = offset;
        self.opened += 1;
        Ok(())
    }

    fn skip(&mut self, mut n: u64) -> Result<()> {
        let mut empty = 0;
        while n > 0 {
            let c = self.read(n.min(SKIP_CHUNK) as usize)?;
            if c.data.is_empty() {
                if c.eof {
                    break;
                }
                self.stalled(&mut empty)?;
                continue;
            }
            empty = 0;
            n -= c.data.len() as u64;
        }
        Ok(())
    }

    fn stalled(&mut self, empty: &mut usize) -> Result<()> {
        *empty += 1;
        if *empty < MAX_EMPTY_READS {
            return Ok(());
        }
        let e = Error::transient(
            self.object.path.as_str(),
            io::Error::new(io::ErrorKind::TimedOut, "stream stalled"),
        );
        self.discard();
        Err(e)
    }

    /// one remote read of at most `max` bytes, may come back short
    pub fn read(&mut self, max: usize) -> Result<Chunk> {
        let path = self.object.path.as_str();
        let Some(s) = self.stream.as_mut() else {
            return Err(Error::transient(
                path,
                io::Error::new(io::ErrorKind::NotConnected, "no open stream"),
            ));
        };
        let remain = self.object.size - self.offset.min(self.object.size);
        let mut c = match s.read(max.min(remain as usize)) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("read {} at {} failed: {}", path, self.offset, e);
                self.discard();
                return Err(e);
            }
        };
        c.data.truncate(remain as usize);
        self.offset += c.data.len() as u64;
        if c.eof && self.offset < self.object.size {
            let e = Error::transient(
                self.object.path.as_str(),
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended at {} of {}", self.offset, self.object.size),
                ),
            );
            self.discard();
            return Err(e);
        }
        c.eof = self.offset == self.object.size;
        Ok(c)
    }

    /// Read exactly `len` bytes (fewer only at the end of the object), looping over short
    /// remote reads. On error nothing is returned and the stream is gone.
    pub fn fill(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut empty = 0;
        while out.len() < len {
            let c = self.read(len - out.len())?;
            if c.data.is_empty() {
                if c.eof {
                    break;
                }
                self.stalled(&mut empty)?;
                continue;
            }
            empty = 0;
            out.extend_from_slice(&c.data);
            if c.eof {
                break;
            }
        }
        Ok(out)
    }

    /// close and forget the open stream, if any
    pub fn discard(&mut self) {
        if let Some(mut s) = self.stream.take() {
            s.close();
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.discard();
    }
}
