use super::{Checksum, Chunk, HashKind, RemoteObject, RemoteStore, RemoteStream};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct MemObject {
    data: Arc<Vec<u8>>,
    checksum: Option<Checksum>,
}

#[derive(Default)]
struct Faults {
    fail_opens: usize,
    fail_reads: usize,
    // path -> offset of a byte flipped on delivery
    corrupt: HashMap<String, u64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Shared {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    faults: Mutex<Faults>,
}

impl Shared {
    fn take_fault(&self, read: bool) -> bool {
        let mut f = lock(&self.faults);
        let n = if read { &mut f.fail_reads } else { &mut f.fail_opens };
        if *n > 0 {
            *n -= 1;
            true
        } else {
            false
        }
    }
}

/// In-memory object store. Streams never return more than `chunk` bytes per read, and the
/// store can be told to fail opens or reads, or to corrupt a byte on its way out.
pub struct MemStore {
    chunk: usize,
    objects: Mutex<HashMap<String, MemObject>>,
    shared: Arc<Shared>,
}

impl MemStore {
    pub fn new(chunk: usize) -> Self {
        Self {
            chunk: chunk.max(1),
            objects: Mutex::new(HashMap::new()),
            shared: Arc::new(Shared::default()),
        }
    }

    /// store `data` under `path`, hashing it with `kind` when given
    pub fn put(&self, path: &str, data: &[u8], kind: Option<HashKind>) -> RemoteObject {
        let checksum = kind.map(|k| Checksum::compute(k, data));
        self.put_with_checksum(path, data, checksum)
    }

    pub fn put_with_checksum(&self, path: &str, data: &[u8], checksum: Option<Checksum>) -> RemoteObject {
        let obj = RemoteObject::new(path, data.len() as u64, checksum.clone());
        let entry = MemObject {
            data: Arc::new(data.to_vec()),
            checksum,
        };
        lock(&self.objects).insert(path.to_string(), entry);
        obj
    }

    pub fn fail_next_opens(&self, n: usize) {
        lock(&self.shared.faults).fail_opens = n;
    }

    pub fn fail_next_reads(&self, n: usize) {
        lock(&self.shared.faults).fail_reads = n;
    }

    pub fn corrupt_byte(&self, path: &str, offset: u64) {
        lock(&self.shared.faults).corrupt.insert(path.to_string(), offset);
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// streams opened and not yet closed
    pub fn live_streams(&self) -> usize {
        self.opens() - self.closes()
    }

    pub fn reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }
}

impl RemoteStore for MemStore {
    fn list(&self) -> Result<Vec<RemoteObject>> {
        let objects = lock(&self.objects);
        let mut v: Vec<RemoteObject> = objects
            .iter()
            .map(|(k, o)| RemoteObject::new(k.as_str(), o.data.len() as u64, o.checksum.clone()))
            .collect();
        v.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(v)
    }

    fn stat(&self, path: &str) -> Result<RemoteObject> {
        let objects = lock(&self.objects);
        let o = objects.get(path).ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(RemoteObject::new(path, o.data.len() as u64, o.checksum.clone()))
    }

    fn open_at(&self, obj: &RemoteObject, offset: u64) -> Result<Box<dyn RemoteStream>> {
        if self.shared.take_fault(false) {
            return Err(Error::transient(
                obj.path.as_str(),
                io::Error::new(io::ErrorKind::ConnectionRefused, "injected open failure"),
            ));
        }
        let data = {
            let objects = lock(&self.objects);
            let o = objects
                .get(&obj.path)
                .ok_or_else(|| Error::NotFound(obj.path.clone()))?;
            o.data.clone()
        };
        let corrupt = lock(&self.shared.faults).corrupt.get(&obj.path).copied();
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemStream {
            shared: self.shared.clone(),
            path: obj.path.clone(),
            pos: offset.min(data.len() as u64),
            data,
            chunk: self.chunk,
            corrupt,
            closed: false,
        }))
    }
}

struct MemStream {
    shared: Arc<Shared>,
    path: String,
    data: Arc<Vec<u8>>,
    pos: u64,
    chunk: usize,
    corrupt: Option<u64>,
    closed: bool,
}

impl RemoteStream for MemStream {
    fn read(&mut self, max: usize) -> Result<Chunk> {
        if self.closed {
            return Err(Error::transient(
                self.path.as_str(),
                io::Error::new(io::ErrorKind::NotConnected, "stream closed"),
            ));
        }
        if self.shared.take_fault(true) {
            return Err(Error::transient(
                self.path.as_str(),
                io::Error::new(io::ErrorKind::ConnectionReset, "injected read failure"),
            ));
        }
        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        let len = self.data.len() as u64;
        let n = (len - self.pos).min(max.min(self.chunk) as u64);
        let start = self.pos as usize;
        let mut out = self.data[start..start + n as usize].to_vec();
        if let Some(off) = self.corrupt {
            if off >= self.pos && off < self.pos + n {
                out[(off - self.pos) as usize] ^= 0xff;
            }
        }
        self.pos += n;
        Ok(Chunk {
            data: out,
            eof: self.pos == len,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemStream {
    fn drop(&mut self) {
        self.close();
    }
}
