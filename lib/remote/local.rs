use super::{Checksum, Chunk, HashKind, Hasher, RemoteObject, RemoteStore, RemoteStream};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const META_SUFFIX: &str = ".meta";

/// sidecar stored next to every object as `<name>.meta`
#[derive(Serialize, Deserialize, Debug)]
struct ObjectMeta {
    size: u64,
    checksum: Option<Checksum>,
}

/// A directory of objects standing in for a remote bucket. Objects are plain files, their
/// declared checksum lives in a bincode sidecar; an object without a sidecar has no checksum.
pub struct LocalStore {
    root: PathBuf,
    chunk: usize,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P, chunk: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let path = root.to_string_lossy().to_string();
        match std::fs::metadata(&root) {
            Ok(m) if m.is_dir() => Ok(Self {
                root,
                chunk: chunk.max(1),
            }),
            Ok(_) => Err(Error::meta(path, "not a directory")),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(path)),
            Err(e) => Err(Error::transient(path, e)),
        }
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') || name.ends_with(META_SUFFIX) {
            return Err(Error::meta(name, "invalid object name"));
        }
        Ok(())
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, META_SUFFIX))
    }

    pub fn put(&self, name: &str, data: &[u8], kind: Option<HashKind>) -> Result<RemoteObject> {
        self.put_reader(name, data, kind)
    }

    /// copy everything from `src` into object `name`, hashing on the way
    pub fn put_reader<R: Read>(&self, name: &str, mut src: R, kind: Option<HashKind>) -> Result<RemoteObject> {
        Self::check_name(name)?;
        let dst = self.data_path(name);
        let mut fp = File::create(&dst).map_err(|e| Error::transient(name, e))?;
        let mut hasher = kind.map(Hasher::new);
        let mut buf = vec![0u8; self.chunk];
        let mut size = 0u64;
        loop {
            let n = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::transient(name, e)),
            };
            fp.write_all(&buf[..n]).map_err(|e| Error::transient(name, e))?;
            if let Some(h) = hasher.as_mut() {
                h.update(&buf[..n]);
            }
            size += n as u64;
        }
        fp.sync_all().map_err(|e| Error::transient(name, e))?;

        let meta = ObjectMeta {
            size,
            checksum: hasher.map(Hasher::finish),
        };
        let raw = bincode::serialize(&meta).map_err(|e| Error::meta(name, e))?;
        std::fs::write(self.meta_path(name), raw).map_err(|e| Error::transient(name, e))?;
        log::info!("put {} size {} checksum {:?}", name, size, meta.checksum);
        Ok(RemoteObject::new(name, size, meta.checksum))
    }

    fn load_meta(&self, name: &str, size: u64) -> Result<Option<Checksum>> {
        let raw = match std::fs::read(self.meta_path(name)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::transient(name, e)),
        };
        let meta = bincode::deserialize::<ObjectMeta>(&raw).map_err(|e| Error::meta(name, e))?;
        if meta.size != size {
            return Err(Error::meta(
                name,
                format!("sidecar says {} bytes, object has {}", meta.size, size),
            ));
        }
        Ok(meta.checksum)
    }
}

impl RemoteStore for LocalStore {
    fn list(&self) -> Result<Vec<RemoteObject>> {
        let dir = std::fs::read_dir(&self.root).map_err(|e| Error::transient(self.root.to_string_lossy(), e))?;
        let mut r = Vec::new();
        for ent in dir {
            let ent = ent.map_err(|e| Error::transient(self.root.to_string_lossy(), e))?;
            let name = ent.file_name().to_string_lossy().to_string();
            if Self::check_name(&name).is_err() {
                continue;
            }
            match self.stat(&name) {
                Ok(obj) => r.push(obj),
                // a directory or a half written object
                Err(e) => log::warn!("skip {} error {}", name, e),
            }
        }
        r.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(r)
    }

    fn stat(&self, path: &str) -> Result<RemoteObject> {
        Self::check_name(path)?;
        let m = match std::fs::metadata(self.data_path(path)) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::NotFound(path.to_string())),
            Err(e) => return Err(Error::transient(path, e)),
        };
        if !m.is_file() {
            return Err(Error::meta(path, "not a regular file"));
        }
        let checksum = self.load_meta(path, m.len())?;
        Ok(RemoteObject::new(path, m.len(), checksum))
    }

    fn open_at(&self, obj: &RemoteObject, offset: u64) -> Result<Box<dyn RemoteStream>> {
        let mut fp = File::open(self.data_path(&obj.path)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(obj.path.clone()),
            _ => Error::transient(obj.path.as_str(), e),
        })?;
        let pos = fp
            .seek(SeekFrom::Start(offset.min(obj.size)))
            .map_err(|e| Error::transient(obj.path.as_str(), e))?;
        log::debug!("open {} at {}", obj.path, pos);
        Ok(Box::new(LocalStream {
            fp: Some(fp),
            path: obj.path.clone(),
            pos,
            size: obj.size,
            chunk: self.chunk,
        }))
    }
}

struct LocalStream {
    fp: Option<File>,
    path: String,
    pos: u64,
    size: u64,
    chunk: usize,
}

impl RemoteStream for LocalStream {
    fn read(&mut self, max: usize) -> Result<Chunk> {
        let Some(fp) = self.fp.as_mut() else {
            return Err(Error::transient(
                self.path.as_str(),
                std::io::Error::new(ErrorKind::NotConnected, "stream closed"),
            ));
        };
        let want = (self.size - self.pos.min(self.size)).min(max.min(self.chunk) as u64) as usize;
        let mut data = vec![0u8; want];
        let n = loop {
            match fp.read(&mut data) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::transient(self.path.as_str(), e)),
            }
        };
        if n == 0 && want > 0 {
            // the file shrank underneath us
            return Err(Error::transient(
                self.path.as_str(),
                std::io::Error::new(ErrorKind::UnexpectedEof, "object truncated"),
            ));
        }
        data.truncate(n);
        self.pos += n as u64;
        Ok(Chunk {
            data,
            eof: self.pos >= self.size,
        })
    }

    fn close(&mut self) {
        if self.fp.take().is_some() {
            log::debug!("close {} at {}", self.path, self.pos);
        }
    }
}
