use crate::config::Config;
use crate::error::Result;
use crate::handle::{ReadFileHandle, Verdict};
use crate::remote::{RemoteObject, RemoteStore};
use crate::utils::{align_up, BitMap, FS_BLK_SIZE, FS_MAX_HANDLES, FS_ROOT_INODE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use libc::{EFAULT, ENOENT, ENOTDIR, EROFS};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

const TTL: Duration = Duration::new(1, 0);

struct DirEntry {
    ino: u64,
    kind: FileType,
    name: String,
}

/// Read only view of a remote store: every object is a regular file directly under the root,
/// numbered from 2 in path order when the filesystem is created.
pub struct Fs {
    store: Arc<dyn RemoteStore>,
    skip_gap: u64,
    objects: Vec<Arc<RemoteObject>>,
    names: HashMap<String, u64>,
    mounted: SystemTime,
    uid: u32,
    gid: u32,
    file_handles: Mutex<HashMap<u64, Arc<ReadFileHandle>>>,
    dir_handles: Mutex<HashMap<u64, Vec<DirEntry>>>,
    hmap: Mutex<BitMap>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Fs {
    pub fn new(store: Arc<dyn RemoteStore>, cfg: &Config) -> Result<Self> {
        let mut objects = store.list()?;
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        let mut names = HashMap::with_capacity(objects.len());
        for (i, o) in objects.iter().enumerate() {
            names.insert(o.path.clone(), FS_ROOT_INODE + 1 + i as u64);
        }
        log::info!("loaded {} objects", objects.len());

        // SAFETY: getuid and getgid can not fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Ok(Self {
            store,
            skip_gap: cfg.skip_gap,
            objects: objects.into_iter().map(Arc::new).collect(),
            names,
            mounted: SystemTime::now(),
            uid,
            gid,
            file_handles: Mutex::new(HashMap::new()),
            dir_handles: Mutex::new(HashMap::new()),
            hmap: Mutex::new(BitMap::new(FS_MAX_HANDLES)),
        })
    }

    fn object(&self, ino: u64) -> Option<&Arc<RemoteObject>> {
        if ino <= FS_ROOT_INODE {
            return None;
        }
        self.objects.get((ino - FS_ROOT_INODE - 1) as usize)
    }

    fn attr(&self, ino: u64) -> Option<FileAttr> {
        let (kind, size, perm, nlink) = if ino == FS_ROOT_INODE {
            (FileType::Directory, 0, 0o555, 2)
        } else {
            (FileType::RegularFile, self.object(ino)?.size, 0o444, 1)
        };
        Some(FileAttr {
            ino,
            size,
            blocks: align_up(size, FS_BLK_SIZE) / 512,
            atime: self.mounted,
            mtime: self.mounted,
            ctime: self.mounted,
            crtime: self.mounted,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: FS_BLK_SIZE as u32,
            flags: 0,
        })
    }

    fn lookup_name(&self, parent: u64, name: &str) -> std::result::Result<FileAttr, i32> {
        if parent != FS_ROOT_INODE {
            return Err(ENOTDIR);
        }
        let ino = match name {
            "." | ".." => FS_ROOT_INODE,
            _ => *self.names.get(name).ok_or(ENOENT)?,
        };
        self.attr(ino).ok_or(ENOENT)
    }

    fn open_file(&self, ino: u64, flags: i32) -> std::result::Result<u64, i32> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(EROFS);
        }
        let obj = self.object(ino).ok_or(ENOENT)?.clone();
        let fh = lock(&self.hmap).alloc().ok_or_else(|| {
            log::warn!("out of file handles opening {}", obj.path);
            EFAULT
        })?;
        log::debug!("open {} fh {}", obj.path, fh);
        let h = ReadFileHandle::open(self.store.clone(), obj, self.skip_gap);
        lock(&self.file_handles).insert(fh, Arc::new(h));
        Ok(fh)
    }

    fn read_file(&self, fh: u64, offset: i64, size: u32) -> std::result::Result<Vec<u8>, i32> {
        if offset < 0 {
            return Err(libc::EINVAL);
        }
        let h = lock(&self.file_handles).get(&fh).cloned().ok_or(libc::EBADF)?;
        h.read_at(offset as u64, size as usize).map_err(|e| {
            log::warn!("read fh {} at {} len {} fail: {}", fh, offset, size, e);
            e.errno()
        })
    }

    fn release_file(&self, fh: u64) -> std::result::Result<Option<Verdict>, i32> {
        let h = lock(&self.file_handles).remove(&fh).ok_or(libc::EBADF)?;
        lock(&self.hmap).del(fh);
        h.release().map_err(|e| {
            log::error!("release fh {} fail: {}", fh, e);
            e.errno()
        })
    }

    fn open_dir(&self, ino: u64) -> std::result::Result<u64, i32> {
        if ino != FS_ROOT_INODE {
            return Err(ENOTDIR);
        }
        let fh = lock(&self.hmap).alloc().ok_or(EFAULT)?;
        let mut entries = Vec::with_capacity(self.objects.len() + 2);
        for name in [".", ".."] {
            entries.push(DirEntry {
                ino: FS_ROOT_INODE,
                kind: FileType::Directory,
                name: name.to_string(),
            });
        }
        for (i, o) in self.objects.iter().enumerate() {
            entries.push(DirEntry {
                ino: FS_ROOT_INODE + 1 + i as u64,
                kind: FileType::RegularFile,
                name: o.path.clone(),
            });
        }
        lock(&self.dir_handles).insert(fh, entries);
        Ok(fh)
    }

    fn release_dir(&self, fh: u64) {
        lock(&self.dir_handles).remove(&fh);
        lock(&self.hmap).del(fh);
    }
}

impl Filesystem for Fs {
    fn init(&mut self, _req: &Request<'_>, _cfg: &mut KernelConfig) -> std::result::Result<(), libc::c_int> {
        log::info!("mounted with {} objects, skip gap {}", self.objects.len(), self.skip_gap);
        Ok(())
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_name(parent, &name.to_string_lossy()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.attr(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_file(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_file(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.release_file(fh) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_dir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let dirs = lock(&self.dir_handles);
        let Some(entries) = dirs.get(&fh) else {
            reply.error(ENOENT);
            return;
        };
        for (i, e) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(e.ino, (i + 1) as i64, e.kind, &e.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.release_dir(fh);
        reply.ok();
    }
}

impl Drop for Fs {
    fn drop(&mut self) {
        let handles: Vec<(u64, Arc<ReadFileHandle>)> = lock(&self.file_handles).drain().collect();
        for (fh, h) in handles {
            log::warn!("fh {} of {} still open at unmount", fh, h.object().path);
            if let Err(e) = h.release() {
                log::error!("release fh {} fail: {}", fh, e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Fs;
    use crate::config::Config;
    use crate::handle::Verdict;
    use crate::remote::{HashKind, MemStore, RemoteStore};
    use crate::utils::FS_ROOT_INODE;
    use fuser::FileType;
    use std::sync::Arc;

    fn fs() -> (Arc<MemStore>, Fs) {
        let store = Arc::new(MemStore::new(4));
        store.put("b.txt", b"hellohello", Some(HashKind::Md5));
        store.put("a.txt", b"abc", None);
        let dyn_store: Arc<dyn RemoteStore> = store.clone();
        let fs = Fs::new(dyn_store, &Config::default()).unwrap();
        (store, fs)
    }

    #[test]
    fn test_namespace() {
        let (_, fs) = fs();
        let a = fs.lookup_name(FS_ROOT_INODE, "a.txt").unwrap();
        let b = fs.lookup_name(FS_ROOT_INODE, "b.txt").unwrap();
        assert_eq!((a.ino, a.size), (2, 3));
        assert_eq!((b.ino, b.size), (3, 10));
        assert_eq!(b.kind, FileType::RegularFile);
        assert_eq!(b.perm, 0o444);
        assert_eq!(fs.lookup_name(FS_ROOT_INODE, "..").unwrap().kind, FileType::Directory);
        assert_eq!(fs.lookup_name(FS_ROOT_INODE, "c.txt").err(), Some(libc::ENOENT));
        assert_eq!(fs.lookup_name(2, "a.txt").err(), Some(libc::ENOTDIR));
        assert!(fs.attr(4).is_none());
        assert!(fs.attr(0).is_none());

        let fh = fs.open_dir(FS_ROOT_INODE).unwrap();
        let names: Vec<String> = fs.dir_handles.lock().unwrap()[&fh]
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, [".", "..", "a.txt", "b.txt"]);
        fs.release_dir(fh);
        assert!(fs.hmap.lock().unwrap().is_empty());
    }

    #[test]
    fn test_open_read_release() {
        let (store, fs) = fs();
        assert_eq!(fs.open_file(3, libc::O_WRONLY).err(), Some(libc::EROFS));
        assert_eq!(fs.open_file(3, libc::O_RDWR).err(), Some(libc::EROFS));
        assert_eq!(fs.open_file(9, libc::O_RDONLY).err(), Some(libc::ENOENT));

        let fh = fs.open_file(3, libc::O_RDONLY).unwrap();
        assert_eq!(fs.read_file(fh, 0, 4).unwrap(), b"hell");
        assert_eq!(fs.read_file(fh, 4, 100).unwrap(), b"ohello");
        assert!(fs.read_file(fh, 10, 4).unwrap().is_empty());
        assert!(matches!(fs.release_file(fh), Ok(Some(Verdict::Verified(_)))));
        assert_eq!(fs.release_file(fh).err(), Some(libc::EBADF));
        assert_eq!(fs.read_file(fh, 0, 1).err(), Some(libc::EBADF));
        assert_eq!(store.live_streams(), 0);
    }

    #[test]
    fn test_corrupt_release_is_eio() {
        let (store, fs) = fs();
        store.corrupt_byte("b.txt", 0);
        let fh = fs.open_file(3, libc::O_RDONLY).unwrap();
        assert_eq!(fs.read_file(fh, 0, 10).unwrap().len(), 10);
        assert_eq!(fs.release_file(fh).err(), Some(libc::EIO));
    }

    #[test]
    fn test_drop_releases_open_handles() {
        let (store, fs) = fs();
        let fh = fs.open_file(2, libc::O_RDONLY).unwrap();
        assert_eq!(fs.read_file(fh, 1, 1).unwrap(), b"b");
        assert_eq!(store.live_streams(), 1);
        drop(fs);
        assert_eq!(store.live_streams(), 0);
    }
}
