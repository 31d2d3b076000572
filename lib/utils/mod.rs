mod bitmap;

pub use bitmap::BitMap;

/// largest single read a remote stream hands back by default
pub const FS_CHUNK_SIZE: u64 = 128 << 10;
pub const FS_BLK_SIZE: u64 = 4096;
/// forward gaps up to this size are skipped by reading and dropping bytes
pub const FS_SKIP_GAP: u64 = 64 << 10;
pub const FS_MAX_HANDLES: u64 = 8192;

pub const FS_ROOT_INODE: u64 = 1;

pub const fn align_up(size: u64, align: u64) -> u64 {
    (size + (align - 1)) & !(align - 1)
}
