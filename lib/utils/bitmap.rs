use super::align_up;

/// Fixed size bit set used to hand out small integer ids (file handle numbers).
/// Bit 0 is never handed out, the kernel treats fh 0 as "no handle".
#[derive(Debug)]
pub struct BitMap {
    data: Vec<u8>,
    size: u64,
    count: u64,
    hint: u64,
}

impl BitMap {
    pub fn new(size: u64) -> Self {
        let size = align_up(size.max(8), 8);
        let mut bm = Self {
            data: vec![0u8; (size >> 3) as usize],
            size,
            count: 0,
            hint: 1,
        };
        bm.add(0);
        bm
    }

    pub fn add(&mut self, bit: u64) -> bool {
        if bit >= self.size || self.test(bit) {
            return false;
        }
        self.data[(bit >> 3) as usize] |= 1 << (bit & 7);
        self.count += 1;
        true
    }

    pub fn test(&self, bit: u64) -> bool {
        if bit >= self.size {
            return false;
        }
        (self.data[(bit >> 3) as usize] & (1 << (bit & 7))) != 0
    }

    /// clear `bit`, return false if it was not set
    pub fn del(&mut self, bit: u64) -> bool {
        if bit == 0 || !self.test(bit) {
            return false;
        }
        self.data[(bit >> 3) as usize] &= !(1 << (bit & 7));
        self.count -= 1;
        if bit < self.hint {
            self.hint = bit;
        }
        true
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        // bit 0 is reserved
        self.count <= 1
    }

    pub fn cap(&self) -> u64 {
        self.size
    }

    pub fn full(&self) -> bool {
        self.len() == self.cap()
    }

    pub fn alloc(&mut self) -> Option<u64> {
        if self.full() {
            return None;
        }
        let start = self.hint;
        let found = (start..self.size).chain(1..start).find(|&i| !self.test(i))?;
        self.add(found);
        self.hint = found + 1;
        Some(found)
    }
}

#[cfg(test)]
mod test {
    use super::BitMap;

    #[test]
    fn test_bitmap() {
        let mut bm = BitMap::new(1024);

        bm.add(233);
        bm.add(666);

        assert!(bm.test(233));
        assert!(bm.test(666));
        assert!(!bm.test(101));
        assert!(!bm.test(4096));

        assert!(bm.del(233));
        assert!(!bm.del(233));
        assert!(!bm.test(233));
        // 666 and the reserved bit 0
        assert_eq!(bm.len(), 2);
    }

    #[test]
    fn test_alloc_skips_zero_and_reuses() {
        let mut bm = BitMap::new(16);
        let a = bm.alloc().unwrap();
        let b = bm.alloc().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        assert!(bm.del(a));
        assert_eq!(bm.alloc(), Some(1));
        assert!(!bm.del(0));

        while bm.alloc().is_some() {}
        assert!(bm.full());
        assert_eq!(bm.alloc(), None);
    }
}
