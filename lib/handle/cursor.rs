use std::io::SeekFrom;

/// Where the next kernel read on a handle starts, always within `[0, size]`.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pos: u64,
    size: u64,
}

impl Cursor {
    pub fn new(size: u64) -> Self {
        Self { pos: 0, size }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.pos
    }

    /// move to `target` clamped into the object, seeking past the end lands on the end
    pub fn seek(&mut self, target: SeekFrom) -> u64 {
        let (base, delta) = match target {
            SeekFrom::Start(p) => (0i128, p as i128),
            SeekFrom::End(d) => (self.size as i128, d as i128),
            SeekFrom::Current(d) => (self.pos as i128, d as i128),
        };
        self.pos = (base + delta).clamp(0, self.size as i128) as u64;
        self.pos
    }

    pub fn advance(&mut self, n: u64) {
        self.pos = self.pos.saturating_add(n).min(self.size);
    }
}

#[cfg(test)]
mod test {
    use super::Cursor;
    use std::io::SeekFrom;

    #[test]
    fn test_clamp() {
        let mut c = Cursor::new(10);
        assert_eq!(c.seek(SeekFrom::Start(5)), 5);
        assert_eq!(c.seek(SeekFrom::Start(1_000_000)), 10);
        assert_eq!(c.seek(SeekFrom::Current(-3)), 7);
        assert_eq!(c.seek(SeekFrom::Current(-100)), 0);
        assert_eq!(c.seek(SeekFrom::End(-4)), 6);
        assert_eq!(c.seek(SeekFrom::End(4)), 10);
        assert_eq!(c.remaining(), 0);
        assert_eq!(c.seek(SeekFrom::Start(u64::MAX)), 10);
    }

    #[test]
    fn test_advance() {
        let mut c = Cursor::new(10);
        c.advance(4);
        assert_eq!(c.pos(), 4);
        assert_eq!(c.remaining(), 6);
        c.advance(100);
        assert_eq!(c.pos(), 10);
    }
}
