use crate::remote::{Checksum, HashKind, Hasher};

/// Why a handle's content could not be checked against the declared checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoChecksum,
    /// the cursor was moved away from the end of the sequential run
    Seek { from: u64, to: u64 },
    /// a read did not start where the sequential run ended
    OutOfOrder { expected: u64, got: u64 },
    /// the handle was released before the whole object was read
    Incomplete { read: u64, size: u64 },
}

/// Outcome of finalizing a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified(Checksum),
    Skipped(SkipReason),
    Mismatch { expected: Checksum, actual: Checksum },
}

/// Hashes what the kernel was handed as long as it was handed in order from offset 0.
/// The first out of order read or seek disqualifies the handle for good.
#[derive(Clone)]
pub enum IntegrityTracker {
    Tracking { bytes: u64, hasher: Hasher },
    Disqualified(SkipReason),
}

impl IntegrityTracker {
    /// start tracking for `kind`, a missing kind means there is nothing to verify against
    pub fn new(kind: Option<HashKind>) -> Self {
        match kind {
            Some(k) => IntegrityTracker::Tracking {
                bytes: 0,
                hasher: Hasher::new(k),
            },
            None => IntegrityTracker::Disqualified(SkipReason::NoChecksum),
        }
    }

    /// bytes hashed so far, None once disqualified
    pub fn sequential_bytes(&self) -> Option<u64> {
        match self {
            IntegrityTracker::Tracking { bytes, .. } => Some(*bytes),
            IntegrityTracker::Disqualified(_) => None,
        }
    }

    pub fn is_disqualified(&self) -> bool {
        matches!(self, IntegrityTracker::Disqualified(_))
    }

    /// keeps the first reason, later ones add nothing
    pub fn disqualify(&mut self, reason: SkipReason) {
        if matches!(self, IntegrityTracker::Tracking { .. }) {
            log::debug!("integrity tracking stopped: {:?}", reason);
            *self = IntegrityTracker::Disqualified(reason);
        }
    }

    pub fn observe(&mut self, offset: u64, data: &[u8]) {
        let expected = match self {
            IntegrityTracker::Tracking { bytes, hasher } if *bytes == offset => {
                hasher.update(data);
                *bytes += data.len() as u64;
                return;
            }
            IntegrityTracker::Tracking { bytes, .. } => *bytes,
            IntegrityTracker::Disqualified(_) => return,
        };
        self.disqualify(SkipReason::OutOfOrder { expected, got: offset });
    }

    pub fn finalize(&self, size: u64, expected: Option<&Checksum>) -> Verdict {
        let (bytes, hasher) = match self {
            IntegrityTracker::Disqualified(reason) => return Verdict::Skipped(reason.clone()),
            IntegrityTracker::Tracking { bytes, hasher } => (*bytes, hasher),
        };
        let Some(expected) = expected else {
            return Verdict::Skipped(SkipReason::NoChecksum);
        };
        if bytes != size {
            return Verdict::Skipped(SkipReason::Incomplete { read: bytes, size });
        }
        if hasher.kind() != expected.kind {
            return Verdict::Skipped(SkipReason::NoChecksum);
        }
        let actual = hasher.clone().finish();
        if actual == *expected {
            Verdict::Verified(actual)
        } else {
            Verdict::Mismatch {
                expected: expected.clone(),
                actual,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{IntegrityTracker, SkipReason, Verdict};
    use crate::remote::{Checksum, HashKind};

    #[test]
    fn test_sequential_read_verifies() {
        let sum = Checksum::compute(HashKind::Md5, b"hellohello");
        let mut t = IntegrityTracker::new(Some(HashKind::Md5));
        t.observe(0, b"hel");
        t.observe(3, b"lohel");
        t.observe(8, b"lo");
        t.observe(10, b"");
        assert_eq!(t.sequential_bytes(), Some(10));
        assert_eq!(t.finalize(10, Some(&sum)), Verdict::Verified(sum));
    }

    #[test]
    fn test_prefix_is_skipped() {
        let sum = Checksum::compute(HashKind::Sha256, b"hellohello");
        let mut t = IntegrityTracker::new(Some(HashKind::Sha256));
        t.observe(0, b"hello");
        assert_eq!(
            t.finalize(10, Some(&sum)),
            Verdict::Skipped(SkipReason::Incomplete { read: 5, size: 10 })
        );
    }

    #[test]
    fn test_gap_disqualifies_for_good() {
        let sum = Checksum::compute(HashKind::Md5, b"hellohello");
        let mut t = IntegrityTracker::new(Some(HashKind::Md5));
        t.observe(0, b"hello");
        t.observe(7, b"llo");
        assert!(t.is_disqualified());
        // filling the hole later does not bring it back
        t.observe(5, b"he");
        assert_eq!(
            t.finalize(10, Some(&sum)),
            Verdict::Skipped(SkipReason::OutOfOrder { expected: 5, got: 7 })
        );
    }

    #[test]
    fn test_first_reason_wins() {
        let mut t = IntegrityTracker::new(Some(HashKind::Md5));
        t.disqualify(SkipReason::Seek { from: 0, to: 4 });
        t.disqualify(SkipReason::OutOfOrder { expected: 0, got: 4 });
        assert_eq!(
            t.finalize(10, None),
            Verdict::Skipped(SkipReason::Seek { from: 0, to: 4 })
        );
    }

    #[test]
    fn test_mismatch_and_missing_checksum() {
        let sum = Checksum::compute(HashKind::Md5, b"hellohello");
        let mut t = IntegrityTracker::new(Some(HashKind::Md5));
        t.observe(0, b"hellohellO");
        match t.finalize(10, Some(&sum)) {
            Verdict::Mismatch { expected, actual } => {
                assert_eq!(expected, sum);
                assert_eq!(actual, Checksum::compute(HashKind::Md5, b"hellohellO"));
            }
            v => panic!("unexpected verdict {:?}", v),
        }
        assert_eq!(t.finalize(10, None), Verdict::Skipped(SkipReason::NoChecksum));

        let t = IntegrityTracker::new(None);
        assert_eq!(t.sequential_bytes(), None);
        assert_eq!(t.finalize(0, Some(&sum)), Verdict::Skipped(SkipReason::NoChecksum));
    }

    #[test]
    fn test_empty_object() {
        let sum = Checksum::compute(HashKind::Sha256, b"");
        let t = IntegrityTracker::new(Some(HashKind::Sha256));
        assert_eq!(t.finalize(0, Some(&sum)), Verdict::Verified(sum));
    }
}
