use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashKind {
    Md5,
    Sha256,
}

impl HashKind {
    pub fn digest_len(&self) -> usize {
        match self {
            HashKind::Md5 => 16,
            HashKind::Sha256 => 32,
        }
    }
}

impl FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashKind::Md5),
            "sha256" => Ok(HashKind::Sha256),
            _ => Err(format!("unknown hash {}", s)),
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Md5 => write!(f, "md5"),
            HashKind::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A content digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub kind: HashKind,
    pub digest: Vec<u8>,
}

impl Checksum {
    pub fn compute(kind: HashKind, data: &[u8]) -> Self {
        let mut h = Hasher::new(kind);
        h.update(data);
        h.finish()
    }

    /// parse `kind:hexdigest`, e.g. `md5:5d41402abc4b2a76b9719d911017c592`
    pub fn parse(s: &str) -> Result<Self, String> {
        let (kind, hex_digest) = s.split_once(':').ok_or_else(|| format!("missing kind in {}", s))?;
        let kind = kind.parse::<HashKind>()?;
        let digest = hex::decode(hex_digest).map_err(|e| format!("bad digest {}: {}", hex_digest, e))?;
        if digest.len() != kind.digest_len() {
            return Err(format!("{} digest must be {} bytes", kind, kind.digest_len()));
        }
        Ok(Self { kind, digest })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, hex::encode(&self.digest))
    }
}

/// Rolling hash state for either supported algorithm.
#[derive(Clone)]
pub enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl Hasher {
    pub fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Md5 => Hasher::Md5(md5::Context::new()),
            HashKind::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    pub fn kind(&self) -> HashKind {
        match self {
            Hasher::Md5(_) => HashKind::Md5,
            Hasher::Sha256(_) => HashKind::Sha256,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(c) => c.consume(data),
            Hasher::Sha256(s) => s.update(data),
        }
    }

    pub fn finish(self) -> Checksum {
        let kind = self.kind();
        let digest = match self {
            Hasher::Md5(c) => c.compute().0.to_vec(),
            Hasher::Sha256(s) => s.finalize().to_vec(),
        };
        Checksum { kind, digest }
    }
}

#[cfg(test)]
mod test {
    use super::{Checksum, HashKind, Hasher};

    #[test]
    fn test_known_digests() {
        let c = Checksum::compute(HashKind::Md5, b"hello");
        assert_eq!(c.to_string(), "md5:5d41402abc4b2a76b9719d911017c592");

        let c = Checksum::compute(HashKind::Sha256, b"hello");
        assert_eq!(
            c.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut h = Hasher::new(HashKind::Sha256);
        h.update(b"hello");
        h.update(b"hello");
        assert_eq!(h.finish(), Checksum::compute(HashKind::Sha256, b"hellohello"));
    }

    #[test]
    fn test_parse() {
        let c = Checksum::parse("md5:5d41402abc4b2a76b9719d911017c592").unwrap();
        assert_eq!(c, Checksum::compute(HashKind::Md5, b"hello"));
        assert!(Checksum::parse("5d41402abc4b2a76b9719d911017c592").is_err());
        assert!(Checksum::parse("crc:00").is_err());
        assert!(Checksum::parse("md5:zz").is_err());
        assert!(Checksum::parse("sha256:5d41402abc4b2a76b9719d911017c592").is_err());
    }
}
