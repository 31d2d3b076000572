use crate::utils::{FS_CHUNK_SIZE, FS_SKIP_GAP};
use std::str::FromStr;
use std::time::Duration;

/// Mount tunables. Every field can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// forward gaps up to this many bytes are skipped on the open stream instead of reopening,
    /// 0 always reopens and `u64::MAX` never does
    pub skip_gap: u64,
    pub open_retries: usize,
    pub retry_delay: Duration,
    /// largest single remote read
    pub chunk_size: u64,
    pub log_path: String,
    pub log_level: log::LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_gap: FS_SKIP_GAP,
            open_retries: 3,
            retry_delay: Duration::from_millis(100),
            chunk_size: FS_CHUNK_SIZE,
            log_path: "/tmp/streamfs.log".to_string(),
            log_level: log::LevelFilter::Warn,
        }
    }
}

fn parse<T: FromStr>(key: &str, val: &str) -> Result<T, String> {
    val.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid value {:?} for {}", val, key))
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// build a config from `lookup`, unknown keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = Self::default();
        if let Some(v) = lookup("STREAMFS_SKIP_GAP") {
            c.skip_gap = parse("STREAMFS_SKIP_GAP", &v)?;
        }
        if let Some(v) = lookup("STREAMFS_RETRIES") {
            c.open_retries = parse("STREAMFS_RETRIES", &v)?;
        }
        if let Some(v) = lookup("STREAMFS_RETRY_DELAY_MS") {
            c.retry_delay = Duration::from_millis(parse("STREAMFS_RETRY_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("STREAMFS_CHUNK") {
            c.chunk_size = parse("STREAMFS_CHUNK", &v)?;
            if c.chunk_size == 0 {
                return Err("STREAMFS_CHUNK must be positive".to_string());
            }
        }
        if let Some(v) = lookup("STREAMFS_LOG") {
            c.log_path = v;
        }
        if let Some(v) = lookup("STREAMFS_LEVEL") {
            c.log_level = parse("STREAMFS_LEVEL", &v)?;
        }
        Ok(c)
    }
}

#[cfg(test)]
mod test {
    use super::Config;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.skip_gap, 64 << 10);
        assert_eq!(c.chunk_size, 128 << 10);
        assert_eq!(c.open_retries, 3);
        assert_eq!(c.log_level, log::LevelFilter::Warn);
    }

    #[test]
    fn test_overrides() {
        let c = Config::from_lookup(lookup(&[
            ("STREAMFS_SKIP_GAP", "0"),
            ("STREAMFS_RETRIES", "7"),
            ("STREAMFS_RETRY_DELAY_MS", "5"),
            ("STREAMFS_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(c.skip_gap, 0);
        assert_eq!(c.open_retries, 7);
        assert_eq!(c.retry_delay, Duration::from_millis(5));
        assert_eq!(c.log_level, log::LevelFilter::Debug);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Config::from_lookup(lookup(&[("STREAMFS_SKIP_GAP", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STREAMFS_CHUNK", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STREAMFS_LEVEL", "loud")])).is_err());
    }
}
