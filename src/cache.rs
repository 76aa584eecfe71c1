//! Page source cache
//!
//! Entries are keyed by a file-friendly form of the link (host and path only)
//! and expire after a fixed TTL.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

use crate::config::Settings;
use crate::error::CacheError;

/// Storage for raw page sources.
pub trait Cache: Send + Sync {
    fn read(&self, key: &str) -> Result<Vec<u8>, CacheError>;
    /// Store `data` and return the number of bytes written.
    fn write(&self, key: &str, data: &[u8]) -> Result<usize, CacheError>;

    fn read_link(&self, link: &str) -> Result<Vec<u8>, CacheError> {
        self.read(&cache_key(link))
    }

    fn write_link(&self, link: &str, data: &[u8]) -> Result<usize, CacheError> {
        self.write(&cache_key(link), data)
    }
}

/// File-friendly cache key for a link: `http://github.com/lexndru/hap`
/// becomes `github_com_lexndru_hap`.
///
/// Scheme, query and fragment are ignored. Text that does not parse as an
/// absolute URL is used whole.
pub fn cache_key(link: &str) -> String {
    let raw = match Url::parse(link) {
        Ok(url) => {
            let mut netloc = url.host_str().unwrap_or_default().to_string();
            if let Some(port) = url.port() {
                netloc.push_str(&format!(":{}", port));
            }
            format!("{}{}", file_friendly(&netloc), file_friendly(url.path()))
        }
        Err(_) => file_friendly(link),
    };
    raw.trim_matches('_').to_string()
}

/// Replace anything but ASCII letters, digits and `_` with `_`.
pub fn file_friendly(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// One file per entry under a cache directory; freshness by modification time.
#[derive(Debug, Clone)]
pub struct DiskCache {
    directory: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(settings: &Settings) -> Self {
        Self::with_ttl(&settings.cache_dir, settings.cache_ttl)
    }

    pub fn with_ttl(directory: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ttl,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }
}

impl Cache for DiskCache {
    fn read(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::Miss);
        }
        let path = self.file_path(key);
        if !path.is_file() {
            return Err(CacheError::Miss);
        }

        // A modification time in the future counts as fresh
        let age = fs::metadata(&path)?
            .modified()?
            .elapsed()
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            debug!("Cache entry {} is {}s old", key, age.as_secs());
            return Err(CacheError::Expired);
        }

        let data = fs::read(&path)?;
        if data.is_empty() {
            return Err(CacheError::Empty);
        }
        Ok(data)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<usize, CacheError> {
        if key.is_empty() {
            return Err(CacheError::MissingKey);
        }
        if data.is_empty() {
            return Err(CacheError::MissingData);
        }
        if self.directory.exists() && !self.directory.is_dir() {
            return Err(CacheError::NotADirectory);
        }
        fs::create_dir_all(&self.directory)?;
        fs::write(self.file_path(key), data)?;
        debug!("Cached {} bytes as {}", data.len(), key);
        Ok(data.len())
    }
}

/// In-process cache, used for tests and for pre-seeding known pages.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedSource>>,
    ttl: Duration,
}

#[derive(Debug)]
struct CachedSource {
    data: Vec<u8>,
    stored_at: Instant,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_CACHE_TTL_SECS))
    }
}

impl Cache for MemoryCache {
    fn read(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        let cached = entries.get(key).ok_or(CacheError::Miss)?;
        if cached.stored_at.elapsed() > self.ttl {
            return Err(CacheError::Expired);
        }
        if cached.data.is_empty() {
            return Err(CacheError::Empty);
        }
        Ok(cached.data.clone())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<usize, CacheError> {
        if key.is_empty() {
            return Err(CacheError::MissingKey);
        }
        if data.is_empty() {
            return Err(CacheError::MissingData);
        }
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(
            key.to_string(),
            CachedSource {
                data: data.to_vec(),
                stored_at: Instant::now(),
            },
        );
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("http://github.com/lexndru/hap"), "github_com_lexndru_hap");
        assert_eq!(cache_key("https://github.com/lexndru/hap?tab=1#top"), "github_com_lexndru_hap");
        assert_eq!(cache_key("http://localhost/mockup"), "localhost_mockup");
        assert_eq!(cache_key("http://localhost:8080/"), "localhost_8080");
        assert_eq!(cache_key("not existing link"), "not_existing_link");
    }

    #[test]
    fn test_file_friendly() {
        assert_eq!(
            file_friendly("~!bad@#$%^filename&*()1234567890"),
            "__bad_____filename____1234567890"
        );
    }

    #[test]
    fn test_disk_write_read() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_ttl(dir.path().join("cache"), Duration::from_secs(60));
        let link = "http://github.com/lexndru/hap";

        assert_eq!(cache.write_link(link, b"hap").unwrap(), 3);
        assert!(dir.path().join("cache/github_com_lexndru_hap").is_file());
        assert_eq!(cache.read_link(link).unwrap(), b"hap");
    }

    #[test]
    fn test_disk_misses() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_ttl(dir.path(), Duration::from_secs(60));

        assert!(matches!(cache.read_link("not existing link"), Err(CacheError::Miss)));
        assert!(matches!(cache.write("", b"x"), Err(CacheError::MissingKey)));
        assert!(matches!(cache.write("hap_test.html", b""), Err(CacheError::MissingData)));

        fs::write(dir.path().join(".hap.tmp"), b"").unwrap();
        assert!(matches!(cache.read(".hap.tmp"), Err(CacheError::Empty)));
    }

    #[test]
    fn test_disk_expired() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_ttl(dir.path(), Duration::ZERO);
        cache.write("page", b"<html></html>").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(cache.read("page"), Err(CacheError::Expired)));
    }

    #[test]
    fn test_disk_directory_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"x").unwrap();
        let cache = DiskCache::with_ttl(&blocker, Duration::from_secs(60));
        assert!(matches!(cache.write("page", b"data"), Err(CacheError::NotADirectory)));
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::default();
        assert!(cache.is_empty());
        cache.write_link("http://localhost/mockup", b"<p>hi</p>").unwrap();
        assert_eq!(cache.read("localhost_mockup").unwrap(), b"<p>hi</p>");
        assert!(matches!(cache.read("other"), Err(CacheError::Miss)));

        let expired = MemoryCache::new(Duration::ZERO);
        expired.write("page", b"x").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(expired.read("page"), Err(CacheError::Expired)));
    }

    #[test]
    fn test_memory_cache_poisoned_lock() {
        let cache = MemoryCache::default();
        cache.write("page", b"before").unwrap();
        std::thread::scope(|s| {
            let holder = s.spawn(|| {
                let _guard = cache.entries.write().unwrap();
                panic!("writer died holding the lock");
            });
            assert!(holder.join().is_err());
        });

        assert!(matches!(cache.write("page", b"after"), Err(CacheError::Poisoned)));
        assert!(matches!(cache.read("page"), Err(CacheError::Poisoned)));
    }
}
