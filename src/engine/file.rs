//! File Engine
//!
//! One file per entry in a configured directory:
//!
//! ```text
//! <path>/<prefix><sanitized key>      content = codec bytes (or raw text)
//!                                     mtime   = expiry anchor
//! ```
//!
//! An entry is live while `mtime + ttl > now`, with the TTL resolved on every
//! call. Expired files are never removed by `read` or `exists`; they stay on
//! disk until the key is written again, deleted, or cleared.
//!
//! Writes hold an exclusive lock on the file for the duration of the
//! truncate-and-write, and reads hold a shared lock, so a reader never sees
//! another process's half-written entry. Counters are read-modify-write and
//! are not atomic across processes.

use crate::codec::Codec;
use crate::config::FileConfig;
use crate::duration::Ttl;
use crate::engine::{apply_offset, CacheStore};
use crate::error::{CacheError, CacheResult};
use crate::key::KeyNormalizer;
use crate::value::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Cache engine storing one file per entry.
#[derive(Debug)]
pub struct FileEngine {
    dir: PathBuf,
    keys: KeyNormalizer,
    ttl: Ttl,
    serialize: bool,
    mode: u32,
}

impl FileEngine {
    pub fn new(config: FileConfig) -> Self {
        Self {
            dir: config.path,
            keys: KeyNormalizer::new(config.prefix),
            ttl: config.ttl,
            serialize: config.serialize,
            mode: config.mode,
        }
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(self.keys.key(key))
    }

    fn encode(&self, value: &Value) -> CacheResult<Vec<u8>> {
        if self.serialize {
            Codec::encode(value)
        } else {
            Codec::encode_raw(value)
        }
    }

    fn decode(&self, data: &[u8]) -> CacheResult<Value> {
        if self.serialize {
            Codec::decode(data)
        } else {
            Codec::decode_raw(data)
        }
    }

    /// True if the file exists and its mtime is inside the TTL window.
    fn is_live(&self, path: &Path) -> bool {
        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };

        match self.ttl.resolve() {
            None => true,
            Some(ttl) => match modified.checked_add(ttl) {
                Some(expires_at) => expires_at > SystemTime::now(),
                None => true,
            },
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let created = !path.exists();

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.lock()?;
        let result = overwrite(&mut file, data);
        let unlocked = file.unlock();
        result?;
        unlocked?;

        if created {
            self.apply_mode(path);
        }
        Ok(())
    }

    #[cfg(unix)]
    fn apply_mode(&self, path: &Path) {
        use std::os::unix::fs::PermissionsExt;

        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(self.mode)) {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", self.mode),
                error = %e,
                "Could not apply cache file permissions"
            );
        }
    }

    #[cfg(not(unix))]
    fn apply_mode(&self, _path: &Path) {}

    fn read_file(path: &Path) -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        file.lock_shared()?;
        let mut data = Vec::new();
        let result = file.read_to_end(&mut data);
        let unlocked = file.unlock();
        result?;
        unlocked?;
        Ok(data)
    }
}

fn overwrite(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.write_all(data)?;
    file.flush()
}

impl CacheStore for FileEngine {
    fn write(&self, key: &str, value: Value) -> bool {
        if value.is_empty_payload() {
            debug!(key = key, engine = "file", "Refusing to store an empty value");
            return false;
        }

        let data = match self.encode(&value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = key, error = %e, engine = "file", "Cache SET failed");
                return false;
            }
        };

        let path = self.path(key);
        match self.write_file(&path, &data) {
            Ok(()) => {
                debug!(key = key, bytes = data.len(), engine = "file", "Cache SET");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, engine = "file", "Cache SET failed");
                false
            }
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        let path = self.path(key);
        if !self.is_live(&path) {
            debug!(key = key, engine = "file", "Cache MISS");
            return None;
        }

        let data = match Self::read_file(&path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, engine = "file", "Cache GET failed");
                }
                return None;
            }
        };

        if data.is_empty() {
            return None;
        }

        match self.decode(&data) {
            Ok(value) => {
                debug!(key = key, engine = "file", "Cache HIT");
                Some(value)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, engine = "file", "Corrupt cache entry");
                None
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.is_live(&self.path(key))
    }

    fn delete(&self, key: &str) -> bool {
        let path = self.path(key);
        let live = self.is_live(&path);

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = key, live = live, engine = "file", "Cache DELETE");
                live
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, engine = "file", "Cache DELETE failed");
                }
                false
            }
        }
    }

    fn clear(&self) -> bool {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, engine = "file", "Cache CLEAR failed");
                return false;
            }
        };

        let mut ok = true;
        let mut removed = 0usize;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, engine = "file", "Unreadable directory entry");
                    ok = false;
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name();
            let owned = name.to_str().map(|n| self.keys.owns(n)).unwrap_or(false);
            if !is_file || !owned {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, engine = "file", "Could not remove cache file");
                    ok = false;
                }
            }
        }

        debug!(removed = removed, engine = "file", "Cache CLEAR");
        ok
    }

    fn increment(&self, key: &str, offset: i64) -> CacheResult<i64> {
        let current = self.read(key);
        let next = apply_offset(key, current.as_ref(), offset)?;

        if self.write(key, Value::Int(next)) {
            Ok(next)
        } else {
            Err(CacheError::Backend(format!(
                "could not write counter `{}` to {}",
                key,
                self.dir.display()
            )))
        }
    }

    fn engine_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> FileEngine {
        FileEngine::new(FileConfig::new(dir.path()))
    }

    /// Pushes a file's mtime into the past.
    fn age(path: &Path, by: Duration) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        assert!(engine.write("greeting", Value::from("hello")));
        assert_eq!(engine.read("greeting"), Some(Value::from("hello")));
        assert!(dir.path().join("cache_greeting").is_file());

        assert!(engine.write("flag", Value::Bool(false)));
        assert_eq!(engine.read("flag"), Some(Value::Bool(false)));
        assert_eq!(engine.read("missing"), None);
    }

    #[test]
    fn test_empty_string_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        engine.write("key", Value::from("before"));
        assert!(!engine.write("key", Value::from("")));
        assert_eq!(engine.read("key"), Some(Value::from("before")));
    }

    #[test]
    fn test_overwrite_shorter_value() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        engine.write("key", Value::from("a much longer value than the next one"));
        engine.write("key", Value::from("short"));
        assert_eq!(engine.read("key"), Some(Value::from("short")));
    }

    #[test]
    fn test_expired_entries_stay_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);
        let path = dir.path().join("cache_session");

        engine.write("session", Value::from("abc123"));
        age(&path, Duration::from_secs(7200));

        assert!(!engine.exists("session"));
        assert_eq!(engine.read("session"), None);
        assert!(path.exists());

        // Deleting an expired entry removes the file but reports no live entry
        assert!(!engine.delete("session"));
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_duration_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FileConfig::new(dir.path());
        config.ttl = Ttl::seconds(0);
        let engine = FileEngine::new(config);

        engine.write("forever", Value::Int(1));
        age(&dir.path().join("cache_forever"), Duration::from_secs(365 * 86_400));
        assert_eq!(engine.read("forever"), Some(Value::Int(1)));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        engine.write("key", Value::from("value"));
        assert!(engine.delete("key"));
        assert!(!engine.exists("key"));
        assert!(!engine.delete("key"));
    }

    #[test]
    fn test_clear_respects_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let pages = engine_in(&dir);
        let mut other = FileConfig::new(dir.path());
        other.prefix = "sessions_".to_string();
        let sessions = FileEngine::new(other);

        pages.write("home", Value::from("<html>"));
        sessions.write("abc", Value::from("user-1"));
        fs::create_dir(dir.path().join("cache_subdir")).unwrap();

        assert!(pages.clear());
        assert!(!pages.exists("home"));
        assert_eq!(sessions.read("abc"), Some(Value::from("user-1")));
        assert!(dir.path().join("cache_subdir").is_dir());
    }

    #[test]
    fn test_counters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        assert_eq!(engine.increment("hits", 1).unwrap(), 1);
        assert_eq!(engine.increment("hits", 9).unwrap(), 10);
        assert_eq!(engine.decrement("hits", 4).unwrap(), 6);
        assert_eq!(engine.read("hits"), Some(Value::Int(6)));

        engine.write("name", Value::from("ariz"));
        assert!(matches!(
            engine.increment("name", 1),
            Err(CacheError::NotAnInteger(_))
        ));
    }

    #[test]
    fn test_raw_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FileConfig::new(dir.path());
        config.serialize = false;
        let engine = FileEngine::new(config);

        assert!(engine.write("page", Value::from("<p>hi</p>")));
        assert_eq!(
            fs::read(dir.path().join("cache_page")).unwrap(),
            b"<p>hi</p>"
        );
        assert_eq!(engine.read("page"), Some(Value::from("<p>hi</p>")));

        assert!(!engine.write("list", Value::List(vec![Value::Int(1)])));

        assert_eq!(engine.increment("n", 5).unwrap(), 5);
        assert_eq!(engine.increment("n", 5).unwrap(), 10);
        assert_eq!(engine.read("n"), Some(Value::from("10")));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);

        fs::write(dir.path().join("cache_broken"), b"not a cache entry").unwrap();
        assert_eq!(engine.read("broken"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_applied_on_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut config = FileConfig::new(dir.path());
        config.mode = 0o600;
        let engine = FileEngine::new(config);

        engine.write("secret", Value::from("s3cr3t"));
        let mode = fs::metadata(dir.path().join("cache_secret"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
