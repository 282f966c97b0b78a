// Copyright 2026 tensor-gc Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::{lock::TensorLock, tensor::TensorId};

/// Defined outcomes of an eviction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// The payload was deleted under the tensor lock.
    Evicted,
    /// The payload no longer exists, nothing to do.
    AlreadyGone,
    /// The tensor has no lock file and must not be deleted in this cycle.
    NoLockArtifact,
}

impl Eviction {
    /// Whether the tensor is known to be absent from the cache afterwards.
    pub fn is_settled(&self) -> bool {
        matches!(self, Eviction::Evicted | Eviction::AlreadyGone)
    }
}

/// Eviction error. The tensor stays evictable and is retried in the next cycle.
#[derive(thiserror::Error, Debug)]
pub enum EvictError {
    /// A reader held the tensor lock for longer than the lock timeout.
    #[error("lock of tensor {tensor} not acquired within {waited:?}")]
    LockTimeout {
        /// The tensor.
        tensor: TensorId,
        /// How long the evictor waited.
        waited: Duration,
    },
    /// Filesystem error.
    #[error("io error evicting tensor {tensor}: {source}")]
    Io {
        /// The tensor.
        tensor: TensorId,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl EvictError {
    fn io(tensor: &TensorId, source: io::Error) -> Self {
        Self::Io {
            tensor: tensor.clone(),
            source,
        }
    }
}

/// Deletes cached tensors while holding their advisory lock.
///
/// The evictor never creates cache or lock files.
#[derive(Debug, Clone)]
pub struct SafeEvictor {
    cache_dir: PathBuf,
    lock_dir: PathBuf,
    lock_timeout: Option<Duration>,
    poll_interval: Duration,
}

impl SafeEvictor {
    /// Default lock timeout.
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default lock poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Create an evictor for payloads in `cache_dir` guarded by lock files in `lock_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            lock_dir: lock_dir.into(),
            lock_timeout: Some(Self::DEFAULT_LOCK_TIMEOUT),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set how long to wait for a reader to release a tensor lock.
    ///
    /// `None` waits indefinitely.
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set how often a contended lock is retried.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The lock directory.
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Evict `tensor`.
    ///
    /// Blocks while a reader holds the tensor lock, up to the lock timeout.
    pub fn evict(&self, tensor: &TensorId) -> Result<Eviction, EvictError> {
        if !tensor.is_plain_file_name() {
            return Err(EvictError::io(
                tensor,
                io::Error::new(io::ErrorKind::InvalidInput, "tensor id is not a plain file name"),
            ));
        }

        let lock_path = self.lock_dir.join(tensor.as_str());
        let cache_path = self.cache_dir.join(tensor.as_str());

        if !lock_path.try_exists().map_err(|e| EvictError::io(tensor, e))? {
            tracing::debug!("[evictor] skip tensor {tensor} without lock file");
            return Ok(Eviction::NoLockArtifact);
        }
        if !cache_path.try_exists().map_err(|e| EvictError::io(tensor, e))? {
            tracing::trace!("[evictor] tensor {tensor} is already gone");
            return Ok(Eviction::AlreadyGone);
        }

        let start = Instant::now();
        let guard = match TensorLock::acquire(&lock_path, self.lock_timeout, self.poll_interval) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                return Err(EvictError::LockTimeout {
                    tensor: tensor.clone(),
                    waited: start.elapsed(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("[evictor] lock file of tensor {tensor} vanished");
                return Ok(Eviction::NoLockArtifact);
            }
            Err(e) => return Err(EvictError::io(tensor, e)),
        };
        let waited = start.elapsed();

        let res = match fs::remove_file(&cache_path) {
            Ok(()) => Ok(Eviction::Evicted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Eviction::AlreadyGone),
            Err(e) => Err(EvictError::io(tensor, e)),
        };
        drop(guard);

        tracing::debug!("[evictor] tensor {tensor}: {res:?}, lock waited: {waited:?}");
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dirs {
        _root: tempfile::TempDir,
        cache: PathBuf,
        lock: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let lock = root.path().join("lock");
        fs::create_dir(&cache).unwrap();
        fs::create_dir(&lock).unwrap();
        Dirs {
            _root: root,
            cache,
            lock,
        }
    }

    #[test_log::test]
    fn test_evict() {
        let dirs = dirs();
        fs::write(dirs.cache.join("t"), b"payload").unwrap();
        fs::write(dirs.lock.join("t"), b"").unwrap();

        let evictor = SafeEvictor::new(&dirs.cache, &dirs.lock);
        assert_eq!(evictor.evict(&TensorId::from("t")).unwrap(), Eviction::Evicted);
        assert!(!dirs.cache.join("t").exists());
        // The lock file belongs to the serving runtime.
        assert!(dirs.lock.join("t").exists());
    }

    #[test_log::test]
    fn test_skip_without_lock_file() {
        let dirs = dirs();
        fs::write(dirs.cache.join("d"), b"payload").unwrap();

        let evictor = SafeEvictor::new(&dirs.cache, &dirs.lock);
        assert_eq!(evictor.evict(&TensorId::from("d")).unwrap(), Eviction::NoLockArtifact);
        assert!(dirs.cache.join("d").exists());
        assert!(!dirs.lock.join("d").exists());
    }

    #[test_log::test]
    fn test_evict_already_gone_is_noop() {
        let dirs = dirs();
        fs::write(dirs.lock.join("t"), b"lock").unwrap();

        let evictor = SafeEvictor::new(&dirs.cache, &dirs.lock);
        let tensor = TensorId::from("t");
        assert_eq!(evictor.evict(&tensor).unwrap(), Eviction::AlreadyGone);
        assert_eq!(evictor.evict(&tensor).unwrap(), Eviction::AlreadyGone);
        assert_eq!(fs::read(dirs.lock.join("t")).unwrap(), b"lock");
        assert!(!dirs.cache.join("t").exists());
    }

    #[test_log::test]
    fn test_reject_path_escape() {
        let dirs = dirs();
        let evictor = SafeEvictor::new(&dirs.cache, &dirs.lock);
        let res = evictor.evict(&TensorId::from("../lock"));
        assert!(matches!(res, Err(EvictError::Io { .. })));
        assert!(dirs.lock.exists());
    }

    #[cfg(target_os = "linux")]
    #[test_log::test]
    fn test_lock_timeout_keeps_payload() {
        let dirs = dirs();
        fs::write(dirs.cache.join("t"), b"payload").unwrap();
        fs::write(dirs.lock.join("t"), b"").unwrap();

        let reader = TensorLock::try_acquire(&dirs.lock.join("t")).unwrap().unwrap();

        let evictor = SafeEvictor::new(&dirs.cache, &dirs.lock)
            .with_lock_timeout(Some(Duration::from_millis(100)))
            .with_poll_interval(Duration::from_millis(10));
        let res = evictor.evict(&TensorId::from("t"));
        assert!(matches!(res, Err(EvictError::LockTimeout { .. })), "{res:?}");
        assert!(dirs.cache.join("t").exists());

        drop(reader);
        assert_eq!(evictor.evict(&TensorId::from("t")).unwrap(), Eviction::Evicted);
    }
}
