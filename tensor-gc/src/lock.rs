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

//! Advisory per-tensor locks.
//!
//! Serving runtimes hold a POSIX record lock on a tensor's lock file while they publish or map it. The evictor
//! takes the same kind of lock exclusively before unlinking the payload. On Linux the lock is an open file
//! description lock, which conflicts with the runtimes' record locks but is owned by the file handle rather than
//! the process, so closing an unrelated handle never drops it.

use std::{
    fs::{File, OpenOptions},
    io,
    os::fd::AsRawFd,
    path::Path,
    time::{Duration, Instant},
};

#[cfg(target_os = "linux")]
const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
#[cfg(target_os = "linux")]
const SET_LOCK_WAIT: libc::c_int = libc::F_OFD_SETLKW;
#[cfg(not(target_os = "linux"))]
const SET_LOCK: libc::c_int = libc::F_SETLK;
#[cfg(not(target_os = "linux"))]
const SET_LOCK_WAIT: libc::c_int = libc::F_SETLKW;

/// An exclusive lock on a tensor's lock file, released on drop.
#[derive(Debug)]
pub struct TensorLock {
    file: File,
}

impl TensorLock {
    /// Open the existing lock file at `path` and lock it exclusively.
    ///
    /// The lock file is opened for writing and is never created or truncated.
    ///
    /// With a `timeout`, the lock is polled every `poll` until acquired or until the timeout elapses, in which case
    /// `Ok(None)` is returned. Without a timeout, the call blocks until the lock is granted.
    pub fn acquire(path: &Path, timeout: Option<Duration>, poll: Duration) -> io::Result<Option<Self>> {
        let file = OpenOptions::new().write(true).open(path)?;

        let Some(timeout) = timeout else {
            lock(&file, libc::F_WRLCK as i32, true)?;
            return Ok(Some(Self { file }));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if lock(&file, libc::F_WRLCK as i32, false)? {
                return Ok(Some(Self { file }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }

    /// Try to lock the existing lock file at `path` exclusively without waiting.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        Self::acquire(path, Some(Duration::ZERO), Duration::ZERO)
    }
}

impl Drop for TensorLock {
    fn drop(&mut self) {
        if let Err(e) = lock(&self.file, libc::F_UNLCK as i32, false) {
            tracing::warn!("[lock] fail to release tensor lock: {e}");
        }
    }
}

/// Apply a whole-file lock of `kind`.
///
/// Returns `Ok(false)` if a non-waiting request conflicts with a lock held elsewhere.
fn lock(file: &File, kind: i32, wait: bool) -> io::Result<bool> {
    // Safety: `flock` is a plain C struct, all zero is a valid value and a zero `l_pid` is required for open file
    // description locks.
    let mut request: libc::flock = unsafe { std::mem::zeroed() };
    request.l_type = kind as _;
    request.l_whence = libc::SEEK_SET as _;
    request.l_start = 0;
    request.l_len = 0;

    let cmd = if wait { SET_LOCK_WAIT } else { SET_LOCK };
    loop {
        // Safety: the descriptor is owned by `file` and `request` outlives the call.
        let res = unsafe { libc::fcntl(file.as_raw_fd(), cmd, &mut request as *mut libc::flock) };
        if res != -1 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EACCES) | Some(libc::EAGAIN) if !wait => return Ok(false),
            _ => return Err(err),
        }
    }
}
