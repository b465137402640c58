use crate::core::error::SchedError;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive `flock` on the PID file, held for the daemon's lifetime.
/// Dropping it removes the file and releases the lock.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

fn try_flock(file: &File, op: libc::c_int) -> io::Result<bool> {
    // SAFETY: flock(2) on a descriptor owned by `file`.
    let rc = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Result of locking one opened descriptor of the pid file.
#[derive(Debug)]
enum Attempt {
    Locked(File),
    /// Locked an inode that is no longer the one at the path.
    Stale,
    Held,
}

const MAX_STALE_RETRIES: usize = 8;

fn same_inode(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Locks `file`, then checks it is still the file at `path`. A holder
/// unlinks the path before unlocking, so a lock on a replaced inode is
/// worthless.
fn lock_opened(file: File, path: &Path) -> Result<Attempt, SchedError> {
    let locked = try_flock(&file, libc::LOCK_EX)
        .map_err(|e| SchedError::io(format!("Failed to lock {}", path.display()), e))?;
    if !locked {
        return Ok(Attempt::Held);
    }
    let current = same_inode(&file, path)
        .map_err(|e| SchedError::io(format!("Failed to stat {}", path.display()), e))?;
    if current {
        Ok(Attempt::Locked(file))
    } else {
        // dropping `file` releases the stale lock
        Ok(Attempt::Stale)
    }
}

fn open_pid_file(path: &Path) -> Result<File, SchedError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| SchedError::io(format!("Failed to open {}", path.display()), e))
}

impl PidLock {
    pub fn acquire(path: &Path) -> Result<Self, SchedError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SchedError::io(format!("Failed to create {}", parent.display()), e))?;
        }

        for _ in 0..MAX_STALE_RETRIES {
            match lock_opened(open_pid_file(path)?, path)? {
                Attempt::Locked(file) => return Self::claim(file, path),
                Attempt::Held => {
                    return Err(SchedError::AlreadyRunning {
                        pid: read_pid(path),
                    });
                }
                Attempt::Stale => {
                    debug!(target: "hwsched::daemon", "{} replaced while locking, retrying", path.display());
                }
            }
        }
        Err(SchedError::io(
            format!("Failed to lock {}", path.display()),
            io::Error::other("pid file keeps being replaced"),
        ))
    }

    fn claim(mut file: File, path: &Path) -> Result<Self, SchedError> {
        let pid = std::process::id();
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", pid))
            .and_then(|_| file.sync_all())
            .map_err(|e| SchedError::io(format!("Failed to write {}", path.display()), e))?;

        debug!(target: "hwsched::daemon", "Acquired {} (pid {})", path.display(), pid);
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        // Remove before the descriptor closes so a successor's file is never unlinked.
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(target: "hwsched::daemon", "Failed to remove {}: {}", self.path.display(), e);
        }
        // SAFETY: unlocking our own descriptor; closing it would release the lock anyway.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

pub fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

/// Whether some process currently holds the lock on `path`.
pub fn is_locked(path: &Path) -> Result<bool, SchedError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(SchedError::io(format!("Failed to open {}", path.display()), e)),
    };
    let acquired = try_flock(&file, libc::LOCK_SH)
        .map_err(|e| SchedError::io(format!("Failed to check lock on {}", path.display()), e))?;
    if acquired {
        // SAFETY: releasing the test lock taken just above.
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
    }
    Ok(!acquired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/hwsched.pid");
        let _lock = PidLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        assert!(is_locked(&path).unwrap());
    }

    #[test]
    fn test_second_acquire_is_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwsched.pid");
        let _first = PidLock::acquire(&path).unwrap();

        match PidLock::acquire(&path) {
            Err(SchedError::AlreadyRunning { pid }) => {
                assert_eq!(pid, Some(std::process::id() as i32))
            }
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        // the holder is untouched
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
    }

    #[test]
    fn test_drop_releases_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwsched.pid");
        drop(PidLock::acquire(&path).unwrap());
        assert!(!path.exists());
        assert!(!is_locked(&path).unwrap());
        assert!(PidLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_stale_file_is_not_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwsched.pid");
        std::fs::write(&path, "999999\n").unwrap();
        assert!(!is_locked(&path).unwrap());
        assert_eq!(read_pid(&path), Some(999999));

        let _lock = PidLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(std::process::id() as i32));
    }

    #[test]
    fn test_lock_on_unlinked_inode_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwsched.pid");
        let first = PidLock::acquire(&path).unwrap();

        // a contender opened the old file before the holder exited
        let late = open_pid_file(&path).unwrap();
        drop(first);

        assert!(matches!(lock_opened(late, &path).unwrap(), Attempt::Stale));

        let second = PidLock::acquire(&path).unwrap();
        let racer = open_pid_file(&path).unwrap();
        assert!(matches!(lock_opened(racer, &path).unwrap(), Attempt::Held));
        drop(second);
    }

    #[test]
    fn test_lock_on_current_inode_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwsched.pid");
        let file = open_pid_file(&path).unwrap();
        assert!(matches!(lock_opened(file, &path).unwrap(), Attempt::Locked(_)));
    }
}
