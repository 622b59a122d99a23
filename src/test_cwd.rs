use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

fn cwd_mutex() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Switches the process working directory for one test. The guard holds the
/// shared lock until the original directory has been restored.
pub struct CwdGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl CwdGuard {
    pub fn set(path: &Path) -> Self {
        // A panicking test must not wedge every later one.
        let lock = cwd_mutex().lock().unwrap_or_else(PoisonError::into_inner);
        let original = env::current_dir().expect("Failed to capture current directory");
        env::set_current_dir(path).expect("Failed to switch current directory for test");
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        env::set_current_dir(&self.original).expect("Failed to restore current directory");
    }
}
