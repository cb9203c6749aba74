//! RAII release of a held lock.

use super::Locksmith;
use crate::error::Result;

/// Releases a held lock when dropped.
///
/// Prefer [`LockGuard::release`] on the success path so release errors
/// surface to the caller; the drop path is the safety net for panics and
/// early returns, and can only warn.
pub struct LockGuard<'a> {
    locksmith: &'a Locksmith,
    released: bool,
}

impl<'a> LockGuard<'a> {
    /// Guard a lock the locksmith currently holds.
    pub(super) fn new(locksmith: &'a Locksmith) -> Self {
        Self {
            locksmith,
            released: false,
        }
    }

    /// Release the lock now, surfacing any release error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.locksmith.unlock().map(|_| ())
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.locksmith.unlock() {
            eprintln!(
                "Warning: failed to release lock {} on drop: {}",
                self.locksmith.digest(),
                e
            );
        }
    }
}
