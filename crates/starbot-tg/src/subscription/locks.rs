use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes gate evaluations of the same user, so that a burst of button
/// presses results in a single provider request and one consistent answer.
/// Locks of different users never contend.
#[derive(Default)]
pub(crate) struct UserLocks {
    locks: SyncMutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

pub(crate) struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub(crate) async fn lock(&self, user_id: UserId) -> UserLockGuard<'_> {
        let lock = self.locks.lock().entry(user_id).or_default().clone();

        UserLockGuard {
            locks: self,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock();

        drop(self.guard.take());

        // Nobody else holds or waits for the lock if the map is the last owner
        let idle = locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);

        if idle {
            locks.remove(&self.user_id);
        }
    }
}
