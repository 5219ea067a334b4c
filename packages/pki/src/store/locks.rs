//! Per-alias write locks

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes writers of the same alias
///
/// An alias has an entry only while some task holds or waits for its lock,
/// so the map stays as small as the set of in-flight writes.
#[derive(Debug, Default)]
pub(crate) struct AliasLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AliasLocks {
    pub(crate) async fn lock(&self, alias: &str) -> AliasGuard<'_> {
        let lock = self.locks.entry(alias.to_string()).or_default().clone();
        AliasGuard {
            locks: self,
            alias: alias.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held for the duration of one write
pub(crate) struct AliasGuard<'a> {
    locks: &'a AliasLocks,
    alias: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AliasGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's reference left: nobody holds or waits for this alias
        self.locks
            .locks
            .remove_if(&self.alias, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_entry_released_after_last_writer() {
        let locks = AliasLocks::default();
        {
            let _guard = locks.lock("device-01").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiting_writer_keeps_entry() {
        let locks = Arc::new(AliasLocks::default());
        let first = locks.lock("device-01").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("device-01").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1, "the waiting writer still needs the lock");

        waiter.await.expect("waiter");
        assert_eq!(locks.len(), 0);
    }
}
