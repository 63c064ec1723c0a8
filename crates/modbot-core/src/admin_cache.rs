//! TTL cache of "is this user an admin in this chat".
//!
//! Expiry is lazy on read; a single background loop purges stale entries while
//! the cache is non-empty and exits once it drains.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, UserId},
    ports::ModerationPlatform,
};

pub const DEFAULT_ADMIN_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    is_admin: bool,
    observed_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(ChatId, UserId), CacheEntry>,
    cleanup_running: bool,
}

#[derive(Debug)]
struct Inner {
    ttl: Duration,
    cleanup_interval: Duration,
    state: Mutex<CacheState>,
}

#[derive(Clone, Debug)]
pub struct AdminExemptionCache {
    inner: Arc<Inner>,
}

impl Default for AdminExemptionCache {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_TTL, DEFAULT_CLEANUP_INTERVAL)
    }
}

impl AdminExemptionCache {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                cleanup_interval: cleanup_interval.max(Duration::from_millis(1)),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Cached value if fresh; `None` is a miss. Stale entries are evicted.
    pub async fn get(&self, chat_id: ChatId, user_id: UserId) -> Option<bool> {
        let mut st = self.inner.state.lock().await;
        let key = (chat_id, user_id);
        let entry = *st.entries.get(&key)?;
        if entry.observed_at.elapsed() < self.inner.ttl {
            return Some(entry.is_admin);
        }
        st.entries.remove(&key);
        None
    }

    pub async fn set(&self, chat_id: ChatId, user_id: UserId, is_admin: bool) {
        let mut st = self.inner.state.lock().await;
        st.entries.insert(
            (chat_id, user_id),
            CacheEntry {
                is_admin,
                observed_at: Instant::now(),
            },
        );

        if !st.cleanup_running {
            st.cleanup_running = true;
            let weak = Arc::downgrade(&self.inner);
            let interval = self.inner.cleanup_interval;
            tokio::spawn(cleanup_loop(weak, interval));
        }
    }

    pub async fn invalidate(&self, chat_id: ChatId, user_id: UserId) {
        let mut st = self.inner.state.lock().await;
        st.entries.remove(&(chat_id, user_id));
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn cleanup_running(&self) -> bool {
        self.inner.state.lock().await.cleanup_running
    }

    /// Cached lookup, falling back to the platform on a miss.
    ///
    /// Fails closed: a platform error is treated as "not an admin" and is not
    /// cached.
    pub async fn resolve(
        &self,
        platform: &dyn ModerationPlatform,
        chat_id: ChatId,
        user_id: UserId,
    ) -> bool {
        if let Some(v) = self.get(chat_id, user_id).await {
            return v;
        }
        match platform.get_chat_member(chat_id, user_id).await {
            Ok(status) => {
                let is_admin = status.is_privileged();
                self.set(chat_id, user_id, is_admin).await;
                is_admin
            }
            Err(e) => {
                tracing::warn!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    "member lookup failed, treating as not admin: {e}"
                );
                false
            }
        }
    }
}

async fn cleanup_loop(inner: Weak<Inner>, interval: Duration) {
    loop {
        sleep(interval).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut st = inner.state.lock().await;
        let ttl = inner.ttl;
        let before = st.entries.len();
        st.entries.retain(|_, e| e.observed_at.elapsed() < ttl);
        tracing::debug!(
            purged = before - st.entries.len(),
            remaining = st.entries.len(),
            "admin cache cleanup"
        );
        if st.entries.is_empty() {
            st.cleanup_running = false;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, MemberStatus, MessageId, MessageRef};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MemberLookup {
        status: Option<MemberStatus>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModerationPlatform for MemberLookup {
        async fn send_message(&self, chat_id: ChatId, _text: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }
        async fn edit_message(&self, _msg: MessageRef, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn delete_messages(&self, _c: ChatId, ids: &[MessageId]) -> Result<usize> {
            Ok(ids.len())
        }
        async fn get_chat_member(&self, _c: ChatId, _u: UserId) -> Result<MemberStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status
                .ok_or_else(|| Error::External("lookup failed".to_string()))
        }
        async fn get_chat_history(&self, _c: ChatId, _l: usize) -> Result<Vec<ChatMessage>> {
            Ok(vec![])
        }
        async fn restrict_member(
            &self,
            _c: ChatId,
            _u: UserId,
            _until: Option<DateTime<Utc>>,
        ) -> Result<()> {
            Ok(())
        }
        async fn ban_member(&self, _c: ChatId, _u: UserId) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = AdminExemptionCache::new(Duration::from_secs(60), Duration::from_secs(300));
        cache.set(ChatId(1), UserId(2), true).await;
        assert_eq!(cache.get(ChatId(1), UserId(2)).await, Some(true));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(ChatId(1), UserId(2)).await, Some(true));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(ChatId(1), UserId(2)).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_timestamp() {
        let cache = AdminExemptionCache::new(Duration::from_secs(10), Duration::from_secs(300));
        cache.set(ChatId(1), UserId(2), true).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set(ChatId(1), UserId(2), false).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(ChatId(1), UserId(2)).await, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_loop_drains_and_restarts() {
        let cache = AdminExemptionCache::new(Duration::from_secs(60), Duration::from_secs(120));
        cache.set(ChatId(1), UserId(1), false).await;
        cache.set(ChatId(1), UserId(2), true).await;
        assert!(cache.cleanup_running().await);

        // First tick at t=120s purges both (ttl 60s) and the loop exits.
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(cache.is_empty().await);
        assert!(!cache.cleanup_running().await);

        cache.set(ChatId(3), UserId(3), true).await;
        assert!(cache.cleanup_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_removes_one_entry() {
        let cache = AdminExemptionCache::default();
        cache.set(ChatId(1), UserId(1), true).await;
        cache.set(ChatId(1), UserId(2), true).await;
        cache.invalidate(ChatId(1), UserId(1)).await;
        assert_eq!(cache.get(ChatId(1), UserId(1)).await, None);
        assert_eq!(cache.get(ChatId(1), UserId(2)).await, Some(true));
    }

    #[tokio::test]
    async fn resolve_caches_success_and_fails_closed() {
        let cache = AdminExemptionCache::default();
        let admin = MemberLookup {
            status: Some(MemberStatus::Owner),
            calls: AtomicUsize::new(0),
        };
        assert!(cache.resolve(&admin, ChatId(1), UserId(1)).await);
        assert!(cache.resolve(&admin, ChatId(1), UserId(1)).await);
        assert_eq!(admin.calls.load(Ordering::SeqCst), 1);

        let broken = MemberLookup {
            status: None,
            calls: AtomicUsize::new(0),
        };
        assert!(!cache.resolve(&broken, ChatId(1), UserId(9)).await);
        assert_eq!(cache.get(ChatId(1), UserId(9)).await, None);
    }
}
