//! Unit-of-work sessions and the factory that hands them out.
//!
//! A [`Session`] is released when it is dropped, so every exit path of a
//! data-access call gives it back exactly once. [`Instrumented`] counts
//! those acquisitions and releases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::db::models::User;
use crate::db::queries::UserQuery;
use crate::Result;

/// One unit of work against storage.
///
/// Writes are only accepted between [`Session::begin`] and
/// [`Session::commit`]. Dropping a session with an open transaction
/// discards it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send {
    async fn find_user(&mut self, user_id: &str) -> Result<Option<User>>;

    async fn find_users(&mut self, query: &UserQuery) -> Result<Vec<User>>;

    async fn begin(&mut self) -> Result<()>;

    /// Inserts a new row; fails with `DatabaseError::Duplicate` if the
    /// `userId` is taken.
    async fn insert_user(&mut self, user: &User) -> Result<User>;

    /// Validates the record, then writes it over the existing row with the
    /// same `userId`. `Ok(None)` when that row no longer exists; nothing is
    /// inserted in that case.
    async fn merge_user(&mut self, user: &User) -> Result<Option<User>>;

    async fn commit(&mut self) -> Result<()>;

    /// No-op when no transaction is open.
    async fn rollback(&mut self) -> Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Fails with `DatabaseError::ConnectionError` when storage is unreachable.
    async fn open(&self) -> Result<Box<dyn Session>>;

    /// Releases the resources behind the factory. Sessions opened afterwards fail.
    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub opened: u64,
    pub released: u64,
    pub active: u64,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    released: AtomicU64,
}

/// Wraps a factory and counts the sessions it hands out and gets back.
pub struct Instrumented {
    inner: Arc<dyn SessionFactory>,
    counters: Arc<Counters>,
}

impl Instrumented {
    pub fn new(inner: Arc<dyn SessionFactory>) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> SessionStats {
        // released is read first so active never underflows
        let released = self.counters.released.load(Ordering::SeqCst);
        let opened = self.counters.opened.load(Ordering::SeqCst);
        SessionStats {
            opened,
            released,
            active: opened.saturating_sub(released),
        }
    }
}

#[async_trait]
impl SessionFactory for Instrumented {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let inner = self.inner.open().await?;
        let id = self.counters.opened.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session = id, "session opened");
        Ok(Box::new(Tracked {
            id,
            inner,
            counters: self.counters.clone(),
        }))
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

struct Tracked {
    id: u64,
    inner: Box<dyn Session>,
    counters: Arc<Counters>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        debug!(session = self.id, "session released");
    }
}

#[async_trait]
impl Session for Tracked {
    async fn find_user(&mut self, user_id: &str) -> Result<Option<User>> {
        self.inner.find_user(user_id).await
    }

    async fn find_users(&mut self, query: &UserQuery) -> Result<Vec<User>> {
        self.inner.find_users(query).await
    }

    async fn begin(&mut self) -> Result<()> {
        self.inner.begin().await
    }

    async fn insert_user(&mut self, user: &User) -> Result<User> {
        self.inner.insert_user(user).await
    }

    async fn merge_user(&mut self, user: &User) -> Result<Option<User>> {
        self.inner.merge_user(user).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemorySessionFactory;
    use crate::error::{AppError, DatabaseError};

    #[tokio::test]
    async fn test_drop_releases_exactly_once() {
        let factory = Instrumented::new(Arc::new(MemorySessionFactory::default()));

        let first = factory.open().await.unwrap();
        let second = factory.open().await.unwrap();
        assert_eq!(
            factory.stats(),
            SessionStats { opened: 2, released: 0, active: 2 }
        );

        drop(first);
        assert_eq!(factory.stats().active, 1);
        drop(second);
        assert_eq!(
            factory.stats(),
            SessionStats { opened: 2, released: 2, active: 0 }
        );
    }

    #[tokio::test]
    async fn test_failed_open_is_not_counted() {
        let memory = MemorySessionFactory::default();
        memory.fail_next_open();
        let factory = Instrumented::new(Arc::new(memory));

        let err = factory.open().await.err().unwrap();
        assert!(matches!(
            err,
            AppError::DatabaseError(DatabaseError::ConnectionError(_))
        ));
        assert_eq!(factory.stats().opened, 0);
        assert_eq!(factory.stats().released, 0);
    }

    #[tokio::test]
    async fn test_tracked_session_delegates() {
        let memory = MemorySessionFactory::with_users([User::new("u1").with_city("Lyon")]);
        let factory = Instrumented::new(Arc::new(memory));

        let mut session = factory.open().await.unwrap();
        let found = session.find_user("u1").await.unwrap().unwrap();
        assert_eq!(found.city(), Some("Lyon"));
        let all = session.find_users(&UserQuery::All).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
