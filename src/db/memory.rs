//! In-process `User` table.
//!
//! Follows the same unit-of-work rules as the Postgres backend: writes are
//! staged per session and only become visible to other sessions on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::models::User;
use crate::db::queries::UserQuery;
use crate::db::session::{Session, SessionFactory};
use crate::error::{AppError, DatabaseError};
use crate::Result;

type Table = BTreeMap<String, User>;

#[derive(Debug, Default)]
struct Faults {
    fail_next_open: AtomicBool,
    fail_commit: AtomicBool,
    closed: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemorySessionFactory {
    table: Arc<Mutex<Table>>,
    faults: Arc<Faults>,
}

impl MemorySessionFactory {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let table = users
            .into_iter()
            .map(|user| (user.user_id.clone(), user))
            .collect();
        Self {
            table: Arc::new(Mutex::new(table)),
            faults: Arc::default(),
        }
    }

    /// Deletes a row outside of any session, as another process would.
    pub fn remove_user(&self, user_id: &str) -> Option<User> {
        lock(&self.table).ok()?.remove(user_id)
    }

    /// Committed rows, ordered by `userId`.
    pub fn snapshot(&self) -> Vec<User> {
        lock(&self.table)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes the next `open` fail as if storage were unreachable.
    pub fn fail_next_open(&self) {
        self.faults.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Makes every commit fail until switched off again.
    pub fn fail_commits(&self, fail: bool) {
        self.faults.fail_commit.store(fail, Ordering::SeqCst);
    }
}

fn lock(table: &Mutex<Table>) -> Result<MutexGuard<'_, Table>> {
    table
        .lock()
        .map_err(|e| AppError::InternalError(format!("memory table poisoned: {}", e)))
}

#[async_trait]
impl SessionFactory for MemorySessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        if self.faults.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionError("memory store is closed".into()).into());
        }
        if self.faults.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionError("memory store unavailable".into()).into());
        }
        Ok(Box::new(MemorySession {
            table: self.table.clone(),
            faults: self.faults.clone(),
            staged: None,
        }))
    }

    async fn close(&self) {
        self.faults.closed.store(true, Ordering::SeqCst);
    }
}

/// A write staged in the open transaction.
#[derive(Clone)]
enum Staged {
    Insert(User),
    Update(User),
}

impl Staged {
    fn user(&self) -> &User {
        match self {
            Staged::Insert(user) | Staged::Update(user) => user,
        }
    }
}

struct MemorySession {
    table: Arc<Mutex<Table>>,
    faults: Arc<Faults>,
    /// Writes of the open transaction, `None` outside of one.
    staged: Option<BTreeMap<String, Staged>>,
}

impl MemorySession {
    fn staged_mut(&mut self) -> Result<&mut BTreeMap<String, Staged>> {
        self.staged
            .as_mut()
            .ok_or_else(|| AppError::InternalError("write outside of a transaction".into()))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn find_user(&mut self, user_id: &str) -> Result<Option<User>> {
        if let Some(write) = self.staged.as_ref().and_then(|s| s.get(user_id)) {
            return Ok(Some(write.user().clone()));
        }
        Ok(lock(&self.table)?.get(user_id).cloned())
    }

    async fn find_users(&mut self, query: &UserQuery) -> Result<Vec<User>> {
        let mut rows = lock(&self.table)?.clone();
        if let Some(staged) = &self.staged {
            rows.extend(staged.iter().map(|(k, w)| (k.clone(), w.user().clone())));
        }
        Ok(rows.into_values().filter(|u| query.matches(u)).collect())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(AppError::InternalError("transaction already open".into()));
        }
        self.staged = Some(BTreeMap::new());
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<User> {
        user.validate()?;
        let taken = lock(&self.table)?.contains_key(&user.user_id);
        let staged = self.staged_mut()?;
        if taken || staged.contains_key(&user.user_id) {
            return Err(DatabaseError::Duplicate.into());
        }
        staged.insert(user.user_id.clone(), Staged::Insert(user.clone()));
        Ok(user.clone())
    }

    async fn merge_user(&mut self, user: &User) -> Result<Option<User>> {
        user.validate()?;
        let exists = lock(&self.table)?.contains_key(&user.user_id);
        let staged = self.staged_mut()?;
        let write = match staged.get(&user.user_id) {
            Some(Staged::Insert(_)) => Staged::Insert(user.clone()),
            Some(Staged::Update(_)) => Staged::Update(user.clone()),
            None if exists => Staged::Update(user.clone()),
            None => return Ok(None),
        };
        staged.insert(user.user_id.clone(), write);
        Ok(Some(user.clone()))
    }

    /// Applies every staged write or none. An update whose row was removed
    /// since it was staged fails with `NotFound`, an insert whose id was
    /// taken meanwhile with `Duplicate`.
    async fn commit(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| AppError::InternalError("commit without a transaction".into()))?;
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            warn!(rows = staged.len(), "injected commit failure, staged rows dropped");
            return Err(DatabaseError::QueryError("commit failed".into()).into());
        }

        let mut table = lock(&self.table)?;
        for (user_id, write) in &staged {
            match write {
                Staged::Update(_) if !table.contains_key(user_id) => {
                    warn!(user_id = %user_id, "row removed before commit");
                    return Err(DatabaseError::NotFound.into());
                }
                Staged::Insert(_) if table.contains_key(user_id) => {
                    return Err(DatabaseError::Duplicate.into());
                }
                _ => {}
            }
        }
        let rows = staged.len();
        table.extend(staged.into_iter().map(|(k, w)| (k, w.user().clone())));
        debug!(rows, "memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }
}
