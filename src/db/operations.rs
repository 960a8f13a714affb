use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::models::User;
use crate::db::queries::UserQuery;
use crate::db::session::{Session, SessionFactory};
use crate::error::DatabaseError;
use crate::Result;

/// Data access for the `User` table.
///
/// Every call opens its own session from the shared factory and releases it
/// before returning, on success and on error.
#[derive(Clone)]
pub struct UserStore {
    sessions: Arc<dyn SessionFactory>,
}

impl UserStore {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self { sessions }
    }

    /// Looks a user up by primary key. A missing row is `Ok(None)`.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let mut session = self.sessions.open().await?;
        let user = session.find_user(user_id).await?;
        debug!(user_id, found = user.is_some(), "get_user_by_id");
        Ok(user)
    }

    pub async fn find_all(&self) -> Result<Vec<User>> {
        self.find_by(&UserQuery::All).await
    }

    pub async fn find_by(&self, query: &UserQuery) -> Result<Vec<User>> {
        let mut session = self.sessions.open().await?;
        let users = session.find_users(query).await?;
        debug!(query = query.name(), rows = users.len(), "find_by");
        Ok(users)
    }

    /// Persists a new user in its own transaction.
    pub async fn create_user(&self, user: &User) -> Result<User> {
        let mut session = self.sessions.open().await?;
        session.begin().await?;

        let result = session.insert_user(user).await;
        let created = Self::finish(session.as_mut(), result).await?;
        info!(user_id = %created.user_id, "user created");
        Ok(created)
    }

    /// Re-reads the row for `user.user_id` inside a transaction, sets its
    /// city and commits. Returns the stored record; `user` itself is not
    /// modified.
    ///
    /// Fails with `DatabaseError::NotFound` if the row no longer exists, in
    /// which case nothing is written.
    pub async fn update_user_city(&self, user: &User, new_city: Option<&str>) -> Result<User> {
        let mut session = self.sessions.open().await?;
        session.begin().await?;

        let result = Self::apply_city(session.as_mut(), user.user_id(), new_city).await;
        let updated = Self::finish(session.as_mut(), result).await?;
        info!(user_id = %updated.user_id, city = ?updated.city, "user city updated");
        Ok(updated)
    }

    async fn apply_city(
        session: &mut dyn Session,
        user_id: &str,
        new_city: Option<&str>,
    ) -> Result<User> {
        let mut managed = session
            .find_user(user_id)
            .await?
            .ok_or(DatabaseError::NotFound)?;
        managed.set_city(new_city.map(str::to_owned));
        // the row can still disappear between the read and the write
        let merged = session
            .merge_user(&managed)
            .await?
            .ok_or(DatabaseError::NotFound)?;
        Ok(merged)
    }

    /// Commits on success, rolls back on failure. A failed rollback is
    /// logged and the original error is returned.
    async fn finish<T>(session: &mut dyn Session, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }
}
