use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::db::models::User;
use crate::db::queries::{UserQuery, USER_COLUMNS};
use crate::db::session::{Session, SessionFactory};
use crate::error::{AppError, DatabaseError};
use crate::Result;

/// Hands out sessions backed by one shared connection pool.
#[derive(Clone)]
pub struct PgSessionFactory {
    pool: PgPool,
}

impl PgSessionFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        info!(
            persistence_unit = %config.persistence_unit,
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        if self.pool.is_closed() {
            return Err(DatabaseError::ConnectionError("connection pool is closed".into()).into());
        }
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool closed");
    }
}

/// Acquires pool connections lazily; a transaction pins one connection
/// until it is committed, rolled back, or dropped.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::InternalError("write outside of a transaction".into()))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn find_user(&mut self, user_id: &str) -> Result<Option<User>> {
        let sql = format!(r#"SELECT {} FROM "User" WHERE "userId" = $1"#, USER_COLUMNS);
        let query = sqlx::query_as::<_, User>(&sql).bind(user_id);
        let user = match self.tx.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        Ok(user)
    }

    async fn find_users(&mut self, query: &UserQuery) -> Result<Vec<User>> {
        let sql = query.sql();
        let mut prepared = sqlx::query_as::<_, User>(&sql);
        if let Some(param) = query.param() {
            prepared = prepared.bind(param);
        }
        let users = match self.tx.as_mut() {
            Some(tx) => prepared.fetch_all(&mut **tx).await?,
            None => prepared.fetch_all(&self.pool).await?,
        };
        debug!(query = query.name(), rows = users.len(), "named query executed");
        Ok(users)
    }

    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(AppError::InternalError("transaction already open".into()));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<User> {
        user.validate()?;
        let sql = format!(
            r#"
            INSERT INTO "User" ("userId", city, password, country, email, phone, "firstName", "lastName")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let tx = self.tx_mut()?;
        let stored = bind_user(sqlx::query_as::<_, User>(&sql), user)
            .fetch_one(&mut **tx)
            .await?;
        Ok(stored)
    }

    async fn merge_user(&mut self, user: &User) -> Result<Option<User>> {
        user.validate()?;
        let sql = format!(
            r#"
            UPDATE "User" SET
                city = $2,
                password = $3,
                country = $4,
                email = $5,
                phone = $6,
                "firstName" = $7,
                "lastName" = $8
            WHERE "userId" = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let tx = self.tx_mut()?;
        // zero rows means the row was deleted after it was read
        let stored = bind_user(sqlx::query_as::<_, User>(&sql), user)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(stored)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::InternalError("commit without a transaction".into()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

type UserQueryAs<'q> =
    sqlx::query::QueryAs<'q, Postgres, User, sqlx::postgres::PgArguments>;

fn bind_user<'q>(query: UserQueryAs<'q>, user: &'q User) -> UserQueryAs<'q> {
    query
        .bind(&user.user_id)
        .bind(&user.city)
        .bind(&user.password)
        .bind(&user.country)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
}
