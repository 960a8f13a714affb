//! Data access for the `User` table.
//!
//! Callers go through [`UserStore`]; each call borrows one [`Session`] from
//! a [`SessionFactory`] built once at start-up.

pub mod memory;
pub mod models;
pub mod operations;
pub mod postgres;
pub mod queries;
pub mod session;

pub use memory::MemorySessionFactory;
pub use models::User;
pub use operations::UserStore;
pub use postgres::PgSessionFactory;
pub use queries::UserQuery;
pub use session::{Instrumented, Session, SessionFactory, SessionStats};
