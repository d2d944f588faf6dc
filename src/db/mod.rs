//! User storage.
//!
//! Account routes only need two things from storage: look a user up by email
//! and create one. `UserStore` is that seam; `DbOperations` backs it with
//! Postgres and `InMemoryUserStore` keeps everything in process.

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;

use crate::error::DatabaseError;

pub use memory::InMemoryUserStore;
pub use models::User;
pub use operations::DbOperations;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Fails with `DatabaseError::Duplicate` when the email is taken.
    async fn insert(&self, user: &User) -> Result<User, DatabaseError>;
}
