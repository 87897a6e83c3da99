use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{qr_code::QrCode, user::UserModel};

pub mod memory;
pub mod qr_code;
pub mod user;

pub use memory::MemoryStore;
pub use qr_code::QrCodeRepository;
pub use user::UserRepository;

/// Raised by `UserStore::create_user` when the email is already registered.
#[derive(Debug, thiserror::Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, email: &str, name: &str, password_hash: &str)
    -> anyhow::Result<Uuid>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserModel>>;
}

#[async_trait]
pub trait QrCodeStore: Send + Sync {
    /// Favorites first, then most recently updated first.
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<QrCode>>;

    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<QrCode>>;

    async fn find_by_share_token(&self, token: &str) -> anyhow::Result<Option<QrCode>>;

    async fn insert(&self, code: &QrCode) -> anyhow::Result<()>;

    /// Overwrites the record matching both `code.id` and `code.user_id`.
    async fn update(&self, code: &QrCode) -> anyhow::Result<bool>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
}
