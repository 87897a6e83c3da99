use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{DuplicateEmail, QrCodeStore, UserStore};
use crate::models::{qr_code::QrCode, user::UserModel};

/// Process-local storage backend. Nothing survives a restart; meant for
/// development runs and the test-suite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, UserModel>,
    qr_codes: DashMap<Uuid, QrCode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<Uuid> {
        use dashmap::mapref::entry::Entry;

        match self.users.entry(email.to_string()) {
            Entry::Occupied(_) => Err(DuplicateEmail.into()),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                slot.insert(UserModel {
                    id,
                    email: email.to_string(),
                    name: name.to_string(),
                    password_hash: password_hash.to_string(),
                    created_at: chrono::Utc::now(),
                });
                Ok(id)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserModel>> {
        Ok(self.users.get(email).map(|user| user.value().clone()))
    }
}

#[async_trait]
impl QrCodeStore for MemoryStore {
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<QrCode>> {
        let mut codes: Vec<QrCode> = self
            .qr_codes
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        codes.sort_by(|a, b| {
            b.is_favorite
                .cmp(&a.is_favorite)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(codes)
    }

    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<QrCode>> {
        Ok(self
            .qr_codes
            .get(&id)
            .filter(|code| code.user_id == user_id)
            .map(|code| code.value().clone()))
    }

    async fn find_by_share_token(&self, token: &str) -> anyhow::Result<Option<QrCode>> {
        Ok(self
            .qr_codes
            .iter()
            .find(|entry| entry.share_token.as_deref() == Some(token))
            .map(|entry| entry.value().clone()))
    }

    async fn insert(&self, code: &QrCode) -> anyhow::Result<()> {
        if self.qr_codes.contains_key(&code.id) {
            anyhow::bail!("QR code {} already exists", code.id);
        }
        self.qr_codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn update(&self, code: &QrCode) -> anyhow::Result<bool> {
        match self.qr_codes.get_mut(&code.id) {
            Some(mut existing) if existing.user_id == code.user_id => {
                *existing = code.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .qr_codes
            .remove_if(&id, |_, code| code.user_id == user_id)
            .is_some())
    }
}
