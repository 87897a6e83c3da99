use std::sync::Arc;

use chrono::Utc;
use nanoid::nanoid;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    errors::ApiError,
    models::qr_code::{ListFilter, QrCode, QrCodeForm, SharedQrCode},
    store::QrCodeStore,
};

/// Length of generated share tokens.
const SHARE_TOKEN_LEN: usize = 21;

/// Ownership-checked operations on a user's QR codes. A record owned by
/// someone else is reported exactly like a missing one.
#[derive(Clone)]
pub struct QrCodeService {
    repo: Arc<dyn QrCodeStore>,
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::qr_not_found())
}

fn store_error(e: anyhow::Error) -> ApiError {
    ApiError::Unexpected(e.context("QR code store failure"))
}

impl QrCodeService {
    pub fn new(repo: Arc<dyn QrCodeStore>) -> Self {
        Self { repo }
    }

    #[instrument(name = "Service: List QR codes", skip(self))]
    pub async fn list(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        filter: ListFilter,
    ) -> Result<Vec<QrCode>, ApiError> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let codes = self.repo.list_by_user(user_id).await.map_err(store_error)?;
        Ok(codes
            .into_iter()
            .filter(|code| filter.matches(code))
            .filter(|code| match &needle {
                Some(needle) => {
                    code.name.to_lowercase().contains(needle)
                        || code.content.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect())
    }

    #[instrument(name = "Service: Get QR code", skip(self))]
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<QrCode, ApiError> {
        self.repo
            .find_owned(id, user_id)
            .await
            .map_err(store_error)?
            .ok_or_else(ApiError::qr_not_found)
    }

    /// Fetches several of the user's records, keeping the requested order and
    /// failing if any of them is not the user's.
    #[instrument(
        name = "Service: Get QR code selection",
        skip(self, ids),
        fields(count = ids.len())
    )]
    pub async fn get_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<Vec<QrCode>, ApiError> {
        if ids.is_empty() {
            return Err(ApiError::BadRequest("Select at least one QR code".into()));
        }
        let mut codes = Vec::with_capacity(ids.len());
        for id in ids {
            codes.push(self.get(user_id, *id).await?);
        }
        Ok(codes)
    }

    #[instrument(name = "Service: Create QR code", skip(self, form))]
    pub async fn create(&self, user_id: Uuid, form: QrCodeForm) -> Result<QrCode, ApiError> {
        let draft = form.validate().map_err(ApiError::BadRequest)?;
        let code = QrCode::new(user_id, draft, Utc::now());
        self.repo.insert(&code).await.map_err(store_error)?;
        tracing::info!(qr_id = %code.id, "QR code created");
        Ok(code)
    }

    #[instrument(name = "Service: Update QR code", skip(self, form))]
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        form: QrCodeForm,
    ) -> Result<QrCode, ApiError> {
        let mut code = self.get(user_id, id).await?;
        let draft = form.validate().map_err(ApiError::BadRequest)?;
        code.apply(draft, Utc::now());
        self.save(&code).await?;
        Ok(code)
    }

    #[instrument(name = "Service: Delete QR code", skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        if !self.repo.delete(id, user_id).await.map_err(store_error)? {
            return Err(ApiError::qr_not_found());
        }
        tracing::info!(qr_id = %id, "QR code deleted");
        Ok(())
    }

    #[instrument(name = "Service: Duplicate QR code", skip(self))]
    pub async fn duplicate(&self, user_id: Uuid, id: Uuid) -> Result<QrCode, ApiError> {
        let original = self.get(user_id, id).await?;
        let copy = original.duplicate(Utc::now());
        self.repo.insert(&copy).await.map_err(store_error)?;
        tracing::info!(qr_id = %copy.id, source_id = %id, "QR code duplicated");
        Ok(copy)
    }

    #[instrument(name = "Service: Toggle favorite", skip(self))]
    pub async fn toggle_favorite(&self, user_id: Uuid, id: Uuid) -> Result<QrCode, ApiError> {
        let mut code = self.get(user_id, id).await?;
        code.is_favorite = !code.is_favorite;
        code.updated_at = Utc::now();
        self.save(&code).await?;
        Ok(code)
    }

    /// Flips public sharing. A token is minted (or kept) while public and
    /// dropped as soon as sharing is turned off.
    #[instrument(name = "Service: Toggle sharing", skip(self))]
    pub async fn toggle_share(&self, user_id: Uuid, id: Uuid) -> Result<QrCode, ApiError> {
        let mut code = self.get(user_id, id).await?;
        code.is_public = !code.is_public;
        code.share_token = if code.is_public {
            Some(code.share_token.take().unwrap_or_else(|| nanoid!(SHARE_TOKEN_LEN)))
        } else {
            None
        };
        code.updated_at = Utc::now();
        self.save(&code).await?;
        tracing::info!(qr_id = %id, is_public = code.is_public, "QR code sharing toggled");
        Ok(code)
    }

    #[instrument(name = "Service: Resolve share token", skip(self, token))]
    pub async fn resolve_share(&self, token: &str) -> Result<SharedQrCode, ApiError> {
        Ok(SharedQrCode::from(&self.resolve_share_record(token).await?))
    }

    /// Full record behind a public token, for server-side rendering only.
    pub async fn resolve_share_record(&self, token: &str) -> Result<QrCode, ApiError> {
        let not_shared = || ApiError::NotFound("QR code not found or not shared".into());
        match self
            .repo
            .find_by_share_token(token)
            .await
            .map_err(store_error)?
        {
            Some(code) if code.is_public => Ok(code),
            _ => {
                tracing::warn!("Share token did not resolve");
                Err(not_shared())
            }
        }
    }

    async fn save(&self, code: &QrCode) -> Result<(), ApiError> {
        if !self.repo.update(code).await.map_err(store_error)? {
            return Err(ApiError::qr_not_found());
        }
        Ok(())
    }
}
