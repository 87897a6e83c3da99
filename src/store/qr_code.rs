use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;
use uuid::Uuid;

use super::QrCodeStore;
use crate::models::qr_code::{QrCode, QrCodeRow};

const COLUMNS: &str = "id, user_id, name, kind, content, foreground_color, background_color, \
    size, error_correction, logo_data_url, is_favorite, is_public, share_token, \
    created_at, updated_at";

#[derive(Clone, Debug)]
pub struct QrCodeRepository {
    pg_pool: Pool<Postgres>,
}

impl QrCodeRepository {
    pub fn new(pg_pool: Pool<Postgres>) -> Self {
        Self { pg_pool }
    }
}

fn size_column(code: &QrCode) -> i32 {
    // 1024 at most
    code.size.pixels() as i32
}

#[async_trait]
impl QrCodeStore for QrCodeRepository {
    #[instrument(name = "Listing QR codes from database", skip(self))]
    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<QrCode>> {
        let rows = sqlx::query_as::<_, QrCodeRow>(&format!(
            "SELECT {COLUMNS} FROM qr_codes WHERE user_id = $1 \
             ORDER BY is_favorite DESC, updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pg_pool)
        .await?;
        rows.into_iter().map(QrCode::try_from).collect()
    }

    #[instrument(name = "Fetching QR code from database", skip(self))]
    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<QrCode>> {
        let row = sqlx::query_as::<_, QrCodeRow>(&format!(
            "SELECT {COLUMNS} FROM qr_codes WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pg_pool)
        .await?;
        row.map(QrCode::try_from).transpose()
    }

    #[instrument(name = "Fetching shared QR code from database", skip(self, token))]
    async fn find_by_share_token(&self, token: &str) -> anyhow::Result<Option<QrCode>> {
        let row = sqlx::query_as::<_, QrCodeRow>(&format!(
            "SELECT {COLUMNS} FROM qr_codes WHERE share_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pg_pool)
        .await?;
        row.map(QrCode::try_from).transpose()
    }

    #[instrument(
        name = "Saving new QR code to database",
        skip(self, code),
        fields(qr_id = %code.id)
    )]
    async fn insert(&self, code: &QrCode) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO qr_codes ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(code.id)
        .bind(code.user_id)
        .bind(&code.name)
        .bind(code.kind.as_str())
        .bind(&code.content)
        .bind(code.foreground_color.as_str())
        .bind(code.background_color.as_str())
        .bind(size_column(code))
        .bind(code.error_correction.as_str())
        .bind(code.logo_data_url.as_deref())
        .bind(code.is_favorite)
        .bind(code.is_public)
        .bind(code.share_token.as_deref())
        .bind(code.created_at)
        .bind(code.updated_at)
        .execute(&self.pg_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to execute query: {:?}", e);
            e
        })?;
        Ok(())
    }

    #[instrument(name = "Updating QR code in database", skip(self, code), fields(qr_id = %code.id))]
    async fn update(&self, code: &QrCode) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE qr_codes SET name = $3, kind = $4, content = $5, foreground_color = $6, \
             background_color = $7, size = $8, error_correction = $9, logo_data_url = $10, \
             is_favorite = $11, is_public = $12, share_token = $13, updated_at = $14 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(code.id)
        .bind(code.user_id)
        .bind(&code.name)
        .bind(code.kind.as_str())
        .bind(&code.content)
        .bind(code.foreground_color.as_str())
        .bind(code.background_color.as_str())
        .bind(size_column(code))
        .bind(code.error_correction.as_str())
        .bind(code.logo_data_url.as_deref())
        .bind(code.is_favorite)
        .bind(code.is_public)
        .bind(code.share_token.as_deref())
        .bind(code.updated_at)
        .execute(&self.pg_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(name = "Deleting QR code from database", skip(self))]
    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM qr_codes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pg_pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
