use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, patch, post},
};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::configuration::{Settings, StorageBackend};
use crate::routes::auth::{
    Keys, authorize_handler, login_page, login_post, logout_handler, register_handler,
    signup_page, signup_post,
};
use crate::routes::pages::{
    create_post, dashboard_page, delete_action, duplicate_action, edit_page, favorite_action,
    index_page, new_page, not_found_handler, robots_txt, share_action, share_page, sitemap_xml,
    update_post,
};
use crate::routes::qr_code::{
    create_handler, delete_handler, duplicate_handler, export_handler, export_zip_handler,
    favorite_handler, get_handler, list_handler, preview_handler, share_handler,
    templates_handler, update_handler,
};
use crate::routes::share::{shared_handler, shared_image_handler};
use crate::services::auth::AuthService;
use crate::services::qr_code::QrCodeService;
use crate::store::{MemoryStore, QrCodeRepository, QrCodeStore, UserRepository, UserStore};

#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    pub hours: i64,
    pub secure_cookies: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub qr_service: QrCodeService,
    pub auth_service: AuthService,
    pub keys: Arc<Keys>,
    pub session: SessionSettings,
    pub base_url: String,
}

/// Wires the stores and services selected by `settings`. The Postgres pool
/// connects lazily, so migrations are the first round trip.
pub async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let (users, qr_codes): (Arc<dyn UserStore>, Arc<dyn QrCodeStore>) =
        match settings.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store, data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                let users: Arc<dyn UserStore> = store.clone();
                (users, store as Arc<dyn QrCodeStore>)
            }
            StorageBackend::Postgres => {
                let pg_pool = PgPoolOptions::new()
                    .acquire_timeout(std::time::Duration::from_secs(2))
                    .connect_lazy_with(settings.database.with_db());
                sqlx::migrate!("./migrations")
                    .run(&pg_pool)
                    .await
                    .context("failed to run database migrations")?;
                let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pg_pool.clone()));
                let qr_codes: Arc<dyn QrCodeStore> = Arc::new(QrCodeRepository::new(pg_pool));
                (users, qr_codes)
            }
        };

    if settings.auth.uses_placeholder_secret() {
        tracing::warn!("auth.jwt_secret is the bundled placeholder, sessions can be forged");
    }

    Ok(AppState {
        qr_service: QrCodeService::new(qr_codes),
        auth_service: AuthService::new(users),
        keys: Arc::new(Keys::new(
            settings.auth.jwt_secret.expose_secret().as_bytes(),
        )),
        session: SessionSettings {
            hours: settings.auth.session_hours,
            secure_cookies: settings.auth.secure_cookies,
        },
        base_url: settings.application.base_url.clone(),
    })
}

pub fn build_router(state: AppState, assets_dir: &str) -> Router {
    let api = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(authorize_handler))
        .route("/qrcodes", get(list_handler).post(create_handler))
        .route("/qrcodes/duplicate", post(duplicate_handler))
        .route("/qrcodes/export.zip", get(export_zip_handler))
        .route(
            "/qrcodes/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/qrcodes/{id}/favorite", patch(favorite_handler))
        .route("/qrcodes/{id}/share", patch(share_handler))
        .route("/qrcodes/{id}/export", get(export_handler))
        .route("/qrcodes/{id}/preview", get(preview_handler))
        .route("/share/{token}", get(shared_handler))
        .route("/share/{token}/image", get(shared_image_handler))
        .route("/templates", get(templates_handler));

    Router::new()
        .route("/", get(index_page))
        .route("/login", get(login_page).post(login_post))
        .route("/signup", get(signup_page).post(signup_post))
        .route("/logout", get(logout_handler))
        .route("/dashboard", get(dashboard_page))
        .route("/qrcode/new", get(new_page).post(create_post))
        .route("/qrcode/{id}", get(edit_page).post(update_post))
        .route("/qrcode/{id}/favorite", post(favorite_action))
        .route("/qrcode/{id}/duplicate", post(duplicate_action))
        .route("/qrcode/{id}/delete", post(delete_action))
        .route("/qrcode/{id}/share", post(share_action))
        .route("/share/{token}", get(share_page))
        .route("/robots.txt", get(robots_txt))
        .route("/sitemap.xml", get(sitemap_xml))
        .nest("/api", api)
        .nest_service("/assets", ServeDir::new(assets_dir))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let state = build_state(&settings).await?;
    let app = build_router(state, &settings.application.assets_dir);

    let address = format!(
        "{}:{}",
        settings.application.host, settings.application.port
    );
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;
    tracing::info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
