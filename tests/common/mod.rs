#![allow(dead_code)]

use qrforge::configuration::{Settings, StorageBackend, get_configuration};
use qrforge::startup::{build_router, build_state};
use serde_json::{Value, json};
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

fn test_settings() -> Settings {
    let mut settings = get_configuration().expect("configurations/ should load");
    settings.database.backend = StorageBackend::Memory;
    settings.application.base_url = "https://qr.example.test".into();
    settings
}

/// Spin up the app on an OS-assigned port over the in-memory store.
pub async fn spawn_app() -> TestApp {
    let settings = test_settings();
    let state = build_state(&settings).await.unwrap();
    let app = build_router(state, &settings.application.assets_dir);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(true)
        .build()
        .unwrap();

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client,
    }
}

pub fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4())
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn register(&self, email: &str, name: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "email": email, "name": name, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Registers a fresh user and returns their bearer token.
    pub async fn new_user_token(&self) -> String {
        let email = unique_email();
        let registered = self.register(&email, "Tester", "secret123").await;
        assert_eq!(registered.status(), 201);
        let body: Value = self.login(&email, "secret123").await.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn create_qr(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/qrcodes"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn create_menu(&self, token: &str) -> Value {
        let response = self
            .create_qr(
                token,
                json!({
                    "name": "Lunch menu",
                    "type": "url",
                    "content": "https://example.com/menu"
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }
}
