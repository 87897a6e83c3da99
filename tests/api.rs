mod common;

use common::{spawn_app, unique_email};
use serde_json::{Value, json};

#[tokio::test]
async fn register_then_login_issues_a_bearer_token() {
    let app = spawn_app().await;
    let email = unique_email();

    let resp = app.register(&email, "Ada", "secret123").await;
    assert_eq!(resp.status(), 201);
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["email"], email.as_str());
    assert_eq!(user["name"], "Ada");
    assert!(user.get("password_hash").is_none());

    let resp = app.login(&email, "secret123").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert!(!body["access_token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn registration_rejects_bad_input_and_duplicates() {
    let app = spawn_app().await;
    let email = unique_email();

    assert_eq!(app.register(&email, "Ada", "123").await.status(), 400);
    assert_eq!(app.register(&email, "", "secret123").await.status(), 400);
    assert_eq!(app.register("", "Ada", "secret123").await.status(), 400);

    assert_eq!(app.register(&email, "Ada", "secret123").await.status(), 201);
    let resp = app
        .register(&email.to_uppercase(), "Ada", "secret123")
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email, "Ada", "secret123").await;

    assert_eq!(app.login(&email, "wrong-pass").await.status(), 401);
    assert_eq!(app.login(&unique_email(), "secret123").await.status(), 401);
}

#[tokio::test]
async fn qr_endpoints_require_a_token() {
    let app = spawn_app().await;

    let resp = app.get("/api/qrcodes").await;
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .get(app.url("/api/qrcodes"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn create_fills_in_defaults() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    let code = app.create_menu(&token).await;
    assert_eq!(code["name"], "Lunch menu");
    assert_eq!(code["type"], "url");
    assert_eq!(code["size"], 512);
    assert_eq!(code["errorCorrection"], "M");
    assert_eq!(code["foregroundColor"], "#000000");
    assert_eq!(code["backgroundColor"], "#ffffff");
    assert_eq!(code["isFavorite"], false);
    assert_eq!(code["isPublic"], false);
    assert!(code["shareToken"].is_null());

    let id = code["id"].as_str().unwrap();
    let fetched: Value = app
        .client
        .get(app.url(&format!("/api/qrcodes/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"], id);
}

#[tokio::test]
async fn create_rejects_invalid_records() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    let cases = [
        json!({ "name": "x", "type": "url", "content": "not a url" }),
        json!({ "name": "", "type": "text", "content": "hello" }),
        json!({ "name": "x", "type": "text", "content": "hello", "size": 300 }),
        json!({ "name": "x", "type": "text", "content": "hello", "foregroundColor": "blue" }),
        json!({ "name": "x", "type": "text", "content": "hello", "errorCorrection": "Z" }),
        json!({
            "name": "x",
            "type": "text",
            "content": "hello",
            "logoDataUrl": "data:text/plain;base64,aGk="
        }),
    ];
    for body in cases {
        let resp = app.create_qr(&token, body.clone()).await;
        assert_eq!(resp.status(), 400, "expected 400 for {body}");
        let err: Value = resp.json().await.unwrap();
        assert!(err["error"].is_string());
    }
}

#[tokio::test]
async fn url_content_with_a_script_scheme_is_rejected() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    for content in [
        "javascript://example.com/%0Aalert(document.domain)",
        "data:text/html,<script>alert(1)</script>",
        "ftp://example.com/file",
    ] {
        let resp = app
            .create_qr(&token, json!({ "name": "x", "type": "url", "content": content }))
            .await;
        assert_eq!(resp.status(), 400, "expected 400 for {content}");
    }

    // text records may still carry any string
    let resp = app
        .create_qr(
            &token,
            json!({ "name": "x", "type": "text", "content": "javascript:alert(1)" }),
        )
        .await;
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn undecodable_logo_is_rejected_and_exports_keep_working() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    let resp = app
        .create_qr(
            &token,
            json!({
                "name": "x",
                "type": "text",
                "content": "hello",
                "logoDataUrl": "data:image/png;base64,AAAA"
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "The logo image could not be decoded");

    let code = app.create_menu(&token).await;
    let id = code["id"].as_str().unwrap();
    let resp = app
        .client
        .put(app.url(&format!("/api/qrcodes/{id}")))
        .bearer_auth(&token)
        .json(&json!({
            "name": "Lunch menu",
            "type": "url",
            "content": "https://example.com/menu",
            "logoDataUrl": "data:image/png;base64,AAAA"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .get(app.url(&format!("/api/qrcodes/export.zip?ids={id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn bearer_token_is_used_when_the_session_cookie_is_stale() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    let client = reqwest::Client::new();
    let resp = client
        .get(app.url("/api/qrcodes"))
        .header("cookie", "jwt=not-a-valid-token")
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(app.url("/api/qrcodes"))
        .header("cookie", "jwt=not-a-valid-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn records_of_other_users_are_not_found() {
    let app = spawn_app().await;
    let owner = app.new_user_token().await;
    let other = app.new_user_token().await;
    let code = app.create_menu(&owner).await;
    let id = code["id"].as_str().unwrap();

    let resp = app
        .client
        .get(app.url(&format!("/api/qrcodes/{id}")))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app
        .client
        .delete(app.url(&format!("/api/qrcodes/{id}")))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let list: Vec<Value> = app
        .client
        .get(app.url("/api/qrcodes"))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.is_empty());

    let resp = app
        .client
        .get(app.url("/api/qrcodes/not-a-uuid"))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn update_then_delete() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;
    let url = app.url(&format!("/api/qrcodes/{}", code["id"].as_str().unwrap()));

    let updated: Value = app
        .client
        .put(&url)
        .bearer_auth(&token)
        .json(&json!({
            "name": "Dinner",
            "type": "text",
            "content": "Soup",
            "size": 1024,
            "errorCorrection": "H"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "Dinner");
    assert_eq!(updated["type"], "text");
    assert_eq!(updated["size"], 1024);
    assert_eq!(updated["errorCorrection"], "H");
    assert_eq!(updated["createdAt"], code["createdAt"]);

    let resp = app
        .client
        .delete(&url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let resp = app
        .client
        .get(&url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn list_filters_and_orders_favorites_first() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let menu = app.create_menu(&token).await;
    app.create_qr(&token, json!({ "name": "Wifi", "type": "text", "content": "WIFI:S:home;;" }))
        .await;

    let resp = app
        .client
        .patch(app.url(&format!("/api/qrcodes/{}/favorite", menu["id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let favorite: Value = resp.json().await.unwrap();
    assert_eq!(favorite["isFavorite"], true);

    let all: Vec<Value> = app
        .client
        .get(app.url("/api/qrcodes"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["id"], menu["id"]);

    let texts: Vec<Value> = app
        .client
        .get(app.url("/api/qrcodes?filter=text&search=wifi"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0]["name"], "Wifi");

    let resp = app
        .client
        .get(app.url("/api/qrcodes?filter=bogus"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn favorite_toggled_twice_is_restored() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;
    let url = app.url(&format!("/api/qrcodes/{}/favorite", code["id"].as_str().unwrap()));

    for expected in [true, false] {
        let body: Value = app
            .client
            .patch(&url)
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["isFavorite"], expected);
    }
}

#[tokio::test]
async fn duplicate_creates_a_private_copy() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;

    let resp = app
        .client
        .post(app.url("/api/qrcodes/duplicate"))
        .bearer_auth(&token)
        .json(&json!({ "id": code["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let copy: Value = resp.json().await.unwrap();
    assert_ne!(copy["id"], code["id"]);
    assert_eq!(copy["name"], "Lunch menu (copy)");
    assert_eq!(copy["content"], code["content"]);
    assert_eq!(copy["isPublic"], false);
}

#[tokio::test]
async fn duplicate_requires_an_id() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;

    for body in [json!({ "id": "" }), json!({ "id": "   " }), json!({})] {
        let resp = app
            .client
            .post(app.url("/api/qrcodes/duplicate"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "expected 400 for {body}");
        let err: Value = resp.json().await.unwrap();
        assert_eq!(err["error"], "ID is required");
    }
}

#[tokio::test]
async fn sharing_exposes_a_public_view_until_revoked() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;
    let toggle = app.url(&format!("/api/qrcodes/{}/share", code["id"].as_str().unwrap()));

    let shared: Value = app
        .client
        .patch(&toggle)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(shared["isPublic"], true);
    let share_token = shared["shareToken"].as_str().unwrap().to_string();

    let anonymous = reqwest::Client::new();
    let resp = anonymous
        .get(app.url(&format!("/api/share/{share_token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let public: Value = resp.json().await.unwrap();
    assert_eq!(public["name"], "Lunch menu");
    assert!(public.get("userId").is_none());
    assert!(public.get("shareToken").is_none());

    let resp = anonymous
        .get(app.url(&format!("/api/share/{share_token}/image?format=svg")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/svg+xml");

    let private: Value = app
        .client
        .patch(&toggle)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(private["isPublic"], false);
    assert!(private["shareToken"].is_null());

    let resp = anonymous
        .get(app.url(&format!("/api/share/{share_token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn export_serves_each_format_as_an_attachment() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;
    let id = code["id"].as_str().unwrap();

    for (format, content_type, magic) in [
        ("png", "image/png", &b"\x89PNG"[..]),
        ("jpeg", "image/jpeg", &b"\xFF\xD8"[..]),
        ("svg", "image/svg+xml", &b"<"[..]),
        ("pdf", "application/pdf", &b"%PDF"[..]),
    ] {
        let resp = app
            .client
            .get(app.url(&format!("/api/qrcodes/{id}/export?format={format}")))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "format {format}");
        assert_eq!(resp.headers()["content-type"], content_type);
        let disposition = resp.headers()["content-disposition"].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"Lunch menu."));
        let bytes = resp.bytes().await.unwrap();
        assert!(bytes.starts_with(magic), "format {format}");
    }

    let resp = app
        .client
        .get(app.url(&format!("/api/qrcodes/{id}/export?format=gif")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn preview_is_a_png() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let code = app.create_menu(&token).await;

    let resp = app
        .client
        .get(app.url(&format!("/api/qrcodes/{}/preview", code["id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
}

#[tokio::test]
async fn zip_export_bundles_the_selection() {
    let app = spawn_app().await;
    let token = app.new_user_token().await;
    let first = app.create_menu(&token).await;
    let second = app.create_menu(&token).await;

    let resp = app
        .client
        .get(app.url(&format!(
            "/api/qrcodes/export.zip?ids={}&ids={}",
            first["id"].as_str().unwrap(),
            second["id"].as_str().unwrap()
        )))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    let bytes = resp.bytes().await.unwrap();
    assert!(bytes.starts_with(b"PK"));

    let resp = app
        .client
        .get(app.url("/api/qrcodes/export.zip"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn templates_are_public() {
    let app = spawn_app().await;
    let templates: Vec<Value> = reqwest::get(app.url("/api/templates"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(templates.len(), 8);
    assert_eq!(templates[0]["id"], "classic");
    assert!(templates[0]["foregroundColor"].is_string());
}
