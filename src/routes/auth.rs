use std::convert::Infallible;
use std::fmt::Display;

use askama::Template;
use axum::Form;
use axum::Json;
use axum::RequestPartsExt;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use axum_extra::extract::TypedHeader;
use axum_extra::extract::WithRejection;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::render_html;
use crate::errors::AuthError;
use crate::services::auth::AuthenticatedUser;
use crate::startup::AppState;

pub const SESSION_COOKIE: &str = "jwt";

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    email: String,
    name: String,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    email: String,
    error: Option<String>,
}

pub async fn signup_page(claims: Option<Claims>) -> Response {
    if claims.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    render_html(&SignupTemplate {
        email: String::new(),
        name: String::new(),
        error: None,
    })
    .into_response()
}

pub async fn login_page(claims: Option<Claims>) -> Response {
    if claims.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    render_html(&LoginTemplate {
        email: String::new(),
        error: None,
    })
    .into_response()
}

pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }
}

impl Display for Claims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Email: {}", self.email)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthBody {
    pub access_token: String,
    pub token_type: String,
}

impl AuthBody {
    fn new(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserBody {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<AuthenticatedUser> for UserBody {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
}

fn issue_token(state: &AppState, user: &AuthenticatedUser) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(state.session.hours)).timestamp()
            as usize,
    };
    encode(&Header::default(), &claims, &state.keys.encoding).map_err(|e| {
        tracing::error!("JWT Encoding failed: {:?}", e);
        AuthError::TokenCreation
    })
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.session.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}

#[instrument(name = "Web: Login POST", skip(state, jar, payload))]
pub async fn login_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(payload): Form<AuthPayload>,
) -> Response {
    tracing::info!("Request to login user received!");
    let outcome = async {
        // 1. Verify credentials via service
        let user = state
            .auth_service
            .login(&payload.email, &payload.password)
            .await?;
        // 2. Create JWT
        issue_token(&state, &user)
    }
    .await;

    match outcome {
        // 3. Set HttpOnly Cookie and Redirect to Dashboard
        Ok(token) => (
            jar.add(session_cookie(&state, token)),
            Redirect::to("/dashboard"),
        )
            .into_response(),
        Err(e) => {
            let (status, message) = e.status_and_message();
            let page = LoginTemplate {
                email: payload.email,
                error: Some(message.to_string()),
            };
            (status, render_html(&page)).into_response()
        }
    }
}

#[instrument(name = "Web: Signup POST", skip(state, jar, form))]
pub async fn signup_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    if form.password != form.confirm_password {
        let page = SignupTemplate {
            email: form.email,
            name: form.name,
            error: Some("Passwords do not match".into()),
        };
        return (StatusCode::BAD_REQUEST, render_html(&page)).into_response();
    }

    let outcome = async {
        let user = state
            .auth_service
            .register(&form.email, &form.name, &form.password)
            .await?;
        issue_token(&state, &user)
    }
    .await;

    match outcome {
        Ok(token) => (
            jar.add(session_cookie(&state, token)),
            Redirect::to("/dashboard"),
        )
            .into_response(),
        Err(e) => {
            let (status, message) = e.status_and_message();
            let page = SignupTemplate {
                email: form.email,
                name: form.name,
                error: Some(message.to_string()),
            };
            (status, render_html(&page)).into_response()
        }
    }
}

#[instrument(name = "Web: Logout GET", skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> impl IntoResponse {
    let updated_jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (updated_jar, Redirect::to("/login"))
}

#[instrument(
    name = "HTTP: Register Handler",
    skip(state, payload),
    fields(user_email = %payload.email)
)]
pub async fn register_handler(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterPayload>, AuthError>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state
        .auth_service
        .register(&payload.email, &payload.name, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserBody::from(user))))
}

#[instrument(
    name = "HTTP: Authorize Handler",
    skip(state, payload),
    fields(
        user_email = %payload.email,
        request_id = tracing::field::Empty
    )
)]
pub async fn authorize_handler(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<AuthPayload>, AuthError>,
) -> Result<Json<AuthBody>, AuthError> {
    tracing::info!("Received login request");

    let user = state
        .auth_service
        .login(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            tracing::error!("Authorization failed: {:?}", e);
            e
        })?;

    let token = issue_token(&state, &user)?;

    tracing::info!("JWT issued for user");
    Ok(Json(AuthBody::new(token)))
}

fn decode_claims(token: &str, state: &AppState) -> jsonwebtoken::errors::Result<Claims> {
    decode::<Claims>(token, &state.keys.decoding, &Validation::default()).map(|data| data.claims)
}

impl FromRequestParts<AppState> for Claims {
    type Rejection = AuthError;

    #[instrument(name = "Extracting Claims", skip(state, parts))]
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // 1. Try the session cookie (for Browser/Dashboard)
        let cookie_token = parts
            .extract::<CookieJar>()
            .await
            .ok()
            .and_then(|jar| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));
        if let Some(token) = cookie_token {
            match decode_claims(&token, state) {
                Ok(claims) => return Ok(claims),
                Err(e) => tracing::warn!("Session cookie rejected: {:?}", e),
            }
        }

        // 2. Fall back to the Authorization Header (for API/Curl)
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| {
                tracing::warn!("No valid JWT found in cookies or headers");
                AuthError::InvalidToken
            })?;

        // 3. Decode the token
        decode_claims(bearer.token(), state).map_err(|e| {
            tracing::warn!("JWT decoding failed: {:?}", e);
            AuthError::InvalidToken
        })
    }
}

/// Pages use `Option<Claims>` and redirect to the login form themselves.
impl OptionalFromRequestParts<AppState> for Claims {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(
            <Claims as FromRequestParts<AppState>>::from_request_parts(parts, state)
                .await
                .ok(),
        )
    }
}
