use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::instrument;
use uuid::Uuid;

use super::auth::Claims;
use super::qr_code::parse_filter;
use super::render_html;
use crate::errors::ApiError;
use crate::models::qr_code::{
    ContentKind, DEFAULT_BACKGROUND, DEFAULT_FOREGROUND, ErrorCorrection, ListFilter, ListQuery,
    QrCode, QrCodeForm, QrSize, encode_logo_data_url,
};
use crate::models::template::{STYLE_TEMPLATES, StyleTemplate};
use crate::services::qr_code::parse_id;
use crate::startup::AppState;

pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    fn new(value: &str, label: &str, current: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            selected: value == current,
        }
    }
}

pub struct CardView {
    pub id: String,
    pub name: String,
    pub kind: &'static str,
    pub content: String,
    pub is_favorite: bool,
    pub is_public: bool,
    pub updated: String,
}

impl From<&QrCode> for CardView {
    fn from(code: &QrCode) -> Self {
        Self {
            id: code.id.to_string(),
            name: code.name.clone(),
            kind: code.kind.as_str(),
            content: code.content.clone(),
            is_favorite: code.is_favorite,
            is_public: code.is_public,
            updated: code.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Raw editor values, kept as typed so a rejected submission can be shown again.
#[derive(Debug, Clone)]
pub struct EditorFields {
    pub name: String,
    pub kind: String,
    pub content: String,
    pub foreground_color: String,
    pub background_color: String,
    pub size: String,
    pub error_correction: String,
}

impl Default for EditorFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "url".into(),
            content: String::new(),
            foreground_color: DEFAULT_FOREGROUND.into(),
            background_color: DEFAULT_BACKGROUND.into(),
            size: QrSize::Medium.pixels().to_string(),
            error_correction: ErrorCorrection::M.as_str().into(),
        }
    }
}

impl From<&QrCode> for EditorFields {
    fn from(code: &QrCode) -> Self {
        Self {
            name: code.name.clone(),
            kind: code.kind.as_str().into(),
            content: code.content.clone(),
            foreground_color: code.foreground_color.to_string(),
            background_color: code.background_color.to_string(),
            size: code.size.pixels().to_string(),
            error_correction: code.error_correction.as_str().into(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    user_name: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    user_name: String,
    cards: Vec<CardView>,
    search: String,
    filter_options: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "editor.html")]
struct EditorTemplate {
    user_name: String,
    code_id: Option<String>,
    fields: EditorFields,
    kind_options: Vec<SelectOption>,
    size_options: Vec<SelectOption>,
    level_options: Vec<SelectOption>,
    presets: &'static [StyleTemplate],
    logo_data_url: Option<String>,
    share_url: Option<String>,
    error: Option<String>,
}

impl EditorTemplate {
    fn new(claims: &Claims, code: Option<&QrCode>, fields: EditorFields, base_url: &str) -> Self {
        let kind_options = vec![
            SelectOption::new("url", "URL", &fields.kind),
            SelectOption::new("text", "Text", &fields.kind),
        ];
        let size_options = QrSize::ALL
            .iter()
            .map(|size| {
                let px = size.pixels().to_string();
                SelectOption::new(&px, &format!("{px} px"), &fields.size)
            })
            .collect();
        let level_options = ErrorCorrection::ALL
            .iter()
            .map(|level| {
                SelectOption::new(level.as_str(), level.as_str(), &fields.error_correction)
            })
            .collect();
        Self {
            user_name: claims.name.clone(),
            code_id: code.map(|c| c.id.to_string()),
            kind_options,
            size_options,
            level_options,
            presets: &STYLE_TEMPLATES,
            logo_data_url: code.and_then(|c| c.logo_data_url.clone()),
            share_url: code
                .and_then(|c| c.share_token.as_deref())
                .map(|token| share_url(base_url, token)),
            error: None,
            fields,
        }
    }
}

#[derive(Template)]
#[template(path = "share.html")]
struct SharePageTemplate {
    token: String,
    name: String,
    content: String,
    is_url: bool,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate {
    message: String,
}

pub fn share_url(base_url: &str, token: &str) -> String {
    format!("{}/share/{token}", base_url.trim_end_matches('/'))
}

fn require_user(claims: Option<Claims>) -> Result<(Uuid, Claims), Response> {
    match claims {
        Some(claims) => match claims.user_id() {
            Ok(id) => Ok((id, claims)),
            Err(_) => Err(Redirect::to("/login").into_response()),
        },
        None => Err(Redirect::to("/login").into_response()),
    }
}

fn page_error(err: ApiError) -> Response {
    match err {
        ApiError::NotFound(message) => {
            let page = NotFoundTemplate { message };
            (StatusCode::NOT_FOUND, render_html(&page)).into_response()
        }
        other => other.into_response(),
    }
}

pub async fn not_found_handler() -> Response {
    let page = NotFoundTemplate {
        message: "Page not found".into(),
    };
    (StatusCode::NOT_FOUND, render_html(&page)).into_response()
}

pub async fn index_page(claims: Option<Claims>) -> Result<impl IntoResponse, ApiError> {
    render_html(&IndexTemplate {
        user_name: claims.map(|c| c.name),
    })
}

#[instrument(name = "Web: Dashboard", skip(state, claims, query))]
pub async fn dashboard_page(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Query(query): Query<ListQuery>,
) -> Response {
    let (user_id, claims) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let filter = parse_filter(query.filter.as_deref()).unwrap_or_default();
    let search = query.search.unwrap_or_default();

    let codes = match state
        .qr_service
        .list(user_id, Some(search.as_str()), filter)
        .await
    {
        Ok(codes) => codes,
        Err(e) => return page_error(e),
    };

    let filter_options = [
        (ListFilter::All, "All"),
        (ListFilter::Url, "URLs"),
        (ListFilter::Text, "Text"),
        (ListFilter::Favorites, "Favorites"),
    ]
    .iter()
    .map(|(f, label)| SelectOption::new(f.as_str(), label, filter.as_str()))
    .collect();

    render_html(&DashboardTemplate {
        user_name: claims.name,
        cards: codes.iter().map(CardView::from).collect(),
        search,
        filter_options,
    })
    .into_response()
}

pub async fn new_page(State(state): State<AppState>, claims: Option<Claims>) -> Response {
    let (_, claims) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let page = EditorTemplate::new(&claims, None, EditorFields::default(), &state.base_url);
    render_html(&page).into_response()
}

#[instrument(name = "Web: Editor", skip(state, claims))]
pub async fn edit_page(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
) -> Response {
    let (user_id, claims) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let code = match lookup(&state, user_id, &id).await {
        Ok(code) => code,
        Err(e) => return page_error(e),
    };
    let page = EditorTemplate::new(
        &claims,
        Some(&code),
        EditorFields::from(&code),
        &state.base_url,
    );
    render_html(&page).into_response()
}

async fn lookup(state: &AppState, user_id: Uuid, raw_id: &str) -> Result<QrCode, ApiError> {
    state.qr_service.get(user_id, parse_id(raw_id)?).await
}

/// Reads the editor's multipart body. An uploaded file replaces the logo and
/// the `removeLogo` checkbox clears it; otherwise the current logo is kept.
/// On error the fields read so far come back with the message.
async fn read_editor_form(
    mut multipart: Multipart,
) -> Result<(EditorFields, Option<Option<String>>), (EditorFields, String)> {
    let mut fields = EditorFields {
        name: String::new(),
        content: String::new(),
        ..EditorFields::default()
    };
    let mut upload = None;
    let mut logo_error = None;
    let mut remove_logo = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err((fields, format!("Invalid form submission: {e}"))),
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "logo" {
            let mime = field.content_type().map(str::to_string);
            let bytes = match field.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => return Err((fields, format!("Could not read the logo: {e}"))),
            };
            if !bytes.is_empty() {
                let mime = mime.unwrap_or_else(|| "application/octet-stream".into());
                match encode_logo_data_url(&mime, &bytes) {
                    Ok(data_url) => upload = Some(data_url),
                    // keep reading so the typed values survive
                    Err(msg) => logo_error = Some(msg),
                }
            }
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value,
            Err(e) => return Err((fields, format!("Invalid form submission: {e}"))),
        };
        match name.as_str() {
            "name" => fields.name = value,
            "type" => fields.kind = value,
            "content" => fields.content = value,
            "foregroundColor" => fields.foreground_color = value,
            "backgroundColor" => fields.background_color = value,
            "size" => fields.size = value,
            "errorCorrection" => fields.error_correction = value,
            "removeLogo" => remove_logo = !value.is_empty(),
            _ => {}
        }
    }

    if let Some(msg) = logo_error {
        return Err((fields, msg));
    }
    let logo = match (upload, remove_logo) {
        (Some(data_url), _) => Some(Some(data_url)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    Ok((fields, logo))
}

fn to_form(fields: &EditorFields, logo: Option<Option<String>>) -> Result<QrCodeForm, String> {
    let size = fields
        .size
        .trim()
        .parse::<u32>()
        .map_err(|_| "Size must be 256, 512 or 1024".to_string())?;
    Ok(QrCodeForm {
        name: Some(fields.name.clone()),
        kind: Some(fields.kind.clone()),
        content: Some(fields.content.clone()),
        foreground_color: Some(fields.foreground_color.clone()),
        background_color: Some(fields.background_color.clone()),
        size: Some(size),
        error_correction: Some(fields.error_correction.clone()),
        logo_data_url: logo,
    })
}

fn editor_with_error(
    state: &AppState,
    claims: &Claims,
    code: Option<&QrCode>,
    fields: EditorFields,
    message: String,
) -> Response {
    let mut page = EditorTemplate::new(claims, code, fields, &state.base_url);
    page.error = Some(message);
    (StatusCode::BAD_REQUEST, render_html(&page)).into_response()
}

#[instrument(name = "Web: Create POST", skip(state, claims, multipart))]
pub async fn create_post(
    State(state): State<AppState>,
    claims: Option<Claims>,
    multipart: Multipart,
) -> Response {
    let (user_id, claims) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let (fields, logo) = match read_editor_form(multipart).await {
        Ok(parsed) => parsed,
        Err((fields, msg)) => return editor_with_error(&state, &claims, None, fields, msg),
    };
    let form = match to_form(&fields, logo) {
        Ok(form) => form,
        Err(msg) => return editor_with_error(&state, &claims, None, fields, msg),
    };

    match state.qr_service.create(user_id, form).await {
        Ok(code) => Redirect::to(&format!("/qrcode/{}", code.id)).into_response(),
        Err(ApiError::BadRequest(msg)) => editor_with_error(&state, &claims, None, fields, msg),
        Err(e) => page_error(e),
    }
}

#[instrument(name = "Web: Update POST", skip(state, claims, multipart))]
pub async fn update_post(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    let (user_id, claims) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let code = match lookup(&state, user_id, &id).await {
        Ok(code) => code,
        Err(e) => return page_error(e),
    };
    let (fields, logo) = match read_editor_form(multipart).await {
        Ok(parsed) => parsed,
        Err((fields, msg)) => {
            return editor_with_error(&state, &claims, Some(&code), fields, msg);
        }
    };
    let form = match to_form(&fields, logo) {
        Ok(form) => form,
        Err(msg) => return editor_with_error(&state, &claims, Some(&code), fields, msg),
    };

    match state.qr_service.update(user_id, code.id, form).await {
        Ok(updated) => Redirect::to(&format!("/qrcode/{}", updated.id)).into_response(),
        Err(ApiError::BadRequest(msg)) => {
            editor_with_error(&state, &claims, Some(&code), fields, msg)
        }
        Err(e) => page_error(e),
    }
}

#[derive(Clone, Copy, Debug)]
enum CardAction {
    Favorite,
    Duplicate,
    Delete,
    Share,
}

async fn card_action(
    state: AppState,
    claims: Option<Claims>,
    id: String,
    action: CardAction,
) -> Response {
    let (user_id, _) = match require_user(claims) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(e) => return page_error(e),
    };
    let service = &state.qr_service;
    let outcome = match action {
        CardAction::Favorite => service
            .toggle_favorite(user_id, id)
            .await
            .map(|_| "/dashboard".to_string()),
        CardAction::Duplicate => service
            .duplicate(user_id, id)
            .await
            .map(|_| "/dashboard".to_string()),
        CardAction::Delete => service
            .delete(user_id, id)
            .await
            .map(|_| "/dashboard".to_string()),
        CardAction::Share => service
            .toggle_share(user_id, id)
            .await
            .map(|code| format!("/qrcode/{}", code.id)),
    };
    match outcome {
        Ok(target) => Redirect::to(&target).into_response(),
        Err(e) => page_error(e),
    }
}

pub async fn favorite_action(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
) -> Response {
    card_action(state, claims, id, CardAction::Favorite).await
}

pub async fn duplicate_action(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
) -> Response {
    card_action(state, claims, id, CardAction::Duplicate).await
}

pub async fn delete_action(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
) -> Response {
    card_action(state, claims, id, CardAction::Delete).await
}

pub async fn share_action(
    State(state): State<AppState>,
    claims: Option<Claims>,
    Path(id): Path<String>,
) -> Response {
    card_action(state, claims, id, CardAction::Share).await
}

#[instrument(name = "Web: Shared page", skip(state, token))]
pub async fn share_page(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.qr_service.resolve_share_record(&token).await {
        Ok(code) => render_html(&SharePageTemplate {
            is_url: code.kind == ContentKind::Url,
            name: code.name,
            content: code.content,
            token,
        })
        .into_response(),
        Err(e) => page_error(e),
    }
}

pub async fn robots_txt(State(state): State<AppState>) -> impl IntoResponse {
    let base = state.base_url.trim_end_matches('/');
    let body = format!(
        "User-agent: *\nAllow: /\nAllow: /share/\nDisallow: /api/\nDisallow: /dashboard\n\
         Disallow: /qrcode/\n\nSitemap: {base}/sitemap.xml\n"
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

pub async fn sitemap_xml(State(state): State<AppState>) -> impl IntoResponse {
    let base = state.base_url.trim_end_matches('/');
    let urls: String = [("/", "1.0"), ("/signup", "0.8"), ("/login", "0.5")]
        .iter()
        .map(|(path, priority)| {
            format!(
                "  <url>\n    <loc>{base}{path}</loc>\n    \
                 <priority>{priority}</priority>\n  </url>\n"
            )
        })
        .collect();
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{urls}</urlset>\n"
    );
    ([(header::CONTENT_TYPE, "application/xml")], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_url_joins_without_double_slash() {
        assert_eq!(share_url("http://host/", "abc"), "http://host/share/abc");
        assert_eq!(share_url("http://host", "abc"), "http://host/share/abc");
    }

    #[test]
    fn editor_size_must_be_numeric() {
        let fields = EditorFields {
            size: "big".into(),
            ..EditorFields::default()
        };
        assert!(to_form(&fields, None).is_err());
    }

    #[test]
    fn editor_fields_become_a_form() {
        let fields = EditorFields {
            name: "Menu".into(),
            content: "https://example.com".into(),
            ..EditorFields::default()
        };
        let draft = to_form(&fields, Some(None)).unwrap().validate().unwrap();
        assert_eq!(draft.name, "Menu");
        assert_eq!(draft.size, QrSize::Medium);
    }
}
