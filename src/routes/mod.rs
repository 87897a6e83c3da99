use anyhow::Context;
use askama::Template;
use axum::http::{HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};

use crate::errors::ApiError;

pub mod auth;
pub mod pages;
pub mod qr_code;
pub mod share;

pub fn render_html<T: Template>(template: &T) -> Result<Html<String>, ApiError> {
    let body = template.render().context("template rendering failed")?;
    Ok(Html(body))
}

/// `Content-Disposition` value with an ASCII fallback plus the RFC 5987
/// UTF-8 form for names that need it.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

pub fn file_response(filename: &str, content_type: &'static str, bytes: Vec<u8>) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
