use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Largest accepted logo payload once base64-decoded.
pub const MAX_LOGO_BYTES: usize = 500 * 1024;

pub const DEFAULT_FOREGROUND: &str = "#000000";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Url,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Url => "url",
            ContentKind::Text => "text",
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "text" => Ok(Self::Text),
            other => Err(format!("Unsupported content type `{other}`, use `url` or `text`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCorrection {
    L,
    M,
    Q,
    H,
}

impl ErrorCorrection {
    pub const ALL: [ErrorCorrection; 4] = [Self::L, Self::M, Self::Q, Self::H];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCorrection::L => "L",
            ErrorCorrection::M => "M",
            ErrorCorrection::Q => "Q",
            ErrorCorrection::H => "H",
        }
    }
}

impl FromStr for ErrorCorrection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            other => Err(format!(
                "Unsupported error correction level `{other}`, use L, M, Q or H"
            )),
        }
    }
}

/// Export side length in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum QrSize {
    Small,
    Medium,
    Large,
}

impl QrSize {
    pub const ALL: [QrSize; 3] = [Self::Small, Self::Medium, Self::Large];

    pub fn pixels(&self) -> u32 {
        match self {
            QrSize::Small => 256,
            QrSize::Medium => 512,
            QrSize::Large => 1024,
        }
    }
}

impl TryFrom<u32> for QrSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            256 => Ok(Self::Small),
            512 => Ok(Self::Medium),
            1024 => Ok(Self::Large),
            other => Err(format!("Unsupported size {other}, use 256, 512 or 1024")),
        }
    }
}

impl From<QrSize> for u32 {
    fn from(size: QrSize) -> Self {
        size.pixels()
    }
}

/// A `#rrggbb` color, always stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let invalid = || format!("Invalid color `{raw}`, expected #rrggbb");
        let digits = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let expanded = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => digits.to_string(),
            _ => return Err(invalid()),
        };
        Ok(Self(format!("#{}", expanded.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rgb(&self) -> [u8; 3] {
        let channel = |i: usize| u8::from_str_radix(&self.0[i..i + 2], 16).unwrap_or(0);
        [channel(1), channel(3), channel(5)]
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: String,
    pub foreground_color: HexColor,
    pub background_color: HexColor,
    pub size: QrSize,
    pub error_correction: ErrorCorrection,
    pub logo_data_url: Option<String>,
    pub is_favorite: bool,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QrCode {
    pub fn new(user_id: Uuid, draft: QrCodeDraft, now: DateTime<Utc>) -> Self {
        let logo_data_url = match draft.logo {
            LogoChange::Set(url) => Some(url),
            LogoChange::Keep | LogoChange::Clear => None,
        };
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: draft.name,
            kind: draft.kind,
            content: draft.content,
            foreground_color: draft.foreground_color,
            background_color: draft.background_color,
            size: draft.size,
            error_correction: draft.error_correction,
            logo_data_url,
            is_favorite: false,
            is_public: false,
            share_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, draft: QrCodeDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.kind = draft.kind;
        self.content = draft.content;
        self.foreground_color = draft.foreground_color;
        self.background_color = draft.background_color;
        self.size = draft.size;
        self.error_correction = draft.error_correction;
        match draft.logo {
            LogoChange::Keep => {}
            LogoChange::Clear => self.logo_data_url = None,
            LogoChange::Set(url) => self.logo_data_url = Some(url),
        }
        self.updated_at = now;
    }

    /// Copy of the record under a new identity; sharing and favorite state are not carried over.
    pub fn duplicate(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("{} (copy)", self.name),
            is_favorite: false,
            is_public: false,
            share_token: None,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Database row shape; enum columns are stored as text.
#[derive(Debug, FromRow)]
pub struct QrCodeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub kind: String,
    pub content: String,
    pub foreground_color: String,
    pub background_color: String,
    pub size: i32,
    pub error_correction: String,
    pub logo_data_url: Option<String>,
    pub is_favorite: bool,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QrCodeRow> for QrCode {
    type Error = anyhow::Error;

    fn try_from(row: QrCodeRow) -> Result<Self, Self::Error> {
        let size = u32::try_from(row.size).map_err(|_| anyhow::anyhow!("negative size"))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            kind: row.kind.parse().map_err(anyhow::Error::msg)?,
            content: row.content,
            foreground_color: HexColor::parse(&row.foreground_color).map_err(anyhow::Error::msg)?,
            background_color: HexColor::parse(&row.background_color).map_err(anyhow::Error::msg)?,
            size: QrSize::try_from(size).map_err(anyhow::Error::msg)?,
            error_correction: row.error_correction.parse().map_err(anyhow::Error::msg)?,
            logo_data_url: row.logo_data_url,
            is_favorite: row.is_favorite,
            is_public: row.is_public,
            share_token: row.share_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// What an unauthenticated visitor of a share link gets to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedQrCode {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: String,
    pub foreground_color: HexColor,
    pub background_color: HexColor,
    pub size: QrSize,
    pub error_correction: ErrorCorrection,
    pub logo_data_url: Option<String>,
}

impl From<&QrCode> for SharedQrCode {
    fn from(code: &QrCode) -> Self {
        Self {
            id: code.id,
            name: code.name.clone(),
            kind: code.kind,
            content: code.content.clone(),
            foreground_color: code.foreground_color.clone(),
            background_color: code.background_color.clone(),
            size: code.size,
            error_correction: code.error_correction,
            logo_data_url: code.logo_data_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoChange {
    Keep,
    Clear,
    Set(String),
}

/// A user submission for create/update, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeForm {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub size: Option<u32>,
    pub error_correction: Option<String>,
    /// Absent keeps the current logo, `null` or `""` removes it.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub logo_data_url: Option<Option<String>>,
}

fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// A validated submission with defaults filled in.
#[derive(Debug, Clone)]
pub struct QrCodeDraft {
    pub name: String,
    pub kind: ContentKind,
    pub content: String,
    pub foreground_color: HexColor,
    pub background_color: HexColor,
    pub size: QrSize,
    pub error_correction: ErrorCorrection,
    pub logo: LogoChange,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl QrCodeForm {
    pub fn validate(self) -> Result<QrCodeDraft, String> {
        let (Some(name), Some(content)) = (
            non_blank(self.name.as_deref()),
            non_blank(self.content.as_deref()),
        ) else {
            return Err("Name and content are required".into());
        };

        let kind = match non_blank(self.kind.as_deref()) {
            Some(kind) => kind.parse()?,
            None => ContentKind::Url,
        };
        if kind == ContentKind::Url {
            match url::Url::parse(content) {
                Ok(parsed)
                    if parsed.has_host() && matches!(parsed.scheme(), "http" | "https") => {}
                _ => return Err("Invalid URL (e.g. https://example.com)".into()),
            }
        }

        let foreground_color = HexColor::parse(
            non_blank(self.foreground_color.as_deref()).unwrap_or(DEFAULT_FOREGROUND),
        )?;
        let background_color = HexColor::parse(
            non_blank(self.background_color.as_deref()).unwrap_or(DEFAULT_BACKGROUND),
        )?;
        let size = match self.size {
            Some(px) => QrSize::try_from(px)?,
            None => QrSize::Medium,
        };
        let error_correction = match non_blank(self.error_correction.as_deref()) {
            Some(level) => level.parse()?,
            None => ErrorCorrection::M,
        };

        let logo = match self.logo_data_url {
            None => LogoChange::Keep,
            Some(None) => LogoChange::Clear,
            Some(Some(url)) if url.trim().is_empty() => LogoChange::Clear,
            Some(Some(url)) => {
                decode_logo_data_url(&url)?;
                LogoChange::Set(url.trim().to_string())
            }
        };

        Ok(QrCodeDraft {
            name: name.to_string(),
            kind,
            content: content.to_string(),
            foreground_color,
            background_color,
            size,
            error_correction,
            logo,
        })
    }
}

/// Decodes a `data:image/...;base64,` URL into the logo image.
pub fn decode_logo_data_url(data_url: &str) -> Result<DynamicImage, String> {
    let rest = data_url
        .trim()
        .strip_prefix("data:image/")
        .ok_or("The logo must be an image data URL")?;
    let (_, payload) = rest
        .split_once(";base64,")
        .ok_or("The logo must be base64 encoded")?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| "The logo is not valid base64".to_string())?;
    if bytes.len() > MAX_LOGO_BYTES {
        return Err("The logo must not exceed 500 KB".into());
    }
    load_logo(&bytes)
}

fn load_logo(bytes: &[u8]) -> Result<DynamicImage, String> {
    image::load_from_memory(bytes).map_err(|_| "The logo image could not be decoded".to_string())
}

pub fn encode_logo_data_url(mime: &str, bytes: &[u8]) -> Result<String, String> {
    if !mime.starts_with("image/") {
        return Err("The logo must be an image".into());
    }
    if bytes.len() > MAX_LOGO_BYTES {
        return Err("The logo must not exceed 500 KB".into());
    }
    load_logo(bytes)?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    Url,
    Text,
    Favorites,
}

impl ListFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListFilter::All => "all",
            ListFilter::Url => "url",
            ListFilter::Text => "text",
            ListFilter::Favorites => "favorites",
        }
    }

    pub fn matches(&self, code: &QrCode) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Url => code.kind == ContentKind::Url,
            ListFilter::Text => code.kind == ContentKind::Text,
            ListFilter::Favorites => code.is_favorite,
        }
    }
}

impl FromStr for ListFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(Self::All),
            "url" => Ok(Self::Url),
            "text" => Ok(Self::Text),
            "favorites" => Ok(Self::Favorites),
            other => Err(format!(
                "Unsupported filter `{other}`, use all, url, text or favorites"
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, content: &str) -> QrCodeForm {
        QrCodeForm {
            name: Some(name.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    fn sample_png() -> Vec<u8> {
        let pixel = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(pixel)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
        bytes
    }

    #[test]
    fn hex_color_normalises_short_and_upper_case() {
        assert_eq!(HexColor::parse("#ABC").unwrap().as_str(), "#aabbcc");
        assert_eq!(HexColor::parse(" #1E3A5F ").unwrap().as_str(), "#1e3a5f");
        assert_eq!(
            HexColor::parse("#1e3a5f").unwrap().rgb(),
            [0x1e, 0x3a, 0x5f]
        );
        assert!(HexColor::parse("1e3a5f").is_err());
        assert!(HexColor::parse("#12345").is_err());
        assert!(HexColor::parse("#gggggg").is_err());
    }

    #[test]
    fn size_accepts_only_the_three_presets() {
        assert_eq!(QrSize::try_from(1024).unwrap(), QrSize::Large);
        assert!(QrSize::try_from(300).is_err());
        assert_eq!(serde_json::to_value(QrSize::Small).unwrap(), 256);
    }

    #[test]
    fn validation_fills_defaults_and_trims() {
        let draft = form("  Menu ", " https://example.com/menu ")
            .validate()
            .unwrap();
        assert_eq!(draft.name, "Menu");
        assert_eq!(draft.content, "https://example.com/menu");
        assert_eq!(draft.kind, ContentKind::Url);
        assert_eq!(draft.foreground_color.as_str(), "#000000");
        assert_eq!(draft.background_color.as_str(), "#ffffff");
        assert_eq!(draft.size, QrSize::Medium);
        assert_eq!(draft.error_correction, ErrorCorrection::M);
        assert_eq!(draft.logo, LogoChange::Keep);
    }

    #[test]
    fn validation_rejects_blank_name_or_content() {
        assert!(form("   ", "hello").validate().is_err());
        assert!(form("name", "  ").validate().is_err());
        assert!(QrCodeForm::default().validate().is_err());
    }

    #[test]
    fn url_content_must_be_absolute() {
        assert!(form("n", "not a url").validate().is_err());
        let mut text = form("n", "not a url");
        text.kind = Some("text".into());
        assert_eq!(text.validate().unwrap().kind, ContentKind::Text);
    }

    #[test]
    fn url_content_must_be_http_or_https() {
        assert!(form("n", "http://example.com").validate().is_ok());
        for content in [
            "javascript://example.com/%0Aalert(document.domain)",
            "ftp://example.com/file",
            "data://example.com/x",
        ] {
            assert_eq!(
                form("n", content).validate().unwrap_err(),
                "Invalid URL (e.g. https://example.com)"
            );
        }
    }

    #[test]
    fn logo_field_is_tri_state() {
        let absent: QrCodeForm =
            serde_json::from_str(r#"{"name":"a","content":"b","type":"text"}"#).unwrap();
        assert_eq!(absent.validate().unwrap().logo, LogoChange::Keep);

        let null: QrCodeForm =
            serde_json::from_str(r#"{"name":"a","content":"b","type":"text","logoDataUrl":null}"#)
                .unwrap();
        assert_eq!(null.validate().unwrap().logo, LogoChange::Clear);

        let url = encode_logo_data_url("image/png", &sample_png()).unwrap();
        let set: QrCodeForm = serde_json::from_value(serde_json::json!({
            "name": "a", "content": "b", "type": "text", "logoDataUrl": url
        }))
        .unwrap();
        assert_eq!(set.validate().unwrap().logo, LogoChange::Set(url));
    }

    #[test]
    fn oversized_logo_is_rejected() {
        let big = vec![0u8; MAX_LOGO_BYTES + 1];
        assert!(encode_logo_data_url("image/png", &big).is_err());
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&big));
        assert!(decode_logo_data_url(&url).is_err());
        assert!(decode_logo_data_url("data:text/plain;base64,AAAA").is_err());
    }

    #[test]
    fn logo_must_decode_as_an_image() {
        let err = decode_logo_data_url("data:image/png;base64,AAAA").unwrap_err();
        assert_eq!(err, "The logo image could not be decoded");
        assert!(encode_logo_data_url("image/svg+xml", b"<svg/>").is_err());

        let mut bad = form("a", "https://example.com");
        bad.logo_data_url = Some(Some("data:image/png;base64,AAAA".into()));
        assert!(bad.validate().is_err());

        let logo = decode_logo_data_url(&encode_logo_data_url("image/png", &sample_png()).unwrap());
        assert_eq!(logo.unwrap().width(), 2);
    }

    #[test]
    fn duplicate_gets_new_identity_and_resets_flags() {
        let now = Utc::now();
        let draft = form("Menu", "https://a.b").validate().unwrap();
        let mut original = QrCode::new(Uuid::new_v4(), draft, now);
        original.is_favorite = true;
        original.is_public = true;
        original.share_token = Some("tok".into());

        let copy = original.duplicate(now);
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.name, "Menu (copy)");
        assert_eq!(copy.user_id, original.user_id);
        assert_eq!(copy.foreground_color, original.foreground_color);
        assert_eq!(copy.size, original.size);
        assert!(!copy.is_favorite && !copy.is_public);
        assert!(copy.share_token.is_none());
    }

    #[test]
    fn list_filter_parses_and_matches() {
        let now = Utc::now();
        let draft = form("a", "https://a.b").validate().unwrap();
        let mut code = QrCode::new(Uuid::new_v4(), draft, now);
        assert!("url".parse::<ListFilter>().unwrap().matches(&code));
        assert!(!"text".parse::<ListFilter>().unwrap().matches(&code));
        assert!(!ListFilter::Favorites.matches(&code));
        code.is_favorite = true;
        assert!(ListFilter::Favorites.matches(&code));
        assert!("starred".parse::<ListFilter>().is_err());
    }
}
