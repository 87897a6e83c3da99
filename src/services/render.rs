//! Turns a stored record into pixels. Symbol encoding is entirely the
//! `qrcode` crate's job; this module only maps modules onto a canvas and
//! composites the optional logo.

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage, imageops};
use qrcode::{EcLevel, QrCode as Symbol, render::svg};
use thiserror::Error;

use crate::errors::ApiError;
use crate::models::qr_code::{ErrorCorrection, HexColor, QrCode, decode_logo_data_url};

/// Quiet zone, in modules, around exported symbols.
pub const EXPORT_MARGIN: u32 = 2;
pub const PREVIEW_MARGIN: u32 = 1;
pub const PREVIEW_SIZE: u32 = 80;

const LOGO_RATIO: f32 = 0.2;
const LOGO_PADDING_RATIO: f32 = 0.1;
const LOGO_CORNER_RADIUS: u32 = 8;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("content cannot be encoded: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("{0}")]
    Logo(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("pdf generation failed: {0}")]
    Pdf(String),

    #[error("archive generation failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Encode(e) => ApiError::BadRequest(format!(
                "The content cannot be encoded with this error correction level ({e})"
            )),
            RenderError::Logo(msg) => ApiError::BadRequest(msg),
            other => ApiError::Unexpected(other.into()),
        }
    }
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::L => EcLevel::L,
            ErrorCorrection::M => EcLevel::M,
            ErrorCorrection::Q => EcLevel::Q,
            ErrorCorrection::H => EcLevel::H,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone)]
pub struct RenderOptions<'a> {
    pub content: &'a str,
    pub size: u32,
    pub margin: u32,
    pub foreground: &'a HexColor,
    pub background: &'a HexColor,
    pub error_correction: ErrorCorrection,
    pub logo_data_url: Option<&'a str>,
}

impl<'a> RenderOptions<'a> {
    /// Full-size export of a record, logo included.
    pub fn export(code: &'a QrCode) -> Self {
        Self {
            content: &code.content,
            size: code.size.pixels(),
            margin: EXPORT_MARGIN,
            foreground: &code.foreground_color,
            background: &code.background_color,
            error_correction: code.error_correction,
            logo_data_url: code.logo_data_url.as_deref(),
        }
    }

    /// Thumbnail used on the dashboard grid.
    pub fn preview(code: &'a QrCode) -> Self {
        Self {
            size: PREVIEW_SIZE,
            margin: PREVIEW_MARGIN,
            logo_data_url: None,
            ..Self::export(code)
        }
    }
}

fn rgba(color: &HexColor) -> Rgba<u8> {
    let [r, g, b] = color.rgb();
    Rgba([r, g, b, 255])
}

pub fn render_raster(opts: &RenderOptions<'_>) -> Result<RgbaImage, RenderError> {
    let symbol =
        Symbol::with_error_correction_level(opts.content.as_bytes(), opts.error_correction.into())?;
    let modules = symbol.width() as u32;
    let colors = symbol.to_colors();
    let span = modules + opts.margin * 2;
    let size = opts.size.max(span);

    let dark = rgba(opts.foreground);
    let mut canvas = RgbaImage::from_pixel(size, size, rgba(opts.background));
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let mx = (x * span / size).checked_sub(opts.margin);
        let my = (y * span / size).checked_sub(opts.margin);
        if let (Some(mx), Some(my)) = (mx, my) {
            if mx < modules
                && my < modules
                && colors[(my * modules + mx) as usize] == qrcode::Color::Dark
            {
                *pixel = dark;
            }
        }
    }

    if let Some(data_url) = opts.logo_data_url {
        overlay_logo(&mut canvas, data_url)?;
    }
    Ok(canvas)
}

/// Centers the logo on a white rounded pad covering ~20% of the width.
fn overlay_logo(canvas: &mut RgbaImage, data_url: &str) -> Result<(), RenderError> {
    let logo = decode_logo_data_url(data_url).map_err(RenderError::Logo)?;

    let width = canvas.width();
    let logo_size = ((width as f32 * LOGO_RATIO).floor() as u32).max(1);
    let padding = (logo_size as f32 * LOGO_PADDING_RATIO).floor() as u32;
    let pad_size = logo_size + padding * 2;
    let x = (width - pad_size.min(width)) / 2;
    let y = (canvas.height() - pad_size.min(canvas.height())) / 2;

    fill_rounded_square(
        canvas,
        (x, y),
        pad_size,
        LOGO_CORNER_RADIUS,
        Rgba([255, 255, 255, 255]),
    );

    let scaled = imageops::resize(
        &logo.to_rgba8(),
        logo_size,
        logo_size,
        imageops::FilterType::Lanczos3,
    );
    imageops::overlay(canvas, &scaled, (x + padding) as i64, (y + padding) as i64);
    Ok(())
}

/// Offset from the nearest corner circle center, zero outside the corner boxes.
fn corner_offset(d: i64, side: i64, radius: i64) -> i64 {
    if d < radius {
        radius - d
    } else if d >= side - radius {
        d - (side - radius - 1)
    } else {
        0
    }
}

fn fill_rounded_square(
    canvas: &mut RgbaImage,
    (x0, y0): (u32, u32),
    side: u32,
    radius: u32,
    color: Rgba<u8>,
) {
    let radius = radius.min(side / 2) as i64;
    let side = side as i64;
    for dy in 0..side {
        for dx in 0..side {
            let cx = corner_offset(dx, side, radius);
            let cy = corner_offset(dy, side, radius);
            if cx * cx + cy * cy > radius * radius {
                continue;
            }
            let (px, py) = (x0 as i64 + dx, y0 as i64 + dy);
            if px < canvas.width() as i64 && py < canvas.height() as i64 {
                canvas.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

pub fn encode_raster(image: RgbaImage, format: RasterFormat) -> Result<Vec<u8>, RenderError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    match format {
        RasterFormat::Png => {
            DynamicImage::ImageRgba8(image).write_to(&mut buffer, ImageOutputFormat::Png)?
        }
        RasterFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).into_rgb8())
            .write_to(&mut buffer, ImageOutputFormat::Jpeg(100))?,
    }
    Ok(buffer.into_inner())
}

/// Vector rendering straight from the encoder; the logo is not embedded.
pub fn render_svg(opts: &RenderOptions<'_>) -> Result<String, RenderError> {
    let symbol =
        Symbol::with_error_correction_level(opts.content.as_bytes(), opts.error_correction.into())?;
    Ok(symbol
        .render::<svg::Color<'_>>()
        .min_dimensions(opts.size, opts.size)
        .quiet_zone(opts.margin > 0)
        .dark_color(svg::Color(opts.foreground.as_str()))
        .light_color(svg::Color(opts.background.as_str()))
        .build())
}
