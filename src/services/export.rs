use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::str::FromStr;

use image::DynamicImage;
use printpdf::{BuiltinFont, Color, Greyscale, Image, ImageTransform, Mm, PdfDocument};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use super::render::{
    RasterFormat, RenderError, RenderOptions, encode_raster, render_raster, render_svg,
};
use crate::models::qr_code::QrCode;

const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;
const PDF_TITLE_TOP_MM: f32 = 20.0;
const PDF_IMAGE_TOP_MM: f32 = 30.0;
const PDF_IMAGE_MM: f32 = 120.0;
const PDF_CAPTION_GAP_MM: f32 = 10.0;
const PT_TO_MM: f32 = 25.4 / 72.0;
// average Helvetica glyph advance, in em
const HELVETICA_AVG_ADVANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Svg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Svg => "svg",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            other => Err(format!(
                "Unsupported export format `{other}`, use png, jpeg, svg or pdf"
            )),
        }
    }
}

#[derive(Debug)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Turns a record name into something safe to use as a file name.
pub fn file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "qrcode".into()
    } else {
        cleaned
    }
}

pub fn export(code: &QrCode, format: ExportFormat) -> Result<ExportedFile, RenderError> {
    let opts = RenderOptions::export(code);
    let bytes = match format {
        ExportFormat::Png => encode_raster(render_raster(&opts)?, RasterFormat::Png)?,
        ExportFormat::Jpeg => encode_raster(render_raster(&opts)?, RasterFormat::Jpeg)?,
        ExportFormat::Svg => render_svg(&opts)?.into_bytes(),
        ExportFormat::Pdf => render_pdf(code)?,
    };
    Ok(ExportedFile {
        filename: format!("{}.{}", file_stem(&code.name), format.extension()),
        content_type: format.content_type(),
        bytes,
    })
}

pub fn preview(code: &QrCode) -> Result<Vec<u8>, RenderError> {
    encode_raster(render_raster(&RenderOptions::preview(code))?, RasterFormat::Png)
}

fn centered_x(text: &str, font_size_pt: f32) -> Mm {
    let width = text.chars().count() as f32 * font_size_pt * HELVETICA_AVG_ADVANCE * PT_TO_MM;
    Mm(((A4_WIDTH_MM - width) / 2.0).max(10.0))
}

/// A4 sheet: title, the symbol, then the encoded content as a caption.
pub fn render_pdf(code: &QrCode) -> Result<Vec<u8>, RenderError> {
    let raster = render_raster(&RenderOptions::export(code))?;
    let pixels = raster.width() as f32;

    let title = if code.name.trim().is_empty() {
        "QR Code"
    } else {
        code.name.trim()
    };
    let (doc, page, layer) =
        PdfDocument::new(title, Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "QR code");
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;

    layer.use_text(
        title,
        18.0,
        centered_x(title, 18.0),
        Mm(A4_HEIGHT_MM - PDF_TITLE_TOP_MM),
        &font,
    );

    let image_size = PDF_IMAGE_MM.min(A4_WIDTH_MM - 40.0);
    let flattened = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(raster).into_rgb8());
    Image::from_dynamic_image(&flattened).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm((A4_WIDTH_MM - image_size) / 2.0)),
            translate_y: Some(Mm(A4_HEIGHT_MM - PDF_IMAGE_TOP_MM - image_size)),
            // pixels per inch that make the raster exactly `image_size` wide
            dpi: Some(pixels * 25.4 / image_size),
            ..Default::default()
        },
    );

    layer.set_fill_color(Color::Greyscale(Greyscale::new(0.5, None)));
    layer.use_text(
        code.content.trim(),
        10.0,
        centered_x(code.content.trim(), 10.0),
        Mm(A4_HEIGHT_MM - PDF_IMAGE_TOP_MM - image_size - PDF_CAPTION_GAP_MM),
        &font,
    );

    doc.save_to_bytes().map_err(|e| RenderError::Pdf(e.to_string()))
}

/// One PNG per record; colliding names get a ` (2)`, ` (3)`... suffix.
pub fn export_zip(codes: &[QrCode]) -> Result<Vec<u8>, RenderError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for code in codes {
        let png = encode_raster(render_raster(&RenderOptions::export(code))?, RasterFormat::Png)?;
        let stem = file_stem(&code.name);
        let mut filename = format!("{stem}.png");
        let mut n = 2;
        while !used.insert(filename.clone()) {
            filename = format!("{stem} ({n}).png");
            n += 1;
        }
        writer.start_file(filename, options)?;
        writer.write_all(&png)?;
    }

    Ok(writer.finish()?.into_inner())
}
