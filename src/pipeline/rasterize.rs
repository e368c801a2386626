//! Document decoding and rasterisation.
//!
//! Turns an in-memory document into per-page RGB frames. A raster image is
//! exactly one frame, taken as-is; a PDF yields one frame per page, rendered
//! by pdfium at the quality profile's scale factor. Frames come back in
//! document order with 0-based contiguous indices, normalised to 3-channel
//! RGB regardless of the source's channel count.
//!
//! Everything here is blocking (pdfium keeps thread-local state and must not
//! run on the async scheduler); the orchestrator calls it from inside
//! `spawn_blocking`.

use crate::error::PipelineError;
use image::RgbImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Supported document payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Image,
}

impl MediaType {
    /// Map a declared MIME type onto a supported kind.
    ///
    /// `application/pdf` and any `image/*` subtype are accepted; parameters
    /// after a `;` are ignored. Anything else is rejected before any bytes
    /// are inspected.
    pub fn from_mime(mime: &str) -> Result<Self, PipelineError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(MediaType::Pdf),
            m if m.starts_with("image/") => Ok(MediaType::Image),
            _ => Err(PipelineError::UnsupportedMediaType {
                declared: mime.to_string(),
            }),
        }
    }
}

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct PageFrame {
    /// 0-based page index; contiguous and in document order.
    pub index: usize,
    pub pixels: RgbImage,
}

/// Decode a document into per-page RGB frames.
///
/// `raster_scale` applies to PDF rendering only; image inputs are never
/// resampled here (the preprocessor decides about upscaling later).
pub fn rasterize(
    bytes: &[u8],
    media: MediaType,
    raster_scale: f32,
) -> Result<Vec<PageFrame>, PipelineError> {
    match media {
        MediaType::Image => decode_image(bytes),
        MediaType::Pdf => render_pdf(bytes, raster_scale),
    }
}

fn decode_image(bytes: &[u8]) -> Result<Vec<PageFrame>, PipelineError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PipelineError::ImageDecodeFailed {
            detail: e.to_string(),
        })?;
    let pixels = decoded.to_rgb8();
    debug!("Decoded image input: {}x{} px", pixels.width(), pixels.height());
    Ok(vec![PageFrame { index: 0, pixels }])
}

fn render_pdf(bytes: &[u8], raster_scale: f32) -> Result<Vec<PageFrame>, PipelineError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PipelineError::CorruptDocument {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new().scale_page_by_factor(raster_scale);

    let mut frames = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            }
        })?;
        let pixels = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            pixels.width(),
            pixels.height()
        );
        frames.push(PageFrame { index, pixels });
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn mime_mapping_accepts_pdf_and_images() {
        assert_eq!(MediaType::from_mime("application/pdf").unwrap(), MediaType::Pdf);
        assert_eq!(MediaType::from_mime("image/png").unwrap(), MediaType::Image);
        assert_eq!(
            MediaType::from_mime("IMAGE/JPEG; charset=binary").unwrap(),
            MediaType::Image
        );
    }

    #[test]
    fn mime_mapping_rejects_everything_else() {
        let err = MediaType::from_mime("text/plain").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnsupportedMediaType { ref declared } if declared == "text/plain"
        ));
    }

    #[test]
    fn image_input_is_one_unscaled_frame() {
        let img = RgbaImage::from_pixel(37, 23, Rgba([10, 20, 30, 255]));
        let frames = rasterize(&png_bytes(&img), MediaType::Image, 2.0).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].index, 0);
        // Scale factor is for PDFs only; alpha is dropped in normalisation.
        assert_eq!(frames[0].pixels.dimensions(), (37, 23));
        assert_eq!(frames[0].pixels.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn undecodable_image_bytes_are_a_decode_error() {
        let err = rasterize(b"not an image", MediaType::Image, 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecodeFailed { .. }));
    }
}
