// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — display rotation for page previews, resizing of user
// images, and PNG/JPEG encoding of rendered pages. Operates on in-memory
// images using the `image` and `imageproc` crates.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use pagesmith_core::ImageKind;
use pagesmith_core::error::PagesmithError;
use tracing::{debug, instrument};

/// A single in-memory image.
///
/// Transformations consume `self` and return the transformed image so calls
/// chain:
///
/// ```ignore
/// let jpeg = ImageProcessor::from_bytes(&bytes)?
///     .resize_to(Some(800), None)
///     .to_jpeg_bytes(90)?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    /// Decode JPEG or PNG bytes.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PagesmithError> {
        let image = image::load_from_memory(data)
            .map_err(|err| PagesmithError::Image(format!("failed to decode image: {err}")))?;
        debug!(width = image.width(), height = image.height(), "Image decoded");
        Ok(Self { image })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Wrap a rendered page bitmap.
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self::from_dynamic(DynamicImage::ImageRgba8(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.image.into_rgba8()
    }

    /// Scale to a target width and/or height, keeping the aspect ratio. With
    /// one side given the other follows from it; with both the image is
    /// fitted inside the box. With neither it is returned unchanged.
    #[instrument(skip(self))]
    pub fn resize_to(self, width: Option<u32>, height: Option<u32>) -> Self {
        let (w, h) = (
            u64::from(self.image.width().max(1)),
            u64::from(self.image.height().max(1)),
        );
        let image = match (width, height) {
            (Some(bw), Some(bh)) => self.image.resize(bw.max(1), bh.max(1), FilterType::Lanczos3),
            (Some(tw), None) => {
                let th = (u64::from(tw) * h / w).max(1) as u32;
                self.image.resize_exact(tw.max(1), th, FilterType::Lanczos3)
            }
            (None, Some(th)) => {
                let tw = (u64::from(th) * w / h).max(1) as u32;
                self.image.resize_exact(tw, th.max(1), FilterType::Lanczos3)
            }
            (None, None) => return self,
        };
        debug!(width = image.width(), height = image.height(), "Image resized");
        Self { image }
    }

    /// Rotate clockwise by `degrees`.
    ///
    /// Right angles are lossless and swap the dimensions. Any other angle
    /// turns about the centre on a canvas of the same size, with transparent
    /// corners.
    #[instrument(skip(self))]
    pub fn rotate(self, degrees: f32) -> Self {
        let normalised = degrees.rem_euclid(360.0);
        let quarter = (normalised / 90.0).round();
        if (normalised - quarter * 90.0).abs() < 0.01 {
            let image = match quarter as u32 % 4 {
                1 => self.image.rotate90(),
                2 => self.image.rotate180(),
                3 => self.image.rotate270(),
                _ => self.image,
            };
            return Self { image };
        }

        let rotated = rotate_about_center(
            &self.image.to_rgba8(),
            normalised.to_radians(),
            Interpolation::Bilinear,
            Rgba([255, 255, 255, 0]),
        );
        Self::from_rgba(rotated)
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, PagesmithError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|err| PagesmithError::Image(format!("PNG encoding failed: {err}")))?;
        Ok(buffer.into_inner())
    }

    /// JPEG at `quality` (clamped to 1-100). Transparency is flattened onto
    /// white, as JPEG has no alpha.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, PagesmithError> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        flatten_on_white(&self.image)
            .write_with_encoder(encoder)
            .map_err(|err| PagesmithError::Image(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }

    /// Encode as `kind`; `jpeg_quality` only applies to JPEG.
    pub fn encode(&self, kind: ImageKind, jpeg_quality: u8) -> Result<Vec<u8>, PagesmithError> {
        match kind {
            ImageKind::Png => self.to_png_bytes(),
            ImageKind::Jpeg => self.to_jpeg_bytes(jpeg_quality),
        }
    }
}

fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |channel: u8| ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
