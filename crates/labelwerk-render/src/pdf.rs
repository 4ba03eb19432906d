// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembly: one page per rendered label image, using `printpdf` 0.8.
//
// Each page is exactly the size of its label.  The page size comes from the
// image's pixel size at the render density, and the image is placed at the
// origin at that same density so it fills the page edge to edge.

use labelwerk_core::error::{LabelwerkError, Result};
use labelwerk_core::units::MM_PER_INCH;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, instrument};

/// Builds multi-page PDFs from rendered label images.
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    /// Density the images were rendered at.
    dpi: f32,
    title: String,
}

impl PdfAssembler {
    pub fn new(dpi: f32) -> Self {
        Self {
            dpi: if dpi > 0.0 { dpi } else { 203.2 },
            title: "Labelwerk Labels".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    /// Page side in millimetres for `pixels` at the assembler density.
    pub fn pixels_to_mm(&self, pixels: u32) -> f32 {
        (f64::from(pixels) / f64::from(self.dpi) * MM_PER_INCH) as f32
    }

    /// Encode the images, in order, as pages of one PDF.
    #[instrument(skip_all, fields(pages = images.len()))]
    pub fn assemble(&self, images: &[Vec<u8>]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(LabelwerkError::Encode("no pages to assemble".to_string()));
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pages = Vec::with_capacity(images.len());

        for (index, bytes) in images.iter().enumerate() {
            let decoded = ::image::load_from_memory(bytes).map_err(|e| {
                LabelwerkError::Encode(format!("page {}: cannot decode image: {e}", index + 1))
            })?;
            let (width, height) = (decoded.width(), decoded.height());
            let rgb = decoded.to_rgb8();

            let raw = RawImage {
                pixels: RawImageData::U8(rgb.into_raw()),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let page_w = Mm(self.pixels_to_mm(width));
            let page_h = Mm(self.pixels_to_mm(height));
            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: None,
                    scale_y: None,
                    dpi: Some(self.dpi),
                    rotate: None,
                },
            }];
            debug!(page = index + 1, width, height, page_w_mm = page_w.0, page_h_mm = page_h.0, "page laid out");
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "PDF encoder reported warnings");
        }
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::io::Cursor;

    use ::image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// A PNG of the given pixel size with a black border on white.
    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for x in 0..width {
            img.put_pixel(x, 0, Rgb([0, 0, 0]));
            img.put_pixel(x, height - 1, Rgb([0, 0, 0]));
        }
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn page_size_follows_pixels_and_density() {
        let assembler = PdfAssembler::new(203.2);
        // 812 dots at 8 dpmm is 101.5 mm.
        assert!((assembler.pixels_to_mm(812) - 101.5).abs() < 0.01);
        assert!((assembler.pixels_to_mm(1218) - 152.25).abs() < 0.01);
    }

    #[test]
    fn assembles_a_pdf_from_images() {
        let assembler = PdfAssembler::new(203.2).with_title("test");
        let pdf = assembler
            .assemble(&[png(80, 40), png(80, 40)])
            .expect("assemble");
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_input_is_an_encode_error() {
        let err = PdfAssembler::new(203.2).assemble(&[]).expect_err("no pages");
        assert!(matches!(err, LabelwerkError::Encode(_)));
    }

    #[test]
    fn undecodable_page_is_reported_by_position() {
        let err = PdfAssembler::new(203.2)
            .assemble(&[png(10, 10), b"not an image".to_vec()])
            .expect_err("bad page");
        assert!(err.to_string().contains("page 2"), "{err}");
    }

    #[test]
    fn non_positive_density_falls_back() {
        assert!((PdfAssembler::new(0.0).dpi() - 203.2).abs() < f32::EPSILON);
    }
}
