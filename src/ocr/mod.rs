//! External text recognition engines.
//!
//! We treat OCR as a black box: an image goes in, and text comes out. The
//! traits here are the seams where tests substitute scripted engines.

use std::sync::Arc;

use image::DynamicImage;
use schemars::JsonSchema;

use crate::{prelude::*, variants::VariantTag};

pub mod pdftotext;
pub mod tesseract;

pub use self::{pdftotext::PdfToTextEngine, tesseract::TesseractOcrEngine};

/// Settings for the OCR engine.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrOptions {
    /// Language hint, using Tesseract's language codes.
    pub language: String,

    /// Tesseract page segmentation mode. `3` is fully automatic.
    pub page_segmentation_mode: u8,

    /// How long a single OCR call may take, in seconds. A call that runs
    /// longer is treated as a failed call.
    pub timeout_secs: u64,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "por".to_owned(),
            page_segmentation_mode: 3,
            timeout_secs: 60,
        }
    }
}

/// An engine that reads text from an image.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in `image`, which was rendered as variant `tag`.
    ///
    /// Returning an empty string is fine. Errors are for when the engine
    /// itself broke.
    async fn recognize(&self, tag: VariantTag, image: Arc<DynamicImage>) -> Result<String>;
}

/// An engine that reads the embedded text layer of a PDF.
#[async_trait]
pub trait PdfTextEngine: Send + Sync + 'static {
    /// Extract whatever text the PDF carries. Scanned PDFs will usually
    /// return nothing but whitespace.
    async fn extract_text(&self, pdf: Arc<Vec<u8>>) -> Result<String>;
}
