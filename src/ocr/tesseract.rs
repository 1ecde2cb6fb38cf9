//! Tesseract OCR engine.

use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use tokio::process::Command;

use super::{OcrEngine, OcrOptions};
use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
    variants::VariantTag,
};

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Clone, Debug)]
pub struct TesseractOcrEngine {
    language: String,
    page_segmentation_mode: u8,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine.
    pub fn new(opts: &OcrOptions) -> Self {
        Self {
            language: opts.language.clone(),
            page_segmentation_mode: opts.page_segmentation_mode,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(variant = %tag, lang = %self.language))]
    async fn recognize(&self, tag: VariantTag, image: Arc<DynamicImage>) -> Result<String> {
        // Write our input to a temporary file. PNG is lossless, which matters
        // for the thresholded variants.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        let png_path = input_path.clone();
        spawn_blocking_propagating_panics(move || {
            image.save_with_format(&png_path, ImageFormat::Png)
        })
        .await?
        .context("cannot write tesseract input file")?;

        // Run tesseract, sending the text to standard output. If our caller
        // gives up on us, `kill_on_drop` cleans up the process.
        let output = with_cpu_semaphore(|| async {
            Command::new("tesseract")
                .arg(&input_path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .arg("--psm")
                .arg(self.page_segmentation_mode.to_string())
                .kill_on_drop(true)
                .output()
                .await
                .context("cannot run tesseract")
        })
        .await?;
        check_for_command_failure("tesseract", &output)?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "tesseract finished");
        Ok(text)
    }
}
