//! PDF text layer extraction using `pdftotext`.

use std::sync::Arc;

use tokio::process::Command;

use super::PdfTextEngine;
use crate::{async_utils::check_for_command_failure, prelude::*};

/// Text engine wrapping the `pdftotext` CLI tool from `poppler-utils`.
///
/// This will miss any "non-searchable" text in a PDF, so scanned documents
/// come back empty.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct PdfToTextEngine {}

impl PdfToTextEngine {
    /// Create a new `pdftotext` engine.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl PdfTextEngine for PdfToTextEngine {
    #[instrument(level = "debug", skip_all, fields(bytes = pdf.len()))]
    async fn extract_text(&self, pdf: Arc<Vec<u8>>) -> Result<String> {
        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("pdftotext")?;
        let input_path = tmpdir.path().join("input.pdf");
        let output_path = tmpdir.path().join("output.txt");
        tokio::fs::write(&input_path, pdf.as_slice())
            .await
            .context("cannot write pdftotext input file")?;

        // Run pdftotext on the input file, keeping the physical layout so
        // that labels stay on the same line as their values.
        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(&input_path)
            .arg(&output_path)
            .kill_on_drop(true)
            .output()
            .await
            .context("cannot run pdftotext")?;
        check_for_command_failure("pdftotext", &output)?;

        // `pdftotext` writes Latin-1 on some systems, so don't insist on
        // UTF-8.
        let bytes = tokio::fs::read(&output_path)
            .await
            .context("cannot read pdftotext output file")?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
