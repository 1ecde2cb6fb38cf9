//! The `image` subcommand.

use clap::Args;

use crate::{
    config::ExtractorOpts,
    data_url::data_url,
    extract::{ExtractRequest, Extractor},
    prelude::*,
};

/// MIME type to claim when `infer` doesn't recognize the file. The extractor
/// sniffs the bytes again anyway.
const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// Extract fields from a single image or PDF.
#[derive(Debug, Args)]
pub struct ImageOpts {
    /// The image or PDF to read.
    pub path: PathBuf,

    #[clap(flatten)]
    pub extractor: ExtractorOpts,
}

/// The `image` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.path.display()))]
pub async fn cmd_image(opts: &ImageOpts) -> Result<()> {
    let config = opts.extractor.load_config().await?;
    let extractor =
        Extractor::with_default_engines(config, opts.extractor.ai.gemini_api_key.clone())?;

    let bytes = tokio::fs::read(&opts.path)
        .await
        .with_context(|| format!("Failed to read {:?}", opts.path))?;
    let mime_type = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or(UNKNOWN_MIME_TYPE);
    debug!(%mime_type, len = bytes.len(), "Read document");

    let request = ExtractRequest {
        image: data_url(mime_type, &bytes),
    };
    let response = extractor.handle_request(request).await;
    let json = serde_json::to_string_pretty(&response).context("failed to serialize response")?;
    println!("{}", json);

    if response.success {
        Ok(())
    } else {
        Err(anyhow!(
            "could not extract fields from {:?}: {}",
            opts.path,
            response.error.as_deref().unwrap_or("unknown error")
        ))
    }
}
