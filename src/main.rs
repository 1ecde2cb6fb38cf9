use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod ai;
mod async_utils;
mod cmd;
mod config;
mod cpu_limit;
mod data_url;
mod document;
mod ensemble;
mod extract;
mod ocr;
mod prelude;
mod ui;
mod variants;
mod work;

/// Extract identity fields from photos and scans of Brazilian ID documents.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - GEMINI_API_KEY (optional): Ask Gemini before falling back to OCR.
  - RUST_LOG (optional): Log filter, like `info` or `docscan=debug`.

  These variables may be set in a standard `.env` file.

External Tools:
  - tesseract, with the `por` language pack, for OCR.
  - pdftotext, from Poppler, for PDFs.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Extract fields from a batch of documents. The input file should have
    /// `id` and `image` fields.
    Extract(cmd::extract::ExtractOpts),
    /// Extract fields from a single image or PDF file.
    Image(cmd::image::ImageOpts),
    /// Parse fields from text that has already been OCRed.
    Parse(cmd::parse::ParseOpts),
    /// Print schemas for input, output and configuration formats.
    Schema(cmd::schema::SchemaOpts),
    /// List the AI models available to our credential.
    ListModels(cmd::list_models::ListModelsOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Image(_) | Cmd::Parse(_) | Cmd::ListModels(_) => true,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments. Credentials are redacted by `Debug`.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Extract(opts) => cmd::extract::cmd_extract(ui, opts).await?,
        Cmd::Image(opts) => cmd::image::cmd_image(opts).await?,
        Cmd::Parse(opts) => cmd::parse::cmd_parse(opts).await?,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await?,
        Cmd::ListModels(opts) => cmd::list_models::cmd_list_models(opts).await?,
    }
    Ok(())
}
