//! The `extract` subcommand.

use clap::Args;
use futures::StreamExt as _;

use crate::{
    async_utils::io::{JsonRecords, read_jsonl_or_csv},
    config::ExtractorOpts,
    extract::{ExtractError, ExtractRequest, ExtractResponse, Extractor},
    prelude::*,
    ui::{ProgressConfig, Ui},
    work::{WorkInput, WorkOutput},
};

use super::StreamOpts;

/// Extract fields from a batch of documents.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// Input JSONL or CSV file. Each record needs an `id` and an `image`
    /// field holding the document as Base64. Reads standard input if omitted.
    pub input_path: Option<PathBuf>,

    #[clap(flatten)]
    pub extractor: ExtractorOpts,

    #[clap(flatten)]
    pub stream: StreamOpts,

    /// Output location, in JSONL format. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    let config = opts.extractor.load_config().await?;
    let extractor =
        Extractor::with_default_engines(config, opts.extractor.ai.gemini_api_key.clone())?;

    let JsonRecords { stream, count } =
        read_jsonl_or_csv(&ui, opts.input_path.as_deref()).await?;
    let input = opts.stream.apply_stream_input_opts(stream);
    let count = match (count, opts.stream.take_first) {
        (Some(count), Some(take_first)) => Some(count.min(take_first)),
        (count, _) => count,
    };

    let pb = ui.new_for_count(
        &ProgressConfig {
            emoji: "🪪",
            msg: "Extracting documents",
            done_msg: "Extracted documents",
        },
        count,
    );

    let output = input
        .map(move |value| {
            let extractor = extractor.clone();
            async move {
                let value = value?;
                Ok::<_, anyhow::Error>(process_record(&extractor, value).await)
            }
        })
        .buffered(opts.stream.job_count());
    let output = pb.wrap_stream(output).boxed();

    WorkOutput::write_stream(
        &ui,
        opts.output_path.as_deref(),
        output,
        opts.stream.allowed_failure_rate,
    )
    .await
}

/// Handle one input record. A record we can't make sense of gets a failure
/// response, so it doesn't take the rest of the batch down with it.
#[instrument(level = "debug", skip_all, fields(id = %value.get("id").unwrap_or(&serde_json::Value::Null)))]
pub async fn process_record(extractor: &Extractor, value: Value) -> WorkOutput<ExtractResponse> {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    match WorkInput::<ExtractRequest>::from_json(value) {
        Ok(input) => WorkOutput {
            id: input.id,
            data: extractor.handle_request(input.data).await,
        },
        Err(err) => {
            warn!("Skipping malformed record: {:#}", err);
            WorkOutput {
                id,
                data: ExtractResponse::failure(&ExtractError::InvalidRequest(format!(
                    "{:#}",
                    err
                ))),
            }
        }
    }
}
