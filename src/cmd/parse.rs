//! The `parse` subcommand, for testing field extraction on text we already
//! have.

use clap::Args;

use crate::{
    async_utils::io::read_text,
    config::load_config_file,
    document::{ExtractedRecord, parse_document_text, score_record},
    prelude::*,
};

/// Parse fields from OCR text.
#[derive(Debug, Args)]
pub struct ParseOpts {
    /// A text file to parse. Reads standard input if omitted.
    pub text_path: Option<PathBuf>,

    /// A TOML or JSON file containing extractor settings. Only the scoring
    /// weights are used.
    #[clap(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,
}

/// What `parse` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport {
    extracted_fields: ExtractedRecord,
    score: u32,
    gold: bool,
}

/// The `parse` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_parse(opts: &ParseOpts) -> Result<()> {
    let config = load_config_file(opts.config_path.as_deref()).await?;
    let text = read_text(opts.text_path.as_deref()).await?;

    let record = parse_document_text(&text);
    let report = ParseReport {
        score: score_record(&record, &config.weights),
        gold: record.is_gold(),
        extracted_fields: record,
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    println!("{}", json);
    Ok(())
}
