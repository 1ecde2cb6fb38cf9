//! The `list-models` subcommand.

use clap::Args;

use crate::{ai::GeminiClient, config::AiOpts, config::load_config_file, prelude::*};

/// List the AI models our credential can use.
#[derive(Debug, Args)]
pub struct ListModelsOpts {
    /// A TOML or JSON file containing extractor settings. Only the AI
    /// settings are used.
    #[clap(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    #[clap(flatten)]
    pub ai: AiOpts,
}

/// The `list-models` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_list_models(opts: &ListModelsOpts) -> Result<()> {
    let config = load_config_file(opts.config_path.as_deref()).await?;
    let api_key = opts.ai.gemini_api_key.clone().ok_or_else(|| {
        anyhow!("no AI credential configured; set GEMINI_API_KEY or pass --gemini-api-key")
    })?;
    info!(credential = %api_key.hint(), "Listing models");

    let client = GeminiClient::new(api_key, &config.ai)?;
    for model in client.list_models().await? {
        println!(
            "{}\t{}",
            model.name,
            model.supported_generation_methods.join(",")
        );
    }
    Ok(())
}
