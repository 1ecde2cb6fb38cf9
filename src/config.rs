//! Extractor configuration.
//!
//! Tunables live in [`ExtractorConfig`], which can be loaded from a TOML or
//! JSON file. Secrets never go in that file. The AI credential comes from the
//! command line or the environment, via [`AiOpts`].

use std::time::Duration;

use clap::Args;
use schemars::JsonSchema;

use crate::{
    ai::{AiOptions, ApiKey},
    async_utils::io::read_json_or_toml,
    document::ScoreWeights,
    ocr::OcrOptions,
    prelude::*,
    variants::{VariantOptions, VariantTag},
};

/// Everything that controls how we extract fields from a document.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    /// Image variants to OCR, in order of preference. The default tries the
    /// cleanest renderings first and the untouched original last.
    pub strategies: Vec<VariantTag>,

    /// How candidate readings are scored.
    pub weights: ScoreWeights,

    /// How image variants are generated.
    pub variants: VariantOptions,

    /// OCR engine settings.
    pub ocr: OcrOptions,

    /// AI service settings. Only used when a credential is supplied.
    pub ai: AiOptions,

    /// How long a whole request may take, in seconds.
    pub request_timeout_secs: u64,

    /// Include the winning OCR text in responses.
    pub include_raw_text: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                VariantTag::Otsu,
                VariantTag::Grayscale,
                VariantTag::Adaptive,
                VariantTag::Original,
            ],
            weights: ScoreWeights::default(),
            variants: VariantOptions::default(),
            ocr: OcrOptions::default(),
            ai: AiOptions::default(),
            request_timeout_secs: 300,
            include_raw_text: false,
        }
    }
}

impl ExtractorConfig {
    /// The strategies we'll actually run.
    ///
    /// If denoising is turned on but nobody said where to try it, it goes
    /// just before the original image.
    pub fn strategy_order(&self) -> Vec<VariantTag> {
        let mut order = self.strategies.clone();
        if self.variants.denoise && !order.contains(&VariantTag::Denoised) {
            let idx = order
                .iter()
                .position(|&tag| tag == VariantTag::Original)
                .unwrap_or(order.len());
            order.insert(idx, VariantTag::Denoised);
        }
        order
    }

    /// Timeout for one OCR call.
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr.timeout_secs)
    }

    /// Timeout for one AI call.
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.timeout_secs)
    }

    /// Timeout for a whole request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check for settings that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.strategy_order().is_empty() {
            return Err(anyhow!("at least one OCR strategy must be configured"));
        }
        if self.variants.upscale_factor == 0 {
            return Err(anyhow!("upscale_factor must be at least 1"));
        }
        if self.request_timeout_secs == 0
            || self.ocr.timeout_secs == 0
            || self.ai.timeout_secs == 0
        {
            return Err(anyhow!("timeouts must be at least 1 second"));
        }
        Ok(())
    }
}

/// Command-line options for the AI service.
#[derive(Args, Clone, Debug)]
pub struct AiOpts {
    /// Gemini API key. When set, we ask Gemini first and only fall back to
    /// OCR if that fails.
    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<ApiKey>,
}

/// Command-line options shared by every subcommand that extracts fields.
#[derive(Args, Clone, Debug)]
pub struct ExtractorOpts {
    /// A TOML or JSON file containing extractor settings. See `schema
    /// ExtractorConfig`.
    #[clap(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    #[clap(flatten)]
    pub ai: AiOpts,

    /// Include the OCR text in each response.
    #[clap(long)]
    pub include_raw_text: bool,
}

impl ExtractorOpts {
    /// Load our configuration, applying any command-line overrides.
    pub async fn load_config(&self) -> Result<ExtractorConfig> {
        let mut config = load_config_file(self.config_path.as_deref()).await?;
        if self.include_raw_text {
            config.include_raw_text = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from `path`, or use the defaults.
pub async fn load_config_file(path: Option<&Path>) -> Result<ExtractorConfig> {
    match path {
        Some(path) => read_json_or_toml::<ExtractorConfig>(path).await,
        None => Ok(ExtractorConfig::default()),
    }
}
