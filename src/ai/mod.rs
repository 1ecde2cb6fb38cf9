//! Extraction using an external AI vision service.
//!
//! When a credential is configured, we ask the AI service first, since it's
//! usually more accurate than OCR. Any failure here is logged and swallowed,
//! and the caller falls back to OCR.

use std::{fmt, str::FromStr, time::Duration};

use schemars::JsonSchema;
use thiserror::Error;

use crate::{
    document::{DocumentType, ExtractedRecord, compact_date, format_tax_id},
    prelude::*,
};

pub mod gemini;

pub use self::gemini::GeminiClient;

/// Our instructions to the AI service.
pub const EXTRACTION_PROMPT: &str = include_str!("extraction_prompt.txt");

/// Settings for the AI service.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AiOptions {
    /// The model to ask.
    pub model: String,

    /// Base URL of the service's REST API.
    pub api_base: String,

    /// How long one AI call may take, in seconds.
    pub timeout_secs: u64,
}

impl Default for AiOptions {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_owned(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// An API key. This is kept out of our logs, apart from the last four
/// characters.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// The actual key, for sending to the service.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The last four characters of the key, for telling keys apart in logs.
    pub fn hint(&self) -> String {
        let chars = self.0.chars().collect::<Vec<_>>();
        let start = chars.len().saturating_sub(4);
        format!("...{}", chars[start..].iter().collect::<String>())
    }
}

impl FromStr for ApiKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        if key.is_empty() {
            Err(anyhow!("API key is empty"))
        } else {
            Ok(Self(key.to_owned()))
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.hint())
    }
}

/// Things that can go wrong when talking to the AI service.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("could not reach AI service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AI service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI service returned no usable fields")]
    EmptyResponse,

    #[error("AI service returned malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("AI service did not answer within {0:?}")]
    Timeout(Duration),
}

/// An AI vision service.
#[async_trait]
pub trait AiExtractor: Send + Sync + 'static {
    /// A short description of the credential we're using, for logs.
    fn credential_hint(&self) -> String;

    /// Send `image` and `prompt` to the service, and return its text reply.
    async fn complete(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, AiError>;
}

/// Fields as the AI service returns them. We accept both our own field names
/// and the Portuguese labels printed on the documents, and we tolerate
/// numbers where we expect strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AiRecord {
    #[serde(alias = "cpf")]
    tax_id: Option<Value>,
    #[serde(alias = "dataNascimento", alias = "data_nascimento")]
    birth_date: Option<Value>,
    #[serde(alias = "rg")]
    registry_id: Option<Value>,
    #[serde(alias = "nome")]
    likely_name: Option<Value>,
    #[serde(alias = "tipoDocumento", alias = "tipo_documento")]
    document_type: Option<Value>,
}

/// Turn a JSON scalar into a trimmed, non-empty string.
fn scalar_text(value: Option<Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

impl AiRecord {
    /// Normalize into the same shape our OCR parser produces.
    fn into_record(self) -> ExtractedRecord {
        ExtractedRecord {
            tax_id: scalar_text(self.tax_id).map(|s| format_tax_id(&s)),
            birth_date: scalar_text(self.birth_date)
                .map(|s| compact_date(&s).unwrap_or(s)),
            registry_id: scalar_text(self.registry_id),
            likely_name: scalar_text(self.likely_name).map(|s| s.to_uppercase()),
            document_type: scalar_text(self.document_type)
                .map(|s| DocumentType::from_loose_str(&s))
                .unwrap_or_default(),
        }
    }
}

/// Remove Markdown code fences that models like to add despite being told
/// not to.
pub fn strip_code_fences(reply: &str) -> &str {
    let reply = reply.trim();
    let Some(rest) = reply.strip_prefix("```") else {
        return reply;
    };
    // Drop the info string, if any, up to the end of the first line.
    let rest = match rest.find('\n') {
        Some(idx) if !rest[..idx].contains('{') => &rest[idx + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the service's text reply into a record.
fn parse_reply(reply: &str) -> Result<ExtractedRecord, AiError> {
    let ai_record = serde_json::from_str::<AiRecord>(strip_code_fences(reply))?;
    let record = ai_record.into_record();
    if record.is_empty() {
        Err(AiError::EmptyResponse)
    } else {
        Ok(record)
    }
}

/// Make exactly one attempt to extract a record using `ai`.
async fn try_extract_with_ai(
    ai: &dyn AiExtractor,
    image: &[u8],
    mime_type: &str,
    timeout: Duration,
) -> Result<ExtractedRecord, AiError> {
    let reply =
        tokio::time::timeout(timeout, ai.complete(image, mime_type, EXTRACTION_PROMPT))
            .await
            .map_err(|_| AiError::Timeout(timeout))??;
    parse_reply(&reply)
}

/// Extract a record using `ai`, returning `None` on any failure.
#[instrument(level = "debug", skip_all, fields(mime_type = %mime_type))]
pub async fn extract_with_ai(
    ai: &dyn AiExtractor,
    image: &[u8],
    mime_type: &str,
    timeout: Duration,
) -> Option<ExtractedRecord> {
    info!(credential = %ai.credential_hint(), "Trying AI extraction");
    match try_extract_with_ai(ai, image, mime_type, timeout).await {
        Ok(record) => {
            info!("AI extraction succeeded");
            Some(record)
        }
        Err(err) => {
            warn!("AI extraction failed, falling back to OCR: {}", err);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{
        testing::{FailingAiExtractor, FixedAiExtractor},
        *,
    };

    #[test]
    fn api_key_is_redacted() -> Result<()> {
        let key = "AIzaSecretSecretWXYZ".parse::<ApiKey>()?;
        assert_eq!(key.hint(), "...WXYZ");
        assert_eq!(format!("{:?}", key), "ApiKey(...WXYZ)");
        assert!(" ".parse::<ApiKey>().is_err());
        Ok(())
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn replies_are_normalized() -> Result<()> {
        let reply = r#"```json
{"taxId": "12345678909", "birthDate": "19091981", "registryId": 1234567,
 "likelyName": "Maria da Silva", "documentType": "cnh"}
```"#;
        let record = parse_reply(reply)?;
        assert_eq!(record.tax_id.as_deref(), Some("123.456.789-09"));
        assert_eq!(record.birth_date.as_deref(), Some("19/09/1981"));
        assert_eq!(record.registry_id.as_deref(), Some("1234567"));
        assert_eq!(record.likely_name.as_deref(), Some("MARIA DA SILVA"));
        assert_eq!(record.document_type, DocumentType::Cnh);
        Ok(())
    }

    #[test]
    fn portuguese_keys_are_accepted() -> Result<()> {
        let record = parse_reply(r#"{"cpf": "123.456.789-09", "nome": "ANA SOUZA", "rg": ""}"#)?;
        assert_eq!(record.tax_id.as_deref(), Some("123.456.789-09"));
        assert_eq!(record.likely_name.as_deref(), Some("ANA SOUZA"));
        assert_eq!(record.registry_id, None);
        Ok(())
    }

    #[test]
    fn empty_and_malformed_replies_are_errors() {
        assert!(matches!(
            parse_reply(r#"{"taxId": null, "likelyName": ""}"#),
            Err(AiError::EmptyResponse)
        ));
        assert!(matches!(
            parse_reply("I'm sorry, I can't read that."),
            Err(AiError::MalformedJson(_))
        ));
    }

    #[tokio::test]
    async fn failures_become_none() {
        let result =
            extract_with_ai(&FailingAiExtractor, b"img", "image/png", Duration::from_secs(1))
                .await;
        assert!(result.is_none());

        let garbage = FixedAiExtractor("not json".to_owned());
        let result =
            extract_with_ai(&garbage, b"img", "image/png", Duration::from_secs(1)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn good_replies_become_records() {
        let ai = FixedAiExtractor(r#"{"taxId": "123.456.789-09", "likelyName": "ANA SOUZA"}"#.to_owned());
        let record = extract_with_ai(&ai, b"img", "image/png", Duration::from_secs(1))
            .await
            .expect("should extract a record");
        assert!(record.is_gold());
    }
}
