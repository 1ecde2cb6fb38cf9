//! Google Gemini client, using the `generateContent` REST API.

use std::time::Duration;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use reqwest::{Client, Response};

use super::{AiError, AiExtractor, AiOptions, ApiKey};
use crate::prelude::*;

/// Header used to pass the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// A Gemini client.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: ApiKey,
    api_base: String,
    model: String,
}

/// Request body for `generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData(InlineData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    /// Base64, without a `data:` prefix.
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

/// Response body from `generateContent`. We only look at the text.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String, AiError> {
        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            Err(AiError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}

/// A model, as listed by the service.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, like `models/gemini-2.0-flash`.
    pub name: String,

    /// Which API methods the model supports.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListModelsResponse {
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

impl GeminiClient {
    /// Create a new client.
    pub fn new(api_key: ApiKey, opts: &AiOptions) -> Result<Self> {
        // Our caller applies its own deadline. This is a backstop for
        // `list-models`, which has no other.
        let client = Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs.max(1) * 2))
            .build()
            .context("could not create HTTP client")?;
        Ok(Self {
            client,
            api_key,
            api_base: opts.api_base.trim_end_matches('/').to_owned(),
            model: opts.model.trim_start_matches("models/").to_owned(),
        })
    }

    /// List the models our key can see.
    #[instrument(level = "debug", skip_all)]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.api_base);
        let mut models = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, self.api_key.expose())
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().await.context("could not reach AI service")?;
            let page = check_status(response)
                .await?
                .json::<ListModelsResponse>()
                .await
                .context("could not parse model list")?;
            models.extend(page.models);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(models)
    }
}

/// Turn non-2xx responses into [`AiError::Status`].
async fn check_status(response: Response) -> Result<Response, AiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(AiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AiExtractor for GeminiClient {
    fn credential_hint(&self) -> String {
        self.api_key.hint()
    }

    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn complete(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, AiError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text(prompt),
                    RequestPart::InlineData(InlineData {
                        mime_type,
                        data: BASE64_STANDARD.encode(image),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.0,
            },
        };
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        trace!(reply = %text, "Gemini reply");
        serde_json::from_str::<GenerateContentResponse>(&text)?.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_matches_wire_format() -> Result<()> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text("read this"),
                    RequestPart::InlineData(InlineData {
                        mime_type: "image/png",
                        data: "AAAA".to_owned(),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.0,
            },
        };
        assert_eq!(
            serde_json::to_value(&body)?,
            json!({
                "contents": [{
                    "parts": [
                        {"text": "read this"},
                        {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
                    ],
                }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "temperature": 0.0,
                },
            })
        );
        Ok(())
    }

    #[test]
    fn reply_text_is_extracted() -> Result<()> {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"taxId\": "}, {"text": "null}"}]},
                "finishReason": "STOP",
            }],
            "usageMetadata": {"promptTokenCount": 10},
        }))?;
        assert_eq!(response.into_text()?, "{\"taxId\": null}");
        Ok(())
    }

    #[test]
    fn blocked_replies_are_empty() -> Result<()> {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"},
        }))?;
        assert!(matches!(response.into_text(), Err(AiError::EmptyResponse)));
        Ok(())
    }

    #[test]
    fn model_names_are_normalized() -> Result<()> {
        let opts = AiOptions {
            model: "models/gemini-2.0-flash".to_owned(),
            api_base: "https://example.com/v1beta/".to_owned(),
            timeout_secs: 30,
        };
        let client = GeminiClient::new("key1234".parse()?, &opts)?;
        assert_eq!(client.model, "gemini-2.0-flash");
        assert_eq!(client.api_base, "https://example.com/v1beta");
        Ok(())
    }
}
