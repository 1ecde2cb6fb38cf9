//! Turning one request into one response.
//!
//! This is the outer boundary of the pipeline. Whatever goes wrong inside,
//! the caller gets an [`ExtractResponse`] saying so. Nothing here returns an
//! error or panics on bad input.

use std::{fmt, sync::Arc, time::Duration};

use schemars::JsonSchema;
use thiserror::Error;
use tracing::Instrument as _;

use crate::{
    ai::{AiExtractor, ApiKey, GeminiClient, extract_with_ai},
    async_utils::spawn_blocking_propagating_panics,
    config::ExtractorConfig,
    data_url::decode_base64_payload,
    document::{ExtractedRecord, parse_document_text},
    ensemble::{Confidence, Ensemble},
    ocr::{OcrEngine, PdfTextEngine, PdfToTextEngine, TesseractOcrEngine},
    prelude::*,
    variants::{ImageVariants, VariantTag},
    work::Outcome,
};

/// PDFs with fewer visible characters than this are assumed to be scans with
/// no text layer.
const MIN_PDF_TEXT_CHARS: usize = 20;

/// MIME type to assume when we can't recognize an image's format.
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// A request to extract fields from a document.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct ExtractRequest {
    /// The document, as Base64. May be prefixed with a `data:` URL header
    /// like `data:image/png;base64,`. PNG, JPEG, WebP and PDF are supported.
    pub image: String,
}

/// Which path through the pipeline produced a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// The AI vision service.
    AiVision,
    /// OCR on this variant found both a tax ID and a name.
    OcrGold(VariantTag),
    /// No OCR variant was conclusive, so we used the best one.
    OcrBestEffort,
    /// The PDF's own text layer.
    PdfNativeExtraction,
    /// The PDF had no usable text layer.
    PdfScanFail,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::AiVision => write!(f, "AI_VISION"),
            Method::OcrGold(tag) => write!(f, "OCR_{}_GOLD", tag.as_str().to_uppercase()),
            Method::OcrBestEffort => write!(f, "OCR_BEST_EFFORT"),
            Method::PdfNativeExtraction => write!(f, "PDF_NATIVE_EXTRACTION"),
            Method::PdfScanFail => write!(f, "PDF_SCAN_FAIL"),
        }
    }
}

impl Serialize for Method {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why a request failed.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request is malformed: {0}")]
    InvalidRequest(String),

    #[error("image is not valid Base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("could not decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error(
        "PDF has no usable text layer ({chars} visible characters); it is probably a scan, so please send it as an image"
    )]
    ScannedPdf { chars: usize },

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// The result of one request.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    /// Did we produce a record?
    pub success: bool,

    /// The fields we found. Present whenever `success` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<ExtractedRecord>,

    /// Which path produced this response: `AI_VISION`,
    /// `OCR_<VARIANT>_GOLD`, `OCR_BEST_EFFORT`, `PDF_NATIVE_EXTRACTION` or
    /// `PDF_SCAN_FAIL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub method: Option<Method>,

    /// What went wrong, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The text the fields were parsed from, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl ExtractResponse {
    /// A successful response.
    pub fn success(record: ExtractedRecord, method: Method, raw_text: Option<String>) -> Self {
        Self {
            success: true,
            extracted_fields: Some(record),
            method: Some(method),
            error: None,
            raw_text,
        }
    }

    /// A failed response.
    pub fn failure(err: &ExtractError) -> Self {
        let method = match err {
            ExtractError::ScannedPdf { .. } => Some(Method::PdfScanFail),
            _ => None,
        };
        Self {
            success: false,
            extracted_fields: None,
            method,
            error: Some(err.to_string()),
            raw_text: None,
        }
    }
}

impl Outcome for ExtractResponse {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// Extracts fields from documents. Cheap to clone.
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractorConfig>,
    ensemble: Ensemble,
    ocr: Arc<dyn OcrEngine>,
    pdf: Arc<dyn PdfTextEngine>,
    ai: Option<Arc<dyn AiExtractor>>,
}

impl Extractor {
    /// Create an extractor from its collaborators. If `ai` is `None`, we
    /// only use OCR.
    pub fn new(
        config: ExtractorConfig,
        ocr: Arc<dyn OcrEngine>,
        pdf: Arc<dyn PdfTextEngine>,
        ai: Option<Arc<dyn AiExtractor>>,
    ) -> Self {
        let ensemble = Ensemble::new(
            config.strategy_order(),
            config.weights.clone(),
            config.ocr_timeout(),
        );
        Self {
            config: Arc::new(config),
            ensemble,
            ocr,
            pdf,
            ai,
        }
    }

    /// Create an extractor using `tesseract`, `pdftotext`, and, if we have a
    /// key, Gemini.
    pub fn with_default_engines(config: ExtractorConfig, api_key: Option<ApiKey>) -> Result<Self> {
        let ai = match api_key {
            Some(api_key) => {
                info!(credential = %api_key.hint(), model = %config.ai.model, "AI extraction enabled");
                Some(Arc::new(GeminiClient::new(api_key, &config.ai)?) as Arc<dyn AiExtractor>)
            }
            None => {
                info!("No AI credential configured, using OCR only");
                None
            }
        };
        let ocr = Arc::new(TesseractOcrEngine::new(&config.ocr));
        let pdf = Arc::new(PdfToTextEngine::new());
        Ok(Self::new(config, ocr, pdf, ai))
    }

    /// Our configuration.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Handle one request, with a deadline. Always returns a response.
    ///
    /// The work runs as its own task, so a panic deep inside becomes a
    /// failed response rather than taking down the batch.
    pub async fn handle_request(&self, request: ExtractRequest) -> ExtractResponse {
        let timeout = self.config.request_timeout();
        let this = self.clone();
        let mut task = tokio::spawn(
            async move { this.extract(&request.image).await }.in_current_span(),
        );
        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ExtractError::Internal(anyhow!(
                "extraction task failed: {}",
                join_err
            ))),
            Err(_) => {
                task.abort();
                Err(ExtractError::Timeout(timeout))
            }
        };
        match result {
            Ok(response) => response,
            Err(err) => {
                warn!("Extraction failed: {}", err);
                ExtractResponse::failure(&err)
            }
        }
    }

    /// Our pipeline: decode, then PDF text, AI, or OCR.
    async fn extract(&self, payload: &str) -> Result<ExtractResponse, ExtractError> {
        let bytes = decode_base64_payload(payload)?;
        if infer::archive::is_pdf(&bytes) {
            return self.extract_pdf(bytes).await;
        }

        // Decode before anything else, so we never send garbage to the AI
        // service.
        let bytes = Arc::new(bytes);
        let source = {
            let bytes = bytes.clone();
            spawn_blocking_propagating_panics(move || image::load_from_memory(&bytes)).await??
        };
        debug!(width = source.width(), height = source.height(), "Decoded image");

        if let Some(ai) = &self.ai {
            let mime_type = infer::get(&bytes)
                .map(|kind| kind.mime_type())
                .unwrap_or(FALLBACK_MIME_TYPE);
            if let Some(record) =
                extract_with_ai(ai.as_ref(), &bytes, mime_type, self.config.ai_timeout()).await
            {
                return Ok(ExtractResponse::success(record, Method::AiVision, None));
            }
        }

        let opts = self.config.variants.clone();
        let variants =
            spawn_blocking_propagating_panics(move || ImageVariants::generate(&source, &opts))
                .await?;
        let outcome = self.ensemble.run(self.ocr.as_ref(), &variants).await?;
        let method = match outcome.confidence {
            Confidence::Gold => Method::OcrGold(outcome.candidate.tag),
            Confidence::BestEffort => Method::OcrBestEffort,
        };
        info!(%method, score = outcome.candidate.score, "OCR extraction finished");
        let raw_text = self
            .config
            .include_raw_text
            .then_some(outcome.candidate.raw_text);
        Ok(ExtractResponse::success(
            outcome.candidate.record,
            method,
            raw_text,
        ))
    }

    /// Use a PDF's embedded text. We don't rasterize PDFs, so a scanned PDF
    /// is a failure.
    async fn extract_pdf(&self, bytes: Vec<u8>) -> Result<ExtractResponse, ExtractError> {
        let timeout = self.config.ocr_timeout();
        let text = tokio::time::timeout(timeout, self.pdf.extract_text(Arc::new(bytes)))
            .await
            .map_err(|_| ExtractError::Timeout(timeout))??;
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        if chars < MIN_PDF_TEXT_CHARS {
            return Err(ExtractError::ScannedPdf { chars });
        }
        let record = parse_document_text(&text);
        let raw_text = self.config.include_raw_text.then_some(text);
        Ok(ExtractResponse::success(
            record,
            Method::PdfNativeExtraction,
            raw_text,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use base64::{Engine as _, prelude::BASE64_STANDARD};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::{
        ai::testing::{FailingAiExtractor, FixedAiExtractor},
        data_url::data_url,
        document::DocumentType,
        ocr::testing::{FixedPdfTextEngine, ScriptedOcrEngine, StalledOcrEngine},
    };

    const GOLD_TEXT: &str = "CPF 123.456.789-09\n\nNOME\nMARIA DA SILVA\n";

    fn png_bytes() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(48, 32, |x, _y| {
            if x % 8 < 4 {
                Rgb([20, 90, 40])
            } else {
                Rgb([240, 240, 240])
            }
        }));
        let mut bytes = vec![];
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("PNG encoding should succeed");
        bytes
    }

    fn png_request() -> ExtractRequest {
        ExtractRequest {
            image: BASE64_STANDARD.encode(png_bytes()),
        }
    }

    fn extractor_with(
        config: ExtractorConfig,
        ocr: Arc<dyn OcrEngine>,
        ai: Option<Arc<dyn AiExtractor>>,
    ) -> Extractor {
        let pdf = Arc::new(FixedPdfTextEngine(String::new()));
        Extractor::new(config, ocr, pdf, ai)
    }

    fn gold_on_grayscale() -> Arc<ScriptedOcrEngine> {
        Arc::new(ScriptedOcrEngine::default().with_text(VariantTag::Grayscale, GOLD_TEXT))
    }

    #[test]
    fn method_tags() {
        assert_eq!(Method::AiVision.to_string(), "AI_VISION");
        assert_eq!(
            Method::OcrGold(VariantTag::Otsu).to_string(),
            "OCR_OTSU_GOLD"
        );
        assert_eq!(
            Method::OcrGold(VariantTag::Grayscale).to_string(),
            "OCR_GRAYSCALE_GOLD"
        );
        assert_eq!(Method::OcrBestEffort.to_string(), "OCR_BEST_EFFORT");
        assert_eq!(
            serde_json::to_value(Method::PdfScanFail).unwrap(),
            json!("PDF_SCAN_FAIL")
        );
    }

    #[tokio::test]
    async fn ocr_gold_response() {
        let ocr = gold_on_grayscale();
        let extractor = extractor_with(ExtractorConfig::default(), ocr.clone(), None);
        let response = extractor.handle_request(png_request()).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": true,
                "extractedFields": {
                    "taxId": "123.456.789-09",
                    "birthDate": null,
                    "registryId": null,
                    "likelyName": "MARIA DA SILVA",
                    "documentType": "UNKNOWN",
                },
                "method": "OCR_GRAYSCALE_GOLD",
            })
        );
        assert_eq!(ocr.calls(), vec![VariantTag::Otsu, VariantTag::Grayscale]);
    }

    #[tokio::test]
    async fn data_url_prefix_gives_identical_results() {
        let extractor = extractor_with(ExtractorConfig::default(), gold_on_grayscale(), None);
        let plain = extractor.handle_request(png_request()).await;
        let prefixed = extractor
            .handle_request(ExtractRequest {
                image: data_url("image/png", &png_bytes()),
            })
            .await;
        assert_eq!(plain, prefixed);
    }

    #[tokio::test]
    async fn failing_ai_is_transparent() {
        let without_ai = extractor_with(ExtractorConfig::default(), gold_on_grayscale(), None)
            .handle_request(png_request())
            .await;
        let with_failing_ai = extractor_with(
            ExtractorConfig::default(),
            gold_on_grayscale(),
            Some(Arc::new(FailingAiExtractor)),
        )
        .handle_request(png_request())
        .await;
        assert_eq!(without_ai, with_failing_ai);
    }

    #[tokio::test]
    async fn successful_ai_skips_ocr() {
        let ocr = gold_on_grayscale();
        let ai = FixedAiExtractor(
            r#"{"taxId": "98765432100", "likelyName": "Jose Pereira", "documentType": "CNH"}"#
                .to_owned(),
        );
        let extractor =
            extractor_with(ExtractorConfig::default(), ocr.clone(), Some(Arc::new(ai)));
        let response = extractor.handle_request(png_request()).await;

        assert!(response.success);
        assert_eq!(response.method, Some(Method::AiVision));
        let fields = response.extracted_fields.unwrap();
        assert_eq!(fields.tax_id.as_deref(), Some("987.654.321-00"));
        assert_eq!(fields.likely_name.as_deref(), Some("JOSE PEREIRA"));
        assert_eq!(fields.document_type, DocumentType::Cnh);
        assert!(ocr.calls().is_empty());
    }

    #[tokio::test]
    async fn best_effort_with_raw_text() {
        let ocr = Arc::new(
            ScriptedOcrEngine::default()
                .with_text(VariantTag::Adaptive, "REGISTRO GERAL\nRG 1234567\n"),
        );
        let config = ExtractorConfig {
            include_raw_text: true,
            ..ExtractorConfig::default()
        };
        let response = extractor_with(config, ocr, None)
            .handle_request(png_request())
            .await;
        assert!(response.success);
        assert_eq!(response.method, Some(Method::OcrBestEffort));
        assert_eq!(
            response.raw_text.as_deref(),
            Some("REGISTRO GERAL\nRG 1234567\n")
        );
        let fields = response.extracted_fields.unwrap();
        assert_eq!(fields.registry_id.as_deref(), Some("1234567"));
    }

    #[tokio::test]
    async fn bad_base64_is_a_failed_response() {
        let extractor = extractor_with(ExtractorConfig::default(), gold_on_grayscale(), None);
        let response = extractor
            .handle_request(ExtractRequest {
                image: "data:image/png;base64,!!!".to_owned(),
            })
            .await;
        assert!(!response.success);
        assert!(response.extracted_fields.is_none());
        assert!(response.error.unwrap().contains("Base64"));
    }

    #[tokio::test]
    async fn undecodable_image_is_a_failed_response() {
        let ocr = gold_on_grayscale();
        let extractor = extractor_with(
            ExtractorConfig::default(),
            ocr.clone(),
            Some(Arc::new(FixedAiExtractor("{}".to_owned()))),
        );
        let response = extractor
            .handle_request(ExtractRequest {
                image: BASE64_STANDARD.encode(b"this is not an image"),
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("could not decode image"));
        assert!(ocr.calls().is_empty());
    }

    #[tokio::test]
    async fn pdf_text_layer_is_parsed() {
        let pdf = Arc::new(FixedPdfTextEngine(
            "CARTEIRA NACIONAL DE HABILITACAO\nNOME\nJOSE CARLOS PEREIRA\nCPF 987.654.321-00\n"
                .to_owned(),
        ));
        let ocr = gold_on_grayscale();
        let extractor = Extractor::new(ExtractorConfig::default(), ocr.clone(), pdf, None);
        let response = extractor
            .handle_request(ExtractRequest {
                image: BASE64_STANDARD.encode(b"%PDF-1.4\n%fake\n"),
            })
            .await;
        assert!(response.success);
        assert_eq!(response.method, Some(Method::PdfNativeExtraction));
        let fields = response.extracted_fields.unwrap();
        assert_eq!(fields.document_type, DocumentType::Cnh);
        assert_eq!(fields.tax_id.as_deref(), Some("987.654.321-00"));
        assert!(ocr.calls().is_empty());
    }

    #[tokio::test]
    async fn scanned_pdf_fails() {
        let pdf = Arc::new(FixedPdfTextEngine(" \n\x0c  page 1 \n".to_owned()));
        let extractor =
            Extractor::new(ExtractorConfig::default(), gold_on_grayscale(), pdf, None);
        let response = extractor
            .handle_request(ExtractRequest {
                image: BASE64_STANDARD.encode(b"%PDF-1.7\n"),
            })
            .await;
        assert!(!response.success);
        assert_eq!(response.method, Some(Method::PdfScanFail));
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let config = ExtractorConfig {
            request_timeout_secs: 1,
            ..ExtractorConfig::default()
        };
        let extractor = extractor_with(config, Arc::new(StalledOcrEngine), None);
        let response = extractor.handle_request(png_request()).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("timed out"));
    }
}
