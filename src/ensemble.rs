//! Run OCR over several image variants and keep the best reading.
//!
//! Strategies are tried strictly in order, because whether we try the next one
//! depends on how the last one went. A reading with both a tax ID and a name
//! ends the search immediately.

use std::time::Duration;

use crate::{
    document::{ExtractedRecord, ScoreWeights, parse_document_text, score_record},
    ocr::OcrEngine,
    prelude::*,
    variants::{ImageVariants, VariantTag},
};

/// The result of OCRing and parsing one variant.
#[derive(Clone, Debug)]
pub struct CandidateResult {
    /// Which variant we read.
    pub tag: VariantTag,

    /// What we parsed out of it.
    pub record: ExtractedRecord,

    /// The OCR text. Empty if OCR failed.
    pub raw_text: String,

    /// See [`score_record`].
    pub score: u32,
}

/// How much do we trust the winning candidate?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    /// The candidate had both a tax ID and a name.
    Gold,

    /// No candidate was gold, so this is just the highest scorer.
    BestEffort,
}

/// The winning candidate.
#[derive(Clone, Debug)]
pub struct EnsembleOutcome {
    pub confidence: Confidence,
    pub candidate: CandidateResult,
}

/// Our strategy list and scoring policy.
#[derive(Clone, Debug)]
pub struct Ensemble {
    strategies: Vec<VariantTag>,
    weights: ScoreWeights,
    ocr_timeout: Duration,
}

impl Ensemble {
    /// Create an ensemble which tries `strategies` in order.
    pub fn new(strategies: Vec<VariantTag>, weights: ScoreWeights, ocr_timeout: Duration) -> Self {
        Self {
            strategies,
            weights,
            ocr_timeout,
        }
    }

    /// Try each strategy in turn.
    ///
    /// OCR failures and timeouts don't stop the loop. The variant just gets
    /// an empty reading. We only fail if no strategy could be attempted at
    /// all.
    #[instrument(level = "debug", skip_all)]
    pub async fn run(
        &self,
        ocr: &dyn OcrEngine,
        variants: &ImageVariants,
    ) -> Result<EnsembleOutcome> {
        let mut best: Option<CandidateResult> = None;
        for &tag in &self.strategies {
            let Some(image) = variants.get(tag) else {
                warn!(strategy = %tag, "Image variant was not generated, skipping");
                continue;
            };

            let raw_text =
                match tokio::time::timeout(self.ocr_timeout, ocr.recognize(tag, image)).await
                {
                    Ok(Ok(text)) => text,
                    Ok(Err(err)) => {
                        warn!(strategy = %tag, "OCR failed: {:#}", err);
                        String::new()
                    }
                    Err(_) => {
                        warn!(strategy = %tag, timeout = ?self.ocr_timeout, "OCR timed out");
                        String::new()
                    }
                };

            let record = parse_document_text(&raw_text);
            let score = score_record(&record, &self.weights);
            info!(strategy = %tag, score, text_len = raw_text.len(), "OCR strategy attempted");
            let candidate = CandidateResult {
                tag,
                record,
                raw_text,
                score,
            };

            if candidate.record.is_gold() {
                return Ok(EnsembleOutcome {
                    confidence: Confidence::Gold,
                    candidate,
                });
            }
            // Strictly greater, so that ties go to the earlier strategy.
            if best.as_ref().is_none_or(|best| candidate.score > best.score) {
                best = Some(candidate);
            }
        }

        let candidate = best.ok_or_else(|| anyhow!("no OCR strategy could be attempted"))?;
        Ok(EnsembleOutcome {
            confidence: Confidence::BestEffort,
            candidate,
        })
    }
}
