//! Scoring parsed records.

use schemars::JsonSchema;

use super::ExtractedRecord;
use crate::prelude::*;

/// How much each populated field contributes to a record's score.
///
/// The defaults were tuned by hand. The tax ID and name dominate, because
/// they're the fields callers care most about and the least likely to be
/// found by accident.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreWeights {
    pub tax_id: u32,
    pub likely_name: u32,
    pub document_type: u32,
    pub registry_id: u32,
    pub birth_date: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tax_id: 3,
            likely_name: 2,
            document_type: 2,
            registry_id: 1,
            birth_date: 1,
        }
    }
}

/// Score a record based on which fields are populated.
pub fn score_record(record: &ExtractedRecord, weights: &ScoreWeights) -> u32 {
    let mut score = 0;
    if record.tax_id.is_some() {
        score += weights.tax_id;
    }
    if record.likely_name.is_some() {
        score += weights.likely_name;
    }
    if record.document_type.is_known() {
        score += weights.document_type;
    }
    if record.registry_id.is_some() {
        score += weights.registry_id;
    }
    if record.birth_date.is_some() {
        score += weights.birth_date;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;

    #[test]
    fn empty_record_scores_zero() {
        assert_eq!(
            score_record(&ExtractedRecord::default(), &ScoreWeights::default()),
            0
        );
    }

    #[test]
    fn full_record_scores_sum_of_weights() {
        let record = ExtractedRecord {
            tax_id: Some("123.456.789-09".to_owned()),
            birth_date: Some("19/09/1981".to_owned()),
            registry_id: Some("1234567".to_owned()),
            likely_name: Some("MARIA DA SILVA".to_owned()),
            document_type: DocumentType::Rg,
        };
        assert_eq!(score_record(&record, &ScoreWeights::default()), 9);
    }

    #[test]
    fn custom_weights_are_respected() {
        let record = ExtractedRecord {
            registry_id: Some("1234567".to_owned()),
            ..ExtractedRecord::default()
        };
        let weights = ScoreWeights {
            registry_id: 10,
            ..ScoreWeights::default()
        };
        assert_eq!(score_record(&record, &weights), 10);
    }
}
