//! Normalizing raw OCR text.

/// Raw OCR text, split up the way our field parsers want it.
#[derive(Clone, Debug, Default)]
pub struct NormalizedText {
    /// Trimmed lines longer than two characters. Shorter lines are almost
    /// always OCR debris.
    pub lines: Vec<String>,

    /// The whole text, upper-cased, with carriage returns removed. Used for
    /// keyword scans and unanchored fallbacks.
    pub upper: String,
}

impl NormalizedText {
    /// Normalize raw OCR output.
    pub fn new(raw: &str) -> Self {
        let lines = raw
            .split('\n')
            .map(str::trim)
            .filter(|line| line.chars().count() > 2)
            .map(str::to_owned)
            .collect();
        let upper = raw.replace('\r', "").to_uppercase();
        Self { lines, upper }
    }

    /// Get the upper-cased line at `idx`, if any.
    pub fn upper_line(&self, idx: usize) -> Option<String> {
        self.lines.get(idx).map(|line| line.to_uppercase())
    }

    /// Iterate over `(index, upper-cased line)` pairs.
    pub fn upper_lines(&self) -> impl Iterator<Item = (usize, String)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx, line.to_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_and_blank_lines() {
        let text = NormalizedText::new("CPF 123\r\n\n  ab \nNOME\n  Maria da Silva  \n");
        assert_eq!(text.lines, vec!["CPF 123", "NOME", "Maria da Silva"]);
        assert!(text.upper.contains("MARIA DA SILVA"));
        assert!(!text.upper.contains('\r'));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let text = NormalizedText::new("");
        assert!(text.lines.is_empty());
        assert!(text.upper.is_empty());
    }
}
