/// Accumulates recognizer output for the utterance being captured.
///
/// Interim results are full-so-far hypotheses, so each one replaces the
/// previous instead of being appended to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    hypothesis: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current hypothesis with an interim result
    pub fn interim(&mut self, text: &str) {
        self.hypothesis.clear();
        self.hypothesis.push_str(text);
    }

    /// Close the utterance with the recognizer's final text.
    ///
    /// Returns the normalized utterance, or `None` if nothing was said. An
    /// empty final falls back to the last interim hypothesis. The buffer is
    /// cleared either way.
    pub fn finalize(&mut self, text: &str) -> Option<String> {
        let mut utterance = normalize(text);
        if utterance.is_empty() {
            utterance = normalize(&self.hypothesis);
        }
        self.hypothesis.clear();

        (!utterance.is_empty()).then_some(utterance)
    }

    pub fn clear(&mut self) {
        self.hypothesis.clear();
    }

    pub fn pending(&self) -> &str {
        &self.hypothesis
    }

    pub fn is_empty(&self) -> bool {
        self.hypothesis.trim().is_empty()
    }
}

/// Trim and collapse runs of whitespace into single spaces
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
