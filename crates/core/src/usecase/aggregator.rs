use std::collections::BTreeMap;

use crate::domain::error::PipelineError;

/// セグメント間の区切り
pub const SEGMENT_SEPARATOR: &str = "\n";

/// セグメント結果を index 順に組み立てる。到着順 (完了順) には依存しない。
///
/// `0..expected` のすべてが揃っていることが前提。空文字の結果も1セグメントとして残す。
pub fn assemble(outcomes: &BTreeMap<usize, String>, expected: usize) -> Result<String, PipelineError> {
    if expected == 0 {
        return Err(PipelineError::internal("no segments to assemble"));
    }
    if let Some(missing) = (0..expected).find(|i| !outcomes.contains_key(i)) {
        return Err(PipelineError::internal(format!(
            "missing transcript for segment {missing} of {expected}"
        )));
    }
    if let Some((&extra, _)) = outcomes.range(expected..).next() {
        return Err(PipelineError::internal(format!(
            "unexpected segment index {extra} (expected {expected} segments)"
        )));
    }

    let parts: Vec<&str> = outcomes.values().map(String::as_str).collect();
    Ok(parts.join(SEGMENT_SEPARATOR))
}

/// 完了順に届く結果を受け取り、最後に `assemble` する。
#[derive(Debug)]
pub struct TranscriptAssembler {
    expected: usize,
    parts: BTreeMap<usize, String>,
}

impl TranscriptAssembler {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            parts: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, index: usize, text: String) -> Result<(), PipelineError> {
        if index >= self.expected {
            return Err(PipelineError::internal(format!(
                "segment index {index} out of range (expected {} segments)",
                self.expected
            )));
        }
        if self.parts.contains_key(&index) {
            return Err(PipelineError::internal(format!(
                "duplicate transcript for segment {index}"
            )));
        }
        self.parts.insert(index, text);
        Ok(())
    }

    pub fn received(&self) -> usize {
        self.parts.len()
    }

    pub fn is_complete(&self) -> bool {
        self.parts.len() == self.expected
    }

    pub fn assemble(self) -> Result<String, PipelineError> {
        assemble(&self.parts, self.expected)
    }
}
