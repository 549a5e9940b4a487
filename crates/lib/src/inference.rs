//! Inference payload parsing: decode one `inferenceInput` message into the set of
//! pipeline ids it mentions.
//!
//! Only the pipeline id is interpreted. Detection fields ride along untouched in
//! `Inference::extra` so logs can show them.

use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed inference payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("inference entry {index} has an empty pipelineId")]
    EmptyPipelineId { index: usize },
}

/// One entry of an inference payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Inference {
    #[serde(rename = "pipelineId", alias = "pipeline_id")]
    pub pipeline_id: String,
    /// Detection fields (entity, box, confidence, ...). Not interpreted here.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shapes accepted on `inferenceInput`: a bare list, or an object wrapping
/// the list under `inferences`.
#[derive(Deserialize)]
#[serde(untagged)]
enum InferencePayload {
    List(Vec<Inference>),
    Wrapped { inferences: Vec<Inference> },
}

/// Ordered entries parsed from one inbound message.
#[derive(Debug, Clone, Default)]
pub struct Inferences(Vec<Inference>);

impl Inferences {
    /// Decode raw message bytes. Fails on the first bad entry; never yields a partial list.
    pub fn from_slice(payload: &[u8]) -> Result<Self, InferenceError> {
        let text = std::str::from_utf8(payload)?;
        let parsed: InferencePayload = serde_json::from_str(text)?;
        Self::validated(parsed)
    }

    fn validated(parsed: InferencePayload) -> Result<Self, InferenceError> {
        let entries = match parsed {
            InferencePayload::List(v) => v,
            InferencePayload::Wrapped { inferences } => inferences,
        };
        if let Some(index) = entries.iter().position(|e| e.pipeline_id.trim().is_empty()) {
            return Err(InferenceError::EmptyPipelineId { index });
        }
        Ok(Self(entries))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unique pipeline ids in this payload. Deduplication is per message.
    pub fn pipeline_ids(&self) -> BTreeSet<String> {
        self.0.iter().map(|e| e.pipeline_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_list_dedupes_pipeline_ids() {
        let payload = br#"[
            {"pipelineId": "p1", "entity": {"tag": "person"}},
            {"pipelineId": "p2"},
            {"pipelineId": "p1", "confidence": 0.4}
        ]"#;
        let inferences = Inferences::from_slice(payload).unwrap();
        assert_eq!(inferences.len(), 3);
        let ids: Vec<_> = inferences.pipeline_ids().into_iter().collect();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn wrapped_object_form_is_accepted() {
        let payload = br#"{"inferences": [{"pipeline_id": "cam-a"}], "timestamp": 12}"#;
        let inferences = Inferences::from_slice(payload).unwrap();
        assert_eq!(inferences.pipeline_ids().len(), 1);
        assert!(inferences.pipeline_ids().contains("cam-a"));
    }

    #[test]
    fn empty_list_yields_no_ids() {
        let inferences = Inferences::from_slice(b"[]").unwrap();
        assert!(inferences.is_empty());
        assert!(inferences.pipeline_ids().is_empty());
    }

    #[test]
    fn missing_pipeline_id_fails_whole_message() {
        let payload = br#"[{"pipelineId": "p1"}, {"entity": {}}]"#;
        assert!(matches!(
            Inferences::from_slice(payload),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[test]
    fn empty_pipeline_id_is_rejected() {
        let payload = br#"[{"pipelineId": "p1"}, {"pipelineId": "  "}]"#;
        assert!(matches!(
            Inferences::from_slice(payload),
            Err(InferenceError::EmptyPipelineId { index: 1 })
        ));
    }

    #[test]
    fn non_json_and_wrong_shape_fail() {
        assert!(Inferences::from_slice(b"not json").is_err());
        assert!(Inferences::from_slice(br#"{"pipelineId": "p1"}"#).is_err());
        assert!(Inferences::from_slice(&[0xff, 0xfe]).is_err());
    }
}
