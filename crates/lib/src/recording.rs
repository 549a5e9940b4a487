//! Recording commands sent on `recordingOutput`.
//!
//! Wire shape: `{"startRecording": [{"configId": "<pipeline id>", "state": <bool>}]}`.

use serde::{Deserialize, Serialize};

/// Output endpoint carrying recording commands.
pub const RECORDING_OUTPUT: &str = "recordingOutput";

/// Top-level key of the recording command body (also the twin trigger field).
pub const START_RECORDING_FIELD: &str = "startRecording";

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("pipeline id must not be empty")]
    EmptyPipelineId,
    #[error("encoding recording command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Desired recording state, as named by operators ("start_recording" / "stop_recording").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAction {
    Start,
    Stop,
}

impl RecordingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingAction::Start => "start_recording",
            RecordingAction::Stop => "stop_recording",
        }
    }
}

/// A single start/stop instruction for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingCommand {
    #[serde(rename = "configId")]
    pub pipeline_id: String,
    #[serde(rename = "state")]
    pub start_recording: bool,
}

impl RecordingCommand {
    pub fn new(
        pipeline_id: impl Into<String>,
        start_recording: bool,
    ) -> Result<Self, RecordingError> {
        let pipeline_id = pipeline_id.into();
        if pipeline_id.is_empty() {
            return Err(RecordingError::EmptyPipelineId);
        }
        Ok(Self {
            pipeline_id,
            start_recording,
        })
    }

    pub fn from_action(
        pipeline_id: impl Into<String>,
        action: RecordingAction,
    ) -> Result<Self, RecordingError> {
        Self::new(pipeline_id, action == RecordingAction::Start)
    }

    /// Encoded body for this command alone.
    pub fn encode(&self) -> Result<Vec<u8>, RecordingError> {
        encode_commands(std::slice::from_ref(self))
    }
}

#[derive(Serialize)]
struct RecordingOutputBody<T> {
    #[serde(rename = "startRecording")]
    start_recording: T,
}

/// Encode commands as one `recordingOutput` body, one array entry per command.
pub fn encode_commands(commands: &[RecordingCommand]) -> Result<Vec<u8>, RecordingError> {
    Ok(serde_json::to_vec(&RecordingOutputBody {
        start_recording: commands,
    })?)
}

/// Wrap an operator-supplied command list verbatim (twin trigger path).
pub fn encode_passthrough(commands: &serde_json::Value) -> Result<Vec<u8>, RecordingError> {
    Ok(serde_json::to_vec(&RecordingOutputBody {
        start_recording: commands,
    })?)
}
