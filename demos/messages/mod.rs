use serde::{Deserialize, Serialize};

/// Body of every `/detect` and `/results` reply, tagged by `status`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionStatus {
    Scheduled {
        id: u64,
    },
    Idle,
    Processing,
    Success {
        id: u64,
        brand: String,
        #[serde(default)]
        file_name: Option<String>,
        duration_ms: u64,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message: String,
    },
}

impl DetectionStatus {
    pub fn error(message: impl Into<String>) -> Self {
        DetectionStatus::Error {
            id: None,
            message: message.into(),
        }
    }
}
