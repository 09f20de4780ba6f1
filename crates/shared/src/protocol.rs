//! JSON bodies exchanged with the staging backend.

use serde::{Deserialize, Serialize};

use crate::domain::TaskType;

/// Common shape of a backend reply that can signal logical failure.
pub trait BackendOutcome {
    fn succeeded(&self) -> bool;
    fn error_message(&self) -> Option<&str>;
}

macro_rules! impl_backend_outcome {
    ($name:ident) => {
        impl BackendOutcome for $name {
            fn succeeded(&self) -> bool {
                self.success
            }

            fn error_message(&self) -> Option<&str> {
                self.error.as_deref().filter(|message| !message.trim().is_empty())
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancePromptRequest {
    pub room_description: String,
    pub image_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancePromptResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub sd_prompt: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl_backend_outcome!(EnhancePromptResponse);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateImageRequest {
    pub enhanced_prompt: String,
    pub room_description: String,
    pub image_path: String,
    pub target_resolution: u32,
    pub task_type: TaskType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl_backend_outcome!(GenerateImageResponse);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineDesignRequest {
    pub user_feedback: String,
    pub previous_reasoning: String,
    pub previous_sd_prompt: String,
    pub previous_result_path: String,
    pub original_image_path: String,
    pub target_resolution: u32,
    pub iteration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineDesignResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub sd_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl_backend_outcome!(RefineDesignResponse);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
