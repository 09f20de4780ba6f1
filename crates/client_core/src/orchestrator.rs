//! The upload → enhance → generate pipeline as an explicit state machine.
//!
//! Each active phase is advanced by exactly one remote call. After every call
//! the invocation token is checked against the session; a superseded
//! invocation stops without touching state.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{Anchor, AssetRef, Resolution, ResultRecord},
    protocol::{EnhancePromptRequest, GenerateImageRequest},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    backend::{EnhancedPrompt, InferenceBackend},
    error::StagingError,
    events::{ClientEvent, EventBus},
    session::{InputFile, InvocationToken, SessionState},
    validator::InputValidator,
};

pub const PIPELINE_STEPS: u8 = 3;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub file: InputFile,
    pub description: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
pub struct GeneratedDesign {
    pub request: GenerationRequest,
    pub upload: AssetRef,
    pub enhanced: EnhancedPrompt,
    pub staged: AssetRef,
}

#[derive(Debug)]
pub enum GenerationPhase {
    Idle,
    UploadingInput {
        request: GenerationRequest,
    },
    EnhancingPrompt {
        request: GenerationRequest,
        upload: AssetRef,
    },
    GeneratingImage {
        request: GenerationRequest,
        upload: AssetRef,
        enhanced: EnhancedPrompt,
    },
    Succeeded(GeneratedDesign),
    Failed(StagingError),
}

impl GenerationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::UploadingInput { .. } => "uploading_input",
            Self::EnhancingPrompt { .. } => "enhancing_prompt",
            Self::GeneratingImage { .. } => "generating_image",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// How a generation or refinement invocation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Preconditions were not met; nothing was sent.
    Skipped,
    Completed(ResultRecord),
    /// A newer invocation started while this one was in flight.
    Superseded,
}

pub struct GenerationOrchestrator {
    backend: Arc<dyn InferenceBackend>,
    events: EventBus,
}

impl GenerationOrchestrator {
    pub fn new(backend: Arc<dyn InferenceBackend>, events: EventBus) -> Self {
        Self { backend, events }
    }

    pub async fn start(&self, state: &Mutex<SessionState>) -> Result<RunOutcome, StagingError> {
        let (token, request) = {
            let mut guard = state.lock().await;
            if guard.busy || !InputValidator::is_ready(&guard) {
                debug!(busy = guard.busy, "generation not started");
                return Ok(RunOutcome::Skipped);
            }
            let Some(file) = guard.input.clone() else {
                return Ok(RunOutcome::Skipped);
            };
            let request = GenerationRequest {
                file,
                description: guard.description.trim().to_string(),
                resolution: guard.resolution,
            };
            (guard.begin_invocation(), request)
        };
        self.events.emit(ClientEvent::BusyChanged(true));
        info!(
            file = %request.file.name,
            resolution = request.resolution.px(),
            "starting generation pipeline"
        );

        let mut phase = GenerationPhase::UploadingInput { request };
        loop {
            phase = match phase {
                GenerationPhase::Succeeded(design) => {
                    return self.commit(state, token, design).await;
                }
                GenerationPhase::Failed(err) => {
                    return self.abort(state, token, err).await;
                }
                GenerationPhase::Idle => {
                    state.lock().await.settle(token);
                    return Ok(RunOutcome::Skipped);
                }
                active => {
                    let from = active.name();
                    let next = self.advance(active).await;
                    debug!(from, to = next.name(), "generation transition");
                    if !state.lock().await.is_latest(token) {
                        info!(phase = next.name(), "discarding superseded generation");
                        return Ok(RunOutcome::Superseded);
                    }
                    next
                }
            };
        }
    }

    /// Issues the single remote call that moves `phase` forward.
    async fn advance(&self, phase: GenerationPhase) -> GenerationPhase {
        match phase {
            GenerationPhase::UploadingInput { request } => {
                self.progress(1, "Uploading input");
                match self.backend.upload_input(&request.file).await {
                    Ok(upload) => GenerationPhase::EnhancingPrompt { request, upload },
                    Err(err) => GenerationPhase::Failed(err),
                }
            }
            GenerationPhase::EnhancingPrompt { request, upload } => {
                self.progress(2, "Enhancing prompt");
                let body = EnhancePromptRequest {
                    room_description: request.description.clone(),
                    image_path: upload.path().to_string(),
                };
                match self.backend.enhance_prompt(&body).await {
                    Ok(enhanced) => GenerationPhase::GeneratingImage {
                        request,
                        upload,
                        enhanced,
                    },
                    Err(err) => GenerationPhase::Failed(err),
                }
            }
            GenerationPhase::GeneratingImage {
                request,
                upload,
                enhanced,
            } => {
                self.progress(3, "Generating image");
                let body = GenerateImageRequest {
                    enhanced_prompt: enhanced.sd_prompt.clone(),
                    room_description: request.description.clone(),
                    image_path: upload.path().to_string(),
                    target_resolution: request.resolution.px(),
                    task_type: enhanced.task_type.clone(),
                };
                match self.backend.generate_image(&body).await {
                    Ok(staged) => GenerationPhase::Succeeded(GeneratedDesign {
                        request,
                        upload,
                        enhanced,
                        staged,
                    }),
                    Err(err) => GenerationPhase::Failed(err),
                }
            }
            terminal => terminal,
        }
    }

    fn progress(&self, step: u8, label: &'static str) {
        debug!(step, label, "pipeline step");
        self.events.emit(ClientEvent::StepProgress {
            step,
            total: PIPELINE_STEPS,
            label,
        });
    }

    async fn commit(
        &self,
        state: &Mutex<SessionState>,
        token: InvocationToken,
        design: GeneratedDesign,
    ) -> Result<RunOutcome, StagingError> {
        let mut guard = state.lock().await;
        if !guard.is_latest(token) {
            return Ok(RunOutcome::Superseded);
        }

        let GeneratedDesign {
            request,
            upload,
            enhanced,
            staged,
        } = design;
        let record = ResultRecord {
            id: guard.allocate_record_id(),
            original: upload.clone(),
            staged,
            reasoning: enhanced.reasoning,
            prompt: enhanced.sd_prompt,
            description: request.description.clone(),
            iteration: 1,
            created_at: Utc::now(),
        };
        guard.anchor = Some(Anchor {
            original: upload,
            description: request.description,
        });
        guard.iteration = 1;
        guard.current = Some(record.clone());
        let history_write = guard.history.push(record.clone());
        let history_len = guard.history.len();
        guard.settle(token);
        drop(guard);

        if let Err(err) = history_write.commit().await {
            self.events.report_degraded(&err);
        }

        info!(record_id = %record.id, staged = record.staged.path(), "generation succeeded");
        self.events.emit(ClientEvent::BusyChanged(false));
        self.events.emit(ClientEvent::HistoryChanged { len: history_len });
        self.events.emit(ClientEvent::ResultReady(record.clone()));
        Ok(RunOutcome::Completed(record))
    }

    /// Returns to idle. An input that was already uploaded stays uploaded.
    async fn abort(
        &self,
        state: &Mutex<SessionState>,
        token: InvocationToken,
        err: StagingError,
    ) -> Result<RunOutcome, StagingError> {
        if !state.lock().await.settle(token) {
            debug!(error = %err, "dropping failure of superseded generation");
            return Ok(RunOutcome::Superseded);
        }
        debug!(step = ?err.step(), "generation pipeline returned to idle");
        self.events.emit(ClientEvent::BusyChanged(false));
        Err(err)
    }
}
