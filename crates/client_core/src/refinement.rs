use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{Anchor, ResultRecord},
    protocol::RefineDesignRequest,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    backend::InferenceBackend,
    error::{StagingError, ValidationErrorKind},
    events::{ClientEvent, EventBus},
    orchestrator::RunOutcome,
    session::SessionState,
};

/// Follow-up edits of the current result, one remote call per invocation.
pub struct RefinementEngine {
    backend: Arc<dyn InferenceBackend>,
    events: EventBus,
}

impl RefinementEngine {
    pub fn new(backend: Arc<dyn InferenceBackend>, events: EventBus) -> Self {
        Self { backend, events }
    }

    /// Refines the current result with the session's pending feedback.
    ///
    /// The busy flag is not consulted. When several refinements overlap, the
    /// one started last is the only one applied.
    pub async fn refine(&self, state: &Mutex<SessionState>) -> Result<RunOutcome, StagingError> {
        let (token, feedback, anchor, request) = {
            let mut guard = state.lock().await;
            let Some(current) = guard.current.clone() else {
                return Err(ValidationErrorKind::NoCurrentResult.into());
            };
            let feedback = guard.feedback.trim().to_string();
            if feedback.is_empty() {
                return Err(ValidationErrorKind::EmptyFeedback.into());
            }
            let (anchor, prior_iteration) = chain_context(&guard, &current);
            let target_iteration = prior_iteration + 1;
            let request = RefineDesignRequest {
                user_feedback: feedback.clone(),
                previous_reasoning: current.reasoning.clone(),
                previous_sd_prompt: current.prompt.clone(),
                previous_result_path: current.staged.path().to_string(),
                original_image_path: anchor.original.path().to_string(),
                target_resolution: guard.resolution.px(),
                iteration: target_iteration,
            };
            (guard.begin_invocation(), feedback, anchor, request)
        };
        self.events.emit(ClientEvent::BusyChanged(true));
        self.events.emit(ClientEvent::StepProgress {
            step: 1,
            total: 1,
            label: "Refining design",
        });
        info!(iteration = request.iteration, "requesting refinement");

        let result = self.backend.refine_design(&request).await;

        let mut guard = state.lock().await;
        if !guard.is_latest(token) {
            info!(iteration = request.iteration, "discarding superseded refinement");
            return Ok(RunOutcome::Superseded);
        }
        let refined = match result {
            Ok(refined) => refined,
            Err(err) => {
                guard.settle(token);
                drop(guard);
                debug!(step = ?err.step(), "refinement left session unchanged");
                self.events.emit(ClientEvent::BusyChanged(false));
                return Err(err);
            }
        };

        let record = ResultRecord {
            id: guard.allocate_record_id(),
            original: anchor.original.clone(),
            staged: refined.staged,
            reasoning: refined.reasoning,
            prompt: refined.sd_prompt,
            description: anchor.refined_description(&feedback),
            iteration: request.iteration,
            created_at: Utc::now(),
        };
        if guard.anchor.is_none() {
            guard.anchor = Some(anchor);
        }
        guard.iteration = request.iteration;
        guard.current = Some(record.clone());
        guard.feedback.clear();
        let history_write = guard.history.push(record.clone());
        let history_len = guard.history.len();
        guard.settle(token);
        drop(guard);

        if let Err(err) = history_write.commit().await {
            self.events.report_degraded(&err);
        }

        info!(record_id = %record.id, iteration = record.iteration, "refinement succeeded");
        self.events.emit(ClientEvent::FeedbackCleared);
        self.events.emit(ClientEvent::BusyChanged(false));
        self.events.emit(ClientEvent::HistoryChanged { len: history_len });
        self.events.emit(ClientEvent::ResultReady(record.clone()));
        Ok(RunOutcome::Completed(record))
    }
}

/// Anchor and prior iteration for the next refinement.
///
/// The session anchor stays pinned to the last generated chain, even after a
/// history entry is selected. Without one (history browsed after a restart),
/// the current record seeds a new chain from its own original and iteration.
fn chain_context(state: &SessionState, current: &ResultRecord) -> (Anchor, u32) {
    match &state.anchor {
        Some(anchor) => (anchor.clone(), state.iteration),
        None => (
            Anchor {
                original: current.original.clone(),
                description: current.description.clone(),
            },
            current.iteration,
        ),
    }
}
