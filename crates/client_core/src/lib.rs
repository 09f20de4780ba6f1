use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use shared::domain::{RecordId, ResultRecord, Theme};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use url::Url;

pub mod backend;
pub mod error;
pub mod events;
pub mod history;
pub mod orchestrator;
pub mod preferences;
pub mod presentation;
pub mod refinement;
pub mod session;
pub mod store;
pub mod validator;

pub use backend::{HttpBackend, InferenceBackend};
pub use error::{RemoteStep, StagingError, ValidationErrorKind};
pub use events::{ClientEvent, EventBus, Severity};
pub use orchestrator::RunOutcome;
pub use presentation::{DisplaySurface, ImageSlot, NullSurface, RenderTicket, RenderedResult};
pub use session::{InputFile, SessionSnapshot};
pub use store::{DurableStore, MemoryStore, OriginStore};

use history::HistoryCache;
use orchestrator::GenerationOrchestrator;
use preferences::Preferences;
use presentation::ResultPresenter;
use refinement::RefinementEngine;
use session::SessionState;
use validator::InputValidator;

/// One user's staging session: input, the current generate/refine chain and
/// the history cache, driven against a single backend.
///
/// Every fallible operation reports its error on the event bus before
/// returning it.
pub struct StagingClient {
    backend: Arc<dyn InferenceBackend>,
    state: Mutex<SessionState>,
    validator: InputValidator,
    orchestrator: GenerationOrchestrator,
    refinement: RefinementEngine,
    presenter: ResultPresenter,
    preferences: Preferences,
    theme: Mutex<Theme>,
    events: EventBus,
}

impl StagingClient {
    pub async fn open(
        backend: Arc<dyn InferenceBackend>,
        store: Arc<dyn DurableStore>,
        surface: Arc<dyn DisplaySurface>,
    ) -> Result<Arc<Self>, StagingError> {
        let events = EventBus::new();
        let history = HistoryCache::load(store.clone(), backend.base_url()).await?;
        let preferences = Preferences::new(store);
        let theme = preferences.load_theme().await?;
        if !history.is_empty() {
            debug!(records = history.len(), "restored history");
        }
        info!(
            backend = %backend.base_url(),
            history = history.len(),
            theme = theme.as_str(),
            "staging session opened"
        );

        Ok(Arc::new(Self {
            state: Mutex::new(SessionState::new(history)),
            validator: InputValidator::new(events.clone()),
            orchestrator: GenerationOrchestrator::new(backend.clone(), events.clone()),
            refinement: RefinementEngine::new(backend.clone(), events.clone()),
            presenter: ResultPresenter::new(surface, events.clone()),
            preferences,
            theme: Mutex::new(theme),
            backend,
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn backend_url(&self) -> &Url {
        self.backend.base_url()
    }

    fn surface<T>(&self, result: Result<T, StagingError>) -> Result<T, StagingError> {
        if let Err(err) = &result {
            self.events.report(err);
        }
        result
    }

    pub async fn accept_file(&self, file: InputFile) -> Result<(), StagingError> {
        let mut guard = self.state.lock().await;
        let result = self.validator.accept_file(&mut guard, file);
        drop(guard);
        self.surface(result)
    }

    pub async fn remove_file(&self) {
        let mut guard = self.state.lock().await;
        self.validator.remove_file(&mut guard);
    }

    pub async fn set_description(&self, text: &str) {
        let mut guard = self.state.lock().await;
        self.validator.set_description(&mut guard, text);
    }

    pub async fn set_resolution(&self, px: u32) -> Result<(), StagingError> {
        let mut guard = self.state.lock().await;
        let result = self.validator.set_resolution(&mut guard, px);
        drop(guard);
        self.surface(result)
    }

    pub async fn set_feedback(&self, text: &str) {
        self.state.lock().await.feedback = text.to_string();
    }

    pub async fn is_ready(&self) -> bool {
        InputValidator::is_ready(&*self.state.lock().await)
    }

    /// Runs the generate pipeline. A no-op unless ready and idle.
    pub async fn generate(&self) -> Result<RunOutcome, StagingError> {
        let outcome = self.orchestrator.start(&self.state).await;
        self.settle_outcome(outcome, "Design generated").await
    }

    /// Refines the current result with the pending feedback text.
    pub async fn refine(&self) -> Result<RunOutcome, StagingError> {
        let outcome = self.refinement.refine(&self.state).await;
        self.settle_outcome(outcome, "Design refined").await
    }

    async fn settle_outcome(
        &self,
        outcome: Result<RunOutcome, StagingError>,
        success_message: &str,
    ) -> Result<RunOutcome, StagingError> {
        let outcome = self.surface(outcome)?;
        if let RunOutcome::Completed(record) = &outcome {
            let ticket = {
                let guard = self.state.lock().await;
                let still_current =
                    guard.current.as_ref().map(|current| current.id) == Some(record.id);
                still_current.then(|| self.presenter.begin_render())
            };
            match ticket {
                Some(ticket) => {
                    self.presenter.render(ticket, record).await;
                }
                None => debug!(record_id = %record.id, "result replaced before it was shown"),
            }
            self.events.notify(
                Severity::Success,
                format!("{success_message} (iteration {})", record.iteration),
            );
        }
        Ok(outcome)
    }

    /// Shows a history entry. Iteration and anchor are left as they are.
    pub async fn select(&self, id: RecordId) -> Result<ResultRecord, StagingError> {
        let selected = {
            let mut guard = self.state.lock().await;
            let record = guard.history.get(id).cloned();
            record.map(|record| {
                guard.current = Some(record.clone());
                (record, self.presenter.begin_render())
            })
        };
        let (record, ticket) =
            self.surface(selected.ok_or(ValidationErrorKind::UnknownRecord(id).into()))?;
        info!(record_id = %id, "selected history entry");
        self.presenter.render(ticket, &record).await;
        Ok(record)
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset_chain();
        info!("session chain reset");
        self.events.notify(Severity::Info, "Session reset");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.state.lock().await;
        SessionSnapshot {
            input_name: guard.input.as_ref().map(|file| file.name.clone()),
            description: guard.description.clone(),
            resolution: guard.resolution,
            ready: InputValidator::is_ready(&guard),
            busy: guard.busy,
            current: guard.current.clone(),
            iteration: guard.iteration,
            anchor: guard.anchor.clone(),
            history: guard.history.records().cloned().collect(),
        }
    }

    pub async fn theme(&self) -> Theme {
        *self.theme.lock().await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<(), StagingError> {
        let result = self.preferences.save_theme(theme).await;
        self.surface(result)?;
        *self.theme.lock().await = theme;
        self.events.emit(ClientEvent::ThemeChanged(theme));
        Ok(())
    }

    pub async fn check_backend(&self) -> bool {
        let healthy = self.backend.is_healthy().await;
        if !healthy {
            self.events
                .notify(Severity::Warning, "Backend is offline; ensure it is running");
        }
        healthy
    }

    pub async fn full_size_url(&self) -> Option<Url> {
        self.presenter.full_size_url().await
    }

    pub async fn export_current(&self, dir: &Path) -> Result<PathBuf, StagingError> {
        let current = self.state.lock().await.current.clone();
        let result = match current {
            Some(record) => {
                self.presenter
                    .export(self.backend.as_ref(), &record, dir)
                    .await
            }
            None => Err(ValidationErrorKind::NoCurrentResult.into()),
        };
        let path = self.surface(result)?;
        self.events
            .notify(Severity::Success, format!("Saved {}", path.display()));
        Ok(path)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
