use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{RecordId, ResultRecord};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    backend::InferenceBackend,
    error::StagingError,
    events::{ClientEvent, EventBus, Severity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Original,
    Staged,
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Staged => f.write_str("staged"),
        }
    }
}

/// Where rendered images end up.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Drops whatever the slot shows.
    fn clear(&self, slot: ImageSlot);
    /// Points the slot at `url`; resolves once it loaded or failed.
    async fn load(&self, slot: ImageSlot, url: &Url) -> anyhow::Result<()>;
}

/// Surface for headless sessions; every load succeeds.
pub struct NullSurface;

#[async_trait]
impl DisplaySurface for NullSurface {
    fn clear(&self, _slot: ImageSlot) {}

    async fn load(&self, _slot: ImageSlot, _url: &Url) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResult {
    pub record_id: RecordId,
    pub original_url: Url,
    pub staged_url: Url,
}

/// Orders renders. Only the most recently issued ticket may update what is
/// shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket(u64);

pub struct ResultPresenter {
    surface: Arc<dyn DisplaySurface>,
    events: EventBus,
    last_token: AtomicU64,
    latest_render: AtomicU64,
    shown: Mutex<Option<RenderedResult>>,
}

impl ResultPresenter {
    pub fn new(surface: Arc<dyn DisplaySurface>, events: EventBus) -> Self {
        Self {
            surface,
            events,
            last_token: AtomicU64::new(0),
            latest_render: AtomicU64::new(0),
            shown: Mutex::new(None),
        }
    }

    /// Strictly increasing, and never below the wall clock in milliseconds.
    fn next_cache_token(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let previous = self
            .last_token
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Issues the ticket for the next render. Take it while the record being
    /// shown is still the session's current one.
    pub fn begin_render(&self) -> RenderTicket {
        RenderTicket(self.latest_render.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn is_latest(&self, ticket: RenderTicket) -> bool {
        self.latest_render.load(Ordering::SeqCst) == ticket.0
    }

    /// Shows `record` with freshly cache-busted URLs. Load failures are
    /// reported but never revert the session.
    ///
    /// Returns `None` once a newer render has started; nothing is recorded
    /// as shown in that case.
    pub async fn render(
        &self,
        ticket: RenderTicket,
        record: &ResultRecord,
    ) -> Option<RenderedResult> {
        let token = self.next_cache_token();
        let rendered = RenderedResult {
            record_id: record.id,
            original_url: record.original.cache_busted(token),
            staged_url: record.staged.cache_busted(token),
        };

        for (slot, url) in [
            (ImageSlot::Original, &rendered.original_url),
            (ImageSlot::Staged, &rendered.staged_url),
        ] {
            if !self.is_latest(ticket) {
                debug!(record_id = %record.id, %slot, "render superseded before load");
                return None;
            }
            self.surface.clear(slot);
            match self.surface.load(slot, url).await {
                Ok(()) => debug!(%slot, %url, "image loaded"),
                Err(err) => {
                    warn!(%slot, %url, error = %err, "image failed to load");
                    self.events.notify(
                        Severity::Warning,
                        format!("could not display the {slot} image: {err:#}"),
                    );
                }
            }
        }

        let mut shown = self.shown.lock().await;
        if !self.is_latest(ticket) {
            debug!(record_id = %record.id, "discarding superseded render");
            return None;
        }
        *shown = Some(rendered.clone());
        self.events.emit(ClientEvent::Rendered {
            record_id: rendered.record_id,
            staged_url: rendered.staged_url.clone(),
        });
        Some(rendered)
    }

    /// The same cache-busted reference the staged slot was last loaded from.
    pub async fn full_size_url(&self) -> Option<Url> {
        self.shown
            .lock()
            .await
            .as_ref()
            .map(|shown| shown.staged_url.clone())
    }

    pub fn export_file_name(record: &ResultRecord, at: DateTime<Utc>) -> String {
        format!(
            "staged_design_{}_{}.png",
            record.id,
            at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Downloads the staged image into `dir` under a synthetic file name.
    pub async fn export(
        &self,
        backend: &dyn InferenceBackend,
        record: &ResultRecord,
        dir: &Path,
    ) -> Result<PathBuf, StagingError> {
        let bytes = backend.fetch_asset(record.staged.url()).await?;
        let target = dir.join(Self::export_file_name(record, Utc::now()));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| StagingError::storage(anyhow::Error::new(err)))?;
        tokio::fs::write(&target, &bytes).await.map_err(|err| {
            StagingError::storage(
                anyhow::Error::new(err).context(format!("failed to write {}", target.display())),
            )
        })?;
        info!(record_id = %record.id, path = %target.display(), bytes = bytes.len(), "exported design");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use anyhow::anyhow;
    use chrono::TimeZone;
    use shared::domain::AssetRef;

    use super::*;

    #[derive(Default)]
    struct RecordingSurface {
        ops: StdMutex<Vec<String>>,
        fail_staged: bool,
    }

    #[async_trait]
    impl DisplaySurface for RecordingSurface {
        fn clear(&self, slot: ImageSlot) {
            self.ops.lock().expect("ops").push(format!("clear {slot}"));
        }

        async fn load(&self, slot: ImageSlot, url: &Url) -> anyhow::Result<()> {
            self.ops.lock().expect("ops").push(format!("load {slot} {url}"));
            if self.fail_staged && slot == ImageSlot::Staged {
                return Err(anyhow!("404 not found"));
            }
            Ok(())
        }
    }

    fn record() -> ResultRecord {
        let base = Url::parse("http://127.0.0.1:8000").expect("url");
        ResultRecord {
            id: RecordId(3),
            original: AssetRef::from_backend_path("/data/inputs/x.png", &base).expect("asset"),
            staged: AssetRef::from_backend_path("/data/outputs/y.png", &base).expect("asset"),
            reasoning: String::new(),
            prompt: String::new(),
            description: "room".into(),
            iteration: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn clears_slot_before_loading_cache_busted_url() {
        let surface = Arc::new(RecordingSurface::default());
        let presenter = ResultPresenter::new(surface.clone(), EventBus::new());

        let rendered = presenter
            .render(presenter.begin_render(), &record())
            .await
            .expect("rendered");

        let ops = surface.ops.lock().expect("ops").clone();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0], "clear original");
        assert!(ops[1].starts_with("load original http://127.0.0.1:8000/data/inputs/x.png?v="));
        assert_eq!(ops[2], "clear staged");
        assert_eq!(ops[3], format!("load staged {}", rendered.staged_url));
        assert_eq!(presenter.full_size_url().await, Some(rendered.staged_url));
    }

    #[tokio::test]
    async fn rerendering_the_same_record_changes_the_url() {
        let presenter = ResultPresenter::new(Arc::new(NullSurface), EventBus::new());
        let first = presenter
            .render(presenter.begin_render(), &record())
            .await
            .expect("first");
        let second = presenter
            .render(presenter.begin_render(), &record())
            .await
            .expect("second");
        assert_ne!(first.staged_url, second.staged_url);
        assert_eq!(first.staged_url.path(), second.staged_url.path());
    }

    #[tokio::test]
    async fn load_failure_is_reported_but_not_fatal() {
        let surface = Arc::new(RecordingSurface {
            fail_staged: true,
            ..Default::default()
        });
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let presenter = ResultPresenter::new(surface, events);

        let rendered = presenter
            .render(presenter.begin_render(), &record())
            .await
            .expect("rendered");
        assert_eq!(rendered.record_id, RecordId(3));

        let mut warnings = Vec::new();
        let mut announcements = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ClientEvent::Notice {
                    severity: Severity::Warning,
                    message,
                } => warnings.push(message),
                ClientEvent::Announcement(_) => announcements += 1,
                _ => {}
            }
        }
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("staged image"));
        assert_eq!(announcements, 1);
    }

    #[tokio::test]
    async fn render_with_an_older_ticket_leaves_the_newer_result_shown() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let presenter = ResultPresenter::new(Arc::new(NullSurface), events);
        let stale = presenter.begin_render();
        let fresh = presenter.begin_render();

        let mut newer = record();
        newer.id = RecordId(4);
        newer.staged = AssetRef::from_backend_path(
            "/data/outputs/z.png",
            &Url::parse("http://127.0.0.1:8000").expect("url"),
        )
        .expect("asset");
        let shown = presenter.render(fresh, &newer).await.expect("fresh");
        assert!(presenter.render(stale, &record()).await.is_none());

        assert_eq!(presenter.full_size_url().await, Some(shown.staged_url));
        let rendered: Vec<RecordId> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                ClientEvent::Rendered { record_id, .. } => Some(record_id),
                _ => None,
            })
            .collect();
        assert_eq!(rendered, vec![RecordId(4)]);
    }

    #[test]
    fn export_name_is_synthetic() {
        let at = Utc
            .with_ymd_and_hms(2026, 10, 14, 9, 5, 7)
            .single()
            .expect("timestamp");
        assert_eq!(
            ResultPresenter::export_file_name(&record(), at),
            "staged_design_3_20261014_090507.png"
        );
    }
}
