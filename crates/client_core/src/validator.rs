use shared::domain::Resolution;
use tracing::debug;

use crate::{
    error::{StagingError, ValidationErrorKind},
    events::{ClientEvent, EventBus},
    session::{InputFile, SessionState},
};

pub const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

/// True for `image/<subtype>` media types, parameters allowed.
pub fn is_image_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => kind.eq_ignore_ascii_case("image") && !subtype.is_empty(),
        None => false,
    }
}

/// Gates what enters the session before any network call is made.
pub struct InputValidator {
    events: EventBus,
}

impl InputValidator {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    pub fn is_ready(state: &SessionState) -> bool {
        state.input.is_some() && !state.description.trim().is_empty()
    }

    pub fn accept_file(
        &self,
        state: &mut SessionState,
        file: InputFile,
    ) -> Result<(), StagingError> {
        if !is_image_media_type(&file.media_type) {
            return Err(ValidationErrorKind::UnsupportedType {
                media_type: file.media_type,
            }
            .into());
        }
        let size_bytes = file.size_bytes();
        if size_bytes > MAX_INPUT_BYTES {
            return Err(ValidationErrorKind::TooLarge {
                size_bytes,
                limit_bytes: MAX_INPUT_BYTES,
            }
            .into());
        }

        debug!(file = %file.name, size_bytes, "accepted input image");
        let file_name = file.name.clone();
        state.input = Some(file);
        self.events.emit(ClientEvent::PreviewReady {
            file_name,
            size_bytes,
        });
        self.emit_readiness(state);
        Ok(())
    }

    pub fn remove_file(&self, state: &mut SessionState) {
        state.input = None;
        self.events.emit(ClientEvent::InputCleared);
        self.emit_readiness(state);
    }

    pub fn set_description(&self, state: &mut SessionState, text: &str) {
        state.description = text.to_string();
        self.emit_readiness(state);
    }

    pub fn set_resolution(&self, state: &mut SessionState, px: u32) -> Result<(), StagingError> {
        state.resolution = Resolution::new(px)
            .map_err(|err| ValidationErrorKind::InvalidResolution(err.to_string()))?;
        Ok(())
    }

    fn emit_readiness(&self, state: &SessionState) {
        self.events
            .emit(ClientEvent::ReadinessChanged(Self::is_ready(state)));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::{history::HistoryCache, store::MemoryStore};

    async fn empty_state() -> SessionState {
        let base = Url::parse("http://127.0.0.1:8000").expect("url");
        let history = HistoryCache::load(Arc::new(MemoryStore::new()), &base)
            .await
            .expect("history");
        SessionState::new(history)
    }

    fn png(size: usize) -> InputFile {
        InputFile::new("room.png", "image/png", vec![0u8; size])
    }

    #[test]
    fn recognises_image_media_types() {
        assert!(is_image_media_type("image/png"));
        assert!(is_image_media_type("IMAGE/JPEG; q=0.9"));
        assert!(!is_image_media_type("image/"));
        assert!(!is_image_media_type("application/pdf"));
        assert!(!is_image_media_type("text/plain"));
        assert!(!is_image_media_type(""));
    }

    #[tokio::test]
    async fn rejects_non_images_without_touching_state() {
        let validator = InputValidator::new(EventBus::new());
        let mut state = empty_state().await;
        validator.accept_file(&mut state, png(16)).expect("accept png");

        for media_type in ["application/pdf", "text/plain", "video/mp4"] {
            let file = InputFile::new("doc", media_type, vec![1, 2, 3]);
            let err = validator.accept_file(&mut state, file).expect_err("reject");
            assert!(matches!(
                err,
                StagingError::Validation(ValidationErrorKind::UnsupportedType { .. })
            ));
            assert_eq!(state.input.as_ref().map(|f| f.name.as_str()), Some("room.png"));
        }
    }

    #[tokio::test]
    async fn rejects_oversized_files_regardless_of_type() {
        let validator = InputValidator::new(EventBus::new());
        let mut state = empty_state().await;
        let oversized = MAX_INPUT_BYTES as usize + 1;

        let err = validator
            .accept_file(&mut state, png(oversized))
            .expect_err("too large");
        assert!(matches!(
            err,
            StagingError::Validation(ValidationErrorKind::TooLarge { .. })
        ));
        assert!(state.input.is_none());

        validator
            .accept_file(&mut state, png(MAX_INPUT_BYTES as usize))
            .expect("exactly at the limit");
    }

    #[tokio::test]
    async fn readiness_tracks_file_and_trimmed_description() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let validator = InputValidator::new(events);
        let mut state = empty_state().await;

        validator.set_description(&mut state, "   ");
        assert!(!InputValidator::is_ready(&state));
        validator.accept_file(&mut state, png(8)).expect("accept");
        assert!(!InputValidator::is_ready(&state));
        validator.set_description(&mut state, "  Modern Scandinavian living room ");
        assert!(InputValidator::is_ready(&state));
        validator.remove_file(&mut state);
        assert!(!InputValidator::is_ready(&state));

        let mut readiness = Vec::new();
        let mut previews = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ClientEvent::ReadinessChanged(ready) => readiness.push(ready),
                ClientEvent::PreviewReady { .. } => previews += 1,
                _ => {}
            }
        }
        assert_eq!(readiness, vec![false, false, true, false]);
        assert_eq!(previews, 1);
    }

    #[tokio::test]
    async fn resolution_outside_bounds_is_rejected() {
        let validator = InputValidator::new(EventBus::new());
        let mut state = empty_state().await;
        validator.set_resolution(&mut state, 2048).expect("valid");
        assert_eq!(state.resolution.px(), 2048);

        let err = validator.set_resolution(&mut state, 100).expect_err("invalid");
        assert!(matches!(
            err,
            StagingError::Validation(ValidationErrorKind::InvalidResolution(_))
        ));
        assert_eq!(state.resolution.px(), 2048);
    }
}
