use shared::domain::{Anchor, RecordId, Resolution, ResultRecord};

use crate::history::HistoryCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Identifies one generation or refinement invocation. Only the most
/// recently issued token may apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvocationToken(u64);

pub struct SessionState {
    pub input: Option<InputFile>,
    pub description: String,
    pub feedback: String,
    pub resolution: Resolution,
    pub busy: bool,
    pub history: HistoryCache,
    pub current: Option<ResultRecord>,
    /// Zero until a chain produces its first result.
    pub iteration: u32,
    pub anchor: Option<Anchor>,
    next_record_id: RecordId,
    latest_token: u64,
}

impl SessionState {
    pub fn new(history: HistoryCache) -> Self {
        let next_record_id = history.max_id().map_or(RecordId(1), RecordId::next);
        Self {
            input: None,
            description: String::new(),
            feedback: String::new(),
            resolution: Resolution::default(),
            busy: false,
            history,
            current: None,
            iteration: 0,
            anchor: None,
            next_record_id,
            latest_token: 0,
        }
    }

    pub fn begin_invocation(&mut self) -> InvocationToken {
        self.latest_token += 1;
        self.busy = true;
        InvocationToken(self.latest_token)
    }

    pub fn is_latest(&self, token: InvocationToken) -> bool {
        token.0 == self.latest_token
    }

    /// Clears the busy flag if `token` is still the latest invocation.
    pub fn settle(&mut self, token: InvocationToken) -> bool {
        if !self.is_latest(token) {
            return false;
        }
        self.busy = false;
        true
    }

    pub fn allocate_record_id(&mut self) -> RecordId {
        let id = self.next_record_id;
        self.next_record_id = id.next();
        id
    }

    /// Ends the current chain. History is kept.
    pub fn reset_chain(&mut self) {
        self.current = None;
        self.anchor = None;
        self.iteration = 0;
    }
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub input_name: Option<String>,
    pub description: String,
    pub resolution: Resolution,
    pub ready: bool,
    pub busy: bool,
    pub current: Option<ResultRecord>,
    pub iteration: u32,
    pub anchor: Option<Anchor>,
    pub history: Vec<ResultRecord>,
}
