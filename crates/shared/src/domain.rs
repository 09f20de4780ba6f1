use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A backend-hosted image, carrying both the path the backend expects on the
/// wire and the absolute URL the display layer loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    path: String,
    url: Url,
}

impl AssetRef {
    pub fn new(path: impl Into<String>, url: Url) -> Self {
        Self {
            path: path.into(),
            url,
        }
    }

    /// Builds a reference from a backend-relative path such as
    /// `/data/outputs/y.png`.
    pub fn from_backend_path(path: &str, base: &Url) -> Result<Self, url::ParseError> {
        let url = base.join(path)?;
        Ok(Self::new(path, url))
    }

    /// Accepts either an absolute http(s) URL or a backend path.
    ///
    /// Absolute URLs are reduced to their path component: origin, query and
    /// fragment are never sent back to the backend.
    pub fn resolve(raw: &str, base: &Url) -> Result<Self, url::ParseError> {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let path = url.path().to_string();
                let mut display = url;
                display.set_query(None);
                display.set_fragment(None);
                Ok(Self::new(path, display))
            }
            _ => Self::from_backend_path(raw, base),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Display URL with a `v=<token>` query pair appended.
    pub fn cache_busted(&self, token: u64) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("v", &token.to_string());
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: RecordId,
    pub original: AssetRef,
    pub staged: AssetRef,
    pub reasoning: String,
    pub prompt: String,
    pub description: String,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
}

/// The uploaded input and description a generate/refine chain started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub original: AssetRef,
    pub description: String,
}

impl Anchor {
    pub fn refined_description(&self, feedback: &str) -> String {
        format!("{} (Refined: {})", self.description, feedback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown theme '{0}', expected 'light' or 'dark'")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

/// ControlNet adjustment hint chosen by the prompt engine (`style`, `add`,
/// `replace`, `material`, ...). Forwarded to generation verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(pub String);

impl Default for TaskType {
    fn default() -> Self {
        Self("style".to_string())
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("resolution {0}px is outside {min}..={max}", min = Resolution::MIN, max = Resolution::MAX)]
    OutOfRange(u32),
    #[error("resolution {0}px is not a multiple of {step}", step = Resolution::STEP)]
    Misaligned(u32),
}

/// Target length of the output's shortest side, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Resolution(u32);

impl Resolution {
    pub const MIN: u32 = 768;
    pub const MAX: u32 = 4096;
    pub const STEP: u32 = 64;

    pub fn new(px: u32) -> Result<Self, ResolutionError> {
        if !(Self::MIN..=Self::MAX).contains(&px) {
            return Err(ResolutionError::OutOfRange(px));
        }
        if px % Self::STEP != 0 {
            return Err(ResolutionError::Misaligned(px));
        }
        Ok(Self(px))
    }

    pub fn px(self) -> u32 {
        self.0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self(1024)
    }
}

impl TryFrom<u32> for Resolution {
    type Error = ResolutionError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Resolution> for u32 {
    fn from(value: Resolution) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:8000").expect("base url")
    }

    #[test]
    fn resolve_strips_origin_and_cache_buster() {
        let asset = AssetRef::resolve("http://127.0.0.1:8000/data/outputs/y.png?v=17", &base())
            .expect("resolve");
        assert_eq!(asset.path(), "/data/outputs/y.png");
        assert_eq!(asset.url().as_str(), "http://127.0.0.1:8000/data/outputs/y.png");
    }

    #[test]
    fn resolve_keeps_backend_relative_paths() {
        let asset = AssetRef::resolve("/data/inputs/x.png", &base()).expect("resolve");
        assert_eq!(asset.path(), "/data/inputs/x.png");
        assert_eq!(asset.url().as_str(), "http://127.0.0.1:8000/data/inputs/x.png");
        assert_eq!(asset.file_name(), Some("x.png"));
    }

    #[test]
    fn cache_busted_url_differs_per_token() {
        let asset = AssetRef::from_backend_path("/data/outputs/y.png", &base()).expect("asset");
        let first = asset.cache_busted(1);
        let second = asset.cache_busted(2);
        assert_ne!(first, second);
        assert_eq!(first.path(), second.path());
        assert_eq!(first.query(), Some("v=1"));
    }

    #[test]
    fn resolution_enforces_bounds_and_step() {
        assert_eq!(Resolution::new(1024).map(Resolution::px), Ok(1024));
        assert_eq!(Resolution::new(512), Err(ResolutionError::OutOfRange(512)));
        assert_eq!(Resolution::new(8192), Err(ResolutionError::OutOfRange(8192)));
        assert_eq!(Resolution::new(1000), Err(ResolutionError::Misaligned(1000)));
        assert_eq!(Resolution::default().px(), 1024);
    }

    #[test]
    fn theme_parses_case_insensitively() {
        assert_eq!("Dark".parse::<Theme>().expect("theme"), Theme::Dark);
        assert!("sepia".parse::<Theme>().is_err());
    }

    #[test]
    fn refined_description_appends_feedback() {
        let anchor = Anchor {
            original: AssetRef::from_backend_path("/data/inputs/x.png", &base()).expect("asset"),
            description: "Modern Scandinavian living room".into(),
        };
        assert_eq!(
            anchor.refined_description("add a chair"),
            "Modern Scandinavian living room (Refined: add a chair)"
        );
    }
}
