//! Transcoding job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::job_status::JobStatus;
use crate::quality::QualityTier;

/// Registry document id of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected content id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentIdError {
    #[error("content id is empty")]
    Empty,

    #[error("content id contains a path separator: {0}")]
    PathSeparator(String),

    #[error("content id contains a parent reference: {0}")]
    ParentReference(String),
}

/// Identifier of the source video.
///
/// Used as a directory and file name component, so it is checked to be a
/// single path segment on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn parse(s: impl Into<String>) -> Result<Self, ContentIdError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ContentIdError::Empty);
        }
        if trimmed.contains('/') || trimmed.contains('\\') {
            return Err(ContentIdError::PathSeparator(s));
        }
        if trimmed.contains("..") {
            return Err(ContentIdError::ParentReference(s));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public URLs published when a job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobOutputs {
    pub poster_url: String,
    pub master_playlist_url: String,
    pub quality_urls: BTreeMap<QualityTier, String>,
}

impl JobOutputs {
    /// True when the poster, the master manifest and every tier have a URL.
    pub fn is_complete(&self) -> bool {
        !self.poster_url.is_empty()
            && !self.master_playlist_url.is_empty()
            && QualityTier::ALL
                .iter()
                .all(|t| self.quality_urls.get(t).is_some_and(|u| !u.is_empty()))
    }
}

/// One transcoding job as read from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Raw content id as stored; see [`Job::content_id`].
    pub content_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error_message: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: Option<JobOutputs>,
}

impl Job {
    /// A freshly created pending job.
    pub fn pending(id: JobId, content_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id,
            content_id: content_id.into(),
            status: JobStatus::Pending,
            step: None,
            progress: 0,
            error_message: None,
            source_url: source_url.into(),
            created_at: Some(Utc::now()),
            outputs: None,
        }
    }

    /// Validated content id.
    pub fn content_id(&self) -> Result<ContentId, ContentIdError> {
        ContentId::parse(self.content_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_accepts_plain_names() {
        let id = ContentId::parse("video_123-abc").unwrap();
        assert_eq!(id.as_str(), "video_123-abc");
        assert_eq!(ContentId::parse("  padded ").unwrap().as_str(), "padded");
    }

    #[test]
    fn test_content_id_rejects_path_components() {
        assert_eq!(ContentId::parse(""), Err(ContentIdError::Empty));
        assert_eq!(ContentId::parse("   "), Err(ContentIdError::Empty));
        assert!(matches!(
            ContentId::parse("a/b"),
            Err(ContentIdError::PathSeparator(_))
        ));
        assert!(matches!(
            ContentId::parse("a\\b"),
            Err(ContentIdError::PathSeparator(_))
        ));
        assert!(matches!(
            ContentId::parse(".."),
            Err(ContentIdError::ParentReference(_))
        ));
    }

    #[test]
    fn test_content_id_deserialize_validates() {
        let ok: ContentId = serde_json::from_str("\"clip1\"").unwrap();
        assert_eq!(ok.as_str(), "clip1");
        assert!(serde_json::from_str::<ContentId>("\"../etc\"").is_err());
    }

    #[test]
    fn test_outputs_completeness() {
        let mut outputs = JobOutputs {
            poster_url: "p".into(),
            master_playlist_url: "m".into(),
            quality_urls: BTreeMap::new(),
        };
        assert!(!outputs.is_complete());

        for tier in QualityTier::ALL {
            outputs.quality_urls.insert(tier, format!("{tier}/playlist.m3u8"));
        }
        assert!(outputs.is_complete());

        outputs.poster_url.clear();
        assert!(!outputs.is_complete());
    }

    #[test]
    fn test_pending_job() {
        let job = Job::pending(JobId::new("doc1"), "c1", "https://example.com/a.mp4");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.content_id().unwrap().as_str(), "c1");
        assert_eq!(job.progress, 0);
        assert!(job.outputs.is_none());
        assert_eq!(job.id.to_string(), "doc1");

        let bad = Job::pending(JobId::new("doc2"), "../x", "https://example.com/a.mp4");
        assert!(bad.content_id().is_err());
    }
}
