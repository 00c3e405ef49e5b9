//! Job-level operations on top of the document client.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use vcomp_models::{
    truncate_error_message, Job, JobId, JobOutputs, JobStatus, ProcessingStep, QualityTier,
    MAX_ERROR_MESSAGE_CHARS,
};

use crate::client::RegistryClient;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{Document, Query};

/// Registry attribute names.
pub mod fields {
    pub const STATUS: &str = "compression_status";
    pub const STEP: &str = "processing_step";
    pub const PROGRESS: &str = "progress";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const SOURCE_URL: &str = "original_video_url";
    pub const CONTENT_ID: &str = "wp_post_id";
    pub const TITLE: &str = "title";
    pub const POSTER_URL: &str = "poster_url";
    pub const MASTER_PLAYLIST_URL: &str = "master_playlist_url";
    pub const CREATED_AT: &str = "$createdAt";

    /// Per-tier playlist URL attribute, e.g. `high_quality_url`.
    pub fn quality_url(tier: vcomp_models::QualityTier) -> String {
        format!("{}_quality_url", tier.as_str())
    }
}

/// Step recorded when a failure happens outside any known step.
const UNKNOWN_STEP: &str = "unknown";

/// Status transitions and progress writes for transcoding jobs.
///
/// Every write is a single partial document update; none is retried here.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Up to `limit` pending jobs, oldest first.
    async fn fetch_oldest_pending(&self, limit: usize) -> RegistryResult<Vec<Job>>;

    async fn get(&self, id: &JobId) -> RegistryResult<Option<Job>>;

    /// status=processing, step=initializing, progress=0, error and outputs cleared.
    async fn claim(&self, id: &JobId) -> RegistryResult<()>;

    /// Update step and progress only.
    async fn advance(&self, id: &JobId, step: &ProcessingStep, progress: u8) -> RegistryResult<()>;

    /// status=completed, step=completed, progress=100, outputs set, error cleared.
    async fn complete(&self, id: &JobId, outputs: &JobOutputs) -> RegistryResult<()>;

    /// status=failed with the active step and a truncated message.
    async fn fail(&self, id: &JobId, message: &str, step: Option<&ProcessingStep>) -> RegistryResult<()>;
}

/// Field set written by `claim`.
pub fn claim_update() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(fields::STATUS.into(), json!(JobStatus::Processing.as_str()));
    data.insert(fields::STEP.into(), json!(ProcessingStep::Initializing.label()));
    data.insert(fields::PROGRESS.into(), json!(0));
    data.insert(fields::ERROR_MESSAGE.into(), Value::Null);
    clear_outputs(&mut data);
    data
}

/// Field set written by `advance`.
pub fn advance_update(step: &ProcessingStep, progress: u8) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(fields::STEP.into(), json!(step.label()));
    data.insert(fields::PROGRESS.into(), json!(progress.min(100)));
    data
}

/// Field set written by `complete`.
pub fn complete_update(outputs: &JobOutputs) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(fields::STATUS.into(), json!(JobStatus::Completed.as_str()));
    data.insert(fields::STEP.into(), json!(ProcessingStep::Completed.label()));
    data.insert(fields::PROGRESS.into(), json!(100));
    data.insert(fields::POSTER_URL.into(), json!(outputs.poster_url));
    data.insert(fields::MASTER_PLAYLIST_URL.into(), json!(outputs.master_playlist_url));
    for tier in QualityTier::ALL {
        let url = outputs.quality_urls.get(&tier).map_or(Value::Null, |u| json!(u));
        data.insert(fields::quality_url(tier), url);
    }
    data.insert(fields::ERROR_MESSAGE.into(), Value::Null);
    data
}

/// Field set written by `fail`.
pub fn fail_update(message: &str, step: Option<&ProcessingStep>) -> Map<String, Value> {
    let message = match truncate_error_message(message.trim(), MAX_ERROR_MESSAGE_CHARS) {
        m if m.is_empty() => "Unknown error".to_string(),
        m => m,
    };

    let mut data = Map::new();
    data.insert(fields::STATUS.into(), json!(JobStatus::Failed.as_str()));
    data.insert(
        fields::STEP.into(),
        json!(step.map_or_else(|| UNKNOWN_STEP.to_string(), ProcessingStep::label)),
    );
    data.insert(fields::ERROR_MESSAGE.into(), json!(message));
    data
}

fn clear_outputs(data: &mut Map<String, Value>) {
    data.insert(fields::POSTER_URL.into(), Value::Null);
    data.insert(fields::MASTER_PLAYLIST_URL.into(), Value::Null);
    for tier in QualityTier::ALL {
        data.insert(fields::quality_url(tier), Value::Null);
    }
}

/// Build a [`Job`] from a registry document.
///
/// Missing content id or source URL are kept empty so the pipeline can fail
/// the job with a meaningful message instead of the job never being listed.
pub fn job_from_document(doc: &Document) -> RegistryResult<Job> {
    let status = match doc.get_str(fields::STATUS) {
        Some(s) => s
            .parse::<JobStatus>()
            .map_err(|e| RegistryError::invalid_document(format!("{}: {}", doc.id, e)))?,
        None => JobStatus::Pending,
    };

    let outputs = (status == JobStatus::Completed).then(|| JobOutputs {
        poster_url: doc.get_str(fields::POSTER_URL).unwrap_or_default().to_string(),
        master_playlist_url: doc
            .get_str(fields::MASTER_PLAYLIST_URL)
            .unwrap_or_default()
            .to_string(),
        quality_urls: QualityTier::ALL
            .iter()
            .filter_map(|t| {
                doc.get_str(&fields::quality_url(*t))
                    .map(|u| (*t, u.to_string()))
            })
            .collect(),
    });

    Ok(Job {
        id: JobId::new(doc.id.clone()),
        content_id: doc.get_string_lenient(fields::CONTENT_ID).unwrap_or_default(),
        status,
        step: doc.get_str(fields::STEP).map(str::to_string),
        progress: doc.get_u64(fields::PROGRESS).unwrap_or(0).min(100) as u8,
        error_message: doc.get_str(fields::ERROR_MESSAGE).map(str::to_string),
        source_url: doc.get_str(fields::SOURCE_URL).unwrap_or_default().to_string(),
        created_at: doc.created_at(),
        outputs,
    })
}

/// [`JobStore`] backed by the registry REST API.
#[derive(Debug, Clone)]
pub struct JobRepository {
    client: RegistryClient,
}

impl JobRepository {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn fetch_oldest_pending(&self, limit: usize) -> RegistryResult<Vec<Job>> {
        let queries = [
            Query::equal(fields::STATUS, JobStatus::Pending.as_str()),
            Query::order_asc(fields::CREATED_AT),
            Query::limit(limit),
        ];
        let list = self.client.list_documents(&queries).await?;

        let mut jobs = Vec::with_capacity(list.documents.len());
        for doc in &list.documents {
            match job_from_document(doc) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(doc_id = %doc.id, error = %e, "Skipping unreadable job document"),
            }
        }
        Ok(jobs)
    }

    async fn get(&self, id: &JobId) -> RegistryResult<Option<Job>> {
        match self.client.get_document(id.as_str()).await? {
            Some(doc) => Ok(Some(job_from_document(&doc)?)),
            None => Ok(None),
        }
    }

    async fn claim(&self, id: &JobId) -> RegistryResult<()> {
        self.client.update_document(id.as_str(), &claim_update()).await?;
        info!(job_id = %id, "Job claimed");
        Ok(())
    }

    async fn advance(&self, id: &JobId, step: &ProcessingStep, progress: u8) -> RegistryResult<()> {
        self.client
            .update_document(id.as_str(), &advance_update(step, progress))
            .await?;
        Ok(())
    }

    async fn complete(&self, id: &JobId, outputs: &JobOutputs) -> RegistryResult<()> {
        self.client
            .update_document(id.as_str(), &complete_update(outputs))
            .await?;
        info!(job_id = %id, "Job marked completed");
        Ok(())
    }

    async fn fail(&self, id: &JobId, message: &str, step: Option<&ProcessingStep>) -> RegistryResult<()> {
        self.client
            .update_document(id.as_str(), &fail_update(message, step))
            .await?;
        info!(job_id = %id, "Job marked failed");
        Ok(())
    }
}
