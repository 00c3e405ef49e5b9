//! Job registry REST client.
//!
//! Talks to a hosted document database (Appwrite databases API) holding one
//! document per transcoding job. Provides:
//! - A thin document client with tracing spans and request metrics
//! - The [`JobStore`] seam used by the worker, and its REST implementation

pub mod client;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod types;


pub use client::{RegistryClient, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use jobs::{JobRepository, JobStore};
pub use types::{Document, DocumentList, Query};
