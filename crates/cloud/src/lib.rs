//! Cloud-side collaborators of the job service.
//!
//! Two seams are exposed as traits so the HTTP layer can be exercised
//! against in-memory fakes:
//!
//! - [`ArtifactStore`]: per-job storage containers, the staged profile
//!   and signed URLs that let batch tasks read and write them.
//! - [`BatchScheduler`]: submission of the Compute → Upload task graph,
//!   task status lookups and the active-job count used as a queue position.
//!
//! The concrete clients talk to Azure-compatible Blob and Batch REST
//! endpoints with Shared Key authentication.

pub mod batch;
pub mod blob;
pub mod config;
pub mod error;
pub mod sas;
pub mod shared_key;
pub mod task_graph;

use async_trait::async_trait;
use autotune_core::types::Timestamp;

pub use batch::AzureBatchScheduler;
pub use blob::AzureBlobStore;
pub use config::{BatchConfig, StorageConfig};
pub use error::CloudError;
pub use task_graph::{ComputeCommand, JobSubmission};

// ---------------------------------------------------------------------------
// Artifact storage
// ---------------------------------------------------------------------------

/// A blob inside a job container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub container: String,
    pub name: String,
}

impl BlobRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create a fresh container. Fails with [`CloudError::ContainerExists`]
    /// when the name is already taken.
    async fn create_container(&self, container: &str) -> Result<(), CloudError>;

    /// Upload the profile as the job's input blob and return a read-only
    /// signed URL for it.
    async fn stage_input(&self, container: &str, profile_json: &str) -> Result<String, CloudError>;

    /// Signed URL granting read and write on the whole container.
    fn container_write_url(&self, container: &str) -> Result<String, CloudError>;

    /// Every blob in the container except the input and the primary result.
    async fn list_secondary_artifacts(&self, container: &str) -> Result<Vec<BlobRef>, CloudError>;

    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>, CloudError>;

    async fn download_text(&self, blob: &BlobRef) -> Result<String, CloudError> {
        let bytes = self.download(blob).await?;
        String::from_utf8(bytes).map_err(|_| {
            CloudError::Decode(format!("Blob {}/{} is not valid UTF-8", blob.container, blob.name))
        })
    }
}

// ---------------------------------------------------------------------------
// Batch scheduling
// ---------------------------------------------------------------------------

/// Execution details of a single task, as reported by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStatus {
    /// `None` while the task has not finished.
    pub exit_code: Option<i32>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
}

impl TaskStatus {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait BatchScheduler: Send + Sync {
    /// Create the job and its two tasks. Returns the number of active jobs
    /// after submission, which callers report as a queue position.
    async fn submit(&self, submission: &JobSubmission) -> Result<usize, CloudError>;

    async fn task_status(&self, job_name: &str, task_id: &str) -> Result<TaskStatus, CloudError>;

    async fn active_job_count(&self) -> Result<usize, CloudError>;
}
