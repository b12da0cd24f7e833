//! Knowledge sync: refresh an assistant's file-search documents from an
//! `llm.txt` index.
//!
//! - [`links`]: markdown link extraction and file naming
//! - [`sync`]: download, clear, and upload workflow
//!
//! Vector store operations go through [`VectorStoreApi`] so the workflow can
//! run against the OpenAI implementation or an in-memory fake.

pub mod links;
pub mod sync;

pub use links::{MarkdownLink, clean_filename, extract_markdown_links};
pub use sync::{ClearReport, KnowledgeSync, SyncReport, SyncSettings, UploadReport};

use std::path::Path;

use serde::Deserialize;

use crate::error::RemoteServiceError;

/// A file attached to a vector store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    /// `in_progress`, `completed`, `failed`, or `cancelled`.
    pub status: String,
}

/// Per-status file counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileCounts {
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

/// Result of attaching a batch of files to a vector store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileBatch {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

/// Vector store and file storage operations used by knowledge sync.
#[async_trait::async_trait]
pub trait VectorStoreApi: Send + Sync {
    /// Vector stores the assistant's file search tool points at.
    async fn vector_store_ids(&self, assistant_id: &str) -> Result<Vec<String>, RemoteServiceError>;

    /// Point the assistant's file search tool at exactly `vector_store_ids`.
    async fn attach_vector_stores(
        &self,
        assistant_id: &str,
        vector_store_ids: &[String],
    ) -> Result<(), RemoteServiceError>;

    /// Create a store expiring `expires_after_days` after last activity.
    async fn create_vector_store(
        &self,
        name: &str,
        expires_after_days: u32,
    ) -> Result<String, RemoteServiceError>;

    async fn vector_store_status(&self, vector_store_id: &str) -> Result<String, RemoteServiceError>;

    async fn update_vector_store(
        &self,
        vector_store_id: &str,
        name: &str,
        expires_after_days: u32,
    ) -> Result<(), RemoteServiceError>;

    /// Returns whether the service reports the store as deleted.
    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<bool, RemoteServiceError>;

    /// Every file of a store, optionally filtered by status. Follows pagination.
    async fn list_files(
        &self,
        vector_store_id: &str,
        status_filter: Option<&str>,
    ) -> Result<Vec<VectorStoreFile>, RemoteServiceError>;

    /// Detach a file from a store. Returns whether it was deleted.
    async fn remove_file_from_store(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<bool, RemoteServiceError>;

    /// Delete a file from file storage. Returns whether it was deleted.
    async fn delete_file(&self, file_id: &str) -> Result<bool, RemoteServiceError>;

    /// Upload a local file for assistant use and return its id.
    async fn upload_file(&self, path: &Path) -> Result<String, RemoteServiceError>;

    /// Attach files to a store and wait until the batch leaves `in_progress`.
    async fn create_file_batch_and_poll(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch, RemoteServiceError>;
}
