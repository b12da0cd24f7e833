//! Knowledge sync workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use super::{VectorStoreApi, extract_markdown_links, links::clean_filename};
use crate::config::{AssistantProfile, KnowledgeConfig};
use crate::error::{RemoteServiceError, SyncError};

/// Expiry for a freshly created store, in days after last activity.
const NEW_STORE_EXPIRY_DAYS: u32 = 7;
/// Expiry applied when a store is kept and renamed.
const KEPT_STORE_EXPIRY_DAYS: u32 = 30;

/// Tuning for uploads.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Parent of the per-run download directories.
    pub work_dir: PathBuf,
    pub max_concurrent_uploads: usize,
    /// Files attached per batch.
    pub batch_size: usize,
    /// Total attach attempts, including the first.
    pub max_attempts: usize,
}

impl From<&KnowledgeConfig> for SyncSettings {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            work_dir: PathBuf::from(&config.work_dir),
            max_concurrent_uploads: config.max_concurrent_uploads,
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
        }
    }
}

/// Outcome of clearing the previous knowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearReport {
    /// Files removed from the primary store.
    pub removed: usize,
    /// Files found in the primary store.
    pub total: usize,
    /// Store kept for the new upload, if it survived.
    pub retained_store: Option<String>,
}

/// Outcome of uploading the new documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub vector_store_id: String,
    pub uploaded: usize,
    pub total: usize,
    pub attempts: usize,
}

/// Outcome of a full sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub assistant_id: String,
    pub source: String,
    /// File names written to the work directory.
    pub documents: Vec<String>,
    pub cleared: ClearReport,
    pub uploaded: UploadReport,
}

/// Downloads an assistant's documents and replaces its file-search knowledge.
#[derive(Clone)]
pub struct KnowledgeSync {
    http: reqwest::Client,
    store: Arc<dyn VectorStoreApi>,
    settings: SyncSettings,
}

impl std::fmt::Debug for KnowledgeSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeSync")
            .field("settings", &self.settings)
            .finish()
    }
}

impl KnowledgeSync {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStoreApi>, settings: SyncSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            settings,
        }
    }

    /// Run a full sync for one assistant.
    ///
    /// The work directory is removed afterwards whether or not the sync
    /// succeeded.
    pub async fn run(&self, profile: &AssistantProfile) -> Result<SyncReport, SyncError> {
        let source = profile
            .llm_txt_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SyncError::MissingSource(profile.id.clone()))?;

        let dir = self.create_work_dir(&profile.id).await?;
        tracing::info!(
            name: "knowledge.sync.started",
            assistant_id = %profile.id,
            source = %source,
            dir = %dir.display(),
            "Starting knowledge sync"
        );

        let result = self.sync_into(&dir, &profile.id, source).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove sync directory");
        }

        match &result {
            Ok(report) => tracing::info!(
                name: "knowledge.sync.finished",
                assistant_id = %profile.id,
                documents = report.documents.len(),
                uploaded = report.uploaded.uploaded,
                "Knowledge sync finished"
            ),
            Err(e) => tracing::error!(
                name: "knowledge.sync.failed",
                assistant_id = %profile.id,
                error = %e,
                "Knowledge sync failed"
            ),
        }
        result
    }

    async fn sync_into(
        &self,
        dir: &Path,
        assistant_id: &str,
        source: &str,
    ) -> Result<SyncReport, SyncError> {
        let paths = self.download_documents(source, dir).await?;

        let knowledge = AssistantKnowledge::new(self.store.as_ref(), assistant_id, &self.settings);
        let cleared = knowledge.clear().await?;
        let uploaded = knowledge
            .upload(cleared.retained_store.clone(), &paths)
            .await?;

        Ok(SyncReport {
            assistant_id: assistant_id.to_string(),
            source: source.to_string(),
            documents: paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
            cleared,
            uploaded,
        })
    }

    async fn create_work_dir(&self, assistant_id: &str) -> Result<PathBuf, SyncError> {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        let dir = self
            .settings
            .work_dir
            .join(format!("sync_{}_{suffix}", clean_filename(assistant_id)));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let download = |source: reqwest::Error| SyncError::Download {
            url: url.to_string(),
            source,
        };
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(download)?;
        resp.bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(download)
    }

    /// Download the index and every linked markdown file into `dir`.
    async fn download_documents(&self, source: &str, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let index = self.fetch(source).await?;
        let links = extract_markdown_links(String::from_utf8_lossy(&index).trim());
        tracing::info!(source = %source, count = links.len(), "Found markdown files to download");

        if links.is_empty() {
            return Err(SyncError::NoDocuments(source.to_string()));
        }

        let mut paths = Vec::with_capacity(links.len());
        for (i, link) in links.iter().enumerate() {
            let url = link.url.trim();
            if url.is_empty() {
                continue;
            }
            tracing::debug!(index = i + 1, total = links.len(), url = %url, "Downloading document");

            let body = self.fetch(url).await?;
            let path = dir.join(format!("{}.md", clean_filename(&link.text)));
            tokio::fs::write(&path, &body).await?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// Vector store maintenance for one assistant.
struct AssistantKnowledge<'a> {
    store: &'a dyn VectorStoreApi,
    assistant_id: &'a str,
    settings: &'a SyncSettings,
    topic: String,
}

impl<'a> AssistantKnowledge<'a> {
    fn new(store: &'a dyn VectorStoreApi, assistant_id: &'a str, settings: &'a SyncSettings) -> Self {
        Self {
            store,
            assistant_id,
            settings,
            topic: format!("{assistant_id}_vector_store"),
        }
    }

    /// Remove every file from the assistant's stores.
    ///
    /// Extra stores are deleted outright. The first store is emptied and
    /// kept, unless it expired or could not be emptied cleanly, in which
    /// case it is deleted as a whole.
    async fn clear(&self) -> Result<ClearReport, SyncError> {
        let ids = self.store.vector_store_ids(self.assistant_id).await?;
        let Some((primary, extra)) = ids.split_first() else {
            tracing::info!(assistant_id = %self.assistant_id, "Assistant has no vector store");
            return Ok(ClearReport {
                removed: 0,
                total: 0,
                retained_store: None,
            });
        };

        for id in extra {
            self.delete_store(id).await;
        }

        let files = self.store.list_files(primary, None).await?;
        let processing = files.iter().any(|f| f.status == "in_progress");
        let mut failed_detach = 0;
        let mut failed_delete = 0;

        for file in &files {
            if !self.remove_from_store(primary, &file.id).await {
                failed_detach += 1;
            }
            if !self.delete_stored_file(&file.id).await {
                failed_delete += 1;
            }
        }

        let expired = self.store.vector_store_status(primary).await? == "expired";
        if !expired {
            self.store
                .update_vector_store(primary, &self.topic, KEPT_STORE_EXPIRY_DAYS)
                .await?;
        }

        let mut removed = files.len() - failed_detach;
        let mut retained_store = (!expired).then(|| primary.clone());

        if processing || failed_detach > 0 || failed_delete > 0 || expired {
            tracing::info!(
                assistant_id = %self.assistant_id,
                vector_store_id = %primary,
                processing,
                expired,
                "Store could not be emptied cleanly, deleting it"
            );
            if self.delete_store(primary).await {
                removed = files.len();
                retained_store = None;
            }
        }

        tracing::info!(
            name: "knowledge.cleared",
            assistant_id = %self.assistant_id,
            removed,
            total = files.len(),
            "Cleared assistant files"
        );
        Ok(ClearReport {
            removed,
            total: files.len(),
            retained_store,
        })
    }

    /// Upload `paths` into the retained store, or a new one, and attach it.
    async fn upload(
        &self,
        retained_store: Option<String>,
        paths: &[PathBuf],
    ) -> Result<UploadReport, SyncError> {
        let vector_store_id = match retained_store {
            Some(id) => id,
            None => {
                let id = self
                    .store
                    .create_vector_store(&self.topic, NEW_STORE_EXPIRY_DAYS)
                    .await?;
                tracing::info!(assistant_id = %self.assistant_id, vector_store_id = %id, "Created vector store");
                id
            }
        };
        self.store
            .attach_vector_stores(self.assistant_id, std::slice::from_ref(&vector_store_id))
            .await?;

        let store = self.store;
        let uploads: Vec<Result<String, RemoteServiceError>> = futures::stream::iter(paths.to_vec())
            .map(move |path| async move { store.upload_file(&path).await })
            .buffer_unordered(self.settings.max_concurrent_uploads)
            .collect()
            .await;
        let file_ids = uploads.into_iter().collect::<Result<Vec<_>, _>>()?;

        self.attach_with_retries(vector_store_id, file_ids).await
    }

    async fn attach_with_retries(
        &self,
        vector_store_id: String,
        file_ids: Vec<String>,
    ) -> Result<UploadReport, SyncError> {
        let total = file_ids.len();
        let mut successful = 0usize;
        let mut pending = file_ids;

        for attempt in 1..=self.settings.max_attempts {
            for (i, batch) in pending.chunks(self.settings.batch_size).enumerate() {
                let result = self
                    .store
                    .create_file_batch_and_poll(&vector_store_id, batch)
                    .await?;
                if result.status != "completed" {
                    return Err(SyncError::BatchFailed {
                        batch: i + 1,
                        status: result.status,
                    });
                }
                successful += usize::try_from(result.file_counts.completed).unwrap_or(usize::MAX);
                tracing::info!(
                    assistant_id = %self.assistant_id,
                    batch = i + 1,
                    counts = ?result.file_counts,
                    "Attached file batch"
                );
            }

            tracing::info!(
                assistant_id = %self.assistant_id,
                attempt,
                successful,
                total,
                "Upload attempt finished"
            );

            let failed: Vec<String> = match self
                .store
                .list_files(&vector_store_id, Some("failed"))
                .await
            {
                Ok(files) => files.into_iter().map(|f| f.id).collect(),
                Err(e) => {
                    tracing::error!(assistant_id = %self.assistant_id, error = %e, "Failed to list failed files");
                    Vec::new()
                }
            };

            if failed.is_empty() {
                if successful >= total {
                    return Ok(UploadReport {
                        vector_store_id,
                        uploaded: successful.min(total),
                        total,
                        attempts: attempt,
                    });
                }
                break;
            }

            if attempt < self.settings.max_attempts {
                tracing::info!(
                    assistant_id = %self.assistant_id,
                    failed = failed.len(),
                    next_attempt = attempt + 1,
                    "Retrying failed files"
                );
                for id in &failed {
                    self.remove_from_store(&vector_store_id, id).await;
                }
                pending = failed;
            }
        }

        Err(SyncError::UploadIncomplete {
            failed: total.saturating_sub(successful),
            total,
            attempts: self.settings.max_attempts,
        })
    }

    /// Detach a file; a missing file counts as removed.
    async fn remove_from_store(&self, vector_store_id: &str, file_id: &str) -> bool {
        match self.store.remove_file_from_store(vector_store_id, file_id).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(vector_store_id = %vector_store_id, file_id = %file_id, "Store refused to remove file");
                false
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(vector_store_id = %vector_store_id, file_id = %file_id, "File already gone from store");
                true
            }
            Err(e) => {
                tracing::error!(vector_store_id = %vector_store_id, file_id = %file_id, error = %e, "Failed to remove file from store");
                false
            }
        }
    }

    /// Delete a stored file; a missing file counts as deleted.
    async fn delete_stored_file(&self, file_id: &str) -> bool {
        match self.store.delete_file(file_id).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(file_id = %file_id, "File storage refused to delete file");
                false
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(file_id = %file_id, "File already deleted");
                true
            }
            Err(e) => {
                tracing::error!(file_id = %file_id, error = %e, "Failed to delete file");
                false
            }
        }
    }

    async fn delete_store(&self, vector_store_id: &str) -> bool {
        match self.store.delete_vector_store(vector_store_id).await {
            Ok(true) => {
                tracing::info!(vector_store_id = %vector_store_id, "Deleted vector store");
                true
            }
            Ok(false) => {
                tracing::error!(vector_store_id = %vector_store_id, "Vector store not deleted, remove it manually and sync again");
                false
            }
            Err(e) => {
                tracing::error!(vector_store_id = %vector_store_id, error = %e, "Failed to delete vector store");
                false
            }
        }
    }
}
