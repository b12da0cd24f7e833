//! Vector store and file endpoints.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use super::OpenAiClient;
use crate::error::RemoteServiceError;
use crate::knowledge::{FileBatch, VectorStoreApi, VectorStoreFile};

/// Page size for file listings; the API maximum.
const LIST_PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct VectorStore {
    status: String,
}

#[derive(Debug, Deserialize)]
struct FilePage {
    data: Vec<VectorStoreFile>,
    #[serde(default)]
    has_more: bool,
    last_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantTools {
    #[serde(default)]
    tool_resources: ToolResources,
}

#[derive(Debug, Default, Deserialize)]
struct ToolResources {
    #[serde(default)]
    file_search: Option<FileSearch>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSearch {
    #[serde(default)]
    vector_store_ids: Vec<String>,
}

/// [`VectorStoreApi`] over the OpenAI REST API.
#[derive(Debug, Clone)]
pub struct OpenAiVectorStores {
    client: OpenAiClient,
}

impl OpenAiVectorStores {
    #[must_use]
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn poll_interval(&self) -> Duration {
        self.client.settings().poll_interval
    }

    async fn delete(&self, path: &str) -> Result<bool, RemoteServiceError> {
        let deleted: Deleted =
            OpenAiClient::send_json(self.client.request(Method::DELETE, path)).await?;
        Ok(deleted.deleted)
    }
}

#[async_trait]
impl VectorStoreApi for OpenAiVectorStores {
    async fn vector_store_ids(&self, assistant_id: &str) -> Result<Vec<String>, RemoteServiceError> {
        let assistant: AssistantTools = OpenAiClient::send_json(
            self.client
                .request(Method::GET, &format!("assistants/{assistant_id}")),
        )
        .await?;
        Ok(assistant
            .tool_resources
            .file_search
            .map(|f| f.vector_store_ids)
            .unwrap_or_default())
    }

    async fn attach_vector_stores(
        &self,
        assistant_id: &str,
        vector_store_ids: &[String],
    ) -> Result<(), RemoteServiceError> {
        OpenAiClient::send(
            self.client
                .request(Method::POST, &format!("assistants/{assistant_id}"))
                .json(&json!({
                    "tool_resources": { "file_search": { "vector_store_ids": vector_store_ids } }
                })),
        )
        .await?;
        Ok(())
    }

    async fn create_vector_store(
        &self,
        name: &str,
        expires_after_days: u32,
    ) -> Result<String, RemoteServiceError> {
        let created: Created = OpenAiClient::send_json(
            self.client.request(Method::POST, "vector_stores").json(&json!({
                "name": name,
                "expires_after": { "anchor": "last_active_at", "days": expires_after_days }
            })),
        )
        .await?;
        Ok(created.id)
    }

    async fn vector_store_status(&self, vector_store_id: &str) -> Result<String, RemoteServiceError> {
        let store: VectorStore = OpenAiClient::send_json(
            self.client
                .request(Method::GET, &format!("vector_stores/{vector_store_id}")),
        )
        .await?;
        Ok(store.status)
    }

    async fn update_vector_store(
        &self,
        vector_store_id: &str,
        name: &str,
        expires_after_days: u32,
    ) -> Result<(), RemoteServiceError> {
        OpenAiClient::send(
            self.client
                .request(Method::POST, &format!("vector_stores/{vector_store_id}"))
                .json(&json!({
                    "name": name,
                    "expires_after": { "anchor": "last_active_at", "days": expires_after_days }
                })),
        )
        .await?;
        Ok(())
    }

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<bool, RemoteServiceError> {
        self.delete(&format!("vector_stores/{vector_store_id}")).await
    }

    async fn list_files(
        &self,
        vector_store_id: &str,
        status_filter: Option<&str>,
    ) -> Result<Vec<VectorStoreFile>, RemoteServiceError> {
        let mut files = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![("limit", LIST_PAGE_SIZE.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }
            if let Some(filter) = status_filter {
                query.push(("filter", filter.to_string()));
            }

            let page: FilePage = OpenAiClient::send_json(
                self.client
                    .request(Method::GET, &format!("vector_stores/{vector_store_id}/files"))
                    .query(&query),
            )
            .await?;
            files.extend(page.data);

            match page.last_id {
                Some(last) if page.has_more => after = Some(last),
                _ => break,
            }
        }

        tracing::debug!(vector_store_id = %vector_store_id, count = files.len(), "Listed vector store files");
        Ok(files)
    }

    async fn remove_file_from_store(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<bool, RemoteServiceError> {
        self.delete(&format!("vector_stores/{vector_store_id}/files/{file_id}"))
            .await
    }

    async fn delete_file(&self, file_id: &str) -> Result<bool, RemoteServiceError> {
        self.delete(&format!("files/{file_id}")).await
    }

    async fn upload_file(&self, path: &Path) -> Result<String, RemoteServiceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| RemoteServiceError::LocalFile {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.md".to_string());

        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let created: Created =
            OpenAiClient::send_json(self.client.request(Method::POST, "files").multipart(form))
                .await?;
        tracing::debug!(file_id = %created.id, path = %path.display(), "Uploaded file");
        Ok(created.id)
    }

    async fn create_file_batch_and_poll(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch, RemoteServiceError> {
        let mut batch: FileBatch = OpenAiClient::send_json(
            self.client
                .request(
                    Method::POST,
                    &format!("vector_stores/{vector_store_id}/file_batches"),
                )
                .json(&json!({ "file_ids": file_ids })),
        )
        .await?;

        while batch.status == "in_progress" {
            tokio::time::sleep(self.poll_interval()).await;
            batch = OpenAiClient::send_json(self.client.request(
                Method::GET,
                &format!("vector_stores/{vector_store_id}/file_batches/{}", batch.id),
            ))
            .await?;
        }
        Ok(batch)
    }
}
