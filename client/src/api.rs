//! Typed operations over the gateway.
//!
//! Wire contract: responses are camelCase, request bodies snake_case, and
//! failures come back as `{"detail": "..."}` — see the envelope structs
//! below for the exact shapes. Envelope types stay private; callers get
//! domain types from `parley-types`.

use std::error::Error;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use parley_auth::BackendRegistrar;
use parley_types::{
    ChatEntry, FileId, FileMetadata, HealthReport, NewAccount, Project, ProjectId, UploadReceipt,
    UserProfile,
};

use crate::error::ClientError;
use crate::gateway::Gateway;

/// Client for the platform backend. Cheap to clone; clones share the
/// gateway (and with it the readiness gate and the 401 once-reaction).
#[derive(Clone)]
pub struct ApiClient {
    gateway: Gateway,
}

impl ApiClient {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Record a freshly registered account with the backend. The only call
    /// expected to go out unauthenticated.
    pub async fn register_account(&self, account: &NewAccount) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct Registered {
            uid: String,
        }
        let resp = self.gateway.post_json("/api/auth/register", account).await?;
        Ok(resp.json::<Registered>().await?.uid)
    }

    /// The authenticated user's profile as the backend records it.
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        Ok(self.gateway.get("/api/auth/me").await?.json().await?)
    }

    /// All projects owned by the authenticated user, newest first.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        #[derive(Deserialize)]
        struct Listing {
            projects: Vec<Project>,
        }
        let resp = self.gateway.get("/api/projects").await?;
        Ok(resp.json::<Listing>().await?.projects)
    }

    pub async fn create_project(
        &self,
        name: &str,
        system_prompt: &str,
    ) -> Result<ProjectId, ClientError> {
        #[derive(Deserialize)]
        struct Created {
            #[serde(rename = "projectId")]
            project_id: ProjectId,
        }
        let resp = self
            .gateway
            .post_json(
                "/api/projects",
                &json!({ "name": name, "system_prompt": system_prompt }),
            )
            .await?;
        Ok(resp.json::<Created>().await?.project_id)
    }

    pub async fn get_project(&self, id: &ProjectId) -> Result<Project, ClientError> {
        let resp = self.gateway.get(&format!("/api/projects/{id}")).await?;
        Ok(resp.json().await?)
    }

    /// Delete a project and its chat history.
    pub async fn delete_project(&self, id: &ProjectId) -> Result<(), ClientError> {
        self.gateway.delete(&format!("/api/projects/{id}")).await?;
        Ok(())
    }

    /// Send one chat message; the backend replies with the assistant's turn.
    pub async fn send_message(
        &self,
        project: &ProjectId,
        message: &str,
    ) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct Reply {
            response: String,
        }
        let resp = self
            .gateway
            .post_json(&format!("/api/chat/{project}"), &json!({ "message": message }))
            .await?;
        Ok(resp.json::<Reply>().await?.response)
    }

    /// Full chat history of a project, oldest first.
    pub async fn chat_history(&self, project: &ProjectId) -> Result<Vec<ChatEntry>, ClientError> {
        #[derive(Deserialize)]
        struct History {
            history: Vec<ChatEntry>,
        }
        let resp = self
            .gateway
            .get(&format!("/api/chat/{project}/history"))
            .await?;
        Ok(resp.json::<History>().await?.history)
    }

    /// Upload a file to a project as a multipart body. The backend enforces
    /// its own size cap and rejects oversized uploads by status.
    pub async fn upload_file(
        &self,
        project: &ProjectId,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, ClientError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .gateway
            .post_multipart(&format!("/api/projects/{project}/files"), form)
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn list_files(&self, project: &ProjectId) -> Result<Vec<FileMetadata>, ClientError> {
        #[derive(Deserialize)]
        struct Listing {
            files: Vec<FileMetadata>,
        }
        let resp = self
            .gateway
            .get(&format!("/api/projects/{project}/files"))
            .await?;
        Ok(resp.json::<Listing>().await?.files)
    }

    pub async fn delete_file(
        &self,
        project: &ProjectId,
        file: &FileId,
    ) -> Result<(), ClientError> {
        self.gateway
            .delete(&format!("/api/projects/{project}/files/{file}"))
            .await?;
        Ok(())
    }

    /// Backend health summary; also useful as a connectivity probe.
    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        Ok(self.gateway.get("/api/health").await?.json().await?)
    }
}

#[async_trait]
impl BackendRegistrar for ApiClient {
    async fn register_account(
        &self,
        account: &NewAccount,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        ApiClient::register_account(self, account).await?;
        Ok(())
    }
}
