//! Core domain types for Parley.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the
//! application: the session layer, the request gateway, and the CLI.
//!
//! Wire-format note: the platform backend responds in camelCase and accepts
//! snake_case request bodies. Types that cross the wire carry the serde
//! renames matching that contract; timestamps are carried as the opaque
//! ISO-8601 strings the backend emits.

mod ids;
mod session;

pub use ids::{FileId, ProjectId};
pub use session::{AuthUser, NewAccount, SessionState};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string guaranteed to be non-empty after trimming.
///
/// Used where an empty value is meaningless on the wire (chat messages,
/// project names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat project: a named assistant persona scoped to one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
            Self::System => f.write_str("system"),
        }
    }
}

/// One entry of a project's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The authenticated user's profile as the backend records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

/// Metadata for an uploaded file. Listings never include file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "fileId")]
    pub file_id: FileId,
    #[serde(rename = "projectId", default)]
    pub project_id: Option<String>,
    pub filename: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    pub size: u64,
    #[serde(rename = "uploadedAt", default)]
    pub uploaded_at: Option<String>,
}

/// Backend acknowledgement of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(rename = "fileId")]
    pub file_id: FileId,
    pub filename: String,
    pub size: u64,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
}

/// Backend health summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Per-service status strings (`api`, `firestore`, `llm`, `auth`).
    #[serde(default)]
    pub services: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}
