//! Project domain model.
//!
//! Projects are plain containers that tasks reference through `project_id`.
//! They carry no version and are never conditionally updated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Timestamp, uuid_identifier};

uuid_identifier! {
    /// Unique identifier for a project.
    ProjectId
}

/// A project grouping tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Project {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

impl Project {
    #[must_use]
    pub fn new(project_id: ProjectId, name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            project_id,
            name: name.into(),
            description: None,
            created_at: timestamp,
        }
    }

    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    /// Case-insensitive substring match on the project name.
    ///
    /// An empty or blank query matches every project.
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        needle.is_empty() || self.name.to_lowercase().contains(&needle)
    }
}
