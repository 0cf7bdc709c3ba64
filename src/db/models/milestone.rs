//! Project milestones.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_empty, set_if_some};
use crate::db::store::{Entity, FieldValue, Fields, NewRecord, PatchRecord};
use crate::error::CoreResult;
use crate::validation::{check, parse_iso_date, require};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum MilestoneStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MilestoneStatus::Pending => write!(f, "pending"),
            MilestoneStatus::InProgress => write!(f, "in-progress"),
            MilestoneStatus::Completed => write!(f, "completed"),
        }
    }
}

impl From<MilestoneStatus> for FieldValue {
    fn from(status: MilestoneStatus) -> Self {
        FieldValue::from(status.to_string())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub status: MilestoneStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Milestone {
    const TABLE: &'static str = "milestones";
    const KIND: &'static str = "Milestone";
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "description"];
    const SORT_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "due_date", "title", "status"];

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    /// Taken from the route, not the body
    #[serde(skip)]
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<MilestoneStatus>,
}

impl NewRecord for NewMilestone {
    type Entity = Milestone;

    fn validate(&self) -> CoreResult<()> {
        require("projectId", &self.project_id)?;
        require("title", &self.title)?;
        if let Some(due) = self.due_date.as_deref().filter(|d| !d.is_empty()) {
            check("dueDate", parse_iso_date(due).map(|_| ()))?;
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("project_id", FieldValue::from(self.project_id)),
            ("title", FieldValue::from(self.title.trim())),
            ("description", FieldValue::from(non_empty(self.description))),
            ("due_date", FieldValue::from(non_empty(self.due_date))),
            ("status", FieldValue::from(self.status.unwrap_or_default())),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<MilestoneStatus>,
}

impl PatchRecord for MilestonePatch {
    type Entity = Milestone;

    fn validate(&self) -> CoreResult<()> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(due) = self.due_date.as_deref().filter(|d| !d.is_empty()) {
            check("dueDate", parse_iso_date(due).map(|_| ()))?;
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "title", self.title);
        set_if_some(&mut fields, "description", self.description);
        set_if_some(&mut fields, "due_date", self.due_date);
        set_if_some(&mut fields, "status", self.status);
        Ok(fields)
    }
}
