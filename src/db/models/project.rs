//! Client projects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_empty, set_if_some};
use crate::db::store::{Entity, FieldValue, Fields, NewRecord, PatchRecord};
use crate::error::CoreResult;
use crate::validation::{check, parse_iso_date, require};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
    OnHold,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::OnHold => write!(f, "on-hold"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "on-hold" => Ok(ProjectStatus::OnHold),
            _ => Err(format!("Unknown project status: {}", s)),
        }
    }
}

impl From<ProjectStatus> for FieldValue {
    fn from(status: ProjectStatus) -> Self {
        FieldValue::from(status.to_string())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub client_id: String,
    pub status: ProjectStatus,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Project {
    const TABLE: &'static str = "projects";
    const KIND: &'static str = "Project";
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "description"];
    const SORT_COLUMNS: &'static [&'static str] = &[
        "created_at",
        "updated_at",
        "title",
        "status",
        "start_date",
        "end_date",
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

fn check_optional_date(field: &str, value: &Option<String>) -> CoreResult<()> {
    if let Some(date) = value.as_deref().filter(|d| !d.is_empty()) {
        check(field, parse_iso_date(date).map(|_| ()))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub client_id: String,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl NewRecord for NewProject {
    type Entity = Project;

    fn validate(&self) -> CoreResult<()> {
        require("title", &self.title)?;
        require("clientId", &self.client_id)?;
        check_optional_date("startDate", &self.start_date)?;
        check_optional_date("endDate", &self.end_date)
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("title", FieldValue::from(self.title.trim())),
            ("description", FieldValue::from(non_empty(self.description))),
            ("client_id", FieldValue::from(self.client_id)),
            ("status", FieldValue::from(self.status.unwrap_or_default())),
            ("start_date", FieldValue::from(non_empty(self.start_date))),
            ("end_date", FieldValue::from(non_empty(self.end_date))),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub client_id: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl PatchRecord for ProjectPatch {
    type Entity = Project;

    fn validate(&self) -> CoreResult<()> {
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        if let Some(client_id) = &self.client_id {
            require("clientId", client_id)?;
        }
        check_optional_date("startDate", &self.start_date)?;
        check_optional_date("endDate", &self.end_date)
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "title", self.title);
        set_if_some(&mut fields, "description", self.description);
        set_if_some(&mut fields, "client_id", self.client_id);
        set_if_some(&mut fields, "status", self.status);
        set_if_some(&mut fields, "start_date", self.start_date);
        set_if_some(&mut fields, "end_date", self.end_date);
        Ok(fields)
    }
}
