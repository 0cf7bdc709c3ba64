//! Project file metadata. The bytes live in an external blob store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::store::{Entity, FieldValue, Fields, NewRecord};
use crate::error::{CoreError, CoreResult};
use crate::validation::{check, require, validate_url};

/// Which portal uploaded a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum UploaderKind {
    Admin,
    Client,
}

impl std::fmt::Display for UploaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploaderKind::Admin => write!(f, "admin"),
            UploaderKind::Client => write!(f, "client"),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: UploaderKind,
    pub uploaded_by_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for ProjectFile {
    const TABLE: &'static str = "project_files";
    const KIND: &'static str = "File";
    const SEARCH_COLUMNS: &'static [&'static str] = &["file_name", "file_type"];
    const SORT_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "file_name", "file_size"];

    fn id(&self) -> &str {
        &self.id
    }
}

/// File metadata as posted by either portal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileUpload {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: i64,
}

#[derive(Debug, Clone)]
pub struct NewProjectFile {
    pub project_id: String,
    pub upload: ProjectFileUpload,
    pub uploaded_by: UploaderKind,
    pub uploaded_by_id: String,
}

impl NewRecord for NewProjectFile {
    type Entity = ProjectFile;

    fn validate(&self) -> CoreResult<()> {
        require("projectId", &self.project_id)?;
        require("fileName", &self.upload.file_name)?;
        require("fileUrl", &self.upload.file_url)?;
        require("fileType", &self.upload.file_type)?;
        check("fileUrl", validate_url(&Some(self.upload.file_url.clone())))?;
        if self.upload.file_size < 0 {
            return Err(CoreError::validation("fileSize", "File size cannot be negative"));
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("project_id", FieldValue::from(self.project_id)),
            ("file_name", FieldValue::from(self.upload.file_name.trim())),
            ("file_url", FieldValue::from(self.upload.file_url)),
            ("file_type", FieldValue::from(self.upload.file_type)),
            ("file_size", FieldValue::from(self.upload.file_size)),
            ("uploaded_by", FieldValue::from(self.uploaded_by.to_string())),
            ("uploaded_by_id", FieldValue::from(self.uploaded_by_id)),
        ])
    }
}
