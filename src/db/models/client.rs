//! Client accounts managed by staff.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_empty, set_if_some};
use crate::crypto::hash_password;
use crate::db::store::{Entity, FieldValue, Fields, NewRecord, PatchRecord};
use crate::error::CoreResult;
use crate::validation::{check, require, validate_email};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company_name: Option<String>,
    /// Absent until staff set a portal password
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Client {
    pub fn can_log_in(&self) -> bool {
        self.password_hash.is_some()
    }
}

impl Entity for Client {
    const TABLE: &'static str = "clients";
    const KIND: &'static str = "Client";
    const UNIQUE_KEY: Option<&'static str> = Some("email");
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "email", "company_name"];
    const SORT_COLUMNS: &'static [&'static str] = &[
        "created_at",
        "updated_at",
        "name",
        "email",
        "company_name",
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub company_name: Option<String>,
    /// Optional portal password
    pub password: Option<String>,
}

impl NewRecord for NewClient {
    type Entity = Client;

    fn validate(&self) -> CoreResult<()> {
        require("name", &self.name)?;
        check("email", validate_email(self.email.trim()))?;
        if let Some(password) = &self.password {
            require("password", password)?;
        }
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.email.trim().to_lowercase())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let password_hash = match non_empty(self.password) {
            Some(p) => Some(hash_password(&p)?),
            None => None,
        };
        Ok(vec![
            ("name", FieldValue::from(self.name.trim())),
            ("email", FieldValue::from(self.email.trim().to_lowercase())),
            ("company_name", FieldValue::from(non_empty(self.company_name))),
            ("password_hash", FieldValue::from(password_hash)),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub password: Option<String>,
}

impl PatchRecord for ClientPatch {
    type Entity = Client;

    fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(email) = &self.email {
            check("email", validate_email(email.trim()))?;
        }
        if let Some(password) = &self.password {
            require("password", password)?;
        }
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        self.email.as_ref().map(|e| e.trim().to_lowercase())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "name", self.name.map(|n| n.trim().to_string()));
        set_if_some(
            &mut fields,
            "email",
            self.email.map(|e| e.trim().to_lowercase()),
        );
        set_if_some(&mut fields, "company_name", self.company_name);
        if let Some(password) = self.password {
            fields.push(("password_hash", FieldValue::from(hash_password(&password)?)));
        }
        Ok(fields)
    }
}
