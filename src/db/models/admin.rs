//! Staff accounts.

use serde::Serialize;
use sqlx::FromRow;

use crate::auth::Role;
use crate::crypto::hash_password;
use crate::db::store::{Entity, FieldValue, Fields, NewRecord};
use crate::error::{CoreError, CoreResult};
use crate::validation::{check, require, validate_email};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for AdminUser {
    const TABLE: &'static str = "admins";
    const KIND: &'static str = "Admin";
    const UNIQUE_KEY: Option<&'static str> = Some("email");
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "email"];
    const SORT_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "name", "email"];

    fn id(&self) -> &str {
        &self.id
    }
}

/// A staff account to create; the password is hashed on insert
#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: String,
}

impl NewRecord for NewAdminUser {
    type Entity = AdminUser;

    fn validate(&self) -> CoreResult<()> {
        require("name", &self.name)?;
        require("password", &self.password)?;
        check("email", validate_email(self.email.trim()))?;
        if !self.role.is_staff() {
            return Err(CoreError::validation(
                "role",
                format!("'{}' is not a staff role", self.role),
            ));
        }
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.email.trim().to_lowercase())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let password_hash = hash_password(&self.password)?;
        Ok(vec![
            ("email", FieldValue::from(self.email.trim().to_lowercase())),
            ("name", FieldValue::from(self.name.trim())),
            ("role", FieldValue::from(self.role.to_string())),
            ("password_hash", FieldValue::from(password_hash)),
        ])
    }
}
