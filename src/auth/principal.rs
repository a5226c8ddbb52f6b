use serde_json::{Value, json};

use crate::{
    auth::permissions::PermissionTable, errors::AppError, storage::models::StoredToken,
};

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    permissions: Vec<String>,
    home_page: String,
}

impl Principal {
    pub fn from_token(token: &StoredToken, table: &PermissionTable, home_page: &str) -> Self {
        Self {
            user_id: token.user_id.clone(),
            name: token.name.clone(),
            email: token.email.clone(),
            permissions: table.expand(token.permissions.as_slice()),
            home_page: home_page.to_string(),
        }
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|granted| granted == name)
    }

    pub fn require_permission(&self, name: &str) -> Result<(), AppError> {
        if self.has_permission(name) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Permission denied: {name} required")))
        }
    }

    pub fn require_any_permission(&self, names: &[&str]) -> Result<(), AppError> {
        if names.iter().any(|name| self.has_permission(name)) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Permission denied: one of {} required",
                names.join(", ")
            )))
        }
    }

    /// Agent recorded as `authority` on statements this principal submits.
    pub fn generate_authority(&self) -> Value {
        let mut authority = match &self.email {
            Some(email) => json!({
                "objectType": "Agent",
                "mbox": format!("mailto:{email}"),
            }),
            None => json!({
                "objectType": "Agent",
                "account": { "homePage": self.home_page, "name": self.user_id },
            }),
        };
        if let Some(name) = &self.name {
            authority["name"] = Value::String(name.clone());
        }
        authority
    }
}
