//! Shapes of the documents persisted in each collection.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStatement {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub statement: Value,
    #[serde(default)]
    pub references: Vec<Value>,
    #[serde(default)]
    pub voided: bool,
    /// Epoch milliseconds of the `stored` instant.
    pub stored_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Activity state or agent profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub agent: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
    /// UTF-8 text, or hex when `binary` is set.
    pub content: String,
    #[serde(default)]
    pub binary: bool,
    pub content_type: String,
    pub hash: String,
    pub stored_at: i64,
}

impl StoredDocument {
    pub fn set_content(&mut self, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.content = text.to_string();
                self.binary = false;
            }
            Err(_) => {
                self.content = hex::encode(bytes);
                self.binary = true;
            }
        }
    }

    pub fn content_bytes(&self) -> Result<Vec<u8>, AppError> {
        if self.binary {
            Ok(hex::decode(&self.content)?)
        } else {
            Ok(self.content.as_bytes().to_vec())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Epoch milliseconds; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredActivity {
    pub id: String,
    pub activity: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    pub sha2: String,
    pub content_type: String,
    pub length: u64,
    pub stored_at: i64,
}

pub fn to_document<T: Serialize>(record: &T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(record)?)
}

pub fn from_document<T: for<'de> Deserialize<'de>>(document: Value) -> Result<T, AppError> {
    Ok(serde_json::from_value(document)?)
}
