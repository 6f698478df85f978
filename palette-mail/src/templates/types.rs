//! Template types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Variable name to replacement text
pub type Bindings = HashMap<String, String>;

/// Email template with `{{variable}}` markers in subject and HTML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    /// Slug for built-in templates, UUID for stored ones
    pub id: String,
    pub name: String,
    pub description: String,
    /// Subject pattern
    pub subject: String,
    /// HTML body pattern
    pub html: String,
    /// Declared variables, in display order
    pub variables: Vec<String>,
    /// Fallback values used when a binding is not supplied
    #[serde(default)]
    pub default_values: HashMap<String, String>,
    /// Visual-builder document the HTML was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
    #[serde(default)]
    pub is_public: bool,
    /// `None` for built-in templates
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EmailTemplate {
    pub fn is_builtin(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// Rendered subject and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledTemplate {
    pub subject: String,
    pub body: String,
}

/// Visual-builder block kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Heading,
    Image,
    Button,
    Divider,
    Spacer,
    #[serde(other)]
    Custom,
}

/// One block of a visual-builder document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Field name to value; only string values can hold markers
    #[serde(default)]
    pub content: Map<String, Value>,
}

/// Request to create a new template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub default_values: HashMap<String, String>,
    #[serde(default)]
    pub blocks: Option<Vec<Block>>,
    #[serde(default)]
    pub is_public: bool,
}

/// Request to update an existing template
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub variables: Option<Vec<String>>,
    pub default_values: Option<HashMap<String, String>>,
    pub blocks: Option<Vec<Block>>,
    pub is_public: Option<bool>,
}
