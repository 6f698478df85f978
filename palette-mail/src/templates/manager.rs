//! Template manager for CRUD operations

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PaletteError, Result};
use crate::templates::builtin::{builtin_template, builtin_templates};
use crate::templates::compiler::TemplateCompiler;
use crate::templates::types::{
    Block, CreateTemplateRequest, EmailTemplate, UpdateTemplateRequest,
};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, description, subject, html, variables, default_values,
           blocks, is_public, owner_id, created_at, updated_at
    FROM email_templates
"#;

/// Manages user templates with database persistence.
///
/// Built-in templates are never stored; they are merged in on read.
#[derive(Clone)]
pub struct TemplateManager {
    db: SqlitePool,
}

impl TemplateManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the templates table
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS email_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL,
                html TEXT NOT NULL,
                variables TEXT NOT NULL,
                default_values TEXT NOT NULL,
                blocks TEXT,
                is_public BOOLEAN NOT NULL DEFAULT 0,
                owner_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_owner ON email_templates(owner_id)")
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Create a template owned by `owner_id`
    pub async fn create(
        &self,
        owner_id: &str,
        request: CreateTemplateRequest,
    ) -> Result<EmailTemplate> {
        if request.name.trim().is_empty() {
            return Err(PaletteError::Validation("Template name is required".to_string()));
        }
        if request.subject.trim().is_empty() {
            return Err(PaletteError::Validation("Template subject is required".to_string()));
        }
        warn_unterminated(&request.name, &request.subject, &request.html);

        let now = Utc::now();
        let variables = resolve_variables(
            request.variables,
            request.blocks.as_deref(),
            &request.subject,
            &request.html,
        );

        let template = EmailTemplate {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            subject: request.subject,
            html: request.html,
            variables,
            default_values: request.default_values,
            blocks: request.blocks,
            is_public: request.is_public,
            owner_id: Some(owner_id.to_string()),
            created_at: Some(now),
            updated_at: Some(now),
        };

        sqlx::query(
            r#"
            INSERT INTO email_templates (
                id, name, description, subject, html, variables, default_values,
                blocks, is_public, owner_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.subject)
        .bind(&template.html)
        .bind(serde_json::to_string(&template.variables)?)
        .bind(serde_json::to_string(&template.default_values)?)
        .bind(blocks_json(template.blocks.as_deref())?)
        .bind(template.is_public)
        .bind(owner_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        info!("Template {} created by {}", template.id, owner_id);
        Ok(template)
    }

    /// Get a stored template by ID, ignoring ownership
    pub async fn get(&self, id: &str) -> Result<Option<EmailTemplate>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(row_to_template).transpose()
    }

    /// Resolve a template the user may read: built-in, own, or public
    pub async fn get_for_user(&self, id: &str, user_id: &str) -> Result<EmailTemplate> {
        if let Some(template) = builtin_template(id) {
            return Ok(template);
        }

        match self.get(id).await? {
            Some(template)
                if template.is_public || template.owner_id.as_deref() == Some(user_id) =>
            {
                Ok(template)
            }
            _ => Err(PaletteError::NotFound(format!("Template not found: {}", id))),
        }
    }

    /// Built-in templates followed by the user's own and other users' public ones
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<EmailTemplate>> {
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = ? OR is_public = 1 ORDER BY updated_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut templates = builtin_templates();
        for row in rows {
            templates.push(row_to_template(row)?);
        }
        Ok(templates)
    }

    /// Apply a partial update to a template owned by `user_id`
    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        request: UpdateTemplateRequest,
    ) -> Result<EmailTemplate> {
        let mut template = self.owned(id, user_id).await?;

        if let Some(name) = request.name {
            template.name = name;
        }
        if let Some(description) = request.description {
            template.description = description;
        }
        if let Some(subject) = request.subject {
            template.subject = subject;
        }
        if let Some(html) = request.html {
            template.html = html;
        }
        if let Some(default_values) = request.default_values {
            template.default_values = default_values;
        }
        if let Some(is_public) = request.is_public {
            template.is_public = is_public;
        }

        let blocks_changed = request.blocks.is_some();
        if let Some(blocks) = request.blocks {
            template.blocks = Some(blocks);
        }
        if blocks_changed || request.variables.is_some() {
            template.variables = resolve_variables(
                request.variables.unwrap_or_default(),
                template.blocks.as_deref(),
                &template.subject,
                &template.html,
            );
        }
        warn_unterminated(&template.name, &template.subject, &template.html);

        let now = Utc::now();
        template.updated_at = Some(now);

        sqlx::query(
            r#"
            UPDATE email_templates
            SET name = ?, description = ?, subject = ?, html = ?, variables = ?,
                default_values = ?, blocks = ?, is_public = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.subject)
        .bind(&template.html)
        .bind(serde_json::to_string(&template.variables)?)
        .bind(serde_json::to_string(&template.default_values)?)
        .bind(blocks_json(template.blocks.as_deref())?)
        .bind(template.is_public)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(template)
    }

    /// Delete a template owned by `user_id`
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<()> {
        self.owned(id, user_id).await?;

        sqlx::query("DELETE FROM email_templates WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        info!("Template {} deleted by {}", id, user_id);
        Ok(())
    }

    async fn owned(&self, id: &str, user_id: &str) -> Result<EmailTemplate> {
        if builtin_template(id).is_some() {
            return Err(PaletteError::Forbidden(
                "Built-in templates cannot be modified".to_string(),
            ));
        }

        let template = self
            .get(id)
            .await?
            .ok_or_else(|| PaletteError::NotFound(format!("Template not found: {}", id)))?;

        if template.owner_id.as_deref() != Some(user_id) {
            return Err(PaletteError::Forbidden("Not owner of this template".to_string()));
        }
        Ok(template)
    }
}

/// Blocks win over declared variables; with neither, markers are read from
/// subject and HTML.
fn resolve_variables(
    declared: Vec<String>,
    blocks: Option<&[Block]>,
    subject: &str,
    html: &str,
) -> Vec<String> {
    if let Some(blocks) = blocks {
        return TemplateCompiler::extract_variables(blocks);
    }
    if !declared.is_empty() {
        return declared;
    }

    let mut variables = TemplateCompiler::extract_from_text(subject);
    for name in TemplateCompiler::extract_from_text(html) {
        if !variables.contains(&name) {
            variables.push(name);
        }
    }
    variables
}

fn warn_unterminated(name: &str, subject: &str, html: &str) {
    let subject_offsets = TemplateCompiler::lint_pattern(subject);
    let html_offsets = TemplateCompiler::lint_pattern(html);
    if !subject_offsets.is_empty() || !html_offsets.is_empty() {
        warn!(
            template = name,
            ?subject_offsets,
            ?html_offsets,
            "Template has unterminated markers"
        );
    }
}

fn blocks_json(blocks: Option<&[Block]>) -> Result<Option<String>> {
    Ok(blocks.map(serde_json::to_string).transpose()?)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| PaletteError::Parse(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc))
}

fn row_to_template(row: SqliteRow) -> Result<EmailTemplate> {
    let variables: String = row.try_get("variables")?;
    let default_values: String = row.try_get("default_values")?;
    let blocks: Option<String> = row.try_get("blocks")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(EmailTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        subject: row.try_get("subject")?,
        html: row.try_get("html")?,
        variables: serde_json::from_str(&variables)?,
        default_values: serde_json::from_str::<HashMap<String, String>>(&default_values)?,
        blocks: blocks.as_deref().map(serde_json::from_str).transpose()?,
        is_public: row.try_get("is_public")?,
        owner_id: Some(row.try_get("owner_id")?),
        created_at: Some(parse_timestamp(&created_at)?),
        updated_at: Some(parse_timestamp(&updated_at)?),
    })
}
