//! Email templates
//!
//! Built-in and user templates with `{{variable}}` substitution, plus
//! variable discovery for visual-builder documents.

pub mod builtin;
pub mod compiler;
pub mod manager;
pub mod types;

pub use builtin::{builtin_template, builtin_templates};
pub use compiler::TemplateCompiler;
pub use manager::TemplateManager;
pub use types::{
    Bindings, Block, BlockType, CompiledTemplate, CreateTemplateRequest, EmailTemplate,
    UpdateTemplateRequest,
};
