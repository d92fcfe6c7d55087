//! Prompt assembly collaborators.
//!
//! The engine asks a [`PromptAssembly`] for each step's *base* prompt and
//! then layers dependency outputs, retry feedback and discussion notes on
//! top of it. Where base prompts come from (files, a database, a UI) is the
//! collaborator's business.

use crate::workflow::Step;
use async_trait::async_trait;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while producing a base prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Template render error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("No prompt available for step '{0}'")]
    Missing(String),

    #[error("Prompt error: {0}")]
    Other(String),
}

/// The project a workflow belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ProjectRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-call options passed alongside the step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOptions {
    pub workflow_id: String,
    pub initial_input: Option<String>,
    pub iteration: u32,
}

/// Source of base prompts.
#[async_trait]
pub trait PromptAssembly: Send + Sync {
    async fn base_prompt(
        &self,
        step_id: &str,
        step: &Step,
        project: &ProjectRecord,
        options: &PromptOptions,
    ) -> Result<String, PromptError>;
}

const DEFAULT_TEMPLATE: &str = "\
{% if project.name %}Project: {{ project.name }}\n{% endif %}\
{% if project.description %}{{ project.description }}\n{% endif %}\
\nTask: {{ step.name }}\n\
{% if input %}\nInput:\n{{ input }}\n{% endif %}";

/// Renders per-step minijinja templates.
///
/// Templates see `step`, `project`, `options` and `input` (the step input,
/// or the run's initial input when the step has none).
///
/// ```rust
/// use llm_stepflow::prompt::TemplatePromptAssembly;
///
/// let assembly = TemplatePromptAssembly::new()
///     .with_template("outline", "Outline a book about {{ input }}.");
/// assert!(assembly.has_template("outline"));
/// ```
#[derive(Debug, Clone)]
pub struct TemplatePromptAssembly {
    templates: HashMap<String, String>,
    fallback: Option<String>,
}

impl Default for TemplatePromptAssembly {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplatePromptAssembly {
    /// Creates an assembly using the built-in template for every step.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            fallback: Some(DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn with_template(mut self, step_id: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(step_id.into(), template.into());
        self
    }

    /// Replaces the template used for steps without their own.
    pub fn with_fallback(mut self, template: impl Into<String>) -> Self {
        self.fallback = Some(template.into());
        self
    }

    /// Requires every step to have its own template.
    pub fn strict(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn has_template(&self, step_id: &str) -> bool {
        self.templates.contains_key(step_id)
    }

    fn render(
        template: &str,
        step: &Step,
        project: &ProjectRecord,
        options: &PromptOptions,
    ) -> Result<String, PromptError> {
        let input = if step.input().is_empty() {
            options.initial_input.clone().unwrap_or_default()
        } else {
            step.input().to_string()
        };

        let env = Environment::new();
        let tmpl = env.template_from_str(template)?;
        let rendered = tmpl.render(context! {
            step => step,
            project => project,
            options => options,
            input => input,
        })?;
        Ok(rendered.trim().to_string())
    }
}

#[async_trait]
impl PromptAssembly for TemplatePromptAssembly {
    async fn base_prompt(
        &self,
        step_id: &str,
        step: &Step,
        project: &ProjectRecord,
        options: &PromptOptions,
    ) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(step_id)
            .or(self.fallback.as_ref())
            .ok_or_else(|| PromptError::Missing(step_id.to_string()))?;
        Self::render(template, step, project, options)
    }
}
