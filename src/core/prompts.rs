// src/core/prompts.rs — Prompt templates
//
// Each prompt is a YAML file `{variants: {<name>: {prompt}}}`
// rendered with minijinja. Files in the override directory replace the
// bundled copies of the same name.

use std::collections::HashMap;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

use crate::infra::config::PromptsConfig;
use crate::infra::errors::CopilotError;
use crate::infra::paths;

pub const PLANNER: &str = "layout_strategist";
pub const REVIEWER: &str = "reviewer";
pub const RETRIEVAL_CALL: &str = "retrieval_call";

const BUNDLED: &[(&str, &str)] = &[
    (PLANNER, include_str!("../../prompts/layout_strategist.yaml")),
    (REVIEWER, include_str!("../../prompts/reviewer.yaml")),
    (RETRIEVAL_CALL, include_str!("../../prompts/retrieval_call.yaml")),
];

#[derive(Debug, Clone, Deserialize)]
struct PromptFile {
    variants: HashMap<String, PromptVariant>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromptVariant {
    prompt: String,
}

#[derive(Debug, Serialize)]
pub struct PlannerVars<'a> {
    pub store_name: &'a str,
    pub city: &'a str,
    pub entrance_side: &'a str,
    pub trends_summary: &'a str,
    pub context: &'a str,
    pub format_instructions: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ReviewerVars<'a> {
    pub layout_json: &'a str,
    pub context: &'a str,
    pub format_instructions: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RetrievalCallVars<'a> {
    pub query: &'a str,
    pub top_k: usize,
}

/// Loaded prompt files plus the variant to render. Loaded once, then shared.
pub struct PromptLibrary {
    files: HashMap<String, PromptFile>,
    variant: String,
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptLibrary")
            .field("prompts", &self.files.keys().collect::<Vec<_>>())
            .field("variant", &self.variant)
            .finish()
    }
}

fn parse_file(name: &str, yaml: &str) -> Result<PromptFile, CopilotError> {
    serde_yml::from_str(yaml)
        .map_err(|e| CopilotError::Prompt(format!("prompt '{name}' is not valid YAML: {e}")))
}

impl PromptLibrary {
    /// Bundled prompts only, `default` variant.
    pub fn bundled() -> Result<Self, CopilotError> {
        Self::load(None, "default")
    }

    /// Honour `[prompts] dir` (falling back to `~/.layout-copilot/prompts` when
    /// it exists) and `[prompts] variant`.
    pub fn from_config(cfg: &PromptsConfig) -> Result<Self, CopilotError> {
        let default_dir = paths::prompts_dir();
        let dir = match &cfg.dir {
            Some(d) => Some(d.as_path()),
            None if default_dir.is_dir() => Some(default_dir.as_path()),
            None => None,
        };
        Self::load(dir, &cfg.variant)
    }

    pub fn load(override_dir: Option<&Path>, variant: &str) -> Result<Self, CopilotError> {
        let mut files = HashMap::new();

        for (name, yaml) in BUNDLED {
            let file = match override_dir.map(|d| d.join(format!("{name}.yaml"))) {
                Some(path) if path.is_file() => {
                    tracing::debug!(prompt = name, path = %path.display(), "Using prompt override");
                    parse_file(name, &std::fs::read_to_string(&path)?)?
                }
                _ => parse_file(name, yaml)?,
            };
            files.insert(name.to_string(), file);
        }

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let library = Self {
            files,
            variant: variant.to_string(),
            env,
        };
        // fail at startup, not mid-loop
        for (name, _) in BUNDLED {
            library.template(name)?;
        }
        Ok(library)
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Raw template text for `name` in the configured variant.
    pub fn template(&self, name: &str) -> Result<&str, CopilotError> {
        let file = self
            .files
            .get(name)
            .ok_or_else(|| CopilotError::Prompt(format!("prompt '{name}' not found")))?;
        file.variants
            .get(&self.variant)
            .map(|v| v.prompt.as_str())
            .ok_or_else(|| {
                CopilotError::Prompt(format!(
                    "prompt '{name}' has no variant '{}'",
                    self.variant
                ))
            })
    }

    pub fn render<S: Serialize>(&self, name: &str, vars: S) -> Result<String, CopilotError> {
        let template = self.template(name)?;
        self.env
            .render_str(template, vars)
            .map_err(|e| CopilotError::Prompt(format!("failed to render '{name}': {e}")))
    }

    pub fn planner(&self, vars: &PlannerVars<'_>) -> Result<String, CopilotError> {
        self.render(PLANNER, vars)
    }

    pub fn reviewer(&self, vars: &ReviewerVars<'_>) -> Result<String, CopilotError> {
        self.render(REVIEWER, vars)
    }

    pub fn retrieval_call(&self, vars: &RetrievalCallVars<'_>) -> Result<String, CopilotError> {
        self.render(RETRIEVAL_CALL, vars)
    }
}
