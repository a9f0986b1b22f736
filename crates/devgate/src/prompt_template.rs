use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::context::ProjectContext;
use crate::models::tool::Tool;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Everything the system preamble is rendered from
#[derive(Debug, Clone, Serialize)]
pub struct PreambleContext<'a> {
    pub root: String,
    pub tools: &'a [Tool],
    pub project: &'a ProjectContext,
}

pub fn render_system_preamble(context: &PreambleContext<'_>) -> Result<String, TeraError> {
    load_prompt(SYSTEM_TEMPLATE, context)
}

/// Renders the system preamble for a project, re-reading the project context each time
#[derive(Debug, Clone)]
pub struct Preamble {
    root: PathBuf,
    home: Option<PathBuf>,
}

impl Preamble {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            home: dirs::home_dir(),
        }
    }

    /// Override where operator-wide hints are looked up; None disables them
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn render(&self, tools: &[Tool]) -> Result<String, TeraError> {
        let project = ProjectContext::detect(&self.root, self.home.as_deref());
        render_system_preamble(&PreambleContext {
            root: self.root.display().to_string(),
            tools,
            project: &project,
        })
    }
}
