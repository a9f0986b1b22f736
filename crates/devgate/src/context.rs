//! Facts about the project that go into the system preamble.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

pub const HINTS_FILE: &str = ".devgatehints";

const README_SUMMARY_CHARS: usize = 300;
const MAX_LISTED_DEPENDENCIES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectContext {
    /// One line per detected fact, e.g. the package name or available scripts
    pub summary: Vec<String>,
    /// Operator supplied hints, local file first
    pub hints: Vec<String>,
}

impl ProjectContext {
    /// Inspect the project root, plus `~/.config/devgate/.devgatehints` when a home is given
    pub fn detect(root: &Path, home: Option<&Path>) -> Self {
        let mut summary = Vec::new();

        if let Ok(manifest) = fs::read_to_string(root.join("Cargo.toml")) {
            summary.push("[Rust Project Detected]".to_string());
            if let Some(name) = cargo_package_name(&manifest) {
                summary.push(format!("- Name: {}", name));
            }
        }

        if let Ok(content) = fs::read_to_string(root.join("package.json")) {
            summary.push("[Node.js Project Detected]".to_string());
            // An unparsable package.json still tells us what kind of project this is
            if let Ok(package) = serde_json::from_str::<Value>(&content) {
                summary.extend(describe_package_json(&package));
            }
        }

        if root.join("requirements.txt").exists() || root.join("pyproject.toml").exists() {
            summary.push("[Python Project Detected]".to_string());
        }

        if let Ok(readme) = fs::read_to_string(root.join("README.md")) {
            let excerpt: String = readme
                .chars()
                .take(README_SUMMARY_CHARS)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            summary.push(format!("[README Summary]: {}...", excerpt.trim_end()));
        }

        let mut hints = Vec::new();
        let mut hint_files = vec![root.join(HINTS_FILE)];
        if let Some(home) = home {
            hint_files.push(home.join(".config").join("devgate").join(HINTS_FILE));
        }
        for path in hint_files {
            if let Ok(content) = fs::read_to_string(&path) {
                if !content.trim().is_empty() {
                    hints.push(content.trim().to_string());
                }
            }
        }

        Self { summary, hints }
    }
}

fn cargo_package_name(manifest: &str) -> Option<String> {
    let mut in_package = false;
    for line in manifest.lines().map(str::trim) {
        if line.starts_with('[') {
            in_package = line == "[package]";
            continue;
        }
        if !in_package {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "name" {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

fn describe_package_json(package: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(name) = package.get("name").and_then(Value::as_str) {
        lines.push(format!("- Name: {}", name));
    }
    if let Some(scripts) = package.get("scripts").and_then(Value::as_object) {
        let names: Vec<&str> = scripts.keys().map(String::as_str).collect();
        lines.push(format!("- Scripts: {}", names.join(", ")));
    }
    if let Some(deps) = package.get("dependencies").and_then(Value::as_object) {
        let names: Vec<&str> = deps
            .keys()
            .take(MAX_LISTED_DEPENDENCIES)
            .map(String::as_str)
            .collect();
        lines.push(format!("- Main Deps: {}", names.join(", ")));
    }
    lines
}
