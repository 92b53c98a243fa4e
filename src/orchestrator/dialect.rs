//! Tool-definition shapes expected by different model providers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::registry::CapabilityDescriptor;

/// Target shape for [`tools_for`](super::FunctionCallOrchestrator::tools_for).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `tools/list` entries, unchanged.
    #[default]
    Mcp,
    /// `{name, description, input_schema}`.
    Anthropic,
    /// `{type: "function", function: {name, description, parameters}}`.
    #[serde(rename = "openai")]
    OpenAi,
    /// `{name, description, parameters}`.
    Gemini,
}

impl Dialect {
    /// Every dialect.
    pub const ALL: [Self; 4] = [Self::Mcp, Self::Anthropic, Self::OpenAi, Self::Gemini];

    /// Resolves a provider name. Unknown names fall back to [`Dialect::Mcp`].
    #[must_use]
    pub fn parse(provider: &str) -> Self {
        match provider.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Self::Anthropic,
            "openai" | "gpt" => Self::OpenAi,
            "gemini" | "google" => Self::Gemini,
            _ => Self::Mcp,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mcp => "mcp",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Converts one tool descriptor.
    #[must_use]
    pub fn convert(self, tool: &CapabilityDescriptor) -> Value {
        let schema = tool.input_schema.to_value();
        match self {
            Self::Mcp => tool.listing(),
            Self::Anthropic => json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": schema,
            }),
            Self::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": schema,
                },
            }),
            Self::Gemini => json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": schema,
            }),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a plain-text listing of tools and their parameters.
#[must_use]
pub fn render_documentation(tools: &[impl AsRef<CapabilityDescriptor>]) -> String {
    if tools.is_empty() {
        return "No tools available.".to_string();
    }

    let mut out = String::from("Available tools\n===============\n");
    for tool in tools {
        let tool = tool.as_ref();
        let _ = write!(out, "\n{}\n  {}\n", tool.name, tool.description);

        let schema = &tool.input_schema;
        if schema.properties.is_empty() {
            out.push_str("  Parameters: none\n");
            continue;
        }

        out.push_str("  Parameters:\n");
        for (name, prop) in &schema.properties {
            let presence = if schema.is_required(name) {
                "required"
            } else {
                "optional"
            };
            let _ = write!(out, "    - {name} ({}, {presence})", prop.kind.as_str());
            if let Some(description) = &prop.description {
                let _ = write!(out, ": {description}");
            }
            if let Some(allowed) = &prop.allowed {
                let values: Vec<String> = allowed.iter().map(Value::to_string).collect();
                let _ = write!(out, " [one of {}]", values.join(", "));
            }
            out.push('\n');
        }
    }
    out
}
