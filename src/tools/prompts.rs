//! Built-in prompt templates.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{optional_str, required_str};
use crate::error::ToolError;
use crate::mcp::router::{PromptMessage, PromptProvider};
use crate::registry::{CapabilityDescriptor, InputSchema, PropertySchema};

/// `system_analysis`: frames a system analysis around the built-in tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAnalysis;

#[async_trait]
impl PromptProvider for SystemAnalysis {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::prompt(
            "system_analysis",
            "Prompt for a structured system analysis",
            InputSchema::object()
                .required_property(
                    "analysis_type",
                    PropertySchema::string("Type of analysis requested"),
                )
                .optional_property(
                    "urgency",
                    PropertySchema::string("Urgency level")
                        .one_of(["low", "medium", "high"])
                        .with_default("medium"),
                ),
        )
    }

    async fn render(&self, arguments: Map<String, Value>) -> Result<Vec<PromptMessage>, ToolError> {
        let analysis_type = required_str(&arguments, "analysis_type")?;
        let urgency = optional_str(&arguments, "urgency").unwrap_or("medium");

        Ok(vec![PromptMessage::user(format!(
            "Perform a {analysis_type} system analysis ({urgency} urgency).\n\
             \n\
             Tools: system_health, system_status, system_config.\n\
             Resources: system://status/runtime, system://config/capabilities.\n\
             \n\
             Start with system_health, check individual components with \
             system_status, and finish with concrete recommendations."
        ))])
    }
}

/// `troubleshooting`: guided troubleshooting for a described issue.
#[derive(Debug, Clone, Copy, Default)]
pub struct Troubleshooting;

#[async_trait]
impl PromptProvider for Troubleshooting {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::prompt(
            "troubleshooting",
            "Guided troubleshooting prompt",
            InputSchema::object()
                .required_property(
                    "issue_description",
                    PropertySchema::string("Description of the issue"),
                )
                .optional_property(
                    "affected_components",
                    PropertySchema::string("Comma-separated list of affected components"),
                ),
        )
    }

    async fn render(&self, arguments: Map<String, Value>) -> Result<Vec<PromptMessage>, ToolError> {
        let issue = required_str(&arguments, "issue_description")?;
        let components = optional_str(&arguments, "affected_components")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown");

        Ok(vec![PromptMessage::user(format!(
            "Troubleshoot: {issue}\n\
             Affected components: {components}\n\
             \n\
             1. Assess current state with system_health.\n\
             2. Check affected components with system_status.\n\
             3. Inspect failed work with list_operations.\n\
             4. Verify configuration with system_config.\n\
             \n\
             Gather data before drawing conclusions and give step-by-step resolution guidance."
        ))])
    }
}
