use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, ScoutError, ToolError};
use crate::message::ToolArguments;
use crate::schema::{self, ToolSchema};

/// A capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier, used as the registry key and the wire function name.
    fn name(&self) -> &str;

    /// Explains to the model when and how to use the tool.
    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterDefinition> {
        Vec::new()
    }

    /// Runs the tool. Implementations decode and check their own arguments.
    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    String,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
        }
    }
}

/// One input a tool accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub required: bool,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ParameterDefinition {
    /// An optional string parameter.
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: ParameterType::String,
            required: false,
            allowed_values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the parameter to a fixed set of values. Leave this off for very large
    /// domains; thousands of enum entries get the request truncated by the backend.
    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Reads this parameter as a non-empty string, failing when it is absent.
    pub fn string_argument<'a>(
        &self,
        arguments: &'a ToolArguments,
    ) -> std::result::Result<&'a str, ToolError> {
        self.optional_string_argument(arguments)?
            .ok_or_else(|| ToolError::MissingArgument(self.name.clone()))
    }

    /// Reads this parameter as a string. Absent, null and empty values yield `None`.
    pub fn optional_string_argument<'a>(
        &self,
        arguments: &'a ToolArguments,
    ) -> std::result::Result<Option<&'a str>, ToolError> {
        let value = match arguments.get(&self.name) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };
        let text = value.as_str().ok_or_else(|| ToolError::InvalidArgument {
            name: self.name.clone(),
            expected: self.kind.as_str().to_string(),
        })?;
        if text.is_empty() {
            return Ok(None);
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.iter().any(|candidate| candidate.as_str() == Some(text)) {
                let choices: Vec<String> = allowed
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect();
                return Err(ToolError::InvalidArgument {
                    name: self.name.clone(),
                    expected: format!("value (expected one of: {})", choices.join(", ")),
                });
            }
        }

        Ok(Some(text))
    }
}

/// The set of tools available to an agent.
///
/// Registration happens before any session starts; afterwards the registry is shared
/// read-only, so the translated schema is built once and reused.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    schemas: OnceLock<Vec<ToolSchema>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Binds the tool under its name. A later registration with the same name
    /// replaces the earlier one.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool registration shadows an earlier tool with the same name");
        }
        self.schemas = OnceLock::new();
    }

    /// Moves every tool of `other` into this registry.
    pub fn extend(&mut self, other: ToolRegistry) {
        for (_, tool) in other.tools {
            self.register_arc(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Wire schemas for every registered tool, ordered by name.
    pub fn schemas(&self) -> Result<&[ToolSchema]> {
        if let Some(schemas) = self.schemas.get() {
            return Ok(schemas);
        }

        let mut tools: Vec<&dyn Tool> = self.tools.values().map(|tool| tool.as_ref()).collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        let translated = schema::translate(&tools)?;
        debug!(tools = translated.len(), "translated tool schemas");

        Ok(self.schemas.get_or_init(|| translated))
    }

    pub async fn invoke(&self, name: &str, arguments: &ToolArguments) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ScoutError::ToolNotFound(name.to_string()))?;
        tool.call(arguments)
            .await
            .map_err(|source| ScoutError::ToolExecution {
                name: name.to_string(),
                source,
            })
    }
}
