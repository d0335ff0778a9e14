//! Translation of tool parameter declarations into the function-calling wire format.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScoutError};
use crate::tool::{ParameterDefinition, ParameterType, Tool};

/// A function declaration as sent in the `tools` array of a chat request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: ParametersSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub required: Vec<String>,
    pub properties: BTreeMap<String, PropertySchema>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub description: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

/// Translates every tool, keeping the order given.
pub fn translate(tools: &[&dyn Tool]) -> Result<Vec<ToolSchema>> {
    tools.iter().map(|tool| translate_tool(*tool)).collect()
}

pub fn translate_tool(tool: &dyn Tool) -> Result<ToolSchema> {
    let name = tool.name();
    if name.trim().is_empty() {
        return Err(ScoutError::SchemaGeneration {
            tool: name.to_string(),
            reason: "tool name is empty".into(),
        });
    }

    let parameters = tool.parameters();
    let mut required = Vec::new();
    let mut properties = BTreeMap::new();
    let mut seen = HashSet::new();
    for parameter in &parameters {
        check_parameter(name, parameter)?;
        if !seen.insert(parameter.name.as_str()) {
            return Err(ScoutError::SchemaGeneration {
                tool: name.to_string(),
                reason: format!("parameter `{}` is declared more than once", parameter.name),
            });
        }

        if parameter.required {
            required.push(parameter.name.clone());
        }
        properties.insert(
            parameter.name.clone(),
            PropertySchema {
                kind: parameter.kind,
                description: parameter.description.clone(),
                allowed_values: parameter.allowed_values.clone(),
            },
        );
    }

    Ok(ToolSchema {
        kind: "function".into(),
        function: FunctionSchema {
            name: name.to_string(),
            description: tool.description().to_string(),
            parameters: ParametersSchema {
                kind: "object".into(),
                required,
                properties,
            },
        },
    })
}

fn check_parameter(tool: &str, parameter: &ParameterDefinition) -> Result<()> {
    let fail = |reason: String| ScoutError::SchemaGeneration {
        tool: tool.to_string(),
        reason,
    };

    if parameter.name.trim().is_empty() {
        return Err(fail("parameter name is empty".into()));
    }

    if let Some(values) = &parameter.allowed_values {
        if values.is_empty() {
            return Err(fail(format!(
                "parameter `{}` declares an empty enum",
                parameter.name
            )));
        }
        match parameter.kind {
            ParameterType::String => {
                if let Some(bad) = values.iter().find(|value| !value.is_string()) {
                    return Err(fail(format!(
                        "enum value {bad} of string parameter `{}` is not a string",
                        parameter.name
                    )));
                }
            }
        }
    }

    Ok(())
}
