//! AWS Cloud Control toolkit.
//!
//! Lists resource identifiers of a given CloudFormation resource type and fetches the
//! full property document of a single resource.

use std::collections::HashSet;

use async_trait::async_trait;
use aws_sdk_cloudcontrol::error::DisplayErrorContext;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudformation::types::{RegistryType, Visibility};
use aws_sdk_cloudformation::Client as CloudFormationClient;
use tracing::info;

use crate::error::{Result, ScoutError, ToolError};
use crate::message::ToolArguments;
use crate::tool::{ParameterDefinition, Tool, ToolRegistry};

const PARAMETER_RESOURCE_TYPE: &str = "resource_type";
const PARAMETER_RESOURCE_IDENTIFIER: &str = "resource_identifier";
const LIST_TOOL_NAME: &str = "list_aws_resources";

/// Builds the list and get tools from shared SDK configuration.
///
/// Discovering the valid resource types pages through the public CloudFormation
/// registry, so this makes network calls.
pub async fn cloudcontrol_toolkit(sdk_config: &aws_config::SdkConfig) -> Result<ToolRegistry> {
    let cloudformation = CloudFormationClient::new(sdk_config);
    let cloudcontrol = CloudControlClient::new(sdk_config);

    let list = ListAwsResourcesTool::discover(&cloudformation, cloudcontrol.clone()).await?;
    info!(resource_types = list.valid_resource_types.len(), "discovered AWS resource types");

    let mut registry = ToolRegistry::new();
    registry.register(list);
    registry.register(GetAwsResourceTool::new(cloudcontrol));
    Ok(registry)
}

/// Every public resource type in the CloudFormation registry, e.g. `AWS::EC2::Instance`.
pub async fn public_resource_types(
    client: &CloudFormationClient,
) -> std::result::Result<Vec<String>, ToolError> {
    let mut pages = client
        .list_types()
        .visibility(Visibility::Public)
        .r#type(RegistryType::Resource)
        .into_paginator()
        .send();

    let mut resource_types = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|err| {
            ToolError::Failed(format!("error listing resource types: {}", DisplayErrorContext(&err)))
        })?;
        for summary in page.type_summaries() {
            if summary.r#type() != Some(&RegistryType::Resource) {
                continue;
            }
            if let Some(name) = summary.type_name() {
                resource_types.push(name.to_string());
            }
        }
    }
    Ok(resource_types)
}

fn resource_type_parameter(description: &str) -> ParameterDefinition {
    ParameterDefinition::string(PARAMETER_RESOURCE_TYPE, description).required()
}

pub struct ListAwsResourcesTool {
    client: CloudControlClient,
    valid_resource_types: HashSet<String>,
    resource_type: ParameterDefinition,
}

impl ListAwsResourcesTool {
    pub async fn discover(
        cloudformation: &CloudFormationClient,
        client: CloudControlClient,
    ) -> Result<Self> {
        let resource_types = public_resource_types(cloudformation)
            .await
            .map_err(|source| ScoutError::ToolExecution {
                name: LIST_TOOL_NAME.to_string(),
                source,
            })?;
        Ok(Self::with_resource_types(client, resource_types))
    }

    pub fn with_resource_types(
        client: CloudControlClient,
        resource_types: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            client,
            valid_resource_types: resource_types.into_iter().collect(),
            // No enum here: the full list of types is large enough to get the
            // request truncated.
            resource_type: resource_type_parameter(
                "The type of resource to list or retrieve. This is in the format of AWS::Service::ResourceType, for example AWS::EC2::Instance. Resource types always begin with `AWS::`.",
            ),
        }
    }
}

#[async_trait]
impl Tool for ListAwsResourcesTool {
    fn name(&self) -> &str {
        LIST_TOOL_NAME
    }

    fn description(&self) -> &str {
        "This tool retrieves a list of identifiers for all resources in AWS of a given type. The list is returned as a JSON array of strings, each of which is the identifier of a single resource."
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.resource_type.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        let resource_type = self.resource_type.string_argument(arguments)?;
        if !self.valid_resource_types.contains(resource_type) {
            return Err(ToolError::Failed(format!(
                "{resource_type} is not a valid resource type"
            )));
        }

        let mut pages = self
            .client
            .list_resources()
            .type_name(resource_type)
            .into_paginator()
            .send();

        let mut identifiers = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                ToolError::Failed(format!("error listing resources: {}", DisplayErrorContext(&err)))
            })?;
            identifiers.extend(
                page.resource_descriptions()
                    .iter()
                    .filter_map(|description| description.identifier())
                    .map(str::to_string),
            );
        }

        serde_json::to_string(&identifiers)
            .map_err(|err| ToolError::backend("error marshalling resource identifiers to JSON", err))
    }
}

pub struct GetAwsResourceTool {
    client: CloudControlClient,
    description: String,
    resource_type: ParameterDefinition,
    resource_identifier: ParameterDefinition,
}

impl GetAwsResourceTool {
    pub fn new(client: CloudControlClient) -> Self {
        Self {
            client,
            description: format!(
                "This tool allows all of the properties of a specific AWS resource to be retrieved.\n\
                 The tool returns a JSON object containing the resource's properties.\n\
                 You must provide both the {PARAMETER_RESOURCE_IDENTIFIER:?} and {PARAMETER_RESOURCE_TYPE:?} parameters.\n\
                 The {PARAMETER_RESOURCE_TYPE:?} parameter is the same resource type used for the {LIST_TOOL_NAME} tool."
            ),
            resource_type: resource_type_parameter(
                "The type of resource to retrieve. This is in the format of AWS::Service::ResourceType, for example AWS::EC2::Instance.",
            ),
            resource_identifier: ParameterDefinition::string(
                PARAMETER_RESOURCE_IDENTIFIER,
                "The identifier of the resource to retrieve.",
            )
            .required(),
        }
    }
}

#[async_trait]
impl Tool for GetAwsResourceTool {
    fn name(&self) -> &str {
        "get_aws_resource"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.resource_type.clone(), self.resource_identifier.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        let resource_type = self.resource_type.string_argument(arguments)?;
        let identifier = self.resource_identifier.string_argument(arguments)?;

        let output = self
            .client
            .get_resource()
            .type_name(resource_type)
            .identifier(identifier)
            .send()
            .await
            .map_err(|err| {
                ToolError::Failed(format!("error getting resource: {}", DisplayErrorContext(&err)))
            })?;

        output
            .resource_description()
            .and_then(|description| description.properties())
            .map(str::to_string)
            .ok_or_else(|| {
                ToolError::Failed(format!("resource {identifier} has no properties"))
            })
    }
}
