//! DNS lookup toolkit.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::ToolError;
use crate::message::ToolArguments;
use crate::tool::{ParameterDefinition, Tool, ToolRegistry};

const PARAMETER_DOMAIN: &str = "domain";

/// Create a toolkit with the DNS lookup tool.
pub fn dns_toolkit() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(DnsTool::default());
    registry
}

pub struct DnsTool {
    domain: ParameterDefinition,
}

impl Default for DnsTool {
    fn default() -> Self {
        Self {
            domain: ParameterDefinition::string(
                PARAMETER_DOMAIN,
                "The domain to get the DNS record for, e.g. google.com",
            )
            .required(),
        }
    }
}

#[async_trait]
impl Tool for DnsTool {
    fn name(&self) -> &str {
        "dns_record"
    }

    fn description(&self) -> &str {
        "Get the DNS record for a given domain"
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.domain.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let domain = self.domain.string_argument(arguments)?;

        let addrs = tokio::net::lookup_host((domain, 0))
            .await
            .map_err(|err| ToolError::backend("error resolving host", err))?;

        Ok(format_addresses(addrs.map(|addr| addr.ip())))
    }
}

/// One `* <addr>` line per distinct address, in resolver order.
fn format_addresses(addrs: impl IntoIterator<Item = IpAddr>) -> String {
    let mut seen = Vec::new();
    let mut out = String::new();
    for addr in addrs {
        if seen.contains(&addr) {
            continue;
        }
        seen.push(addr);
        out.push_str(&format!("* {addr}\n"));
    }
    out
}
