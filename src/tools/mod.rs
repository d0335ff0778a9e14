//! Concrete toolkits the binaries register with the agent.

#[cfg(feature = "aws")]
pub mod aws;
pub mod dns;
#[cfg(feature = "steampipe")]
pub mod steampipe;

#[cfg(feature = "aws")]
pub use aws::{cloudcontrol_toolkit, GetAwsResourceTool, ListAwsResourcesTool};
pub use dns::{dns_toolkit, DnsTool};
#[cfg(feature = "steampipe")]
pub use steampipe::{
    steampipe_toolkit, ExecuteAwsQueryTool, GetAwsTableSchemaTool, ListAwsTablesTool,
};
