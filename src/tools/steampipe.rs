//! Steampipe toolkit.
//!
//! Steampipe exposes cloud resources as foreign tables in a Postgres database, one
//! schema per plugin. These tools let the model discover the `aws` tables, inspect
//! their columns and run arbitrary SQL against them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Column, Row};
use tracing::debug;

use crate::error::{Result, ScoutError, ToolError};
use crate::message::ToolArguments;
use crate::tool::{ParameterDefinition, Tool, ToolRegistry};

const LIST_TABLES_QUERY: &str = "select foreign_table_name::text \
     from information_schema.foreign_tables \
     where foreign_table_schema = 'aws'";

const FILTERED_LIST_TABLES_QUERY: &str = "select foreign_table_name::text \
     from information_schema.foreign_tables \
     where foreign_table_schema = 'aws' and foreign_table_name like $1";

const TABLE_SCHEMA_QUERY: &str = "select column_name::text, data_type::text \
     from information_schema.columns \
     where table_name = $1 and table_schema = 'aws'";

/// Opens a pool against the Steampipe database and checks it answers.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await
        .map_err(|err| ScoutError::Storage(format!("failed to connect to Steampipe: {err}")))?;

    sqlx::query("select 1")
        .execute(&pool)
        .await
        .map_err(|err| ScoutError::Storage(format!("failed to ping Steampipe: {err}")))?;

    Ok(pool)
}

/// Registers the table listing, schema and query tools over one pool.
pub fn steampipe_toolkit(pool: PgPool) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ListAwsTablesTool::new(pool.clone()));
    registry.register(GetAwsTableSchemaTool::new(pool.clone()));
    registry.register(ExecuteAwsQueryTool::new(pool));
    registry
}

pub struct ListAwsTablesTool {
    pool: PgPool,
    filter: ParameterDefinition,
}

impl ListAwsTablesTool {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            filter: ParameterDefinition::string(
                "resource_type_filter",
                "The type of resource to filter by, e.g. \"ec2\" or \"s3\". Tables whose name contains this text are returned.",
            ),
        }
    }
}

#[async_trait]
impl Tool for ListAwsTablesTool {
    fn name(&self) -> &str {
        "list_aws_tables"
    }

    fn description(&self) -> &str {
        "Returns the list of tables containing AWS resources, as a JSON array of strings."
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.filter.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        let filter = self.filter.optional_string_argument(arguments)?;

        let tables: Vec<String> = match filter {
            Some(filter) => {
                sqlx::query_scalar::<_, String>(FILTERED_LIST_TABLES_QUERY)
                    .bind(format!("%{filter}%"))
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query_scalar::<_, String>(LIST_TABLES_QUERY).fetch_all(&self.pool).await,
        }
        .map_err(|err| ToolError::backend("error querying tables", err))?;

        if tables.is_empty() {
            return Err(ToolError::Failed("no resources found".into()));
        }
        debug!(filter = ?filter, tables = tables.len(), "listed tables");

        serde_json::to_string(&tables)
            .map_err(|err| ToolError::backend("error marshalling resources to JSON", err))
    }
}

pub struct GetAwsTableSchemaTool {
    pool: PgPool,
    resource_type: ParameterDefinition,
}

impl GetAwsTableSchemaTool {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            resource_type: ParameterDefinition::string(
                "resource_type",
                "The exact name of the resource table to get the schema for.",
            )
            .required(),
        }
    }
}

#[async_trait]
impl Tool for GetAwsTableSchemaTool {
    fn name(&self) -> &str {
        "get_aws_table_schema"
    }

    fn description(&self) -> &str {
        "Returns the schema for a given AWS resource table as a JSON object mapping each column name to its type."
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.resource_type.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        let resource_type = self.resource_type.string_argument(arguments)?;

        let columns: Vec<(String, String)> = sqlx::query_as(TABLE_SCHEMA_QUERY)
            .bind(resource_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ToolError::backend("error querying columns", err))?;

        if columns.is_empty() {
            return Err(ToolError::Failed(format!(
                "no columns found for resource type {resource_type}"
            )));
        }

        let schema: BTreeMap<String, String> = columns.into_iter().collect();
        serde_json::to_string(&schema)
            .map_err(|err| ToolError::backend("error marshalling columns to JSON", err))
    }
}

pub struct ExecuteAwsQueryTool {
    pool: PgPool,
    query: ParameterDefinition,
}

impl ExecuteAwsQueryTool {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query: ParameterDefinition::string("query", "The SQL query to execute.").required(),
        }
    }
}

#[async_trait]
impl Tool for ExecuteAwsQueryTool {
    fn name(&self) -> &str {
        "execute_aws_query"
    }

    fn description(&self) -> &str {
        "Executes arbitrary SQL queries against the AWS resources tables. The response is a JSON array of objects, one per row of the result set."
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.query.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
        let query = self.query.string_argument(arguments)?;

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ToolError::backend("error executing query", err))?;

        if rows.is_empty() {
            return Err(ToolError::Failed("no rows returned".into()));
        }

        let data: Vec<Value> = rows.iter().map(row_to_json).collect();
        serde_json::to_string(&data)
            .map_err(|err| ToolError::backend("error marshalling data to JSON", err))
    }
}

fn row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_to_json(row, i));
    }
    Value::Object(object)
}

/// Decodes one column into JSON by trying the Postgres types Steampipe tables use.
/// Types with no match come back as null.
fn column_to_json(row: &PgRow, i: usize) -> Value {
    macro_rules! try_decode {
        ($($ty:ty => $convert:expr),+ $(,)?) => {
            $(
                if let Ok(value) = row.try_get::<Option<$ty>, _>(i) {
                    return value.map($convert).unwrap_or(Value::Null);
                }
            )+
        };
    }

    try_decode!(
        bool => Value::from,
        i16 => Value::from,
        i32 => Value::from,
        i64 => Value::from,
        f32 => Value::from,
        f64 => Value::from,
        String => Value::from,
        Value => |v: Value| v,
        DateTime<Utc> => |v: DateTime<Utc>| Value::from(v.to_rfc3339()),
        NaiveDateTime => |v: NaiveDateTime| Value::from(v.to_string()),
        NaiveDate => |v: NaiveDate| Value::from(v.to_string()),
        Uuid => |v: Uuid| Value::from(v.to_string()),
    );
    Value::Null
}
