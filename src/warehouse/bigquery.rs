//! BigQuery query execution on the `google-cloud-bigquery` SDK.
//!
//! `query` submits through `jobs.query` and, while the job is still running
//! or more pages remain, follows up with `jobs.getQueryResults` until the
//! whole result set is in memory. Errors returned by the SDK reach the caller
//! as [`QueryError::Warehouse`] untouched.

use std::sync::Arc;

use async_trait::async_trait;
use google_cloud_bigquery::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::job::get_query_results::GetQueryResultsRequest;
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::http::table::{TableFieldMode, TableFieldType, TableSchema};
use google_cloud_bigquery::http::tabledata::list::{Tuple, Value as WireValue};
use serde_json::{json, Value};

use super::backend::{FieldKind, JobHandle, QueryBackend, QueryOptions, ResultField, ResultPage};
use crate::config::BigQueryConfig;
use crate::errors::{AuthError, QueryError};
use crate::google::ServiceAccountKey;
use crate::models::{Cell, Table};

// ── SDK backend ───────────────────────────────────────────────

/// [`QueryBackend`] over the SDK's HTTP job API.
pub struct BigQueryBackend {
    client: Client,
}

impl BigQueryBackend {
    pub async fn connect(key: &ServiceAccountKey) -> Result<Self, QueryError> {
        let credentials: CredentialsFile = serde_json::from_value(key.to_key_file())
            .map_err(|e| QueryError::Connect(Box::new(e)))?;
        let (config, _) = ClientConfig::new_with_credentials(credentials)
            .await
            .map_err(|e| QueryError::Connect(Box::new(e)))?;
        let client = Client::new(config)
            .await
            .map_err(|e| QueryError::Connect(Box::new(e)))?;
        Ok(Self { client })
    }
}

fn timeout(options: &QueryOptions) -> Option<i64> {
    Some(i64::try_from(options.timeout_ms).unwrap_or(i64::MAX))
}

#[async_trait]
impl QueryBackend for BigQueryBackend {
    async fn start(
        &self,
        project_id: &str,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<ResultPage, QueryError> {
        let request = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            timeout_ms: timeout(options),
            location: options.location.clone().unwrap_or_default(),
            ..Default::default()
        };
        let resp = self.client.job().query(project_id, &request).await?;

        Ok(ResultPage {
            job: JobHandle {
                job_id: resp.job_reference.job_id,
                location: resp.job_reference.location,
            },
            complete: resp.job_complete,
            fields: resp.schema.as_ref().map(result_fields),
            rows: wire_rows(resp.rows),
            page_token: resp.page_token,
        })
    }

    async fn results(
        &self,
        project_id: &str,
        job: &JobHandle,
        page_token: Option<&str>,
        options: &QueryOptions,
    ) -> Result<ResultPage, QueryError> {
        let request = GetQueryResultsRequest {
            page_token: page_token.map(String::from),
            timeout_ms: timeout(options),
            location: job.location.clone().or_else(|| options.location.clone()),
            ..Default::default()
        };
        let resp = self
            .client
            .job()
            .get_query_results(project_id, &job.job_id, &request)
            .await?;

        Ok(ResultPage {
            job: JobHandle {
                job_id: resp.job_reference.job_id,
                location: resp.job_reference.location,
            },
            complete: resp.job_complete,
            fields: resp.schema.as_ref().map(result_fields),
            rows: wire_rows(resp.rows),
            page_token: resp.page_token,
        })
    }
}

fn field_kind(data_type: &TableFieldType) -> FieldKind {
    match data_type {
        TableFieldType::Integer | TableFieldType::Int64 => FieldKind::Integer,
        TableFieldType::Float | TableFieldType::Float64 => FieldKind::Float,
        TableFieldType::Boolean | TableFieldType::Bool => FieldKind::Boolean,
        TableFieldType::Record | TableFieldType::Struct => FieldKind::Record,
        _ => FieldKind::Other,
    }
}

fn result_fields(schema: &TableSchema) -> Vec<ResultField> {
    schema
        .fields
        .iter()
        .map(|field| ResultField {
            name: field.name.clone(),
            kind: field_kind(&field.data_type),
            repeated: matches!(field.mode, Some(TableFieldMode::Repeated)),
        })
        .collect()
}

fn wire_rows(rows: Option<Vec<Tuple>>) -> Vec<Vec<Value>> {
    rows.unwrap_or_default()
        .into_iter()
        .map(|tuple| tuple.f.into_iter().map(|cell| wire_value(cell.v)).collect())
        .collect()
}

/// Back to the REST shape so nested values keep their `v`/`f` structure.
fn wire_value(value: WireValue) -> Value {
    match value {
        WireValue::Null => Value::Null,
        WireValue::String(raw) => Value::String(raw),
        WireValue::Array(cells) => Value::Array(
            cells
                .into_iter()
                .map(|cell| json!({ "v": wire_value(cell.v) }))
                .collect(),
        ),
        WireValue::Struct(tuple) => {
            let f: Vec<Value> = tuple
                .f
                .into_iter()
                .map(|cell| json!({ "v": wire_value(cell.v) }))
                .collect();
            json!({ "f": f })
        }
    }
}

// ── Client ────────────────────────────────────────────────────

/// Runs SQL against one project with one set of credentials.
pub struct BigQueryClient {
    backend: Arc<dyn QueryBackend>,
    project_id: String,
    options: QueryOptions,
}

impl BigQueryClient {
    /// Build the SDK client from the configured key. The project comes from
    /// the config, else from the key.
    pub async fn connect(cfg: BigQueryConfig) -> Result<Self, QueryError> {
        let project_id = resolve_project(&cfg)?;
        let backend = BigQueryBackend::connect(&cfg.credentials).await?;
        tracing::info!(project_id = %project_id, location = ?cfg.location, "bigquery client ready");

        let options = QueryOptions {
            timeout_ms: cfg.timeout_ms,
            location: cfg.location.clone(),
        };
        Ok(Self::with_backend(Arc::new(backend), project_id).with_options(options))
    }

    pub fn with_backend(backend: Arc<dyn QueryBackend>, project_id: impl Into<String>) -> Self {
        Self {
            backend,
            project_id: project_id.into(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Execute `sql` (standard SQL) and return every row.
    pub async fn query(&self, sql: &str) -> Result<Table, QueryError> {
        tracing::debug!(project_id = %self.project_id, sql, "submitting query");

        let mut page = self.backend.start(&self.project_id, sql, &self.options).await?;
        let job = page.job.clone();
        let mut fields: Option<Vec<ResultField>> = None;
        let mut rows: Vec<Vec<Value>> = Vec::new();

        loop {
            let page_token = if page.complete {
                if fields.is_none() {
                    fields = page.fields.take();
                }
                rows.append(&mut page.rows);
                match page.page_token.take() {
                    Some(token) => Some(token),
                    None => break,
                }
            } else {
                None
            };

            if job.job_id.is_empty() {
                return Err(QueryError::Result(
                    "query response is missing jobReference".to_string(),
                ));
            }
            page = self
                .backend
                .results(&self.project_id, &job, page_token.as_deref(), &self.options)
                .await?;
        }

        let table = build_table(fields.unwrap_or_default(), rows)?;
        tracing::info!(
            project_id = %self.project_id,
            job_id = %job.job_id,
            rows = table.len(),
            "query complete"
        );
        Ok(table)
    }
}

fn resolve_project(cfg: &BigQueryConfig) -> Result<String, QueryError> {
    cfg.project_id
        .clone()
        .or_else(|| cfg.credentials.project_id.clone())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            AuthError::InvalidKey("no project_id configured and key carries none".to_string())
                .into()
        })
}

fn build_table(fields: Vec<ResultField>, rows: Vec<Vec<Value>>) -> Result<Table, QueryError> {
    let mut table = Table::new(fields.iter().map(|f| f.name.clone()));
    for row in rows {
        if row.len() != fields.len() {
            return Err(QueryError::Result(format!(
                "row has {} cells but result schema has {} fields",
                row.len(),
                fields.len()
            )));
        }
        let cells = fields
            .iter()
            .zip(row)
            .map(|(field, value)| convert_cell(field, value))
            .collect();
        table
            .push_row(cells)
            .map_err(|e| QueryError::Result(e.to_string()))?;
    }
    Ok(table)
}

fn convert_cell(field: &ResultField, value: Value) -> Cell {
    if value.is_null() {
        return Cell::Null;
    }
    if field.repeated || field.kind == FieldKind::Record {
        return Cell::Json(value);
    }

    let raw = match value {
        Value::String(raw) => raw,
        other => return Cell::Json(other),
    };
    match field.kind {
        FieldKind::Integer => raw.parse().map(Cell::Int).unwrap_or(Cell::Text(raw)),
        FieldKind::Float => raw.parse().map(Cell::Float).unwrap_or(Cell::Text(raw)),
        FieldKind::Boolean => match raw.as_str() {
            "true" => Cell::Bool(true),
            "false" => Cell::Bool(false),
            _ => Cell::Text(raw),
        },
        _ => Cell::Text(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: FieldKind, repeated: bool) -> ResultField {
        ResultField {
            name: name.into(),
            kind,
            repeated,
        }
    }

    fn config(project_id: Option<&str>) -> BigQueryConfig {
        let key =
            ServiceAccountKey::from_json(include_str!("../../tests/fixtures/service_account.json"))
                .unwrap();
        let mut cfg = BigQueryConfig::new(key);
        cfg.project_id = project_id.map(String::from);
        cfg
    }

    #[test]
    fn test_field_kind_maps_sdk_types() {
        assert_eq!(field_kind(&TableFieldType::Int64), FieldKind::Integer);
        assert_eq!(field_kind(&TableFieldType::Integer), FieldKind::Integer);
        assert_eq!(field_kind(&TableFieldType::Float64), FieldKind::Float);
        assert_eq!(field_kind(&TableFieldType::Bool), FieldKind::Boolean);
        assert_eq!(field_kind(&TableFieldType::Struct), FieldKind::Record);
        assert_eq!(field_kind(&TableFieldType::Timestamp), FieldKind::Other);
        assert_eq!(field_kind(&TableFieldType::String), FieldKind::Other);
    }

    #[test]
    fn test_wire_rows_keep_rest_shape() {
        let tuple: Tuple = serde_json::from_value(json!({
            "f": [
                {"v": "1"},
                {"v": null},
                {"v": [{"v": "a"}, {"v": "b"}]},
                {"v": {"f": [{"v": "x"}]}}
            ]
        }))
        .unwrap();

        let rows = wire_rows(Some(vec![tuple]));
        assert_eq!(
            rows,
            vec![vec![
                json!("1"),
                Value::Null,
                json!([{"v": "a"}, {"v": "b"}]),
                json!({"f": [{"v": "x"}]}),
            ]]
        );
        assert!(wire_rows(None).is_empty());
    }

    #[test]
    fn test_convert_scalar_types() {
        assert_eq!(convert_cell(&field("a", FieldKind::Integer, false), json!("42")), Cell::Int(42));
        assert_eq!(convert_cell(&field("a", FieldKind::Float, false), json!("1.5")), Cell::Float(1.5));
        assert_eq!(
            convert_cell(&field("a", FieldKind::Boolean, false), json!("true")),
            Cell::Bool(true)
        );
        assert_eq!(
            convert_cell(&field("a", FieldKind::Other, false), json!("1.7E9")),
            Cell::Text("1.7E9".into())
        );
        assert_eq!(convert_cell(&field("a", FieldKind::Other, false), json!(null)), Cell::Null);
    }

    #[test]
    fn test_convert_unparseable_integer_keeps_text() {
        assert_eq!(
            convert_cell(&field("a", FieldKind::Integer, false), json!("12x")),
            Cell::Text("12x".into())
        );
    }

    #[test]
    fn test_convert_nested_to_json() {
        let v = json!([{"v": "a"}, {"v": "b"}]);
        assert_eq!(
            convert_cell(&field("tags", FieldKind::Other, true), v.clone()),
            Cell::Json(v)
        );
        let r = json!({"f": [{"v": "1"}]});
        assert_eq!(convert_cell(&field("rec", FieldKind::Record, false), r.clone()), Cell::Json(r));
    }

    #[test]
    fn test_build_table_rejects_short_row() {
        let fields = vec![field("a", FieldKind::Other, false), field("b", FieldKind::Other, false)];
        let err = build_table(fields, vec![vec![json!("x")]]).unwrap_err();
        assert!(matches!(err, QueryError::Result(_)));
    }

    #[test]
    fn test_build_table_rejects_long_row() {
        let fields = vec![field("a", FieldKind::Other, false)];
        let err = build_table(fields, vec![vec![json!("x"), json!("EXTRA")]]).unwrap_err();
        match err {
            QueryError::Result(message) => {
                assert!(message.contains("2 cells"), "message: {}", message)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_prefers_config_then_key() {
        assert_eq!(resolve_project(&config(Some("analytics"))).unwrap(), "analytics");
        assert_eq!(resolve_project(&config(None)).unwrap(), "test-project");
        assert_eq!(
            resolve_project(&config(Some(""))).unwrap_err().to_string(),
            "invalid service account key: no project_id configured and key carries none"
        );
    }
}
