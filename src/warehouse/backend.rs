use async_trait::async_trait;

use crate::errors::QueryError;

/// How a result column's values are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    Record,
    /// Strings, numerics, timestamps and anything else kept as text.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultField {
    pub name: String,
    pub kind: FieldKind,
    pub repeated: bool,
}

/// Identifies a running or finished query job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub job_id: String,
    pub location: Option<String>,
}

/// One response of the query protocol.
///
/// Cell values use the REST wire shape: a string, `null`, an array of
/// `{"v": ..}` for repeated fields or `{"f": [..]}` for records.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub job: JobHandle,
    pub complete: bool,
    pub fields: Option<Vec<ResultField>>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Server-side wait per call, in milliseconds.
    pub timeout_ms: u64,
    pub location: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            location: None,
        }
    }
}

/// The two calls a query needs: submit, then fetch further results.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn start(
        &self,
        project_id: &str,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<ResultPage, QueryError>;

    async fn results(
        &self,
        project_id: &str,
        job: &JobHandle,
        page_token: Option<&str>,
        options: &QueryOptions,
    ) -> Result<ResultPage, QueryError>;
}
