pub mod backend;
pub mod bigquery;

pub use backend::{FieldKind, JobHandle, QueryBackend, QueryOptions, ResultField, ResultPage};
pub use bigquery::{BigQueryBackend, BigQueryClient};
