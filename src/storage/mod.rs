//! Object storage uploads.
//!
//! `ObjectUploader` computes the public URL from configuration and hands the
//! bytes to an [`ObjectSink`]: `S3Sink` in production, `ObjectStoreSink` for
//! local files and tests.

pub mod backend;
pub mod s3;
pub mod sigv4;
pub mod uploader;

pub use backend::{ObjectAcl, ObjectSink, ObjectStoreSink, PutRequest};
pub use s3::S3Sink;
pub use uploader::{ObjectUploader, StorageTarget};
