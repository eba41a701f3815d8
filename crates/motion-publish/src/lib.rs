//! Artifact Publisher
//!
//! Uploads a rendered artifact under `<owner_id>/<job_id>/<filename>`,
//! marks it publicly readable and returns its permanent URL. The job
//! workspace is consumed by [`ArtifactPublisher::publish`] and deleted on
//! every exit path.

#![warn(unreachable_pub)]

pub mod error;
pub mod key;
pub mod publisher;
pub mod store;

pub use error::{PublishError, StoreError};
pub use key::{content_type_for, ObjectKey};
pub use publisher::{ArtifactPublisher, PublisherConfig};
pub use store::{HttpObjectStore, LocalObjectStore, ObjectStore, StorageConfig};
