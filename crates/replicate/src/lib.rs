//! Replicate backend adapter.
//!
//! [`adapter::BackendAdapter`] is the service boundary the pipeline talks
//! to; [`adapter::ReplicateBackend`] implements it over the Replicate
//! HTTP API via [`api::ReplicateApi`].

pub mod adapter;
pub mod api;

pub use adapter::{BackendAdapter, BackendError, ReplicateBackend};
pub use api::{ReplicateApi, DEFAULT_API_URL};
