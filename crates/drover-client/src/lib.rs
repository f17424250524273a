//! # drover-client
//!
//! Backend transport for the Drover session runtime.
//!
//! The runtime consumes the [`BackendClient`] trait: thread and run CRUD
//! plus a cancellable SSE event stream for one run. [`HttpBackendClient`]
//! is the production implementation against the REST + SSE backend API;
//! tests and embedders can substitute their own.

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod http;
pub mod sse;

pub use backend::{BackendClient, NewThread, RunEventStream, RunRequest};
pub use error::{ClientError, ClientResult};
pub use http::{HttpBackendClient, HttpClientConfig};
