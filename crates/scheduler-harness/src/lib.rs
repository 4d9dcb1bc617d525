//! Scheduler API Test Harness
//!
//! Library side of the end-to-end suite for the scheduling service. It brings
//! up (or locates) the service and its stores, and gives scenarios typed,
//! session-aware clients for the service's HTTP API.
//!
//! # Modes
//!
//! - `IS_CONTAINERS=true`: a relational store, a cache store and the service
//!   image (`SERVER_IMAGE:SERVER_TAG`) are started on a run-scoped network and
//!   removed at the end of the run, service first.
//! - Otherwise: the service at `BASE_URL` is used as is.
//!
//! Either way the service must answer `GET {BASE_URL}/healthz` before the
//! first scenario runs.
//!
//! # Layout
//!
//! - [`config`]: environment-driven configuration
//! - [`random`]: seedable random fixture values
//! - [`models`]: request and response schemas
//! - [`fixtures`]: base, auth, activity and session clients
//! - [`readiness`]: health probe with backoff
//! - [`stack`]: network topology, container fixtures, provisioning strategies
//! - [`runner`]: scenario runner for `harness = false` test targets

pub mod config;
pub mod fixtures;
pub mod models;
pub mod random;
pub mod readiness;
pub mod runner;
pub mod stack;
