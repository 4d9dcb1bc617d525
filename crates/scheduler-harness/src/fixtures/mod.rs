//! Typed clients for the scheduling service's HTTP API.

pub mod activity_client;
pub mod auth_client;
pub mod http_client;
pub mod session;

pub use activity_client::ActivityClient;
pub use auth_client::AuthClient;
pub use http_client::{ApiResponse, Auth, ClientError, HttpClient};
pub use session::{SessionClient, SessionError};
