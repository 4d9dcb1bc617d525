//! Authentication client fixture for registration and login.

use crate::fixtures::http_client::{ApiResponse, Auth, ClientError, HttpClient};
use crate::models::Account;
use crate::readiness::HEALTH_PATH;

/// Registration endpoint, relative to the base URL.
const REGISTRATION_PATH: &str = "registration";

/// Login endpoint, relative to the base URL.
const LOGIN_PATH: &str = "login";

/// Client for the unauthenticated endpoints: accounts and health.
///
/// No session exists yet when these are called, so every request is sent
/// without an `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: HttpClient,
}

impl AuthClient {
    /// Create a new authentication client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(base_url),
        }
    }

    /// Get the base URL for the service.
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// `POST /registration` with the account as body.
    pub async fn registration(&self, account: &Account) -> Result<ApiResponse, ClientError> {
        self.http
            .post(REGISTRATION_PATH, account, Some(&Auth::Anonymous))
            .await
    }

    /// `POST /login` with the account as body.
    pub async fn login(&self, account: &Account) -> Result<ApiResponse, ClientError> {
        self.http
            .post(LOGIN_PATH, account, Some(&Auth::Anonymous))
            .await
    }

    /// `GET /healthz`.
    pub async fn health(&self) -> Result<ApiResponse, ClientError> {
        self.http
            .get(HEALTH_PATH, None, Some(&Auth::Anonymous))
            .await
    }
}
