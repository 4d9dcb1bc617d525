//! Session client: one freshly registered user and its bound activity client.

use crate::fixtures::activity_client::ActivityClient;
use crate::fixtures::auth_client::AuthClient;
use crate::fixtures::http_client::ClientError;
use crate::models::{Account, LoginResponse};
use crate::random::FixtureGenerator;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, instrument};

/// Default password for generated accounts.
pub const TEST_USER_PASSWORD: &str = "testTT22$$$";

/// Session bootstrap errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(#[source] ClientError),

    #[error("Login failed: {0}")]
    LoginFailed(#[source] ClientError),
}

/// One authenticated user.
///
/// Construction registers a new account and logs in; the resulting token is
/// bound to `activity` for the session's lifetime and never shared. Every
/// instance pays one registration and one login round trip.
#[derive(Debug)]
pub struct SessionClient {
    pub auth: AuthClient,
    pub activity: ActivityClient,
    account: Account,
}

impl SessionClient {
    /// Register and log in a random account.
    pub async fn new(
        base_url: impl Into<String>,
        generator: FixtureGenerator,
    ) -> Result<Self, SessionError> {
        let account = Account::new(generator.email(), TEST_USER_PASSWORD);
        Self::with_account(base_url, account, generator).await
    }

    /// Register and log in the given account.
    #[instrument(skip_all, fields(email = %account.email))]
    pub async fn with_account(
        base_url: impl Into<String>,
        account: Account,
        generator: FixtureGenerator,
    ) -> Result<Self, SessionError> {
        let base_url = base_url.into();
        let auth = AuthClient::new(base_url.clone());

        auth.registration(&account)
            .await
            .and_then(|response| response.expect_status(StatusCode::CREATED))
            .map_err(SessionError::RegistrationFailed)?;

        let login: LoginResponse = auth
            .login(&account)
            .await
            .and_then(|response| response.expect_status(StatusCode::OK))
            .and_then(|response| response.model())
            .map_err(SessionError::LoginFailed)?;

        info!("Session established");

        Ok(Self {
            activity: ActivityClient::new(base_url, login.token, generator),
            auth,
            account,
        })
    }

    /// Credentials this session registered with.
    pub fn account(&self) -> &Account {
        &self.account
    }
}
