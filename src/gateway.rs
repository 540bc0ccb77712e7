//! Remote API boundary
//!
//! The orchestrator talks to the backend only through [`AuthGateway`]. Every
//! call that needs authorization takes the bearer token as an argument: the
//! gateway holds no credential of its own, so a user-slot request can never
//! go out carrying the admin slot's token or the other way round.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::*;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

/// Read the body of a response, returning a status error if it is not 2xx
macro_rules! check_response {
    ($response:expr) => {{
        let status = $response.status();
        let body = $response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        body
    }};
}

/// Authentication endpoints of the storefront API
pub trait AuthGateway: Send + Sync + 'static {
    fn login(&self, credentials: &Credentials)
        -> impl Future<Output = Result<ApiEnvelope<AuthTokens>>> + Send;

    fn register(&self, request: &RegisterRequest)
        -> impl Future<Output = Result<ApiEnvelope<AuthTokens>>> + Send;

    fn logout(&self, bearer: &str)
        -> impl Future<Output = Result<ApiEnvelope<serde_json::Value>>> + Send;

    fn refresh_token(&self, refresh_token: &str)
        -> impl Future<Output = Result<ApiEnvelope<AuthTokens>>> + Send;

    fn get_profile(&self, bearer: &str)
        -> impl Future<Output = Result<ApiEnvelope<UserProfile>>> + Send;

    fn admin_login(&self, credentials: &Credentials)
        -> impl Future<Output = Result<ApiEnvelope<AdminTokens>>> + Send;
}

/// Unwrap an envelope into its payload.
///
/// `success: false` and a successful envelope without data both become a
/// rejection carrying the server message, or `fallback` when it is empty.
pub fn into_data<T>(envelope: ApiEnvelope<T>, fallback: &str) -> Result<T> {
    match envelope {
        ApiEnvelope {
            success: true,
            data: Some(data),
            ..
        } => Ok(data),
        envelope => Err(ClientError::Rejected {
            status: envelope.status_code,
            message: if envelope.message.is_empty() {
                fallback.to_string()
            } else {
                envelope.message
            },
        }),
    }
}

fn status_error(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .ok()
        .map(|envelope| envelope.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP Error: {}", status.as_u16()));
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

/// reqwest-backed gateway
#[derive(Clone)]
pub struct HttpGateway {
    config: ClientConfig,
    http_client: Client,
}

impl HttpGateway {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiEnvelope<T>> {
        let response = request.send().await?;
        debug!(url = %response.url(), status = %response.status(), "API response");
        let body = check_response!(response);
        serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("undecodable body: {e}")))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http_client.post(self.config.endpoint(path))
    }
}

impl AuthGateway for HttpGateway {
    async fn login(&self, credentials: &Credentials) -> Result<ApiEnvelope<AuthTokens>> {
        self.send(self.post("/auth/login").json(credentials)).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<ApiEnvelope<AuthTokens>> {
        self.send(self.post("/auth/register").json(request)).await
    }

    async fn logout(&self, bearer: &str) -> Result<ApiEnvelope<serde_json::Value>> {
        self.send(self.post("/auth/logout").bearer_auth(bearer)).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<ApiEnvelope<AuthTokens>> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.send(self.post("/auth/refresh").json(&request)).await
    }

    async fn get_profile(&self, bearer: &str) -> Result<ApiEnvelope<UserProfile>> {
        let request = self
            .http_client
            .get(self.config.endpoint("/auth/profile"))
            .bearer_auth(bearer);
        self.send(request).await
    }

    async fn admin_login(&self, credentials: &Credentials) -> Result<ApiEnvelope<AdminTokens>> {
        self.send(self.post("/admin/login").json(credentials)).await
    }
}
