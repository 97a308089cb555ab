//! Account service adapter
//!
//! Implements the `IdentityService` and `AvatarService` ports from the
//! `services` crate on top of the account/avatars REST API of the backend.
//! Session state lives where the backend puts it: in the session cookie kept
//! by the HTTP client's cookie store, mirrored in the `X-Fallback-Cookies`
//! header the backend returns for non-browser clients. The header value is
//! replayed on every request and can be persisted to resume the session in
//! a later process.

use std::time::Duration;

use async_trait::async_trait;
use config::ClientConfig;
use serde::Deserialize;
use services::auth::{
    AccountProfile, AvatarService, IdentityError, IdentityService, OAuthProvider, Session,
    SessionId, UserId,
};
use tokio::sync::RwLock;
use url::Url;

/// Response format version requested from the backend
pub const RESPONSE_FORMAT: &str = "1.6.0";

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const FALLBACK_COOKIES_HEADER: &str = "X-Fallback-Cookies";
const RESPONSE_FORMAT_HEADER: &str = "X-Appwrite-Response-Format";

/// Error payload returned by the backend
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}

/// HTTP client for the account service
pub struct AccountClient {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    origin: String,
    fallback_cookies: RwLock<Option<String>>,
}

impl AccountClient {
    pub fn new(config: &ClientConfig) -> Result<Self, IdentityError> {
        Url::parse(&config.endpoint)
            .map_err(|e| IdentityError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                IdentityError::RequestFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        tracing::info!(
            endpoint = %config.endpoint,
            project_id = %config.project_id,
            "Account service client initialized"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            origin: config.origin(),
            fallback_cookies: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url, IdentityError> {
        let raw = format!("{}{}", self.endpoint, path);
        Url::parse(&raw).map_err(|e| IdentityError::InvalidUrl(format!("{raw}: {e}")))
    }

    /// Build a request carrying the project, origin and session headers
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, IdentityError> {
        let mut builder = self
            .client
            .request(method, self.url(path)?)
            .header(PROJECT_HEADER, &self.project_id)
            .header(RESPONSE_FORMAT_HEADER, RESPONSE_FORMAT)
            .header(reqwest::header::ORIGIN, &self.origin);

        if let Some(cookies) = self.fallback_cookies.read().await.as_deref() {
            builder = builder.header(FALLBACK_COOKIES_HEADER, cookies);
        }
        Ok(builder)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IdentityError> {
        let response = builder
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;
        let response = Self::check_response(response).await?;

        let cookies = response
            .headers()
            .get(FALLBACK_COOKIES_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string);
        if let Some(cookies) = cookies {
            tracing::debug!("Session cookies received");
            self.remember_cookies(Some(cookies)).await;
        }
        Ok(response)
    }

    /// Check response status and extract the service error message if needed
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        let message = serde_json::from_str::<ServiceErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        Err(IdentityError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    async fn remember_cookies(&self, cookies: Option<String>) {
        *self.fallback_cookies.write().await = cookies;
    }

    /// Session cookies last returned by the backend, in `X-Fallback-Cookies` form
    pub async fn session_cookies(&self) -> Option<String> {
        self.fallback_cookies.read().await.clone()
    }

    /// Resume a session persisted by an earlier process
    pub async fn restore_session(&self, cookies: impl Into<String>) {
        let cookies = cookies.into();
        if !cookies.trim().is_empty() {
            self.remember_cookies(Some(cookies)).await;
        }
    }
}

#[async_trait]
impl IdentityService for AccountClient {
    async fn create_oauth2_token(
        &self,
        provider: OAuthProvider,
        redirect_uri: &str,
    ) -> Result<Option<Url>, IdentityError> {
        let mut url = self.url(&format!("/account/tokens/oauth2/{provider}"))?;
        url.query_pairs_mut()
            .append_pair("project", &self.project_id)
            .append_pair("success", redirect_uri);

        tracing::debug!(provider = %provider, "Built OAuth2 token URL");
        Ok(Some(url))
    }

    async fn create_session(
        &self,
        user_id: &UserId,
        secret: &str,
    ) -> Result<Option<Session>, IdentityError> {
        let request = self
            .request(reqwest::Method::POST, "/account/sessions/token")
            .await?
            .json(&serde_json::json!({
                "userId": user_id.0,
                "secret": secret,
            }));
        let body = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        if body.trim().is_empty() {
            tracing::warn!("Account service returned an empty session");
            return Ok(None);
        }

        let session: Session =
            serde_json::from_str(&body).map_err(|e| IdentityError::ParseError(e.to_string()))?;
        tracing::debug!(session_id = %session.id, "Session created");
        Ok(Some(session))
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), IdentityError> {
        let path = format!("/account/sessions/{session_id}");
        let request = self.request(reqwest::Method::DELETE, &path).await?;
        self.send(request).await?;

        if *session_id == SessionId::current() {
            self.remember_cookies(None).await;
        }
        Ok(())
    }

    async fn get(&self) -> Result<AccountProfile, IdentityError> {
        let request = self.request(reqwest::Method::GET, "/account").await?;
        self.send(request)
            .await?
            .json::<AccountProfile>()
            .await
            .map_err(|e| IdentityError::ParseError(e.to_string()))
    }
}

impl AvatarService for AccountClient {
    fn initials(&self, name: &str) -> Result<String, IdentityError> {
        let mut url = self.url("/avatars/initials")?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.project_id);
        Ok(url.to_string())
    }
}
