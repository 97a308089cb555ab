use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

// Domain ID types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Alias the account service resolves to the caller's own session
    pub fn current() -> Self {
        SessionId("current".to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity providers the account service can broker an OAuth2 grant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OAuthProvider {
    #[default]
    Google,
    Github,
    Apple,
    Microsoft,
    Facebook,
    Discord,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
            OAuthProvider::Apple => "apple",
            OAuthProvider::Microsoft => "microsoft",
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Discord => "discord",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "apple" => Ok(OAuthProvider::Apple),
            "microsoft" => Ok(OAuthProvider::Microsoft),
            "facebook" => Ok(OAuthProvider::Facebook),
            "discord" => Ok(OAuthProvider::Discord),
            other => Err(AuthError::UnsupportedProvider(other.to_string())),
        }
    }
}

// Domain models

/// Session issued by the account service once OAuth consent completes.
/// The account service owns its lifetime; the client only holds it for the
/// duration of the call that created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: SessionId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing)]
    pub secret: String,
}

/// Account record as returned by the account service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(rename = "$id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email_verification: bool,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub registration: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub prefs: serde_json::Value,
    /// Any other profile fields, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Profile combined with a locally derived avatar. Recomputed on every fetch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub profile: AccountProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.profile.id
    }
}

/// How a browser-mediated consent session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The browser was redirected to the callback URI
    Success { url: String },
    /// The user closed the session explicitly
    Cancel,
    /// The session was torn down without a redirect (timeout, app switch)
    Dismiss,
    /// The URL was handed to an external browser that cannot report back
    Opened,
    /// Another consent session is already in progress
    Locked,
}

impl BrowserOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserOutcome::Success { .. } => "success",
            BrowserOutcome::Cancel => "cancel",
            BrowserOutcome::Dismiss => "dismiss",
            BrowserOutcome::Opened => "opened",
            BrowserOutcome::Locked => "locked",
        }
    }
}

impl std::fmt::Display for BrowserOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

// Error types

/// Failures reported by the account service or the transport in front of it
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Account service request failed: {0}")]
    RequestFailed(String),

    #[error("Account service returned an error: {status} {message}")]
    ApiError { status: u16, message: String },

    #[error("Account service response parsing failed: {0}")]
    ParseError(String),

    #[error("Invalid account service URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to open browser: {0}")]
    Launch(String),

    #[error("Callback listener error: {0}")]
    Listener(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Account service did not return an OAuth URL")]
    MissingTokenUrl,

    #[error("Browser session ended with '{0}'")]
    ConsentNotCompleted(BrowserOutcome),

    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),

    #[error("Callback URL is missing the '{0}' parameter")]
    MissingCallbackParam(&'static str),

    #[error("Account service did not create a session")]
    SessionNotCreated,

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

// Collaborator traits

/// Account/identity operations of the backend service
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// URL the user must visit to grant access. `None` when the service
    /// produced nothing to open.
    async fn create_oauth2_token(
        &self,
        provider: OAuthProvider,
        redirect_uri: &str,
    ) -> Result<Option<Url>, IdentityError>;

    async fn create_session(
        &self,
        user_id: &UserId,
        secret: &str,
    ) -> Result<Option<Session>, IdentityError>;

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), IdentityError>;

    async fn get(&self) -> Result<AccountProfile, IdentityError>;
}

/// Opens a consent URL in a system-mediated browser session and waits for
/// a redirect to `redirect_uri` or for the session to end
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait BrowserSessionOpener: Send + Sync {
    async fn open(&self, url: &Url, redirect_uri: &str) -> Result<BrowserOutcome, BrowserError>;
}

/// Builds URIs that route back into the host application
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
pub trait DeepLinkResolver: Send + Sync {
    fn create_callback_url(&self, path: &str) -> String;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
pub trait AvatarService: Send + Sync {
    /// Initials-based avatar reference for a display name
    fn initials(&self, name: &str) -> Result<String, IdentityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert_eq!(" github ".parse::<OAuthProvider>().unwrap(), OAuthProvider::Github);
        assert!(matches!(
            "myspace".parse::<OAuthProvider>(),
            Err(AuthError::UnsupportedProvider(p)) if p == "myspace"
        ));
    }

    #[test]
    fn test_session_deserializes_service_payload() {
        let session: Session = serde_json::from_value(serde_json::json!({
            "$id": "5e5ea5c16897e",
            "$createdAt": "2020-10-15T06:38:00.000+00:00",
            "userId": "5e5bb8c16897e",
            "expire": "2020-10-15T06:38:00.000+00:00",
            "provider": "google",
            "current": true,
            "secret": ""
        }))
        .unwrap();

        assert_eq!(session.id, SessionId("5e5ea5c16897e".to_string()));
        assert_eq!(session.user_id, UserId("5e5bb8c16897e".to_string()));
        assert!(session.current);
        assert!(session.expire.is_some());
    }

    #[test]
    fn test_current_user_flattens_profile_and_extra_fields() {
        let profile: AccountProfile = serde_json::from_value(serde_json::json!({
            "$id": "u1",
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "emailVerification": true,
            "mfa": false
        }))
        .unwrap();
        assert_eq!(profile.extra.get("mfa"), Some(&serde_json::json!(false)));

        let user = CurrentUser {
            profile,
            avatar: Some("https://avatars.example/initials?name=Ada".to_string()),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["$id"], "u1");
        assert_eq!(json["emailVerification"], true);
        assert_eq!(json["mfa"], false);
        assert_eq!(json["avatar"], "https://avatars.example/initials?name=Ada");
    }

    #[test]
    fn test_browser_outcome_kind() {
        let success = BrowserOutcome::Success {
            url: "restate://?secret=a&userId=b".to_string(),
        };
        assert_eq!(success.to_string(), "success");
        assert_eq!(BrowserOutcome::Dismiss.kind(), "dismiss");
    }
}
