pub mod callback;
pub mod ports;

pub use callback::CallbackParams;
pub use ports::*;

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sequences the redirect-based OAuth login against the account service and
/// manages the resulting session.
///
/// The `try_*` methods report typed failures. `login`, `logout` and
/// `get_current_user` collapse every failure into `false` / `None` after
/// logging it, so UI callers never handle errors at this boundary.
#[derive(Clone)]
pub struct AuthGateway {
    identity: Arc<dyn IdentityService>,
    browser: Arc<dyn BrowserSessionOpener>,
    links: Arc<dyn DeepLinkResolver>,
    avatars: Arc<dyn AvatarService>,
    provider: OAuthProvider,
}

impl AuthGateway {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        browser: Arc<dyn BrowserSessionOpener>,
        links: Arc<dyn DeepLinkResolver>,
        avatars: Arc<dyn AvatarService>,
    ) -> Self {
        Self {
            identity,
            browser,
            links,
            avatars,
            provider: OAuthProvider::Google,
        }
    }

    pub fn with_provider(mut self, provider: OAuthProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    /// Run the full OAuth login sequence and return the created session
    pub async fn try_login(&self) -> Result<Session, AuthError> {
        let redirect_uri = self.links.create_callback_url("/");
        debug!(provider = %self.provider, redirect_uri = %redirect_uri, "Requesting OAuth2 token URL");

        let consent_url = self
            .identity
            .create_oauth2_token(self.provider, &redirect_uri)
            .await?
            .ok_or(AuthError::MissingTokenUrl)?;

        debug!("Opening consent page in browser session");
        let callback_url = match self.browser.open(&consent_url, &redirect_uri).await? {
            BrowserOutcome::Success { url } => url,
            outcome => return Err(AuthError::ConsentNotCompleted(outcome)),
        };

        let params = CallbackParams::from_url(&callback_url)?;
        debug!(user_id = %params.user_id, "Exchanging callback secret for a session");

        let session = self
            .identity
            .create_session(&params.user_id, &params.secret)
            .await?
            .ok_or(AuthError::SessionNotCreated)?;

        info!(user_id = %session.user_id, session_id = %session.id, "Login succeeded");
        Ok(session)
    }

    /// `true` only when every login step succeeded
    pub async fn login(&self) -> bool {
        match self.try_login().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Login failed");
                false
            }
        }
    }

    /// Delete the caller's current session
    pub async fn try_logout(&self) -> Result<(), AuthError> {
        self.identity.delete_session(&SessionId::current()).await?;
        info!("Logged out");
        Ok(())
    }

    pub async fn logout(&self) -> bool {
        match self.try_logout().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Logout failed");
                false
            }
        }
    }

    /// Fetch the account profile and attach an initials avatar.
    ///
    /// A profile without an id is returned as-is, without an avatar.
    pub async fn try_current_user(&self) -> Result<CurrentUser, AuthError> {
        let profile = self.identity.get().await?;

        if profile.id.is_empty() {
            debug!("Account profile has no id, returning it without avatar");
            return Ok(CurrentUser {
                profile,
                avatar: None,
            });
        }

        let avatar = self.avatars.initials(&profile.name)?;
        Ok(CurrentUser {
            profile,
            avatar: Some(avatar),
        })
    }

    pub async fn get_current_user(&self) -> Option<CurrentUser> {
        match self.try_current_user().await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Failed to fetch current user");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const REDIRECT: &str = "app://";

    fn links() -> MockDeepLinkResolver {
        let mut links = MockDeepLinkResolver::new();
        links
            .expect_create_callback_url()
            .withf(|path| path == "/")
            .returning(|_| REDIRECT.to_string());
        links
    }

    fn consent_url() -> Url {
        Url::parse("https://cloud.appwrite.io/v1/account/tokens/oauth2/google?project=p1").unwrap()
    }

    fn session() -> Session {
        Session {
            id: SessionId("s1".to_string()),
            user_id: UserId("123".to_string()),
            provider: "google".to_string(),
            expire: None,
            current: true,
            secret: String::new(),
        }
    }

    fn gateway(
        identity: MockIdentityService,
        browser: MockBrowserSessionOpener,
        avatars: MockAvatarService,
    ) -> AuthGateway {
        AuthGateway::new(
            Arc::new(identity),
            Arc::new(browser),
            Arc::new(links()),
            Arc::new(avatars),
        )
    }

    fn browser_returning(outcome: BrowserOutcome) -> MockBrowserSessionOpener {
        let mut browser = MockBrowserSessionOpener::new();
        browser
            .expect_open()
            .withf(|url, redirect| url.path().ends_with("/oauth2/google") && redirect == REDIRECT)
            .times(1)
            .returning(move |_, _| Ok(outcome.clone()));
        browser
    }

    fn identity_with_token() -> MockIdentityService {
        let mut identity = MockIdentityService::new();
        identity
            .expect_create_oauth2_token()
            .withf(|provider, redirect| *provider == OAuthProvider::Google && redirect == REDIRECT)
            .times(1)
            .returning(|_, _| Ok(Some(consent_url())));
        identity
    }

    #[tokio::test]
    async fn test_login_succeeds_when_every_step_succeeds() {
        let mut identity = identity_with_token();
        identity
            .expect_create_session()
            .withf(|user_id, secret| user_id.0 == "123" && secret == "abc")
            .times(1)
            .returning(|_, _| Ok(Some(session())));

        let gateway = gateway(
            identity,
            browser_returning(BrowserOutcome::Success {
                url: "app://?secret=abc&userId=123".to_string(),
            }),
            MockAvatarService::new(),
        );

        assert!(gateway.login().await);
    }

    #[tokio::test]
    async fn test_login_fails_without_token_url() {
        let mut identity = MockIdentityService::new();
        identity
            .expect_create_oauth2_token()
            .returning(|_, _| Ok(None));
        identity.expect_create_session().never();

        let mut browser = MockBrowserSessionOpener::new();
        browser.expect_open().never();

        let gateway = gateway(identity, browser, MockAvatarService::new());

        assert!(matches!(
            gateway.try_login().await,
            Err(AuthError::MissingTokenUrl)
        ));
        assert!(!gateway.login().await);
    }

    #[tokio::test]
    async fn test_login_fails_when_token_request_errors() {
        let mut identity = MockIdentityService::new();
        identity.expect_create_oauth2_token().returning(|_, _| {
            Err(IdentityError::RequestFailed("connection refused".to_string()))
        });

        let gateway = gateway(
            identity,
            MockBrowserSessionOpener::new(),
            MockAvatarService::new(),
        );

        assert!(!gateway.login().await);
    }

    #[tokio::test]
    async fn test_login_fails_on_non_success_browser_outcome() {
        for outcome in [
            BrowserOutcome::Cancel,
            BrowserOutcome::Dismiss,
            BrowserOutcome::Opened,
            BrowserOutcome::Locked,
        ] {
            let mut identity = identity_with_token();
            identity.expect_create_session().never();

            let gateway = gateway(
                identity,
                browser_returning(outcome.clone()),
                MockAvatarService::new(),
            );

            match gateway.try_login().await {
                Err(AuthError::ConsentNotCompleted(got)) => assert_eq!(got, outcome),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_login_fails_when_browser_errors() {
        let mut browser = MockBrowserSessionOpener::new();
        browser
            .expect_open()
            .returning(|_, _| Err(BrowserError::Launch("no browser".to_string())));

        let gateway = gateway(identity_with_token(), browser, MockAvatarService::new());

        assert!(matches!(
            gateway.try_login().await,
            Err(AuthError::Browser(BrowserError::Launch(_)))
        ));
    }

    #[tokio::test]
    async fn test_login_fails_when_callback_lacks_params() {
        for url in ["app://?userId=123", "app://?secret=abc", "app://"] {
            let mut identity = identity_with_token();
            identity.expect_create_session().never();

            let gateway = gateway(
                identity,
                browser_returning(BrowserOutcome::Success {
                    url: url.to_string(),
                }),
                MockAvatarService::new(),
            );

            assert!(matches!(
                gateway.try_login().await,
                Err(AuthError::MissingCallbackParam(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_login_fails_without_session() {
        let mut identity = identity_with_token();
        identity
            .expect_create_session()
            .times(1)
            .returning(|_, _| Ok(None));

        let gateway = gateway(
            identity,
            browser_returning(BrowserOutcome::Success {
                url: "app://?secret=abc&userId=123".to_string(),
            }),
            MockAvatarService::new(),
        );

        assert!(matches!(
            gateway.try_login().await,
            Err(AuthError::SessionNotCreated)
        ));
    }

    #[tokio::test]
    async fn test_login_uses_configured_provider() {
        let mut identity = MockIdentityService::new();
        identity
            .expect_create_oauth2_token()
            .withf(|provider, _| *provider == OAuthProvider::Github)
            .times(1)
            .returning(|_, _| Ok(None));

        let gateway = gateway(
            identity,
            MockBrowserSessionOpener::new(),
            MockAvatarService::new(),
        )
        .with_provider(OAuthProvider::Github);

        assert!(!gateway.login().await);
    }

    #[tokio::test]
    async fn test_logout() {
        let mut identity = MockIdentityService::new();
        identity
            .expect_delete_session()
            .withf(|id| id.0 == "current")
            .times(1)
            .returning(|_| Ok(()));

        let gateway = gateway(
            identity,
            MockBrowserSessionOpener::new(),
            MockAvatarService::new(),
        );
        assert!(gateway.logout().await);
    }

    #[tokio::test]
    async fn test_logout_failure_returns_false() {
        let mut identity = MockIdentityService::new();
        identity.expect_delete_session().returning(|_| {
            Err(IdentityError::ApiError {
                status: 401,
                message: "User (role: guests) missing scope (account)".to_string(),
            })
        });

        let gateway = gateway(
            identity,
            MockBrowserSessionOpener::new(),
            MockAvatarService::new(),
        );
        assert!(!gateway.logout().await);
    }

    #[tokio::test]
    async fn test_current_user_gets_initials_avatar() {
        let mut identity = MockIdentityService::new();
        identity.expect_get().returning(|| {
            Ok(AccountProfile {
                id: "u1".to_string(),
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                ..Default::default()
            })
        });

        let mut avatars = MockAvatarService::new();
        avatars
            .expect_initials()
            .withf(|name| name == "Ada Lovelace")
            .times(1)
            .returning(|name| Ok(format!("https://avatars.example/initials?name={name}")));

        let gateway = gateway(identity, MockBrowserSessionOpener::new(), avatars);

        let user = gateway.get_current_user().await.unwrap();
        assert_eq!(user.id(), "u1");
        assert_eq!(user.profile.email, "ada@example.com");
        assert_eq!(
            user.avatar.as_deref(),
            Some("https://avatars.example/initials?name=Ada Lovelace")
        );
    }

    #[tokio::test]
    async fn test_current_user_without_id_is_returned_raw() {
        let mut identity = MockIdentityService::new();
        identity.expect_get().returning(|| {
            Ok(AccountProfile {
                name: "Anonymous".to_string(),
                ..Default::default()
            })
        });

        let mut avatars = MockAvatarService::new();
        avatars.expect_initials().never();

        let gateway = gateway(identity, MockBrowserSessionOpener::new(), avatars);

        let user = gateway.get_current_user().await.unwrap();
        assert_eq!(user.profile.name, "Anonymous");
        assert!(user.avatar.is_none());
    }

    #[tokio::test]
    async fn test_current_user_failure_returns_none() {
        let mut identity = MockIdentityService::new();
        identity
            .expect_get()
            .returning(|| Err(IdentityError::ParseError("expected value".to_string())));

        let gateway = gateway(
            identity,
            MockBrowserSessionOpener::new(),
            MockAvatarService::new(),
        );
        assert!(gateway.get_current_user().await.is_none());
    }
}
