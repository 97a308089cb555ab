use crate::session::SessionStore;
use account_client::AccountClient;
use config::AppConfig;
use platform::LoopbackBrowser;
use services::auth::{AuthGateway, OAuthProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Client wiring built once at startup and passed to every command
pub struct ClientContext {
    pub auth: AuthGateway,
    account: Arc<AccountClient>,
    sessions: SessionStore,
}

impl ClientContext {
    pub async fn build(config: &AppConfig, session_file: PathBuf) -> anyhow::Result<Self> {
        let provider: OAuthProvider = config.oauth.provider.parse()?;
        let account = Arc::new(AccountClient::new(&config.client)?);
        let browser = Arc::new(
            LoopbackBrowser::bind(
                config.oauth.callback_port,
                Duration::from_secs(config.oauth.callback_timeout_seconds),
            )
            .await?,
        );

        let auth = AuthGateway::new(account.clone(), browser.clone(), browser, account.clone())
            .with_provider(provider);

        let sessions = SessionStore::new(session_file);
        if let Some(cookies) = sessions.load()? {
            tracing::debug!(path = %sessions.path().display(), "Resuming stored session");
            account.restore_session(cookies).await;
        }

        Ok(Self {
            auth,
            account,
            sessions,
        })
    }

    /// Store the session cookies the backend returned for `login`
    pub async fn persist_session(&self) -> anyhow::Result<()> {
        match self.account.session_cookies().await {
            Some(cookies) => self.sessions.save(&cookies),
            None => {
                tracing::warn!("Backend returned no session cookies, session will not be kept");
                Ok(())
            }
        }
    }

    pub fn forget_session(&self) -> anyhow::Result<()> {
        self.sessions.clear()
    }
}
