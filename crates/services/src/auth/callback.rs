use super::ports::{AuthError, UserId};
use url::Url;

const SECRET_PARAM: &str = "secret";
const USER_ID_PARAM: &str = "userId";

/// Result parameters the account service appends to the OAuth callback URL
#[derive(Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub user_id: UserId,
    pub secret: String,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl CallbackParams {
    /// Extract `secret` and `userId` from a callback URL. Both must be present
    /// and non-empty.
    pub fn from_url(callback_url: &str) -> Result<Self, AuthError> {
        let url = Url::parse(callback_url)
            .map_err(|e| AuthError::InvalidCallbackUrl(format!("{callback_url}: {e}")))?;

        let mut secret = None;
        let mut user_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                SECRET_PARAM => secret = Some(value.into_owned()),
                USER_ID_PARAM => user_id = Some(value.into_owned()),
                _ => {}
            }
        }

        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingCallbackParam(SECRET_PARAM))?;
        let user_id = user_id
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingCallbackParam(USER_ID_PARAM))?;

        Ok(Self {
            user_id: UserId(user_id),
            secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_custom_scheme_callback() {
        let params = CallbackParams::from_url("app://?secret=abc&userId=123").unwrap();
        assert_eq!(params.secret, "abc");
        assert_eq!(params.user_id, UserId("123".to_string()));
    }

    #[test]
    fn test_parses_loopback_callback_with_extra_params() {
        let params = CallbackParams::from_url(
            "http://127.0.0.1:49152/?project=restate&userId=u%2B1&secret=s%3D%3D",
        )
        .unwrap();
        assert_eq!(params.user_id.0, "u+1");
        assert_eq!(params.secret, "s==");
    }

    #[test]
    fn test_missing_secret() {
        let err = CallbackParams::from_url("app://?userId=123").unwrap_err();
        assert!(matches!(err, AuthError::MissingCallbackParam("secret")));
    }

    #[test]
    fn test_missing_user_id() {
        let err = CallbackParams::from_url("app://?secret=abc").unwrap_err();
        assert!(matches!(err, AuthError::MissingCallbackParam("userId")));
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let err = CallbackParams::from_url("app://?secret=&userId=123").unwrap_err();
        assert!(matches!(err, AuthError::MissingCallbackParam("secret")));
    }

    #[test]
    fn test_relative_url_is_invalid() {
        let err = CallbackParams::from_url("/?secret=abc&userId=123").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCallbackUrl(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let params = CallbackParams::from_url("app://?secret=topsecret&userId=123").unwrap();
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("123"));
    }
}
