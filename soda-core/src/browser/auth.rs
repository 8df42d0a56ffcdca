use reqwest::blocking::RequestBuilder;
use reqwest::header::AUTHORIZATION;
use std::fmt;

/// Environment variable holding a pre-acquired SPNEGO token.
pub const NEGOTIATE_TOKEN_ENV: &str = "SODA_NEGOTIATE_TOKEN";

/// Credential attached to every browser request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Negotiate { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Negotiate credential from `SODA_NEGOTIATE_TOKEN`, if set and non-empty.
    pub fn negotiate_from_env() -> Option<Self> {
        std::env::var(NEGOTIATE_TOKEN_ENV)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .map(|token| Self::Negotiate { token })
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Negotiate { .. } => "negotiate",
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Negotiate { token } => request.header(AUTHORIZATION, format!("Negotiate {}", token)),
        }
    }
}

// Keep secrets out of debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Negotiate { .. } => f.debug_struct("Negotiate").field("token", &"***").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::blocking::Client;

    fn authorization_header(credentials: &Credentials) -> String {
        let client = Client::new();
        let request = credentials
            .apply(client.get("http://localhost/cgi-bin/hgTracks"))
            .build()
            .unwrap();
        request
            .headers()
            .get(AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_basic_header() {
        let credentials = Credentials::basic("alice", "secret");
        assert_eq!(authorization_header(&credentials), "Basic YWxpY2U6c2VjcmV0");
        assert_eq!(credentials.scheme(), "basic");
    }

    #[test]
    fn test_negotiate_header() {
        let credentials = Credentials::Negotiate {
            token: "YIIabc".to_string(),
        };
        assert_eq!(authorization_header(&credentials), "Negotiate YIIabc");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", Credentials::basic("alice", "secret"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }
}
