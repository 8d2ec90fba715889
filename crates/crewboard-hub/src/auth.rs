//! Token verification at the connection boundary. The hub only knows the
//! "bearer token in, username out" shape; the identity provider behind it is
//! an adapter.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Rejected(String),
    #[error("identity service unreachable: {0}")]
    Unreachable(String),
}

pub trait TokenVerifier: Send + Sync + 'static {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, AuthError>>;
}

/// Verifies tokens against the GitHub API: a valid bearer token resolves to
/// the account's login.
pub struct GithubVerifier {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
}

impl GithubVerifier {
    pub fn new() -> Self {
        Self::with_api_base("https://api.github.com")
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }
}

impl Default for GithubVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenVerifier for GithubVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, AuthError>> {
        async move {
            let response = self
                .client
                .get(format!("{}/user", self.api_base))
                .bearer_auth(token)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", "crewboard")
                .send()
                .await
                .map_err(|err| AuthError::Unreachable(err.to_string()))?;

            if !response.status().is_success() {
                return Err(AuthError::Rejected(format!(
                    "identity service returned {}",
                    response.status()
                )));
            }

            let user: GithubUser = response
                .json()
                .await
                .map_err(|err| AuthError::Rejected(err.to_string()))?;
            Ok(user.login)
        }
        .boxed()
    }
}

/// Fixed token table for tests and trusted local setups.
pub struct StaticVerifier {
    tokens: Vec<(String, String)>,
}

impl StaticVerifier {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, AuthError>> {
        let found = self
            .tokens
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, user)| user.clone());
        async move { found.ok_or_else(|| AuthError::Rejected("unknown token".to_string())) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_maps_tokens() {
        let verifier = StaticVerifier::new([("tok-1".to_string(), "mira".to_string())]);
        assert_eq!(verifier.verify("tok-1").await.unwrap(), "mira");
        assert!(verifier.verify("tok-2").await.is_err());
    }
}
