use std::future::Future;
use std::pin::Pin;

pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Supplies bearer tokens at call time.
///
/// The app session token authorizes calls to the Jarvis API; the provider
/// token is the calendar OAuth access token. Implementations own refresh and
/// caching. Callers ask again on every request.
pub trait TokenSource: Send + Sync {
    fn session_token(&self) -> TokenFuture<'_>;

    fn provider_token(&self) -> TokenFuture<'_>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenSource {
    session_token: Option<String>,
    provider_token: Option<String>,
}

impl StaticTokenSource {
    pub fn new(session_token: impl Into<String>) -> Self {
        Self {
            session_token: non_empty(session_token.into()),
            provider_token: None,
        }
    }

    pub fn with_provider_token(mut self, provider_token: impl Into<String>) -> Self {
        self.provider_token = non_empty(provider_token.into());
        self
    }
}

impl TokenSource for StaticTokenSource {
    fn session_token(&self) -> TokenFuture<'_> {
        let token = self.session_token.clone();
        Box::pin(async move { token })
    }

    fn provider_token(&self) -> TokenFuture<'_> {
        let token = self.provider_token.clone();
        Box::pin(async move { token })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{StaticTokenSource, TokenSource};

    #[tokio::test]
    async fn blank_tokens_are_treated_as_absent() {
        let tokens = StaticTokenSource::new("  ").with_provider_token("google-token");

        assert_eq!(tokens.session_token().await, None);
        assert_eq!(
            tokens.provider_token().await.as_deref(),
            Some("google-token")
        );
    }
}
