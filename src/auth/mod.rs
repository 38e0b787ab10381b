pub mod storage;

pub use storage::{StoredToken, TokenStore};

/// Synchronous access to the current bearer token, if any.
///
/// The channel only uses it to decide log detail; a missing token never
/// prevents a connection.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token (or none). Handy for tests and unauthenticated sessions.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_returns_value() {
        assert_eq!(StaticToken::new("jwt").token().as_deref(), Some("jwt"));
    }

    #[test]
    fn static_none_returns_none() {
        assert!(StaticToken::none().token().is_none());
        assert!(StaticToken::default().token().is_none());
    }
}
