// src/auth.rs
//! Bearer credential → principal. Unknown or absent credentials resolve to
//! [`Principal::Anonymous`]; only a structurally broken header is an error.

use std::collections::HashMap;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;

use crate::synth::failure::{FailureKind, SynthesisError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(String),
    Anonymous,
}

impl Principal {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Principal::User(id) => Some(id),
            Principal::Anonymous => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is not valid UTF-8")]
    NotUtf8,
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
}

impl From<AuthError> for SynthesisError {
    fn from(_: AuthError) -> Self {
        SynthesisError::from(FailureKind::ConfigError)
    }
}

pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, bearer: Option<&str>) -> Result<Principal, AuthError>;
}

/// Fixed token → principal id table from `[auth.tokens]` in service config.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl PrincipalResolver for StaticTokenResolver {
    fn resolve(&self, bearer: Option<&str>) -> Result<Principal, AuthError> {
        let Some(token) = bearer else {
            return Ok(Principal::Anonymous);
        };
        Ok(self
            .tokens
            .get(token)
            .map(|id| Principal::User(id.clone()))
            .unwrap_or(Principal::Anonymous))
    }
}

/// `Ok(None)` when no Authorization header is present.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(raw) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let raw = raw.to_str().map_err(|_| AuthError::NotUtf8)?.trim();
    let (scheme, rest) = raw.split_once(' ').ok_or(AuthError::UnsupportedScheme)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::UnsupportedScheme);
    }
    Ok(Some(rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(v).expect("header"));
        h
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token(&HeaderMap::new()), Ok(None));
        assert_eq!(bearer_token(&headers("Bearer abc")), Ok(Some("abc")));
        assert_eq!(bearer_token(&headers("bearer   abc ")), Ok(Some("abc")));
        assert_eq!(
            bearer_token(&headers("Basic Zm9vOmJhcg==")),
            Err(AuthError::UnsupportedScheme)
        );
        assert_eq!(
            bearer_token(&headers("Bearer ")),
            Err(AuthError::UnsupportedScheme)
        );
    }

    #[test]
    fn unknown_token_is_anonymous() {
        let r = StaticTokenResolver::new(HashMap::from([("t1".into(), "alice".into())]));
        assert_eq!(r.resolve(Some("t1")), Ok(Principal::User("alice".into())));
        assert_eq!(r.resolve(Some("nope")), Ok(Principal::Anonymous));
        assert_eq!(r.resolve(None), Ok(Principal::Anonymous));
    }

    #[test]
    fn auth_failure_maps_to_config_error() {
        let e: SynthesisError = AuthError::NotUtf8.into();
        assert_eq!(e.kind, FailureKind::ConfigError);
    }
}
