use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::models::Account;
use crate::storage::IdentityStore;

const MAX_API_KEY_LEN: usize = 128;

/// Why an API key was rejected before reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKeyReason {
    IsEmpty,
    IsTooLong,
    IsNotAscii,
    HasWhitespace,
}

impl InvalidKeyReason {
    pub fn reason(&self) -> &'static str {
        match *self {
            Self::IsEmpty => "empty",
            Self::IsTooLong => "too_long",
            Self::IsNotAscii => "not_ascii",
            Self::HasWhitespace => "whitespace",
        }
    }
}

impl fmt::Display for InvalidKeyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("api key missing")]
    Missing,
    #[error("api key malformed ({0})")]
    Malformed(InvalidKeyReason),
    #[error("api key not recognized")]
    Unknown,
    #[error("identity store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

/// Check that a key has the right shape. It may still be unknown.
pub fn validate_api_key(key: &str) -> Result<(), InvalidKeyReason> {
    if key.is_empty() {
        return Err(InvalidKeyReason::IsEmpty);
    }

    if key.len() > MAX_API_KEY_LEN {
        return Err(InvalidKeyReason::IsTooLong);
    }

    if !key.is_ascii() {
        return Err(InvalidKeyReason::IsNotAscii);
    }

    if key.chars().any(|c| c.is_ascii_whitespace()) {
        return Err(InvalidKeyReason::HasWhitespace);
    }

    Ok(())
}

/// Maps the `api_key` query parameter to the owning account.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, api_key: Option<&str>) -> Result<Account, IdentityError> {
        let key = api_key.ok_or(IdentityError::Missing)?;
        validate_api_key(key).map_err(IdentityError::Malformed)?;

        match self.store.find_by_api_key(key).await {
            Ok(Some(account)) => Ok(account),
            Ok(None) => Err(IdentityError::Unknown),
            Err(err) => {
                warn!(error = %err, "api key lookup failed");
                Err(IdentityError::Store(err))
            }
        }
    }
}
