//! Caller identity resolution.

use thiserror::Error;

/// Errors raised while resolving the caller identity.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// No identity is configured for this session.
    #[error("no caller identity configured")]
    Unconfigured,

    /// The identity source returned an unusable value.
    #[error("invalid caller identity: {reason}")]
    Invalid {
        /// Why the identity was rejected.
        reason: String,
    },
}

/// Source of the identity stamped into `createdBy`.
pub trait IdentityProvider {
    /// Returns the identity of the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be determined.
    fn caller_identity(&self) -> Result<String, IdentityError>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for &T {
    fn caller_identity(&self) -> Result<String, IdentityError> {
        (**self).caller_identity()
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Box<T> {
    fn caller_identity(&self) -> Result<String, IdentityError> {
        (**self).caller_identity()
    }
}

/// Fixed identity, typically taken from configuration or a CLI flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    /// Creates a provider that always answers `identity`.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn caller_identity(&self) -> Result<String, IdentityError> {
        if self.0.trim().is_empty() {
            return Err(IdentityError::Invalid {
                reason: "identity is blank".to_string(),
            });
        }
        Ok(self.0.clone())
    }
}

/// Provider used when no identity is configured. Always fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnresolvedIdentity;

impl IdentityProvider for UnresolvedIdentity {
    fn caller_identity(&self) -> Result<String, IdentityError> {
        Err(IdentityError::Unconfigured)
    }
}

/// Picks [`StaticIdentity`] when `identity` is set, [`UnresolvedIdentity`]
/// otherwise.
#[must_use]
pub fn provider_for(identity: Option<&str>) -> Box<dyn IdentityProvider> {
    match identity {
        Some(id) => Box::new(StaticIdentity::new(id)),
        None => Box::new(UnresolvedIdentity),
    }
}
