use std::sync::Arc;
use thiserror::Error;

/// Errors produced while constructing a [Store](crate::Store) or
/// dispatching actions to it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("a model is already registered under the namespace `{0}`")]
    DuplicateNamespace(String),
    #[error("invalid model `{namespace}`: {reason}")]
    InvalidModel { namespace: String, reason: String },
    #[error("plugin `{plugin}` has a malformed `{hook}` hook: {reason}")]
    InvalidPlugin {
        plugin: String,
        hook: &'static str,
        reason: String,
    },
    #[error("invalid `{plugin}` plugin configuration: {reason}")]
    InvalidConfig { plugin: String, reason: String },
    #[error("no reducer or effect is registered for `{0}`")]
    UnknownAction(String),
    #[error("the store has been dropped")]
    StoreDropped,
    /// An effect body returned an error.
    #[error("effect `{action}` failed: {cause}")]
    Effect {
        action: String,
        cause: Arc<anyhow::Error>,
    },
}

impl Error {
    pub(crate) fn invalid_model<N: Into<String>, R: Into<String>>(namespace: N, reason: R) -> Self {
        Error::InvalidModel {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config<P: Into<String>, R: Into<String>>(plugin: P, reason: R) -> Self {
        Error::InvalidConfig {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// The action type of the effect which failed, if this is an
    /// [Error::Effect].
    pub fn effect_action(&self) -> Option<&str> {
        match self {
            Error::Effect { action, .. } => Some(action),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
