//! Error types for the control and its collaborators.

use crate::types::AssetKind;
use thiserror::Error;

/// Failure reported by a splat or model decoder.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecoderError {
    /// The asset could not be fetched.
    #[error("network error: {0}")]
    Network(String),
    /// The asset bytes were malformed or in an unsupported format.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Failure reported by the scene bridge.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("scene error: {0}")]
pub struct SceneError(pub String);

/// Every failure the control can surface to a caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    /// The operation needs a mounted control (or the control was unmounted
    /// while the operation was in flight).
    #[error("control is not attached to a map")]
    UnresolvedHost,

    #[error("failed to fetch {kind} from {url}: {reason}")]
    NetworkFailure {
        kind: AssetKind,
        url: String,
        reason: String,
    },

    #[error("failed to decode {kind} from {url}: {reason}")]
    DecodeFailure {
        kind: AssetKind,
        url: String,
        reason: String,
    },

    #[error("failed to attach {kind} from {url} to the scene: {reason}")]
    SceneFailure {
        kind: AssetKind,
        url: String,
        reason: String,
    },

    /// The scene bridge refused the connection on mount.
    #[error("scene bridge unavailable: {0}")]
    SceneUnavailable(String),

    /// Internal invariant violation; unreachable under monotonic id allocation.
    #[error("asset id {0} is already registered")]
    DuplicateId(String),
}

impl ControlError {
    /// Attach the offending url and kind to a decoder failure.
    pub fn from_decoder(kind: AssetKind, url: &str, err: DecoderError) -> Self {
        match err {
            DecoderError::Network(reason) => ControlError::NetworkFailure {
                kind,
                url: url.to_string(),
                reason,
            },
            DecoderError::Decode(reason) => ControlError::DecodeFailure {
                kind,
                url: url.to_string(),
                reason,
            },
        }
    }

    /// Attach the offending url and kind to a scene-bridge failure.
    pub fn from_scene(kind: AssetKind, url: &str, err: SceneError) -> Self {
        ControlError::SceneFailure {
            kind,
            url: url.to_string(),
            reason: err.0,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_errors_keep_url_and_kind() {
        let err = ControlError::from_decoder(
            AssetKind::Model,
            "bad://url",
            DecoderError::Network("unsupported scheme".into()),
        );
        assert_eq!(
            err.to_string(),
            "failed to fetch model from bad://url: unsupported scheme"
        );
    }
}
