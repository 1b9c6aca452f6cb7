//! Gateway error taxonomy

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The device rejected the credential (HTTP 401). The token has already
    /// been cleared and the unauthorized notification sent.
    #[error("Unauthorized, please log in again")]
    Unauthorized,

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error(transparent)]
    Network(#[from] TransportError),

    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }

    /// HTTP status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Unauthorized => Some(401),
            GatewayError::Http { status } => Some(*status),
            _ => None,
        }
    }
}
