// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors returned along a chain

use crate::connection::ConnId;
use crate::context::ContextError;
use crate::service::Side;

/// A boxed error from a collaborator (e.g. the dataplane client)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The reasons why a chain operation may fail
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The element that provisions interfaces did not produce one for this connection
    #[error("no dataplane interface found for connection '{conn}' on the {side} side")]
    InterfaceNotFound { conn: ConnId, side: Side },
    /// A dataplane call failed, either in transport or with a non-zero return code
    #[error("dataplane call failed: {0}")]
    DataplaneCallFailed(#[source] BoxError),
    #[error(transparent)]
    Context(#[from] ContextError),
    /// A request failed and closing the connection afterwards failed too
    #[error("{cause}; error closing connection: {close}")]
    CloseError {
        cause: Box<ChainError>,
        close: Box<ChainError>,
    },
    /// An element refused the operation for a reason of its own
    #[error("{0}")]
    Refused(String),
}

impl ChainError {
    /// Annotate this error with the failure of the cleanup it triggered
    #[must_use]
    pub fn with_close_error(self, close: ChainError) -> Self {
        Self::CloseError {
            cause: Box::new(self),
            close: Box::new(close),
        }
    }

    /// The error that started it all, skipping close annotations
    #[must_use]
    pub fn root_cause(&self) -> &ChainError {
        match self {
            Self::CloseError { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::ChainError;
    use crate::connection::ConnId;
    use crate::service::Side;

    #[test]
    fn close_error_keeps_both_messages() {
        let cause = ChainError::InterfaceNotFound {
            conn: ConnId::new("c1"),
            side: Side::Server,
        };
        let err = cause.with_close_error(ChainError::Refused("next is gone".to_string()));
        assert_eq!(
            err.to_string(),
            "no dataplane interface found for connection 'c1' on the server side; \
             error closing connection: next is gone"
        );
        assert!(matches!(
            err.root_cause(),
            ChainError::InterfaceNotFound { .. }
        ));
    }
}
