//! Error types for the control link.
//!
//! Every failure a caller can observe is a [`LinkError`]. The variants split
//! into two groups: those that leave the socket usable (a rejected command,
//! a reserved header) and those that mean the connection is gone or its
//! framing is lost (an oversized line leaves unread bytes behind).
//! [`LinkError::is_fatal`] draws that line for the dispatcher.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the receiver.
#[derive(Debug, Error)]
pub enum LinkError {
    /// TCP connection to the receiver could not be established.
    #[error("failed to connect to receiver: {0}")]
    Dial(#[source] io::Error),

    /// The reverse-HTTP registration was rejected or malformed.
    #[error("reverse handshake failed: {0}")]
    Handshake(#[source] Box<LinkError>),

    /// Writing a request to the socket failed.
    #[error("failed to write request: {0}")]
    Write(#[source] io::Error),

    /// Reading the response from the socket failed.
    #[error("failed to read response: {0}")]
    Read(#[source] io::Error),

    /// Receiver answered with a non-success status; carries the raw status line.
    #[error("{0}")]
    Status(String),

    /// Connection closed before any status line arrived.
    #[error("unexpected HTTP response; no status line")]
    NoStatusLine,

    /// Connection closed after the status line but before the header block ended.
    #[error("connection closed before end of response headers")]
    TruncatedResponse,

    /// A response line did not fit the line buffer.
    #[error("response line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// Caller supplied a header the codec always writes itself.
    #[error("header {0:?} is set by the link and may not be supplied")]
    ReservedHeader(String),

    /// Receiver sent data nobody asked for while the link was idle.
    #[error("unexpected data from receiver: {0:?}")]
    UnexpectedData(String),

    /// The dispatcher stopped after a fatal error; carries its description.
    #[error("link terminated: {0}")]
    Terminated(String),

    /// The link was closed, or its dispatcher has stopped.
    #[error("link is closed")]
    Closed,
}

/// Convenient Result alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

impl LinkError {
    /// Returns true if the socket can no longer be used after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Write(_)
                | Self::Read(_)
                | Self::NoStatusLine
                | Self::TruncatedResponse
                | Self::LineTooLong { .. }
        )
    }
}
