//! Error types for rig control.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Validation, transport, and command
//! outcome errors are all captured here. Frame decode failures are handled
//! inside the codec and never reach this type.

/// The error type for all rig-control operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A property value was rejected before any I/O took place.
    #[error("validation error: {0}")]
    Validation(String),

    /// A transport-level error (serial port open, write, or read failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error that is not tied to a single frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the rig.
    ///
    /// For commands this means no confirmation arrived within the command
    /// timeout. During `connect()` it means the transport or the handshake
    /// did not complete in time.
    #[error("timeout waiting for response")]
    Timeout,

    /// The rig refused the command (negative acknowledgment).
    #[error("command rejected by rig: {0}")]
    Rejected(String),

    /// The command was still pending when the connection was torn down.
    #[error("command cancelled")]
    Cancelled,

    /// No connection to the rig has been established.
    #[error("not connected")]
    NotConnected,

    /// `connect()` was called while a connection is already up or in progress.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection to the rig was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error, kept as its kind and message so the error
    /// stays `Clone` and can be delivered to several waiters.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
                Error::ConnectionLost
            }
            std::io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(e.to_string()),
        }
    }
}

impl Error {
    /// Whether this error means the link itself is unusable.
    ///
    /// The controller moves to `Faulted` on these; everything else only
    /// fails the command that produced it.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ConnectionLost | Error::Io(_) | Error::NotConnected
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_validation() {
        let e = Error::Validation("power 120 W exceeds 100 W".into());
        assert_eq!(e.to_string(), "validation error: power 120 W exceeds 100 W");
    }

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_rejected() {
        let e = Error::Rejected("?;".into());
        assert_eq!(e.to_string(), "command rejected by rig: ?;");
    }

    #[test]
    fn error_display_cancelled() {
        assert_eq!(Error::Cancelled.to_string(), "command cancelled");
    }

    #[test]
    fn error_display_lifecycle() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::AlreadyConnected.to_string(), "already connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io_broken_pipe_is_connection_lost() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert_eq!(e, Error::ConnectionLost);
    }

    #[test]
    fn error_from_io_other_keeps_message() {
        let io_err = std::io::Error::other("device unplugged");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("device unplugged"));
    }

    #[test]
    fn link_failure_classification() {
        assert!(Error::ConnectionLost.is_link_failure());
        assert!(Error::Transport("x".into()).is_link_failure());
        assert!(Error::Io("x".into()).is_link_failure());
        assert!(!Error::Timeout.is_link_failure());
        assert!(!Error::Rejected("x".into()).is_link_failure());
        assert!(!Error::Validation("x".into()).is_link_failure());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn result_alias_works() {
        let ok: Result<u32> = Ok(42);
        assert_eq!(ok, Ok(42));

        let err: Result<u32> = Err(Error::Timeout);
        assert!(err.is_err());
    }
}
