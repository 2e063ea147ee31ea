// Error types for the chat relay
//
// The Display text of each variant is the exact line shown on the local
// console or sent to the offending peer.

use std::io;
use thiserror::Error;

/// Failures of the underlying line transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("could not listen on {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Protocol violations detected by the server on an inbound line.
///
/// Each one is sent back to the peer before its connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("Error: Already logged in.")]
    AlreadyLoggedIn,

    #[error("Error: Invalid login format.")]
    MalformedLogin,

    #[error("Error: Must login first.")]
    NotLoggedIn,
}

/// Rejections of a client console command
#[derive(Debug, Error)]
pub enum ClientCommandError {
    #[error("Error: Not connected.")]
    NotConnected,

    #[error("Error: Already connected.")]
    AlreadyConnected,

    #[error("Error: Must log off before changing host.")]
    HostLocked,

    #[error("Error: Must log off before changing port.")]
    PortLocked,

    #[error("Error: No host specified.")]
    MissingHost,

    #[error("Error: No port specified.")]
    MissingPort,

    #[error("Error: Invalid port number.")]
    InvalidPort,

    #[error("Error: Unknown command.")]
    Unknown,

    #[error("Error executing command: {0}")]
    Transport(#[from] TransportError),
}

/// Rejections of a server console command
#[derive(Debug, Error)]
pub enum ServerCommandError {
    #[error("Server is not currently listening.")]
    NotListening,

    #[error("Server is already listening.")]
    AlreadyListening,

    #[error("Error: Server must be closed to change port.")]
    PortLocked,

    #[error("Error: No port specified.")]
    MissingPort,

    #[error("Error: Invalid port number.")]
    InvalidPort,

    #[error("Error: Could not start listening.")]
    ListenFailed(#[source] TransportError),

    #[error("Error: Unknown command.")]
    Unknown,
}
