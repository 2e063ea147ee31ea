// Chat relay: sessions, command interpreters, and the two endpoints
//
// The server keeps a registry of sessions. Once a peer has logged in,
// its lines are attributed and broadcast to every connected peer. The client sends
// its login on connect and relays console lines to the server.

pub mod error;
pub mod config;
pub mod command;
pub mod session;
pub mod transport;
pub mod registry;
pub mod display;
pub mod client;
pub mod server;
pub mod cli;

pub use error::{ClientCommandError, ProtocolViolation, ServerCommandError, TransportError};
pub use config::{ClientConfig, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use command::{ClientCommand, CommandLine, ServerCommand};
pub use session::{Admission, Session, SessionState};
pub use transport::{Connection, ConnectionHandler, ConnectionId, Listener};
pub use registry::ServerRegistry;
pub use display::{ChatDisplay, ConsoleDisplay};
pub use client::ChatClient;
pub use server::ChatServer;
pub use cli::{ClientArgs, ClientArgsError, ServerArgs};

/// What the caller that owns the process should do after an endpoint
/// handled a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}
