//! simplechat - login-gated text chat relay
//!
//! This library provides the server and client endpoints of a small chat
//! system: a central server that admits clients once they log in and relays
//! every chat line to all connected peers, and a console client that talks
//! to it. Both ends accept `#`-prefixed administrative commands.

pub mod chat;

pub use chat::{ChatClient, ChatServer, ClientConfig, ServerConfig};
