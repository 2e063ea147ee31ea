// Command-line arguments for the client and server binaries

use crate::chat::config::{parse_port, ClientConfig, ServerConfig, DEFAULT_BIND_HOST, DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use thiserror::Error;

/// Chat client: logs in to a chat server and relays console lines
#[derive(Debug, Parser)]
#[command(name = "simplechat-client")]
#[command(about = "Connect to a chat server. Lines starting with # are local commands.")]
pub struct ClientArgs {
    /// Login id sent to the server (mandatory)
    pub login_id: Option<String>,

    /// Server host
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port (default: 5555)
    pub port: Option<String>,
}

/// Why client arguments could not become a configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientArgsError {
    #[error("ERROR - No login ID specified.  Terminating client.")]
    MissingLoginId,
}

impl ClientArgs {
    /// Build the client configuration.
    ///
    /// A port that does not parse falls back to the default; the second
    /// value reports whether that happened so the caller can warn.
    pub fn into_config(self) -> Result<(ClientConfig, bool), ClientArgsError> {
        let login_id = self.login_id.ok_or(ClientArgsError::MissingLoginId)?;

        let (port, fell_back) = match self.port.as_deref() {
            None => (DEFAULT_PORT, false),
            Some(arg) => match parse_port(arg) {
                Some(port) => (port, false),
                None => (DEFAULT_PORT, true),
            },
        };

        Ok((ClientConfig::new(login_id, self.host, port), fell_back))
    }
}

/// Chat server: relays lines between logged-in clients
#[derive(Debug, Parser)]
#[command(name = "simplechat-server")]
#[command(about = "Run a chat server. Lines starting with # are admin commands.")]
pub struct ServerArgs {
    /// Port to listen on (default: 5555)
    pub port: Option<String>,

    /// Address to bind
    #[arg(short, long, default_value = DEFAULT_BIND_HOST)]
    pub bind: String,
}

impl ServerArgs {
    /// Build the server configuration; a bad port silently means the default
    pub fn into_config(self) -> ServerConfig {
        let port = self
            .port
            .as_deref()
            .and_then(parse_port)
            .unwrap_or(DEFAULT_PORT);

        ServerConfig::new(port).with_bind_host(self.bind)
    }
}
