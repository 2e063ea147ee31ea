// Endpoint configuration

/// Port used by both endpoints when none is given
pub const DEFAULT_PORT: u16 = 5555;

/// Host the client connects to when none is given
pub const DEFAULT_HOST: &str = "localhost";

/// Address the server binds to when none is given
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Client configuration
///
/// The login id is fixed for the life of the client. Host and port may
/// only be changed while disconnected, which `ChatClient` enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    login_id: String,
    pub host: String,
    pub port: u16,
}

impl ClientConfig {
    pub fn new(login_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            login_id: login_id.into(),
            host: host.into(),
            port,
        }
    }

    pub fn login_id(&self) -> &str {
        &self.login_id
    }

    /// The handshake line sent right after connecting
    pub fn login_line(&self) -> String {
        format!("#login {}", self.login_id)
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port,
        }
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

/// Parse a port argument the way both command interpreters do
pub fn parse_port(arg: &str) -> Option<u16> {
    arg.parse().ok()
}
