// Server endpoint: login handshake, broadcast, and console commands

use crate::chat::command::ServerCommand;
use crate::chat::config::{parse_port, ServerConfig};
use crate::chat::display::ChatDisplay;
use crate::chat::error::{ProtocolViolation, ServerCommandError, TransportError};
use crate::chat::registry::ServerRegistry;
use crate::chat::session::Admission;
use crate::chat::transport::{Connection, ConnectionHandler, Listener};
use crate::chat::Flow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time given to in-flight sends before `#quit` closes every connection
pub const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Prefix of lines typed on the server console and broadcast to clients
pub const SERVER_MSG_PREFIX: &str = "SERVER MSG> ";

/// Transport hooks for every client connection
struct ServerHandler<D> {
    registry: ServerRegistry,
    display: Arc<D>,
}

impl<D: ChatDisplay> ServerHandler<D> {
    fn reject(&self, connection: &Connection, violation: ProtocolViolation) {
        info!(id = %connection.id(), "Rejecting client: {}", violation);

        let result = connection
            .send(violation.to_string())
            .and_then(|()| connection.close());

        if let Err(e) = result {
            warn!(id = %connection.id(), "Failed to close client: {}", e);
            self.display.display("Error closing client connection.");
        }
    }
}

impl<D: ChatDisplay> ConnectionHandler for ServerHandler<D> {
    fn on_connected(&self, connection: &Connection) {
        self.registry.insert(connection.clone());
        info!(id = %connection.id(), peer = ?connection.peer(), "Client connected");
        self.display.display("A new client has connected.");
    }

    fn on_receive(&self, connection: &Connection, line: &str) {
        match self.registry.admit(connection.id(), line) {
            Some(Admission::LoggedIn(login_id)) => {
                info!(id = %connection.id(), %login_id, "Client logged in");
                self.display.display(&format!("{} has logged in.", login_id));
            }
            Some(Admission::Chat(message)) => {
                debug!(id = %connection.id(), "Message received: {}", message);
                self.display.display(&message);
                self.registry.broadcast(&message);
            }
            Some(Admission::Rejected(violation)) => self.reject(connection, violation),
            None => debug!(id = %connection.id(), "Ignoring line from closed client"),
        }
    }

    fn on_disconnected(&self, connection: &Connection) {
        let login_id = self
            .registry
            .remove(connection.id())
            .and_then(|session| session.login_id().map(str::to_string));

        info!(id = %connection.id(), ?login_id, "Client disconnected");
        match login_id {
            Some(login_id) => self.display.display(&format!("{} has disconnected.", login_id)),
            None => self.display.display("An unnamed client has disconnected."),
        }
    }
}

/// The chat server.
///
/// Owned by the console task, which is the only caller of the `&mut self`
/// methods. Connection tasks share the registry through the handler.
pub struct ChatServer<D: ChatDisplay> {
    config: ServerConfig,
    handler: Arc<ServerHandler<D>>,
    listener: Option<Listener>,
}

impl<D: ChatDisplay> ChatServer<D> {
    pub fn new(config: ServerConfig, display: Arc<D>) -> Self {
        Self {
            config,
            handler: Arc::new(ServerHandler {
                registry: ServerRegistry::new(),
                display,
            }),
            listener: None,
        }
    }

    /// Configured port
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Address actually bound, while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.handler.registry
    }

    /// Number of connected clients, logged in or not
    pub fn client_count(&self) -> usize {
        self.handler.registry.connected_count()
    }

    fn display(&self, message: &str) {
        self.handler.display.display(message);
    }

    /// Start accepting connections on the configured address
    pub async fn listen(&mut self) -> Result<SocketAddr, TransportError> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr());
        }

        let listener =
            Listener::bind(&self.config.bind_host, self.config.port, self.handler.clone()).await?;
        let addr = listener.local_addr();
        self.listener = Some(listener);
        self.display(&format!("Server listening for connections on port {}", addr.port()));
        Ok(addr)
    }

    /// Stop accepting connections. Returns false if not listening.
    pub async fn stop_listening(&mut self) -> bool {
        match self.listener.take() {
            Some(listener) => {
                listener.stop().await;
                self.display("Server has stopped listening for connections.");
                true
            }
            None => false,
        }
    }

    /// Stop listening and close every client connection
    pub async fn close(&mut self) {
        self.stop_listening().await;
        let closed = self.handler.registry.close_all();
        info!("Closed {} client connections", closed);
    }

    /// Stop listening, give in-flight sends a moment, then close everything
    pub async fn quit(&mut self) {
        self.stop_listening().await;
        tokio::time::sleep(QUIT_GRACE).await;
        let closed = self.handler.registry.close_all();
        info!("Server quitting, closed {} client connections", closed);
    }

    /// Handle one line typed on the server console
    pub async fn handle_console_line(&mut self, line: &str) -> Flow {
        let Some(command) = ServerCommand::parse(line) else {
            self.announce(line);
            return Flow::Continue;
        };

        let flow = match command {
            ServerCommand::Quit => Flow::Quit,
            _ => Flow::Continue,
        };

        match self.execute(command).await {
            Ok(reply) => self.display(&reply),
            Err(e) => {
                debug!("Command failed: {:?}", e);
                self.display(&e.to_string());
            }
        }

        flow
    }

    /// Broadcast a console line to every client
    fn announce(&self, line: &str) {
        let message = format!("{}{}", SERVER_MSG_PREFIX, line);
        self.display(&message);
        self.handler.registry.broadcast(&message);
    }

    async fn execute(&mut self, command: ServerCommand) -> Result<String, ServerCommandError> {
        match command {
            ServerCommand::Quit => {
                self.quit().await;
                Ok("Server is shutting down.".to_string())
            }
            ServerCommand::Stop => {
                if self.stop_listening().await {
                    Ok("Server has stopped listening for new clients.".to_string())
                } else {
                    Err(ServerCommandError::NotListening)
                }
            }
            ServerCommand::Close => {
                self.close().await;
                Ok("Server closed all client connections.".to_string())
            }
            ServerCommand::SetPort(arg) => {
                if self.is_listening() || self.client_count() > 0 {
                    return Err(ServerCommandError::PortLocked);
                }
                let arg = arg.ok_or(ServerCommandError::MissingPort)?;
                let port = parse_port(&arg).ok_or(ServerCommandError::InvalidPort)?;
                self.config.port = port;
                Ok(format!("Port set to: {}", port))
            }
            ServerCommand::Start => {
                if self.is_listening() {
                    return Err(ServerCommandError::AlreadyListening);
                }
                self.listen()
                    .await
                    .map_err(ServerCommandError::ListenFailed)?;
                Ok("Server is now listening for new clients.".to_string())
            }
            ServerCommand::GetPort => Ok(format!("Current port: {}", self.config.port)),
            ServerCommand::Unknown(name) => {
                debug!("Unknown server command {}", name);
                Err(ServerCommandError::Unknown)
            }
        }
    }
}
