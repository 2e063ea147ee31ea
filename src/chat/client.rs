// Client endpoint: login on connect, console commands, and relaying lines

use crate::chat::command::ClientCommand;
use crate::chat::config::{parse_port, ClientConfig};
use crate::chat::display::ChatDisplay;
use crate::chat::error::{ClientCommandError, TransportError};
use crate::chat::transport::{Connection, ConnectionHandler};
use crate::chat::Flow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `quit` waits for the connection task to wind down
pub const CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Transport hooks for the connection to the server
struct ClientHandler<D> {
    display: Arc<D>,
    terminate: CancellationToken,
}

impl<D: ChatDisplay> ConnectionHandler for ClientHandler<D> {
    fn on_receive(&self, _connection: &Connection, line: &str) {
        self.display.display(line);
    }

    fn on_transport_error(&self, connection: &Connection, error: &TransportError) {
        info!(id = %connection.id(), %error, "Lost connection to server");
        self.display.display("The server has shut down.");
        self.terminate.cancel();
    }

    fn on_disconnected(&self, _connection: &Connection) {
        self.display.display("Connection closed.");
    }
}

/// The chat client.
///
/// Console input arrives through `handle_console_line`; lines from the
/// server are displayed by the connection task as they arrive.
pub struct ChatClient<D: ChatDisplay> {
    config: ClientConfig,
    connection: Option<Connection>,
    handler: Arc<ClientHandler<D>>,
}

impl<D: ChatDisplay> ChatClient<D> {
    /// Connect to the configured server and send the login line
    pub async fn connect(config: ClientConfig, display: Arc<D>) -> Result<Self, TransportError> {
        let mut client = Self {
            config,
            connection: None,
            handler: Arc::new(ClientHandler {
                display,
                terminate: CancellationToken::new(),
            }),
        };

        client.open().await?;
        Ok(client)
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let connection =
            Connection::open(&self.config.host, self.config.port, self.handler.clone()).await?;

        // No acknowledgement comes back for the login
        if let Err(e) = connection.send(self.config.login_line()) {
            let _ = connection.close();
            return Err(e);
        }

        info!("Logging in as {}", self.config.login_id());
        self.connection = Some(connection);
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    /// Cancelled once the client must terminate: after `#quit`, a failed
    /// send, or losing the server.
    pub fn terminated(&self) -> CancellationToken {
        self.handler.terminate.clone()
    }

    fn display(&self, message: &str) {
        self.handler.display.display(message);
    }

    /// Send one chat line to the server
    pub fn send(&self, line: &str) -> Result<(), TransportError> {
        self.connection
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .send(line)
    }

    fn close_connection(&mut self) -> Result<(), TransportError> {
        self.connection
            .take()
            .ok_or(TransportError::NotConnected)?
            .close()
    }

    /// Close the connection if any, wait for its disconnect notice, and
    /// signal termination
    pub async fn quit(&mut self) {
        match self.connection.take() {
            Some(connection) => {
                if let Err(e) = connection.close() {
                    debug!("Connection already closing on quit: {}", e);
                }
                if tokio::time::timeout(CLOSE_WAIT, connection.finished()).await.is_err() {
                    warn!("Connection did not finish within {:?}", CLOSE_WAIT);
                }
            }
            None => debug!("Nothing to close on quit"),
        }
        self.handler.terminate.cancel();
    }

    /// Handle one line typed on the client console
    pub async fn handle_console_line(&mut self, line: &str) -> Flow {
        match ClientCommand::parse(line) {
            None => {
                if let Err(e) = self.send(line) {
                    warn!("Could not send message: {}", e);
                    self.display("Could not send message to server.  Terminating client.");
                    self.quit().await;
                    return Flow::Quit;
                }
            }
            Some(command) => {
                let flow = match command {
                    ClientCommand::Quit => Flow::Quit,
                    _ => Flow::Continue,
                };

                match self.execute(command).await {
                    Ok(Some(reply)) => self.display(&reply),
                    Ok(None) => {}
                    Err(e) => self.display(&e.to_string()),
                }

                return flow;
            }
        }

        Flow::Continue
    }

    async fn execute(&mut self, command: ClientCommand) -> Result<Option<String>, ClientCommandError> {
        match command {
            ClientCommand::Quit => {
                self.quit().await;
                Ok(None)
            }
            ClientCommand::Logoff => {
                if !self.is_connected() {
                    return Err(ClientCommandError::NotConnected);
                }
                self.close_connection()?;
                Ok(None)
            }
            ClientCommand::SetHost(arg) => {
                if self.is_connected() {
                    return Err(ClientCommandError::HostLocked);
                }
                let host = arg.ok_or(ClientCommandError::MissingHost)?;
                let reply = format!("Host set to: {}", host);
                self.config.host = host;
                Ok(Some(reply))
            }
            ClientCommand::SetPort(arg) => {
                if self.is_connected() {
                    return Err(ClientCommandError::PortLocked);
                }
                let arg = arg.ok_or(ClientCommandError::MissingPort)?;
                let port = parse_port(&arg).ok_or(ClientCommandError::InvalidPort)?;
                self.config.port = port;
                Ok(Some(format!("Port set to: {}", port)))
            }
            ClientCommand::Login => {
                if self.is_connected() {
                    return Err(ClientCommandError::AlreadyConnected);
                }
                self.open().await?;
                Ok(None)
            }
            ClientCommand::GetHost => Ok(Some(format!("Current host: {}", self.config.host))),
            ClientCommand::GetPort => Ok(Some(format!("Current port: {}", self.config.port))),
            ClientCommand::Unknown(name) => {
                debug!("Unknown client command {}", name);
                Err(ClientCommandError::Unknown)
            }
        }
    }
}
