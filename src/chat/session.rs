// Per-connection authentication state on the server

use crate::chat::command::CommandLine;
use crate::chat::error::ProtocolViolation;
use crate::chat::transport::{Connection, ConnectionId};

/// Authentication state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// What the server should do with an inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The peer logged in with this id
    LoggedIn(String),
    /// An attributed chat line ready for broadcast
    Chat(String),
    /// The peer broke the protocol; send the violation and close
    Rejected(ProtocolViolation),
}

/// One connected peer as seen by the server
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    login_id: Option<String>,
    state: SessionState,
}

impl Session {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            login_id: None,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn login_id(&self) -> Option<&str> {
        self.login_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Mark the session closed. Terminal.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Run one inbound line through the login state machine.
    ///
    /// Returns `None` for lines that arrive after the session was closed.
    /// A rejection moves the session to `Closed`.
    pub fn admit(&mut self, line: &str) -> Option<Admission> {
        if self.is_closed() {
            return None;
        }

        let admission = match CommandLine::parse(line).filter(CommandLine::is_login) {
            Some(login) => self.login(login.argument),
            None => self.chat(line),
        };

        if matches!(admission, Admission::Rejected(_)) {
            self.close();
        }

        Some(admission)
    }

    fn login(&mut self, argument: Option<&str>) -> Admission {
        if self.state == SessionState::Authenticated {
            return Admission::Rejected(ProtocolViolation::AlreadyLoggedIn);
        }

        match argument {
            Some(id) => {
                self.login_id = Some(id.to_string());
                self.state = SessionState::Authenticated;
                Admission::LoggedIn(id.to_string())
            }
            None => Admission::Rejected(ProtocolViolation::MalformedLogin),
        }
    }

    fn chat(&self, line: &str) -> Admission {
        match (&self.state, &self.login_id) {
            (SessionState::Authenticated, Some(id)) => Admission::Chat(format!("{}: {}", id, line)),
            _ => Admission::Rejected(ProtocolViolation::NotLoggedIn),
        }
    }
}
