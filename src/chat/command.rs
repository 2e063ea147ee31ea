// Command grammar shared by both console interpreters and the login handshake
//
// A command is a line whose first character is `#`. The command token runs
// up to the first space and is case-folded; the argument is everything after
// that space, verbatim. An empty remainder counts as no argument.

/// Token of the login handshake
pub const LOGIN: &str = "#login";

/// A `#`-prefixed line split into its command token and argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub name: String,
    pub argument: Option<&'a str>,
}

impl<'a> CommandLine<'a> {
    /// Split a line into command and argument, or `None` if it is not a command
    pub fn parse(line: &'a str) -> Option<Self> {
        if !line.starts_with('#') {
            return None;
        }

        let (name, argument) = match line.split_once(' ') {
            Some((name, rest)) => (name, Some(rest)),
            None => (line, None),
        };

        Some(Self {
            name: name.to_lowercase(),
            argument: argument.filter(|arg| !arg.is_empty()),
        })
    }

    pub fn is_login(&self) -> bool {
        self.name == LOGIN
    }

    fn owned_argument(&self) -> Option<String> {
        self.argument.map(str::to_string)
    }
}

/// Commands understood by the client console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(Option<String>),
    SetPort(Option<String>),
    Login,
    GetHost,
    GetPort,
    Unknown(String),
}

impl ClientCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let command = CommandLine::parse(line)?;
        Some(match command.name.as_str() {
            "#quit" => Self::Quit,
            "#logoff" => Self::Logoff,
            "#sethost" => Self::SetHost(command.owned_argument()),
            "#setport" => Self::SetPort(command.owned_argument()),
            LOGIN => Self::Login,
            "#gethost" => Self::GetHost,
            "#getport" => Self::GetPort,
            _ => Self::Unknown(command.name),
        })
    }
}

/// Commands understood by the server console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    SetPort(Option<String>),
    Start,
    GetPort,
    Unknown(String),
}

impl ServerCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let command = CommandLine::parse(line)?;
        Some(match command.name.as_str() {
            "#quit" => Self::Quit,
            "#stop" => Self::Stop,
            "#close" => Self::Close,
            "#setport" => Self::SetPort(command.owned_argument()),
            "#start" => Self::Start,
            "#getport" => Self::GetPort,
            _ => Self::Unknown(command.name),
        })
    }
}
