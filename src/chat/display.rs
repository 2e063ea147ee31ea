// Output sink shared by the console and connection tasks

/// Where an endpoint shows messages to its local user.
///
/// Called from the console task and from connection tasks at the same
/// time, so implementations must be thread-safe.
pub trait ChatDisplay: Send + Sync + 'static {
    fn display(&self, message: &str);
}

/// Prints each message on stdout behind a `> ` prompt marker
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl ChatDisplay for ConsoleDisplay {
    fn display(&self, message: &str) {
        // println! takes the stdout lock for the whole line
        println!("> {}", message);
    }
}
