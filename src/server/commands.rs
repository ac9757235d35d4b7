//! Session command parser.

/// Parsed session command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the text back.
    Echo(String),
    Ping,
    /// Report transfer counters and fault states.
    Stats,
    /// Report connected sessions.
    Who,
    Help,
    Quit,
    /// Nothing but whitespace.
    Empty,
    Unknown(String),
}

/// One line per command, shown by `help`.
pub const HELP: &[&str] = &[
    "echo <text>  send <text> back",
    "ping         answer pong",
    "stats        show transfer counters",
    "who          show connected sessions",
    "help         show this list",
    "quit         end the session",
];

/// Parse one received line. The verb is case-insensitive.
pub fn parse(line: &[u8]) -> Command {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Command::Empty;
    }

    let (verb, rest) = match text.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim_start()),
        None => (text, ""),
    };

    if verb.eq_ignore_ascii_case("echo") {
        Command::Echo(rest.to_string())
    } else if !rest.is_empty() {
        Command::Unknown(text.to_string())
    } else if verb.eq_ignore_ascii_case("ping") {
        Command::Ping
    } else if verb.eq_ignore_ascii_case("stats") {
        Command::Stats
    } else if verb.eq_ignore_ascii_case("who") {
        Command::Who
    } else if verb.eq_ignore_ascii_case("help") {
        Command::Help
    } else if verb.eq_ignore_ascii_case("quit") || verb.eq_ignore_ascii_case("exit") {
        Command::Quit
    } else {
        Command::Unknown(text.to_string())
    }
}
