/// Binary that reads the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    Daemon,
    Cli,
}

impl Consumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consumer::Daemon => "DAEMON",
            Consumer::Cli => "CLI",
        }
    }
}

/// JSON-pointer prefixes each consumer actually reads. A leaf under any
/// prefix counts as consumed.
pub fn consumed_pointers(consumer: Consumer) -> &'static [&'static str] {
    match consumer {
        Consumer::Daemon => DAEMON,
        Consumer::Cli => CLI,
    }
}

static DAEMON: &[&str] = &[
    "/offroute",
    "/reservation",
    "/compensation",
    "/daemon",
    "/database/url_env",
];

// `fl assess` uses the compensation policy; `fl db` resolves the URL.
static CLI: &[&str] = &["/compensation", "/database/url_env"];
