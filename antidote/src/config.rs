//! Program options: defaults and the configuration-file parser.
//!
//! The file format is one `key value` or `key = value` pair per record,
//! keys case-insensitive, `#` starting a comment that runs to end of
//! line. Whitespace is free between tokens. Unknown keys are ignored so
//! old installations survive option renames.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

/// Default configuration file location.
pub const DEFAULT_OPTS_FILE: &str = "/etc/antidote.cfg";

/// Default BPF filter expression.
pub const DEFAULT_BPF_FILTER: &str = "arp";

/// Literal recipient value that disables network alerting.
pub const NO_RECIPIENT: &str = "NO";

/// Resolved, immutable program options. Built once at startup and shared
/// by reference for the life of the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Capture interface name; empty selects the first non-loopback one.
    pub device: String,
    /// SMTP `MAIL FROM` / `From:` address.
    pub email_sender: String,
    /// SMTP `RCPT TO` / `To:` address; [`NO_RECIPIENT`] disables mail.
    pub email_recipient: String,
    /// Mail server hostname.
    pub mail_server: String,
    /// Mail server TCP port.
    pub mail_server_port: u16,
    /// Promiscuous capture mode.
    pub promiscuous: bool,
    /// Alert when a stored MAC changes.
    pub check_mac_changes: bool,
    /// Upper bound on `replies - requests` before a poisoning alert.
    pub poison_threshold: i64,
    /// Lower bound on `replies - requests` before a bad-network alert.
    pub badnet_threshold: i64,
    /// Record age limit in seconds.
    pub timeout: u64,
    /// BPF filter expression handed to the capture driver.
    pub bpf_filter: String,
    /// CSV debug dump path; `None` disables the dump.
    pub dump_file: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            device: String::new(),
            email_sender: "antidote@localhost".to_string(),
            email_recipient: "root@localhost".to_string(),
            mail_server: "localhost".to_string(),
            mail_server_port: 25,
            promiscuous: true,
            check_mac_changes: true,
            poison_threshold: 10,
            badnet_threshold: -10,
            timeout: 1500,
            bpf_filter: DEFAULT_BPF_FILTER.to_string(),
            dump_file: None,
        }
    }
}

impl Options {
    /// Load options from a file, starting from the defaults.
    pub fn load(path: &Path) -> Result<Options, Error> {
        let text = fs::read_to_string(path).map_err(Error::NoOptsFile)?;
        Options::parse(&text)
    }

    /// Parse configuration text into options.
    pub fn parse(text: &str) -> Result<Options, Error> {
        let mut opts = Options::default();
        let mut tokens = tokenize(text);
        while let Some(name) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| Error::InvalidOptions(format!("{name}: missing value")))?;
            opts.set(name, value)?;
        }
        Ok(opts)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        match name.to_ascii_lowercase().as_str() {
            "ethernetdevice" => self.device = value.to_string(),
            "emailsender" => self.email_sender = value.to_string(),
            "emailrecipient" => self.email_recipient = value.to_string(),
            "emailserver" => self.mail_server = value.to_string(),
            "emailserverport" => self.mail_server_port = number(name, value)?,
            "promiscuous" => self.promiscuous = yes_no(name, value)?,
            "checkmacchanges" => self.check_mac_changes = yes_no(name, value)?,
            "poisonthreshold" => self.poison_threshold = number(name, value)?,
            "badnetthreshold" => self.badnet_threshold = number(name, value)?,
            // stored in seconds, configured in minutes
            "timeout" => self.timeout = number::<u64>(name, value)? * 60,
            "dumpfile" => self.dump_file = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Token stream over the configuration text: comments stripped, then
/// words split on whitespace and `=`.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter_map(|line| line.split('#').next())
        .flat_map(|line| {
            line.split(|c: char| c.is_whitespace() || c == '=')
                .filter(|token| !token.is_empty())
        })
}

fn yes_no(name: &str, value: &str) -> Result<bool, Error> {
    if value.eq_ignore_ascii_case("yes") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("no") {
        Ok(false)
    } else {
        Err(Error::InvalidOptions(format!(
            "{name}: expected yes or no, got {value:?}"
        )))
    }
}

fn number<T: FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::InvalidOptions(format!("{name}: invalid number {value:?}")))
}
