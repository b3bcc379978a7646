//! Error kinds for the whole monitor.
//!
//! Capture-initialization failures are fatal and become the process exit
//! code; everything else is either tolerated (mail delivery) or reported
//! through an alert and dropped (record allocation). Each variant decodes
//! to operator-readable text via `Display`.

use std::fmt;
use std::io;

/// A Result type for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The capture interface could not be found.
    InterfaceLookup,
    /// The capture interface could not be opened for live capture.
    InterfaceOpen(pcap::Error),
    /// The interface's network address and mask could not be determined.
    NetworkLookup,
    /// The BPF filter expression did not compile.
    FilterCompile(pcap::Error),
    /// The compiled BPF filter could not be installed.
    FilterInstall(pcap::Error),
    /// Record allocation failed.
    OutOfMemory,
    /// A routine was handed arguments it cannot honour.
    BadUsage,
    /// A stored MAC address no longer matches the wire. Informational;
    /// signals the caller that the stored MAC must be refreshed.
    MacChanged,
    /// The configuration file could not be opened.
    NoOptsFile(io::Error),
    /// The configuration file or command line did not parse.
    InvalidOptions(String),
    /// The mail server hostname did not resolve.
    ResolveMailServer,
    /// The mail server refused the connection.
    ConnectMailServer(io::Error),
    /// The peer closed the connection mid-exchange, or a step timed out.
    ConnectionClosed,
    /// The peer answered with an unexpected reply code.
    WrongReply {
        expected: &'static str,
        got: String,
    },
    /// The capture stream ended.
    EndOfFile,
}

impl Error {
    /// Numeric process exit code for this kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InterfaceLookup => 1,
            Error::InterfaceOpen(_) => 2,
            Error::FilterCompile(_) => 3,
            Error::FilterInstall(_) => 4,
            Error::OutOfMemory => 5,
            Error::BadUsage => 6,
            Error::MacChanged => 7,
            Error::NoOptsFile(_) => 8,
            Error::InvalidOptions(_) => 9,
            Error::ResolveMailServer => 10,
            Error::ConnectMailServer(_) => 11,
            Error::NetworkLookup => 12,
            Error::ConnectionClosed => 13,
            Error::WrongReply { .. } => 14,
            Error::EndOfFile => 15,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InterfaceLookup => write!(f, "cannot attach to capture device"),
            Error::InterfaceOpen(e) => write!(f, "cannot open capture device: {e}"),
            Error::NetworkLookup => write!(f, "cannot look up network address for capture device"),
            Error::FilterCompile(e) => write!(f, "cannot compile BPF packet filter: {e}"),
            Error::FilterInstall(e) => write!(f, "cannot set BPF packet filter: {e}"),
            Error::OutOfMemory => write!(f, "cannot allocate memory"),
            Error::BadUsage => write!(f, "routine called incorrectly"),
            Error::MacChanged => write!(f, "a MAC address has changed"),
            Error::NoOptsFile(e) => write!(f, "cannot open configuration file: {e}"),
            Error::InvalidOptions(detail) => write!(f, "syntax error in configuration: {detail}"),
            Error::ResolveMailServer => write!(f, "cannot resolve mail server hostname"),
            Error::ConnectMailServer(e) => write!(f, "cannot connect to mail server: {e}"),
            Error::ConnectionClosed => write!(f, "connection unexpectedly closed"),
            Error::WrongReply { expected, got } => {
                write!(f, "server returned an unexpected reply: wanted {expected}, got {got:?}")
            }
            Error::EndOfFile => write!(f, "end of capture stream"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InterfaceOpen(e) | Error::FilterCompile(e) | Error::FilterInstall(e) => Some(e),
            Error::NoOptsFile(e) | Error::ConnectMailServer(e) => Some(e),
            _ => None,
        }
    }
}
