//! Alert severities and the dispatcher that fans them out.
//!
//! Severity decides the sinks: everything lands in syslog, `Low` and up
//! also on stderr, `Medium` and up on the console, and `Highest` alone
//! goes out over the network as mail. Sink failures are tolerated; a
//! monitor that dies because syslogd or the mail server is down is worse
//! than one that keeps watching.

use std::fs::OpenOptions;
use std::io::Write;

use syslog::{Facility, Formatter3164};
use tracing::{error, info, warn};

use crate::config::{NO_RECIPIENT, Options};
use crate::mail;

/// Subject line for mailed alerts.
const MAIL_SUBJECT: &str = "Network Alert from Antidote";

/// Alert severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Notice,
    Low,
    Medium,
    Highest,
}

/// Where the audit engine hands its verdicts. Implemented by the real
/// [`Dispatcher`] and by recording sinks in tests.
pub trait AlertSink {
    fn alert(&mut self, severity: Severity, message: &str);
}

enum SyslogLevel {
    Info,
    Err,
    Crit,
}

/// Fans one (severity, message) pair out to the configured sinks.
pub struct Dispatcher {
    opts: Options,
}

impl Dispatcher {
    pub fn new(opts: Options) -> Self {
        Dispatcher { opts }
    }

    /// Mail alerting is on unless the recipient is the literal `NO`.
    pub fn network_alerts_enabled(&self) -> bool {
        self.opts.email_recipient != NO_RECIPIENT
    }

    fn syslog_send(&self, facility: Facility, level: SyslogLevel, message: &str) {
        let formatter = Formatter3164 {
            facility,
            hostname: None,
            process: crate::PROGRAM.to_string(),
            pid: std::process::id(),
        };
        match syslog::unix(formatter) {
            Ok(mut logger) => {
                let result = match level {
                    SyslogLevel::Info => logger.info(message),
                    SyslogLevel::Err => logger.err(message),
                    SyslogLevel::Crit => logger.crit(message),
                };
                if let Err(e) = result {
                    warn!(error = %e, "syslog write failed");
                }
            }
            Err(e) => warn!(error = %e, "cannot open syslog"),
        }
    }

    /// Best effort; the console may not exist or may not be writable.
    fn console(&self, message: &str) {
        if let Ok(mut console) = OpenOptions::new().write(true).open("/dev/console") {
            let _ = writeln!(console, "{}: {}", crate::PROGRAM, message);
        }
    }

    fn netalert(&self, message: &str) {
        if !self.network_alerts_enabled() {
            return;
        }
        if let Err(e) = mail::send(&self.opts, MAIL_SUBJECT, message) {
            // never propagated; the capture loop must keep running
            self.syslog_send(Facility::LOG_AUTHPRIV, SyslogLevel::Err, &e.to_string());
            error!(error = %e, "mail alert failed");
        }
    }
}

impl AlertSink for Dispatcher {
    fn alert(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Notice => {
                self.syslog_send(Facility::LOG_USER, SyslogLevel::Info, message);
            }
            Severity::Low => {
                self.syslog_send(Facility::LOG_USER, SyslogLevel::Info, message);
                info!("{}", message);
            }
            Severity::Medium => {
                self.syslog_send(Facility::LOG_USER, SyslogLevel::Err, message);
                error!("{}", message);
                self.console(message);
            }
            Severity::Highest => {
                self.syslog_send(Facility::LOG_AUTHPRIV, SyslogLevel::Crit, message);
                error!("{}", message);
                self.console(message);
                self.netalert(message);
            }
        }
    }
}
