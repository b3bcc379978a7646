//! Minimal SMTP delivery for the highest-severity alerts.
//!
//! The exchange is the classic one: greet, `HELO`, `MAIL FROM`,
//! `RCPT TO`, `DATA`, headers plus body plus a lone dot, `QUIT`. All
//! line terminators are CRLF. Every step is bounded by a 10 second
//! timeout so a wedged mail server cannot stall the capture loop
//! indefinitely; an elapsed timeout surfaces as a closed connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::config::{NO_RECIPIENT, Options};
use crate::error::Error;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Deliver one alert message to the configured recipient. Never retried;
/// the caller logs failures locally.
pub fn send(opts: &Options, subject: &str, body: &str) -> Result<(), Error> {
    if opts.email_recipient == NO_RECIPIENT {
        // callers are expected to check first; never open a connection
        return Err(Error::BadUsage);
    }
    let addr = resolve(&opts.mail_server, opts.mail_server_port)?;
    let mut stream =
        TcpStream::connect_timeout(&addr, STEP_TIMEOUT).map_err(Error::ConnectMailServer)?;
    stream
        .set_read_timeout(Some(STEP_TIMEOUT))
        .map_err(Error::ConnectMailServer)?;
    stream
        .set_write_timeout(Some(STEP_TIMEOUT))
        .map_err(Error::ConnectMailServer)?;
    let mut replies = BufReader::new(stream.try_clone().map_err(Error::ConnectMailServer)?);

    expect(&mut replies, "220")?;
    send_line(&mut stream, &format!("HELO {}", local_hostname()))?;
    expect(&mut replies, "250")?;
    send_line(&mut stream, &format!("MAIL FROM:{}", opts.email_sender))?;
    expect(&mut replies, "250")?;
    send_line(&mut stream, &format!("RCPT TO:{}", opts.email_recipient))?;
    expect(&mut replies, "250")?;
    send_line(&mut stream, "DATA")?;
    expect(&mut replies, "354")?;
    send_line(&mut stream, &format!("Date: {}", Utc::now().to_rfc2822()))?;
    send_line(&mut stream, &format!("From: {}", opts.email_sender))?;
    send_line(&mut stream, &format!("Subject: {subject}"))?;
    send_line(&mut stream, &format!("To: {}", opts.email_recipient))?;
    send_line(&mut stream, "")?;
    send_line(&mut stream, body)?;
    send_line(&mut stream, ".")?;
    expect(&mut replies, "250")?;
    send_line(&mut stream, "QUIT")?;
    expect(&mut replies, "221")?;
    debug!(server = %opts.mail_server, to = %opts.email_recipient, "alert mail delivered");
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::ResolveMailServer)?
        .next()
        .ok_or(Error::ResolveMailServer)
}

fn send_line(stream: &mut TcpStream, line: &str) -> Result<(), Error> {
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\r\n"))
        .map_err(|_| Error::ConnectionClosed)
}

/// Read one SMTP reply and require the given code. Continuation lines
/// (`250-...`) are consumed until the final line of the reply.
fn expect(replies: &mut impl BufRead, code: &'static str) -> Result<(), Error> {
    loop {
        let mut line = String::new();
        let n = line_read(replies, &mut line)?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        if !line.starts_with(code) {
            return Err(Error::WrongReply {
                expected: code,
                got: line.trim_end().to_string(),
            });
        }
        if line.as_bytes().get(3) != Some(&b'-') {
            return Ok(());
        }
    }
}

fn line_read(replies: &mut impl BufRead, line: &mut String) -> Result<usize, Error> {
    replies.read_line(line).map_err(|_| Error::ConnectionClosed)
}

fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost.localdomain".to_string())
}
