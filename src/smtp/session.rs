use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use super::{SmtpChannel, SmtpConnector, SmtpError, SmtpResponse};
use crate::cancel::{CancellationToken, Registration};

const MAX_REPLY_BYTES: usize = 64 * 1024;

/// One SMTP connection plus its transcript. The channel is shut down exactly
/// once, by [`SmtpSession::close`] or on drop, whichever comes first.
pub(crate) struct SmtpSession<'a> {
    host: String,
    channel: Option<Box<dyn SmtpChannel>>,
    buffer: Vec<u8>,
    transcript: Vec<String>,
    cancel: &'a CancellationToken,
    _registration: Option<Registration>,
}

impl<'a> SmtpSession<'a> {
    pub(crate) fn open(
        connector: &dyn SmtpConnector,
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> Result<Self, SmtpError> {
        let timeout = cancel.bounded(timeout).ok_or(SmtpError::Cancelled)?;
        let channel = connector.connect(host, port, timeout)?;
        let registration = channel.interrupter().map(|interrupt| cancel.register(interrupt));
        let mut session = Self {
            host: host.to_string(),
            channel: Some(channel),
            buffer: Vec::new(),
            transcript: Vec::new(),
            cancel,
            _registration: registration,
        };
        session.record("*", &format!("connected to {host}:{port}"));
        Ok(session)
    }

    pub(crate) fn record(&mut self, direction: &str, message: &str) {
        self.transcript
            .push(format!("[{}] {direction}: {message}", self.host));
    }

    pub(crate) fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }

    /// Reads one (possibly multi-line) reply within `timeout`.
    pub(crate) fn read_reply(&mut self, timeout: Duration) -> Result<SmtpResponse, SmtpError> {
        self.arm(timeout)?;
        let reply = self.read_reply_inner().map_err(|err| self.on_error(err))?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Sends `command` and reads its reply within `timeout`.
    pub(crate) fn command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<SmtpResponse, SmtpError> {
        self.arm(timeout)?;
        self.record("C", command);
        debug!(host = %self.host, command, "smtp command");
        self.write_line(command).map_err(|err| self.on_error(err))?;
        let reply = self.read_reply_inner().map_err(|err| self.on_error(err))?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Swaps the plaintext channel for a TLS one. Buffered plaintext is
    /// discarded so nothing read before the handshake leaks into the TLS
    /// conversation.
    pub(crate) fn upgrade_tls(&mut self, timeout: Duration) -> Result<(), SmtpError> {
        let timeout = self.cancel.bounded(timeout).ok_or(SmtpError::Cancelled)?;
        let channel = self.channel.take().ok_or_else(closed)?;
        self.buffer.clear();
        match channel.upgrade_tls(&self.host, timeout) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.record("*", "TLS established");
                Ok(())
            }
            Err(err) => {
                self.record("!", &format!("error: {err}"));
                Err(err)
            }
        }
    }

    /// Best-effort `QUIT`: failures are logged and otherwise ignored.
    pub(crate) fn quit(&mut self, timeout: Duration) {
        if self.channel.is_none() {
            return;
        }
        if let Err(err) = self.command("QUIT", timeout) {
            warn!(host = %self.host, error = %err, "QUIT failed");
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown();
            self.record("*", "connection closed");
        }
    }

    fn arm(&mut self, timeout: Duration) -> Result<(), SmtpError> {
        let timeout = self.cancel.bounded(timeout).ok_or(SmtpError::Cancelled)?;
        let channel = self.channel.as_mut().ok_or_else(closed)?;
        channel.set_timeout(timeout).map_err(SmtpError::io)
    }

    fn on_error(&mut self, err: SmtpError) -> SmtpError {
        let err = if self.cancel.is_cancelled() {
            SmtpError::Cancelled
        } else {
            err
        };
        self.record("!", &format!("error: {err}"));
        err
    }

    fn write_line(&mut self, command: &str) -> Result<(), SmtpError> {
        let channel = self.channel.as_mut().ok_or_else(closed)?;
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        channel.write_all(&data).map_err(SmtpError::io)?;
        channel.flush().map_err(SmtpError::io)
    }

    fn read_reply_inner(&mut self) -> Result<SmtpResponse, SmtpError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            let is_last = match line.as_bytes().get(3) {
                None | Some(b' ') => true,
                Some(b'-') => false,
                Some(_) => {
                    return Err(SmtpError::Protocol(format!("invalid reply: {line}")));
                }
            };
            let parsed_code = line
                .get(..3)
                .filter(|digits| digits.bytes().all(|byte| byte.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u16>().ok())
                .ok_or_else(|| SmtpError::Protocol(format!("invalid code in line: {line}")))?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(SmtpError::Protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed_code}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if is_last {
                break;
            }
        }
        Ok(SmtpResponse {
            code: code.unwrap_or_default(),
            message: lines.join("\n"),
        })
    }

    fn read_line(&mut self) -> Result<String, SmtpError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else if line.ends_with(b"\n") {
                    line.truncate(line.len() - 1);
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_REPLY_BYTES {
                return Err(SmtpError::Protocol("reply line too long".into()));
            }

            let channel = self.channel.as_mut().ok_or_else(closed)?;
            let mut buf = [0u8; 512];
            let read = channel.read(&mut buf).map_err(SmtpError::io)?;
            if read == 0 {
                return Err(SmtpError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }

    fn record_reply(&mut self, reply: &SmtpResponse) {
        if reply.message.is_empty() {
            self.record("S", &reply.code.to_string());
        } else {
            let lines: Vec<String> = reply
                .message
                .lines()
                .map(|line| format!("{} {}", reply.code, line))
                .collect();
            for line in lines {
                self.record("S", &line);
            }
        }
    }
}

impl Drop for SmtpSession<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn closed() -> SmtpError {
    SmtpError::Protocol("connection already closed".into())
}
