use tracing::{debug, warn};

use super::classify::{classify_rcpt, note_policy};
use super::session::SmtpSession;
use super::{ProbeOptions, ProbeOutcome, SmtpConnector, SmtpError, SmtpResponse};
use crate::cancel::CancellationToken;
use crate::flags;

/// Runs single-recipient SMTP conversations:
/// connect, greeting, EHLO, optional STARTTLS, MAIL FROM, RCPT TO, QUIT.
/// `DATA` is never sent.
pub struct SmtpProber<'a> {
    connector: &'a dyn SmtpConnector,
    options: &'a ProbeOptions,
    cancel: &'a CancellationToken,
}

enum AttemptError {
    Failed(SmtpError),
    TlsFailed(SmtpError),
}

impl From<SmtpError> for AttemptError {
    fn from(err: SmtpError) -> Self {
        Self::Failed(err)
    }
}

impl<'a> SmtpProber<'a> {
    pub fn new(
        connector: &'a dyn SmtpConnector,
        options: &'a ProbeOptions,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            connector,
            options,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Probes `recipient` on `host`. Transport failures never surface as
    /// errors: they become `unknown` outcomes carrying a descriptive flag.
    pub fn probe(&self, host: &str, recipient: &str) -> ProbeOutcome {
        debug!(host, recipient, "starting SMTP probe");
        let mut transcript = Vec::new();
        let starttls = self.options.starttls;
        let mut outcome = match self.attempt(host, recipient, starttls, &mut transcript) {
            Ok(outcome) => outcome,
            Err(AttemptError::TlsFailed(err)) => {
                warn!(host, error = %err, "STARTTLS handshake failed, retrying in plaintext");
                let outcome = match self.attempt(host, recipient, false, &mut transcript) {
                    Ok(outcome) => outcome,
                    Err(AttemptError::Failed(err) | AttemptError::TlsFailed(err)) => {
                        failure_outcome(host, &err)
                    }
                };
                outcome.with_flag(flags::STARTTLS_FAILED)
            }
            Err(AttemptError::Failed(err)) => {
                warn!(host, error = %err, "SMTP probe could not complete");
                failure_outcome(host, &err)
            }
        };
        outcome.transcript = transcript;
        debug!(host, result = %outcome.result, "SMTP probe finished");
        outcome
    }

    fn attempt(
        &self,
        host: &str,
        recipient: &str,
        use_tls: bool,
        transcript: &mut Vec<String>,
    ) -> Result<ProbeOutcome, AttemptError> {
        let mut session = SmtpSession::open(
            self.connector,
            host,
            self.options.port,
            self.options.connect_timeout,
            self.cancel,
        )?;
        let result = self.converse(&mut session, host, recipient, use_tls);
        if result.is_ok() {
            session.quit(self.options.command_timeout);
        }
        session.close();
        transcript.extend(session.take_transcript());
        result
    }

    fn converse(
        &self,
        session: &mut SmtpSession<'_>,
        host: &str,
        recipient: &str,
        use_tls: bool,
    ) -> Result<ProbeOutcome, AttemptError> {
        let greeting = session.read_reply(self.options.greeting_timeout)?;
        if greeting.code != 220 {
            return Ok(refusal(
                host,
                &greeting,
                flags::UNEXPECTED_GREETING,
                "greeted with",
            ));
        }

        let ehlo = match self.hello(session)? {
            Ok(reply) => reply,
            Err(rejected) => {
                return Ok(refusal(
                    host,
                    &rejected,
                    flags::EHLO_REJECTED,
                    "refused EHLO/HELO with",
                ));
            }
        };

        if use_tls && ehlo.has_capability("STARTTLS") {
            let reply = session.command("STARTTLS", self.options.tls_timeout)?;
            if reply.code == 220 {
                session
                    .upgrade_tls(self.options.tls_timeout)
                    .map_err(AttemptError::TlsFailed)?;
                if let Err(rejected) = self.hello(session)? {
                    return Ok(refusal(
                        host,
                        &rejected,
                        flags::EHLO_REJECTED,
                        "refused EHLO after TLS with",
                    ));
                }
            } else {
                debug!(host, code = reply.code, "STARTTLS refused, staying in plaintext");
            }
        }

        let domain = recipient.rsplit_once('@').map_or(recipient, |(_, domain)| domain);
        let mail_from = format!("MAIL FROM:<{}>", self.options.envelope_sender(domain));
        let mail_reply = session.command(&mail_from, self.options.command_timeout)?;
        if !mail_reply.is_positive_completion() {
            return Ok(refusal(
                host,
                &mail_reply,
                flags::SENDER_REJECTED,
                "refused the sender with",
            ));
        }

        let rcpt_reply =
            session.command(&format!("RCPT TO:<{recipient}>"), self.options.command_timeout)?;
        Ok(classify_rcpt(host, &rcpt_reply))
    }

    /// EHLO, falling back to HELO when EHLO is refused permanently. The
    /// inner `Err` carries the final refusal.
    fn hello(
        &self,
        session: &mut SmtpSession<'_>,
    ) -> Result<Result<SmtpResponse, SmtpResponse>, SmtpError> {
        let helo = self.options.helo_domain();
        let ehlo = session.command(&format!("EHLO {helo}"), self.options.command_timeout)?;
        if ehlo.is_positive_completion() {
            return Ok(Ok(ehlo));
        }
        if !ehlo.is_permanent_failure() {
            return Ok(Err(ehlo));
        }
        let reply = session.command(&format!("HELO {helo}"), self.options.command_timeout)?;
        if reply.is_positive_completion() {
            Ok(Ok(reply))
        } else {
            Ok(Err(reply))
        }
    }
}

fn refusal(host: &str, reply: &SmtpResponse, flag: &str, what: &str) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::unknown(format!("{host} {what} {reply}")).with_flag(flag);
    if reply.is_transient_failure() {
        outcome.add_flag(flags::TEMPORARY_FAILURE);
    }
    note_policy(&mut outcome, reply);
    outcome.mx_host = Some(host.to_string());
    outcome
}

fn failure_outcome(host: &str, err: &SmtpError) -> ProbeOutcome {
    let flag = match err {
        SmtpError::Cancelled => flags::CANCELLED,
        SmtpError::Connect { .. } => flags::CONNECTION_FAILED,
        _ if err.is_timeout() => flags::SMTP_TIMEOUT,
        SmtpError::Io { .. } => flags::SMTP_IO_ERROR,
        SmtpError::Tls { .. } | SmtpError::Handshake { .. } => flags::STARTTLS_FAILED,
        SmtpError::Protocol(_) => flags::PROTOCOL_ERROR,
    };
    let mut outcome =
        ProbeOutcome::unknown(format!("could not complete SMTP probe on {host}: {err}"))
            .with_flag(flag);
    if matches!(err, SmtpError::Connect { .. }) && err.is_timeout() {
        outcome.add_flag(flags::SMTP_TIMEOUT);
    }
    outcome.mx_host = Some(host.to_string());
    outcome
}
