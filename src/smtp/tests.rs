use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::*;
use crate::cancel::{CancellationToken, Interrupter};
use crate::dns::tests::StubDns;
use crate::flags;

pub(crate) type RcptHandler = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Behaviour of one scripted mail exchanger. Replies are raw wire text.
#[derive(Clone)]
pub(crate) struct MockServer {
    pub greeting: String,
    pub ehlo: String,
    pub helo: String,
    pub starttls: String,
    pub tls_works: bool,
    pub mail_from: String,
    pub rcpt: RcptHandler,
    /// Verb that gets no reply at all, simulating a stalled server. Reads
    /// then block until the channel timeout or an interrupt.
    pub stall_on: Option<&'static str>,
}

impl MockServer {
    pub(crate) fn accepting() -> Self {
        Self {
            greeting: "220 mock.smtp.test ESMTP\r\n".into(),
            ehlo: "250-mock.smtp.test\r\n250 SIZE 10240000\r\n".into(),
            helo: "250 mock.smtp.test\r\n".into(),
            starttls: "454 4.7.0 TLS not available\r\n".into(),
            tls_works: false,
            mail_from: "250 2.1.0 Ok\r\n".into(),
            rcpt: Arc::new(|_| "250 2.1.5 Ok\r\n".to_string()),
            stall_on: None,
        }
    }

    pub(crate) fn rcpt_reply(reply: &str) -> Self {
        let line = format!("{reply}\r\n");
        Self {
            rcpt: Arc::new(move |_| line.clone()),
            ..Self::accepting()
        }
    }

    pub(crate) fn with_rcpt<F>(handler: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            rcpt: Arc::new(move |addr| format!("{}\r\n", handler(addr))),
            ..Self::accepting()
        }
    }
}

/// In-memory connector. Unknown hosts refuse the connection.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    servers: HashMap<String, MockServer>,
    connections: AtomicUsize,
    commands: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_server(mut self, host: &str, server: MockServer) -> Self {
        self.servers.insert(host.to_string(), server);
        self
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl SmtpConnector for ScriptedConnector {
    fn connect(
        &self,
        host: &str,
        _port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let server = self.servers.get(host).cloned().ok_or_else(|| {
            SmtpError::connect(
                host,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            )
        })?;
        let mut output = VecDeque::new();
        output.extend(server.greeting.as_bytes());
        Ok(Box::new(ScriptedChannel {
            server,
            pending: Vec::new(),
            output,
            commands: Arc::clone(&self.commands),
            closed: Arc::clone(&self.closed),
            shut: false,
            timeout: Duration::from_secs(5),
            wake: Arc::new(Wake::default()),
        }))
    }
}

struct ScriptedChannel {
    server: MockServer,
    pending: Vec<u8>,
    output: VecDeque<u8>,
    commands: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
    shut: bool,
    timeout: Duration,
    wake: Arc<Wake>,
}

/// Lets another thread unblock a stalled read, like shutting down a socket.
#[derive(Default)]
struct Wake {
    interrupted: Mutex<bool>,
    signal: Condvar,
}

impl ScriptedChannel {
    fn stall(&self) -> io::Result<usize> {
        let deadline = Instant::now() + self.timeout;
        let mut interrupted = self.wake.interrupted.lock();
        while !*interrupted {
            if self.wake.signal.wait_until(&mut interrupted, deadline).timed_out() {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "read timed out"));
            }
        }
        Ok(0)
    }

    fn respond(&mut self, line: &str) {
        self.commands.lock().push(line.to_string());
        let verb = line
            .split([' ', ':'])
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if self.server.stall_on == Some(verb.as_str()) {
            return;
        }
        let reply = match verb.as_str() {
            "EHLO" => self.server.ehlo.clone(),
            "HELO" => self.server.helo.clone(),
            "STARTTLS" => self.server.starttls.clone(),
            "MAIL" => self.server.mail_from.clone(),
            "RCPT" => {
                let addr = line
                    .split_once('<')
                    .and_then(|(_, rest)| rest.split_once('>'))
                    .map(|(addr, _)| addr)
                    .unwrap_or_default();
                (self.server.rcpt)(addr)
            }
            "RSET" => "250 2.0.0 Ok\r\n".to_string(),
            "QUIT" => "221 2.0.0 Bye\r\n".to_string(),
            _ => "502 5.5.2 Command not recognized\r\n".to_string(),
        };
        self.output.extend(reply.as_bytes());
    }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.shut {
            return Ok(0);
        }
        if self.output.is_empty() {
            return self.stall();
        }
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shut {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.pending.drain(..pos + 2).collect();
            let line = String::from_utf8_lossy(&line[..pos]).into_owned();
            self.respond(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SmtpChannel for ScriptedChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn upgrade_tls(
        self: Box<Self>,
        host: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError> {
        if self.server.tls_works {
            Ok(self)
        } else {
            // the connection is consumed, like a real failed handshake
            let mut channel = self;
            channel.shutdown();
            Err(SmtpError::handshake(host, "handshake failure"))
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let wake = Arc::clone(&self.wake);
        Some(Box::new(move || {
            *wake.interrupted.lock() = true;
            wake.signal.notify_all();
        }))
    }

    fn shutdown(&mut self) {
        if !self.shut {
            self.shut = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn probe_with(connector: &ScriptedConnector, recipient: &str) -> ProbeOutcome {
    let options = ProbeOptions::default();
    let cancel = CancellationToken::new();
    SmtpProber::new(connector, &options, &cancel).probe("mx.example.com", recipient)
}

fn stalling_on_rcpt() -> ScriptedConnector {
    let server = MockServer {
        stall_on: Some("RCPT"),
        ..MockServer::accepting()
    };
    ScriptedConnector::new().with_server("mx.example.com", server)
}

#[test]
fn accepted_recipient_runs_full_conversation() {
    let connector = ScriptedConnector::new().with_server("mx.example.com", MockServer::accepting());
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Valid);
    assert!(outcome.is_valid);
    let commands = connector.commands();
    assert_eq!(
        commands,
        vec![
            "EHLO localhost",
            "MAIL FROM:<postmaster@example.com>",
            "RCPT TO:<alice@example.com>",
            "QUIT",
        ]
    );
    assert!(!commands.iter().any(|c| c.starts_with("DATA")));
    assert_eq!(connector.closed_count(), 1);
    assert!(outcome.transcript.iter().any(|l| l.contains("S: 250 2.1.5 Ok")));
}

#[test]
fn rejected_recipient_is_invalid_and_still_quits() {
    let connector = ScriptedConnector::new()
        .with_server("mx.example.com", MockServer::rcpt_reply("550 5.1.1 No such user"));
    let outcome = probe_with(&connector, "ghost@example.com");

    assert_eq!(outcome.result, ProbeResult::Invalid);
    assert!(outcome.has_flag(flags::USER_UNKNOWN));
    assert_eq!(connector.commands().last().map(String::as_str), Some("QUIT"));
    assert_eq!(connector.closed_count(), 1);
}

#[test]
fn connection_refused_is_unknown_not_invalid() {
    let connector = ScriptedConnector::new();
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(!outcome.is_valid);
    assert!(outcome.has_flag(flags::CONNECTION_FAILED));
}

#[test]
fn bad_greeting_is_unknown() {
    let server = MockServer {
        greeting: "554 5.7.1 Service unavailable; client host blocked\r\n".into(),
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::UNEXPECTED_GREETING));
    assert!(outcome.has_flag(flags::ANTI_SPAM_POLICY));
    assert!(!connector.commands().iter().any(|c| c.starts_with("RCPT")));
    assert_eq!(connector.closed_count(), 1);
}

#[test]
fn stalled_server_times_out_and_closes() {
    let connector = stalling_on_rcpt();
    let options = ProbeOptions {
        command_timeout: Duration::from_millis(50),
        ..ProbeOptions::default()
    };
    let cancel = CancellationToken::new();
    let outcome =
        SmtpProber::new(&connector, &options, &cancel).probe("mx.example.com", "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::SMTP_TIMEOUT));
    // no QUIT after a transport failure, but the socket is still closed once
    assert!(!connector.commands().iter().any(|c| c == "QUIT"));
    assert_eq!(connector.closed_count(), 1);
}

#[test]
fn cancel_interrupts_pending_rcpt() {
    let connector = stalling_on_rcpt();
    let options = ProbeOptions {
        command_timeout: Duration::from_secs(30),
        ..ProbeOptions::default()
    };
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let outcome = thread::scope(|scope| {
        scope.spawn(|| {
            while !connector.commands().iter().any(|c| c.starts_with("RCPT")) {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });
        SmtpProber::new(&connector, &options, &cancel).probe("mx.example.com", "alice@example.com")
    });

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::CANCELLED));
    assert!(!connector.commands().iter().any(|c| c == "QUIT"));
    assert_eq!(connector.connection_count(), 1);
    assert_eq!(connector.closed_count(), 1);
}

#[test]
fn non_ascii_after_reply_code_is_a_protocol_error() {
    let connector =
        ScriptedConnector::new().with_server("mx.example.com", MockServer::rcpt_reply("250é accepted"));
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(!outcome.is_valid);
    assert!(outcome.has_flag(flags::PROTOCOL_ERROR));
    assert_eq!(connector.closed_count(), 1);
}

#[test]
fn malformed_reply_codes_are_protocol_errors() {
    for reply in ["25", "+50 ok", "2x0 ok", "250\u{FFFD}ok", "250_ok"] {
        let connector =
            ScriptedConnector::new().with_server("mx.example.com", MockServer::rcpt_reply(reply));
        let outcome = probe_with(&connector, "alice@example.com");
        assert!(outcome.has_flag(flags::PROTOCOL_ERROR), "{reply}");
    }
}

#[test]
fn bare_code_reply_is_accepted() {
    let connector = ScriptedConnector::new().with_server("mx.example.com", MockServer::rcpt_reply("250"));
    let outcome = probe_with(&connector, "alice@example.com");
    assert_eq!(outcome.result, ProbeResult::Valid);
}

#[test]
fn transient_sender_refusal_is_marked_temporary() {
    let server = MockServer {
        mail_from: "451 4.7.1 Greylisted, try again later\r\n".into(),
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::SENDER_REJECTED));
    assert!(outcome.has_flag(flags::TEMPORARY_FAILURE));
}

#[test]
fn tcp_connector_reports_names_without_addresses() {
    let dns = Arc::new(StubDns::new());
    let connector = TcpConnector::new(false, dns.clone()).expect("tls backend");
    let err = match connector.connect("mx.nowhere.test", 25, Duration::from_secs(1)) {
        Ok(_) => panic!("connected without an address"),
        Err(err) => err,
    };

    assert!(matches!(err, SmtpError::Connect { .. }));
    assert!(!err.is_timeout());
    assert_eq!(dns.query_count(), 1);
}

#[test]
fn ehlo_refusal_falls_back_to_helo() {
    let server = MockServer {
        ehlo: "502 5.5.2 EHLO not supported\r\n".into(),
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Valid);
    assert!(connector.commands().iter().any(|c| c == "HELO localhost"));
}

#[test]
fn sender_rejection_is_unknown() {
    let server = MockServer {
        mail_from: "553 5.7.1 Sender rejected by policy\r\n".into(),
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::SENDER_REJECTED));
    assert!(outcome.has_flag(flags::ANTI_SPAM_POLICY));
}

#[test]
fn refused_starttls_continues_in_plaintext() {
    let server = MockServer {
        ehlo: "250-mock.smtp.test\r\n250 STARTTLS\r\n".into(),
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Valid);
    assert!(!outcome.has_flag(flags::STARTTLS_FAILED));
    assert_eq!(connector.connection_count(), 1);
}

#[test]
fn successful_starttls_repeats_ehlo() {
    let server = MockServer {
        ehlo: "250-mock.smtp.test\r\n250 STARTTLS\r\n".into(),
        starttls: "220 2.0.0 Ready to start TLS\r\n".into(),
        tls_works: true,
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Valid);
    let ehlos = connector
        .commands()
        .iter()
        .filter(|c| c.starts_with("EHLO"))
        .count();
    assert_eq!(ehlos, 2);
    assert!(outcome.transcript.iter().any(|l| l.contains("TLS established")));
}

#[test]
fn failed_handshake_reconnects_in_plaintext() {
    let server = MockServer {
        ehlo: "250-mock.smtp.test\r\n250 STARTTLS\r\n".into(),
        starttls: "220 2.0.0 Ready to start TLS\r\n".into(),
        tls_works: false,
        ..MockServer::accepting()
    };
    let connector = ScriptedConnector::new().with_server("mx.example.com", server);
    let outcome = probe_with(&connector, "alice@example.com");

    assert_eq!(outcome.result, ProbeResult::Valid);
    assert!(outcome.has_flag(flags::STARTTLS_FAILED));
    assert_eq!(connector.connection_count(), 2);
    assert_eq!(connector.closed_count(), 2);
    let starttls = connector
        .commands()
        .iter()
        .filter(|c| *c == "STARTTLS")
        .count();
    assert_eq!(starttls, 1);
}

#[test]
fn cancelled_token_skips_connection() {
    let connector = ScriptedConnector::new().with_server("mx.example.com", MockServer::accepting());
    let options = ProbeOptions::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = SmtpProber::new(&connector, &options, &cancel).probe("mx.example.com", "a@example.com");

    assert_eq!(outcome.result, ProbeResult::Unknown);
    assert!(outcome.has_flag(flags::CANCELLED));
    assert_eq!(connector.connection_count(), 0);
}

#[test]
fn custom_identity_is_used() {
    let connector = ScriptedConnector::new().with_server("mx.example.com", MockServer::accepting());
    let options = ProbeOptions {
        helo_domain: Some("probe.example.net".into()),
        envelope_sender: Some("bounce@probe.example.net".into()),
        ..ProbeOptions::default()
    };
    let cancel = CancellationToken::new();
    SmtpProber::new(&connector, &options, &cancel).probe("mx.example.com", "a@example.com");

    let commands = connector.commands();
    assert_eq!(commands[0], "EHLO probe.example.net");
    assert_eq!(commands[1], "MAIL FROM:<bounce@probe.example.net>");
}

#[test]
fn multiline_capabilities_are_parsed() {
    let reply = SmtpResponse::new(250, "mock.smtp.test\nPIPELINING\nSTARTTLS\nSIZE 1000");
    assert!(reply.has_capability("starttls"));
    assert!(!reply.has_capability("AUTH"));
}

#[test]
#[ignore = "requires loopback TCP binding"]
fn tcp_connector_talks_to_loopback_server() {
    use std::io::{BufRead, BufReader};
    use std::net::{Ipv4Addr, TcpListener};

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        stream.write_all(b"220 loopback ESMTP\r\n").expect("greeting");
        for response in [
            "250 loopback\r\n",
            "250 2.1.0 Ok\r\n",
            "550 5.1.1 User unknown\r\n",
            "221 Bye\r\n",
        ] {
            let mut line = String::new();
            reader.read_line(&mut line).expect("command");
            stream.write_all(response.as_bytes()).expect("reply");
        }
    });

    let dns = Arc::new(StubDns::new().with_ips("mx.loopback.test", &[Ipv4Addr::LOCALHOST.into()]));
    let connector = TcpConnector::new(false, dns.clone()).expect("tls backend");
    let options = ProbeOptions {
        port,
        ..ProbeOptions::default()
    };
    let cancel = CancellationToken::new();
    let outcome =
        SmtpProber::new(&connector, &options, &cancel).probe("mx.loopback.test", "bob@example.com");
    assert_eq!(outcome.result, ProbeResult::Invalid);
    assert!(outcome.has_flag(flags::USER_UNKNOWN));
    assert_eq!(dns.query_count(), 1);
    handle.join().expect("server thread");
}
