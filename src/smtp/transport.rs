use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::debug;

use super::SmtpError;
use crate::cancel::Interrupter;
use crate::dns::{DnsError, DnsLookup, PortProbe};

/// Opens byte channels to mail exchangers. The seam exists so probes can run
/// against scripted servers.
pub trait SmtpConnector: Send + Sync {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError>;
}

/// One owned SMTP connection.
pub trait SmtpChannel: Read + Write + Send {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Performs the TLS handshake after a `220` reply to `STARTTLS`. On
    /// failure the channel is consumed and the connection is gone.
    fn upgrade_tls(
        self: Box<Self>,
        host: &str,
        timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError>;

    /// Callback that unblocks a pending read/write from another thread.
    fn interrupter(&self) -> Option<Interrupter>;

    fn shutdown(&mut self);
}

impl<C: SmtpConnector + ?Sized> PortProbe for C {
    fn can_connect(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match self.connect(host, port, timeout) {
            Ok(mut channel) => {
                channel.shutdown();
                true
            }
            Err(err) => {
                debug!(host, port, error = %err, "port probe failed");
                false
            }
        }
    }
}

/// Blocking TCP connector with opportunistic `native-tls` upgrades. Host
/// names are resolved through the injected [`DnsLookup`] within the connect
/// timeout.
pub struct TcpConnector {
    tls: Arc<TlsConnector>,
    dns: Arc<dyn DnsLookup>,
}

impl TcpConnector {
    /// Certificates are not verified unless `verify_certs` is set: the probe
    /// never transmits message content, so TLS here only hides the envelope.
    pub fn new(verify_certs: bool, dns: Arc<dyn DnsLookup>) -> Result<Self, SmtpError> {
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(!verify_certs)
            .danger_accept_invalid_hostnames(!verify_certs)
            .build()
            .map_err(|source| SmtpError::Tls { source })?;
        Ok(Self {
            tls: Arc::new(tls),
            dns,
        })
    }

    fn addresses(&self, host: &str, timeout: Duration) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse() {
            return Ok(vec![ip]);
        }
        let ips = self.dns.lookup_ips(host, timeout).map_err(|err| match err {
            DnsError::Timeout => io::Error::new(io::ErrorKind::TimedOut, err),
            other => io::Error::new(io::ErrorKind::NotFound, other),
        })?;
        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no address records",
            ));
        }
        Ok(ips)
    }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector").finish_non_exhaustive()
    }
}

impl SmtpConnector for TcpConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError> {
        let deadline = Instant::now() + timeout;
        let ips = self
            .addresses(host, timeout)
            .map_err(|err| SmtpError::connect(host, err))?;
        let mut last_err = None;
        for ip in ips {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_err = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
                break;
            }
            let addr = SocketAddr::new(ip, port);
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    set_stream_timeout(&stream, timeout).map_err(SmtpError::io)?;
                    debug!(host, %addr, "connected");
                    return Ok(Box::new(PlainChannel {
                        stream,
                        tls: Arc::clone(&self.tls),
                    }));
                }
                Err(err) => {
                    debug!(host, %addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(SmtpError::connect(
            host,
            last_err.unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "no socket address available",
                )
            }),
        ))
    }
}

struct PlainChannel {
    stream: TcpStream,
    tls: Arc<TlsConnector>,
}

impl Read for PlainChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for PlainChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SmtpChannel for PlainChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        set_stream_timeout(&self.stream, timeout)
    }

    fn upgrade_tls(
        self: Box<Self>,
        host: &str,
        timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError> {
        let PlainChannel { stream, tls } = *self;
        set_stream_timeout(&stream, timeout).map_err(SmtpError::io)?;
        let stream = complete_handshake(&tls, host, stream)?;
        Ok(Box::new(TlsChannel { stream }))
    }

    fn interrupter(&self) -> Option<Interrupter> {
        socket_interrupter(&self.stream)
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct TlsChannel {
    stream: TlsStream<TcpStream>,
}

impl Read for TlsChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SmtpChannel for TlsChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        set_stream_timeout(self.stream.get_ref(), timeout)
    }

    fn upgrade_tls(
        self: Box<Self>,
        _host: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn SmtpChannel>, SmtpError> {
        Ok(self)
    }

    fn interrupter(&self) -> Option<Interrupter> {
        socket_interrupter(self.stream.get_ref())
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown();
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }
}

fn set_stream_timeout(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

fn socket_interrupter(stream: &TcpStream) -> Option<Interrupter> {
    let handle = stream.try_clone().ok()?;
    Some(Box::new(move || {
        let _ = handle.shutdown(Shutdown::Both);
    }))
}

fn complete_handshake(
    connector: &TlsConnector,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, SmtpError> {
    match connector.connect(host, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(SmtpError::handshake(host, err)),
        // blocking socket: WouldBlock means the handshake read timed out
        Err(HandshakeError::WouldBlock(_)) => {
            Err(SmtpError::handshake(host, "handshake timed out"))
        }
    }
}
