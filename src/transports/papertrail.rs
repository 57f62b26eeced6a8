use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::TcpStream;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use serde::Deserialize;
use slog::{Drain, OwnedKVList, Record};

use crate::config::Level;
use crate::transports::record_fields;

/// Options for the papertrail transport. `host`, `port` and `program` are
/// required; `program` is normally injected from the logger identity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PapertrailOptions {
    pub host: String,
    pub port: u16,
    /// Program name noted in every syslog line.
    pub program: String,
    #[serde(default)]
    pub level: Level,
    /// Ship over plain TCP instead of TLS.
    #[serde(default)]
    pub disable_tls: bool,
    /// Initial delay before a reconnection attempt, in milliseconds.
    #[serde(default = "default_connection_delay_ms")]
    pub connection_delay_ms: u64,
    /// Upper bound for the reconnection delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_between_reconnection_ms: u64,
    /// Failed attempts after which the reconnection delay doubles.
    #[serde(default = "default_attempts_before_decay")]
    pub attempts_before_decay: u32,
    /// Connection attempts before the sink gives up for good.
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
    /// Bytes of formatted lines kept while disconnected; the oldest lines
    /// are dropped beyond this.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

fn default_connection_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_attempts_before_decay() -> u32 {
    5
}

fn default_maximum_attempts() -> u32 {
    25
}

fn default_max_buffer_size() -> usize {
    1024 * 1024
}

enum Wire {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Write for Wire {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Wire::Plain(s) => s.write(buf),
            Wire::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Wire::Plain(s) => s.flush(),
            Wire::Tls(s) => s.flush(),
        }
    }
}

struct ShipperState {
    wire: Option<Wire>,
    pending: VecDeque<String>,
    pending_bytes: usize,
    failures: u32,
    retry_at: Option<Instant>,
    dead: bool,
}

/// A syslog-style line shipper. Connects lazily on the first record and
/// reconnects with a decaying backoff; while disconnected, lines queue up in
/// a bounded buffer.
pub struct PapertrailDrain {
    options: PapertrailOptions,
    hostname: String,
    tls: Option<Arc<ClientConfig>>,
    state: Mutex<ShipperState>,
}

pub(crate) fn drain(options: &PapertrailOptions) -> PapertrailDrain {
    let tls = if options.disable_tls {
        None
    } else {
        let mut roots = RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        Some(Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        ))
    };
    PapertrailDrain {
        options: options.clone(),
        hostname: local_hostname(),
        tls,
        state: Mutex::new(ShipperState {
            wire: None,
            pending: VecDeque::new(),
            pending_bytes: 0,
            failures: 0,
            retry_at: None,
            dead: false,
        }),
    }
}

fn local_hostname() -> String {
    Command::new("hostname")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// RFC 3164 severity within the local0 facility.
fn priority(level: slog::Level) -> u8 {
    let severity = match level {
        slog::Level::Critical => 2,
        slog::Level::Error => 3,
        slog::Level::Warning => 4,
        slog::Level::Info => 6,
        slog::Level::Debug | slog::Level::Trace => 7,
    };
    16 * 8 + severity
}

impl PapertrailDrain {
    fn format_line(&self, record: &Record, values: &OwnedKVList) -> String {
        let mut line = format!(
            "<{}>{} {} {}: {}",
            priority(record.level()),
            Utc::now().format("%b %d %H:%M:%S"),
            self.hostname,
            self.options.program,
            record.msg()
        );
        let mut fields: Vec<_> = record_fields(record, values).into_iter().collect();
        fields.sort();
        for (key, value) in fields {
            line.push_str(&format!(" {key}={value}"));
        }
        line.push('\n');
        line
    }

    fn connect(&self) -> io::Result<Wire> {
        let address = (self.options.host.as_str(), self.options.port);
        let stream = TcpStream::connect(address)?;
        stream.set_write_timeout(Some(Duration::from_secs(10)))?;
        match &self.tls {
            None => Ok(Wire::Plain(stream)),
            Some(config) => {
                let server = ServerName::try_from(self.options.host.clone())
                    .map_err(io::Error::other)?;
                let connection =
                    ClientConnection::new(config.clone(), server).map_err(io::Error::other)?;
                Ok(Wire::Tls(Box::new(StreamOwned::new(connection, stream))))
            }
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let doublings = (failures / self.options.attempts_before_decay.max(1)).min(16);
        let delay = self
            .options
            .connection_delay_ms
            .saturating_mul(1 << doublings)
            .min(self.options.max_delay_between_reconnection_ms);
        Duration::from_millis(delay)
    }

    fn enqueue(&self, state: &mut ShipperState, line: String) {
        state.pending_bytes += line.len();
        state.pending.push_back(line);
        while state.pending_bytes > self.options.max_buffer_size {
            match state.pending.pop_front() {
                Some(dropped) => state.pending_bytes -= dropped.len(),
                None => break,
            }
        }
    }

    // Establishes the connection if due and drains the pending queue.
    fn pump(&self, state: &mut ShipperState) -> io::Result<()> {
        if state.wire.is_none() {
            if let Some(at) = state.retry_at {
                if Instant::now() < at {
                    return Ok(());
                }
            }
            match self.connect() {
                Ok(wire) => {
                    state.wire = Some(wire);
                    state.failures = 0;
                    state.retry_at = None;
                }
                Err(err) => {
                    state.failures += 1;
                    if state.failures >= self.options.maximum_attempts {
                        state.dead = true;
                        state.pending.clear();
                        state.pending_bytes = 0;
                        return Err(io::Error::other(format!(
                            "giving up on {}:{} after {} connection attempts: {}",
                            self.options.host, self.options.port, state.failures, err
                        )));
                    }
                    state.retry_at = Some(Instant::now() + self.backoff(state.failures));
                    return Ok(());
                }
            }
        }

        loop {
            let Some(line) = state.pending.front() else {
                break;
            };
            let Some(wire) = state.wire.as_mut() else {
                break;
            };
            if wire.write_all(line.as_bytes()).is_err() {
                state.wire = None;
                state.retry_at = Some(Instant::now() + self.backoff(1));
                return Ok(());
            }
            state.pending_bytes -= line.len();
            state.pending.pop_front();
        }
        if let Some(wire) = state.wire.as_mut() {
            let _ = wire.flush();
        }
        Ok(())
    }
}

impl Drain for PapertrailDrain {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> io::Result<()> {
        let line = self.format_line(record, values);
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("papertrail shipper state poisoned"))?;
        if state.dead {
            return Ok(());
        }
        self.enqueue(&mut state, line);
        self.pump(&mut state)
    }
}
