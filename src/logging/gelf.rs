//! GELF 1.1 log shipping over UDP.
//!
//! Every event becomes one uncompressed JSON datagram. `short_message` is the
//! event message; `full_message` is the same line the console prints, so both
//! outputs read alike in Graylog.

use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Largest datagram Graylog accepts without chunking.
pub const MAX_DATAGRAM: usize = 8192;

const SHORT_MESSAGE_LIMIT: usize = 1024;

/// Layer sending each event to a GELF UDP input.
#[derive(Debug)]
pub struct GelfLayer {
    socket: UdpSocket,
    host: String,
}

impl GelfLayer {
    /// Resolve `host:port` and bind a local socket towards it. UDP is
    /// connectionless, so an absent Graylog only shows up as lost datagrams.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let target = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{host}: no addresses"))
        })?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;

        let source = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "onewired".to_string());
        Ok(Self {
            socket,
            host: source,
        })
    }

    fn encode(&self, event: &Event<'_>) -> Vec<u8> {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let meta = event.metadata();
        let now = Utc::now();
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");

        let full_message = format!(
            "{} [{}] ({:<10}) {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            meta.level(),
            thread_name,
            fields.message
        );

        let mut record = fields.extra;
        record.insert("version".into(), "1.1".into());
        record.insert("host".into(), self.host.clone().into());
        record.insert("short_message".into(), fields.message.into());
        record.insert("full_message".into(), full_message.into());
        record.insert(
            "timestamp".into(),
            Value::from(now.timestamp_millis() as f64 / 1000.0),
        );
        record.insert("level".into(), syslog_level(meta.level()).into());
        record.insert("_logger".into(), meta.target().into());
        record.insert("_thread".into(), thread_name.into());

        fit_datagram(record)
    }
}

impl<S: Subscriber> Layer<S> for GelfLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let datagram = self.encode(event);
        // Logging must never fail the caller.
        let _ = self.socket.send(&datagram);
    }
}

/// Syslog severity used by GELF.
pub fn syslog_level(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Serialize, dropping `full_message` and clipping long strings when the
/// record would not fit one datagram.
fn fit_datagram(mut record: Map<String, Value>) -> Vec<u8> {
    let encoded = Value::Object(record.clone()).to_string().into_bytes();
    if encoded.len() <= MAX_DATAGRAM {
        return encoded;
    }

    record.remove("full_message");
    for value in record.values_mut() {
        if let Value::String(s) = value {
            if let Some((cut, _)) = s.char_indices().nth(SHORT_MESSAGE_LIMIT) {
                s.truncate(cut);
            }
        }
    }
    Value::Object(record).to_string().into_bytes()
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    extra: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        // `_id` is reserved by GELF.
        let key = match field.name() {
            "id" => "_field_id".to_string(),
            name => format!("_{name}"),
        };
        self.extra.insert(key, value);
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.insert(field, format!("{value:?}").into());
        }
    }
}
