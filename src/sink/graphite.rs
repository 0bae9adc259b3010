//! Graphite plaintext line-protocol sink.
//!
//! One TCP connection per cycle carrying one line per location:
//! `<namespace>.<location> <value> <unix-epoch-seconds>\n`.

use crate::config::GraphiteSettings;
use crate::core::NormalizedSample;
use crate::sink::{Sink, SinkError};
use chrono::Utc;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Render one cycle as plaintext protocol lines, each newline-terminated.
///
/// Whole degrees keep their decimal point (`61.0`).
pub fn format_lines(namespace: &str, sample: &NormalizedSample, epoch_secs: i64) -> String {
    sample
        .values
        .iter()
        .map(|(location, value)| format!("{namespace}.{location} {value:?} {epoch_secs}\n"))
        .collect()
}

pub struct GraphiteSink {
    settings: GraphiteSettings,
    timeout: Duration,
}

impl GraphiteSink {
    pub fn new(settings: GraphiteSettings) -> Self {
        Self {
            settings,
            timeout: Duration::from_secs(5),
        }
    }

    fn connect(&self) -> Result<TcpStream, SinkError> {
        let addrs = (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()
            .map_err(|e| SinkError::Connect(format!("{}: {e}", self.settings.host)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(SinkError::Connect(match last_err {
            Some(e) => format!("{}:{}: {e}", self.settings.host, self.settings.port),
            None => format!("{}: no addresses", self.settings.host),
        }))
    }
}

impl Sink for GraphiteSink {
    fn name(&self) -> &str {
        "graphite"
    }

    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError> {
        if sample.is_empty() {
            return Ok(());
        }

        let message = format_lines(&self.settings.namespace, sample, Utc::now().timestamp());
        let mut stream = self.connect()?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| SinkError::Write(e.to_string()))?;
        stream
            .write_all(message.as_bytes())
            .and_then(|_| stream.flush())
            .map_err(|e| SinkError::Write(e.to_string()))?;

        tracing::debug!("Graphite message: {}", message.trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn sample(pairs: &[(&str, f64)]) -> NormalizedSample {
        let mut s = NormalizedSample::new(Utc::now());
        for (k, v) in pairs {
            s.values.insert(k.to_string(), *v);
        }
        s
    }

    #[test]
    fn test_format_lines() {
        let lines = format_lines(
            "env.internal.temp",
            &sample(&[("attic", 88.25), ("garage", 61.0)]),
            1_700_000_000,
        );
        assert_eq!(
            lines,
            "env.internal.temp.attic 88.25 1700000000\nenv.internal.temp.garage 61.0 1700000000\n"
        );
    }

    #[test]
    fn test_write_sends_lines_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).unwrap();
            received
        });

        let mut sink = GraphiteSink::new(GraphiteSettings {
            host: "127.0.0.1".to_string(),
            port,
            namespace: "home".to_string(),
        });
        sink.write(&sample(&[("office", 70.5)])).unwrap();
        drop(sink);

        let received = server.join().unwrap();
        assert!(received.starts_with("home.office 70.5 "));
        assert!(received.ends_with('\n'));
        assert_eq!(received.lines().count(), 1);
    }

    #[test]
    fn test_unreachable_endpoint_is_an_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut sink = GraphiteSink::new(GraphiteSettings {
            host: "127.0.0.1".to_string(),
            port,
            namespace: "home".to_string(),
        });
        assert!(matches!(
            sink.write(&sample(&[("office", 70.5)])),
            Err(SinkError::Connect(_))
        ));
    }
}
