//! Redis key-value sink.
//!
//! Each location is stored as `SET <namespace>:<location> <value> EX <ttl>`,
//! so a stalled pipeline lets stale values expire instead of lingering.

use crate::config::RedisSettings;
use crate::core::NormalizedSample;
use crate::sink::{Sink, SinkError};
use std::time::Duration;

/// Cache key for one location.
pub fn key(namespace: &str, location: &str) -> String {
    format!("{namespace}:{location}")
}

pub struct RedisSink {
    client: ::redis::Client,
    namespace: String,
    ttl_secs: u64,
    timeout: Duration,
}

impl RedisSink {
    /// Validates the URL; no connection is made until the first write.
    pub fn new(settings: RedisSettings) -> Result<Self, SinkError> {
        let client = ::redis::Client::open(settings.url())
            .map_err(|e| SinkError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            namespace: settings.namespace,
            ttl_secs: settings.ttl_secs,
            timeout: Duration::from_secs(5),
        })
    }
}

impl Sink for RedisSink {
    fn name(&self) -> &str {
        "redis"
    }

    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError> {
        if sample.is_empty() {
            return Ok(());
        }

        let mut con = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        for (location, value) in &sample.values {
            let rkey = key(&self.namespace, location);
            tracing::debug!("REDIS -- loc: {}, rkey: {}, data: {}", location, rkey, value);
            ::redis::cmd("SET")
                .arg(&rkey)
                .arg(*value)
                .arg("EX")
                .arg(self.ttl_secs)
                .query::<()>(&mut con)
                .map_err(|e| SinkError::Write(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::TcpListener;

    fn settings(port: u16) -> RedisSettings {
        RedisSettings {
            host: "127.0.0.1".to_string(),
            port,
            db: 0,
            namespace: "temps".to_string(),
            ttl_secs: 300,
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key("temps", "serverroom"), "temps:serverroom");
    }

    #[test]
    fn test_empty_sample_does_not_connect() {
        let mut sink = RedisSink::new(settings(1)).unwrap();
        assert!(sink.write(&NormalizedSample::new(Utc::now())).is_ok());
    }

    #[test]
    fn test_unreachable_server_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut sink = RedisSink::new(settings(port)).unwrap();
        let mut sample = NormalizedSample::new(Utc::now());
        sample.values.insert("office".to_string(), 70.0);
        assert!(matches!(sink.write(&sample), Err(SinkError::Connect(_))));
    }
}
