//! Remote status logging to a web form.
//!
//! One record per submission, sent as a GET with the form entries in the
//! query string. Delivery is best effort.

use alloc::string::{String, ToString};
use core::fmt::Write;

use serde::Deserialize;

use crate::decision::{Reason, SwitchPosition, VentilationState};
use crate::error::AcquisitionError;
use crate::ports::{request, Endpoint, Transport};

/// A snapshot of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub outdoor_aqi: Option<u16>,
    pub indoor_aqi: Option<u16>,
    pub switch: SwitchPosition,
    pub state: VentilationState,
    pub reason: Reason,
}

/// Renders an AQI for a log line, `N/A` when absent.
pub fn aqi_text(aqi: Option<u16>) -> String {
    match aqi {
        Some(aqi) => aqi.to_string(),
        None => String::from("N/A"),
    }
}

/// Log on change, otherwise at most once per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl LogPolicy {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    pub fn should_log(&self, now_ms: u64, changed: bool) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => changed || now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Restarts the interval. Called after every submission attempt.
    pub fn logged(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }
}

/// Form entry IDs for each column of a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormFields {
    pub outdoor_aqi: String,
    pub indoor_aqi: String,
    pub switch: String,
    pub state: String,
    pub reason: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            outdoor_aqi: String::from("entry.1205406470"),
            indoor_aqi: String::from("entry.1516636704"),
            switch: String::from("entry.937873384"),
            state: String::from("entry.1558449802"),
            reason: String::from("entry.589349670"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormLogger {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub fields: FormFields,
    pub timeout_ms: u64,
}

impl FormLogger {
    /// The request path with the record encoded in the query.
    pub fn query(&self, record: &LogRecord) -> String {
        let mut out = self.path.clone();
        let entries = [
            (&self.fields.outdoor_aqi, aqi_text(record.outdoor_aqi)),
            (&self.fields.indoor_aqi, aqi_text(record.indoor_aqi)),
            (&self.fields.switch, record.switch.to_string()),
            (&self.fields.state, record.state.to_string()),
            (&self.fields.reason, record.reason.to_string()),
        ];
        for (i, (entry, value)) in entries.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            percent_encode(&mut out, entry);
            out.push('=');
            percent_encode(&mut out, value);
        }
        out
    }

    /// Sends `record`. A 2xx or a 302 (the form's redirect after submit)
    /// counts as delivered.
    pub async fn submit<T: Transport>(
        &self,
        transport: &mut T,
        record: &LogRecord,
    ) -> Result<(), AcquisitionError> {
        let endpoint = Endpoint {
            host: &self.host,
            port: self.port,
            secure: true,
            timeout_ms: self.timeout_ms,
        };
        let path = self.query(record);
        let response = request(transport, &endpoint, &path, &[]).await?;
        if response.is_success() || response.status == 302 {
            debug!("form log delivered ({})", response.status);
            Ok(())
        } else {
            Err(AcquisitionError::Protocol(response.status))
        }
    }
}

fn percent_encode(out: &mut String, value: &str) {
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                // Writing to a String cannot fail
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use embassy_futures::block_on;

    fn logger() -> FormLogger {
        FormLogger {
            host: String::from("docs.google.com"),
            port: 443,
            path: String::from("/forms/d/e/abc/formResponse"),
            fields: FormFields {
                outdoor_aqi: String::from("entry.1"),
                indoor_aqi: String::from("entry.2"),
                switch: String::from("entry.3"),
                state: String::from("entry.4"),
                reason: String::from("entry.5"),
            },
            timeout_ms: 10_000,
        }
    }

    fn record() -> LogRecord {
        LogRecord {
            outdoor_aqi: Some(142),
            indoor_aqi: None,
            switch: SwitchPosition::Auto,
            state: VentilationState::Idle,
            reason: Reason::AboveDisable(142),
        }
    }

    #[test]
    fn test_query() {
        assert_eq!(
            logger().query(&record()),
            "/forms/d/e/abc/formResponse?entry.1=142&entry.2=N%2FA&entry.3=AUTO&entry.4=OFF\
             &entry.5=AQI%20too%20high%20%28142%29"
        );
    }

    #[test]
    fn test_submit_accepts_redirect() {
        let mut transport = MockTransport::new();
        transport.respond_json("docs.google.com", 302, "");
        assert_eq!(block_on(logger().submit(&mut transport, &record())), Ok(()));
        assert!(transport.requests[0].secure);
        assert_eq!(transport.open_connections, 0);
    }

    #[test]
    fn test_submit_failure() {
        let mut transport = MockTransport::new();
        transport.respond_json("docs.google.com", 500, "");
        assert_eq!(
            block_on(logger().submit(&mut transport, &record())),
            Err(AcquisitionError::Protocol(500))
        );
        assert_eq!(transport.open_connections, 0);
    }

    #[test]
    fn test_policy() {
        let mut policy = LogPolicy::new(900_000);
        assert!(policy.should_log(0, false));
        policy.logged(0);
        assert!(!policy.should_log(60_000, false));
        assert!(policy.should_log(60_000, true));
        assert!(policy.should_log(900_000, false));
    }

    #[test]
    fn test_aqi_text() {
        assert_eq!(aqi_text(Some(0)), "0");
        assert_eq!(aqi_text(None), "N/A");
    }
}
