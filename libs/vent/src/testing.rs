//! In-memory fakes for the port traits.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! the integration tests.

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::Cell;

use crate::decision::SwitchPosition;
use crate::error::TransportError;
use crate::ports::{
    Clock, Connection, Connectivity, Endpoint, Indicator, Platform, Relay, RelayOutputs, Response,
    Rgb, SwitchInput, Transport, Watchdog,
};

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted transport that counts open connections.
///
/// Responses are queued per host and handed out in order. A host with an
/// empty queue answers with `TransportError::Io`.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Vec<(String, VecDeque<Result<Response, TransportError>>)>,
    unreachable: Vec<String>,
    refuse_connect: Vec<String>,
    pub requests: Vec<Request>,
    pub probes: usize,
    pub connects: usize,
    pub open_connections: usize,
    pub max_open_connections: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, host: &str, response: Result<Response, TransportError>) -> &mut Self {
        match self.routes.iter_mut().find(|(h, _)| h == host) {
            Some((_, queue)) => queue.push_back(response),
            None => {
                let mut queue = VecDeque::new();
                queue.push_back(response);
                self.routes.push((host.to_string(), queue));
            }
        }
        self
    }

    pub fn respond_json(&mut self, host: &str, status: u16, body: &str) -> &mut Self {
        self.respond(host, Ok(Response::new(status, body.as_bytes())))
    }

    /// Make probes to `host` fail.
    pub fn set_unreachable(&mut self, host: &str) -> &mut Self {
        self.unreachable.push(host.to_string());
        self
    }

    /// Make connects to `host` fail.
    pub fn refuse_connect(&mut self, host: &str) -> &mut Self {
        self.refuse_connect.push(host.to_string());
        self
    }

    pub fn requests_to(&self, host: &str) -> usize {
        self.requests.iter().filter(|r| r.host == host).count()
    }

    fn next_response(&mut self, host: &str) -> Result<Response, TransportError> {
        self.routes
            .iter_mut()
            .find(|(h, _)| h == host)
            .and_then(|(_, queue)| queue.pop_front())
            .unwrap_or(Err(TransportError::Io))
    }
}

pub struct MockConnection<'a> {
    transport: &'a mut MockTransport,
    host: String,
    port: u16,
    secure: bool,
}

impl Connection for MockConnection<'_> {
    async fn get(
        &mut self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, TransportError> {
        self.transport.requests.push(Request {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            path: path.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        let host = self.host.clone();
        self.transport.next_response(&host)
    }
}

impl Drop for MockConnection<'_> {
    fn drop(&mut self) {
        self.transport.open_connections -= 1;
    }
}

impl Transport for MockTransport {
    type Connection<'a> = MockConnection<'a>;

    async fn probe(&mut self, host: &str, _port: u16) -> bool {
        self.probes += 1;
        !self.unreachable.iter().any(|h| h == host)
    }

    async fn connect<'a>(
        &'a mut self,
        endpoint: &Endpoint<'_>,
    ) -> Result<MockConnection<'a>, TransportError> {
        self.connects += 1;
        if self.refuse_connect.iter().any(|h| h == endpoint.host) {
            return Err(TransportError::ConnectFailed);
        }
        self.open_connections += 1;
        self.max_open_connections = self.max_open_connections.max(self.open_connections);
        Ok(MockConnection {
            host: endpoint.host.to_string(),
            port: endpoint.port,
            secure: endpoint.secure,
            transport: self,
        })
    }
}

/// Link that comes up after a scripted number of `begin_connect` calls.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    pub connected: bool,
    /// `begin_connect` calls that fail before one succeeds.
    pub failures_before_connect: usize,
    pub begin_calls: usize,
}

impl ScriptedLink {
    pub fn up() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn down(failures_before_connect: usize) -> Self {
        Self {
            connected: false,
            failures_before_connect,
            begin_calls: 0,
        }
    }
}

impl Connectivity for ScriptedLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn begin_connect(&mut self) {
        self.begin_calls += 1;
        if self.begin_calls > self.failures_before_connect {
            self.connected = true;
        }
    }
}

/// Clock whose `sleep_ms` advances time instead of waiting.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Cell<u64>,
    slept: Cell<u64>,
}

impl FakeClock {
    pub fn at(now_ms: u64) -> Self {
        Self {
            now: Cell::new(now_ms),
            slept: Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }

    /// Total milliseconds spent in `sleep_ms`.
    pub fn slept_ms(&self) -> u64 {
        self.slept.get()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.slept.set(self.slept.get() + ms);
        self.advance(ms);
    }
}

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub feeds: usize,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

/// Switch that replays positions in order, then holds the last one.
#[derive(Debug)]
pub struct ScriptedSwitch {
    positions: VecDeque<SwitchPosition>,
    last: SwitchPosition,
}

impl ScriptedSwitch {
    pub fn fixed(position: SwitchPosition) -> Self {
        Self {
            positions: VecDeque::new(),
            last: position,
        }
    }

    pub fn sequence(positions: &[SwitchPosition]) -> Self {
        Self {
            positions: positions.iter().copied().collect(),
            last: SwitchPosition::Auto,
        }
    }
}

impl SwitchInput for ScriptedSwitch {
    fn read(&mut self) -> SwitchPosition {
        if let Some(next) = self.positions.pop_front() {
            self.last = next;
        }
        self.last
    }
}

#[derive(Debug, Default)]
pub struct RecordingRelays {
    pub energised: [bool; 2],
    pub writes: usize,
}

impl RelayOutputs for RecordingRelays {
    fn write(&mut self, relay: Relay, energised: bool) {
        let index = match relay {
            Relay::One => 0,
            Relay::Two => 1,
        };
        self.energised[index] = energised;
        self.writes += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingIndicator {
    pub history: Vec<Rgb>,
}

impl RecordingIndicator {
    pub fn last(&self) -> Option<Rgb> {
        self.history.last().copied()
    }
}

impl Indicator for RecordingIndicator {
    fn write_rgb(&mut self, colour: Rgb) {
        self.history.push(colour);
    }
}

pub type MockPlatform = Platform<MockTransport, ScriptedLink, FakeClock, CountingWatchdog>;

/// A connected platform at time zero with an empty transport script.
pub fn platform() -> MockPlatform {
    Platform::new(
        MockTransport::new(),
        ScriptedLink::up(),
        FakeClock::at(0),
        CountingWatchdog::default(),
    )
}
