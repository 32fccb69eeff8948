//! Ports
//!
//! Everything the control core needs from the outside world, expressed as
//! traits. The firmware implements them on top of embassy; the host tests use
//! the fakes in `testing`.

use alloc::vec::Vec;
use core::future::Future;

use crate::decision::SwitchPosition;
use crate::error::TransportError;

/// Where to connect and how long a request may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Use TLS.
    pub secure: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            body: body.to_vec(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An open connection to one endpoint. Dropping it releases the socket.
pub trait Connection {
    fn get(
        &mut self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Response, TransportError>>;
}

pub trait Transport {
    type Connection<'a>: Connection
    where
        Self: 'a;

    /// Cheap reachability check performed before committing to a connect.
    fn probe(&mut self, host: &str, port: u16) -> impl Future<Output = bool>;

    fn connect<'a>(
        &'a mut self,
        endpoint: &Endpoint<'_>,
    ) -> impl Future<Output = Result<Self::Connection<'a>, TransportError>>;
}

/// Opens a connection, issues one GET and releases the connection before
/// returning, whatever the outcome.
pub async fn request<T: Transport>(
    transport: &mut T,
    endpoint: &Endpoint<'_>,
    path: &str,
    headers: &[(&str, &str)],
) -> Result<Response, TransportError> {
    let mut connection = transport.connect(endpoint).await?;
    let response = connection.get(path, headers).await;
    drop(connection);
    response
}

/// Network link (WiFi association, Ethernet carrier and DHCP lease).
pub trait Connectivity {
    fn is_connected(&self) -> bool;

    /// Starts bringing the link up. Does not wait for it.
    fn begin_connect(&mut self);
}

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u64) -> impl Future<Output = ()>;
}

pub trait Watchdog {
    fn feed(&mut self);
}

pub trait SwitchInput {
    fn read(&mut self) -> SwitchPosition;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Relay {
    One,
    Two,
}

pub trait RelayOutputs {
    fn write(&mut self, relay: Relay, energised: bool);
}

/// An RGB colour, 0-255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb(pub u8, pub u8, pub u8);

pub trait Indicator {
    fn write_rgb(&mut self, colour: Rgb);
}

/// The collaborators shared by every acquisition path.
pub struct Platform<T, N, K, W> {
    pub transport: T,
    pub connectivity: N,
    pub clock: K,
    pub watchdog: W,
}

impl<T, N, K, W> Platform<T, N, K, W>
where
    T: Transport,
    N: Connectivity,
    K: Clock,
    W: Watchdog,
{
    pub fn new(transport: T, connectivity: N, clock: K, watchdog: W) -> Self {
        Self {
            transport,
            connectivity,
            clock,
            watchdog,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
