//! Networking: Ethernet with DHCP via embassy-net, HTTP and HTTPS via
//! reqwless.

use alloc::format;
use alloc::string::String;
use core::net::SocketAddr;

use defmt::{debug, info, warn};
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_net::{ConfigV4, Runner, Stack, StackResources};
use embassy_stm32::eth::generic_smi::GenericSMI;
use embassy_stm32::eth::Ethernet;
use embassy_stm32::peripherals::ETH;
use embassy_time::{with_timeout, Duration};
use embedded_nal_async::{AddrType, Dns, TcpConnect};
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::{Method, RequestBuilder};
use static_cell::{ConstStaticCell, StaticCell};

use vent::ports::{Connection, Connectivity, Endpoint, Response, Transport};
use vent::TransportError;

pub type Device = Ethernet<'static, ETH, GenericSMI>;

const TCP_BUFFER: usize = 4096;
// Largest TLS 1.3 record plus overhead
const TLS_BUFFER: usize = 16_640;
const RX_BUFFER: usize = 8192;
const PROBE_TIMEOUT_MS: u64 = 2_000;

type Tcp = TcpClient<'static, 1, TCP_BUFFER, TCP_BUFFER>;

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, Device>) -> ! {
    runner.run().await
}

/// Creates the IP stack with DHCP. The returned runner must be spawned.
pub fn stack(device: Device, seed: u64) -> (Stack<'static>, Runner<'static, Device>) {
    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    embassy_net::new(
        device,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    )
}

pub struct Link {
    stack: Stack<'static>,
}

impl Link {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl Connectivity for Link {
    fn is_connected(&self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }

    fn begin_connect(&mut self) {
        info!("link up: {}, restarting DHCP", self.stack.is_link_up());
        self.stack.set_config_v4(ConfigV4::Dhcp(Default::default()));
    }
}

struct Buffers {
    tls_read: [u8; TLS_BUFFER],
    tls_write: [u8; TLS_BUFFER],
    rx: [u8; RX_BUFFER],
}

impl Buffers {
    const fn new() -> Self {
        Self {
            tls_read: [0; TLS_BUFFER],
            tls_write: [0; TLS_BUFFER],
            rx: [0; RX_BUFFER],
        }
    }
}

pub struct NetTransport {
    stack: Stack<'static>,
    tcp: Tcp,
    dns: DnsSocket<'static>,
    buffers: &'static mut Buffers,
    seed: u64,
}

impl NetTransport {
    /// Can only be called once; the socket state and buffers are static.
    pub fn new(stack: Stack<'static>, seed: u64) -> Self {
        static TCP_STATE: StaticCell<TcpClientState<1, TCP_BUFFER, TCP_BUFFER>> = StaticCell::new();
        static BUFFERS: ConstStaticCell<Buffers> = ConstStaticCell::new(Buffers::new());
        Self {
            stack,
            tcp: TcpClient::new(stack, TCP_STATE.init(TcpClientState::new())),
            dns: DnsSocket::new(stack),
            buffers: BUFFERS.take(),
            seed,
        }
    }
}

impl Transport for NetTransport {
    type Connection<'a> = NetConnection<'a>;

    /// Resolves `host` and opens (then drops) a TCP connection to it, both
    /// within `PROBE_TIMEOUT_MS`.
    async fn probe(&mut self, host: &str, port: u16) -> bool {
        let dns = &self.dns;
        let tcp = &self.tcp;
        let reach = async {
            let Ok(addr) = dns.get_host_by_name(host, AddrType::IPv4).await else {
                warn!("probe: cannot resolve {}", host);
                return false;
            };
            tcp.connect(SocketAddr::new(addr, port)).await.is_ok()
        };
        match with_timeout(Duration::from_millis(PROBE_TIMEOUT_MS), reach).await {
            Ok(reachable) => reachable,
            Err(_) => {
                warn!("probe: {} timed out", host);
                false
            }
        }
    }

    async fn connect<'a>(
        &'a mut self,
        endpoint: &Endpoint<'_>,
    ) -> Result<NetConnection<'a>, TransportError> {
        if !self.stack.is_config_up() {
            return Err(TransportError::Unreachable);
        }
        let scheme = if endpoint.secure { "https" } else { "http" };
        Ok(NetConnection {
            base: format!("{}://{}:{}", scheme, endpoint.host, endpoint.port),
            secure: endpoint.secure,
            timeout: Duration::from_millis(endpoint.timeout_ms),
            transport: self,
        })
    }
}

/// Holds the transport's buffers for the duration of one exchange. The
/// socket itself is opened and closed inside each `get`.
pub struct NetConnection<'a> {
    transport: &'a mut NetTransport,
    base: String,
    secure: bool,
    timeout: Duration,
}

impl NetConnection<'_> {
    async fn exchange(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, TransportError> {
        let transport = &mut *self.transport;
        let buffers = &mut *transport.buffers;
        let mut client = if self.secure {
            // No certificate check: there is no trust store on the device,
            // so the API key is only protected against passive listeners.
            let tls = TlsConfig::new(
                transport.seed,
                &mut buffers.tls_read,
                &mut buffers.tls_write,
                TlsVerify::None,
            );
            HttpClient::new_with_tls(&transport.tcp, &transport.dns, tls)
        } else {
            HttpClient::new(&transport.tcp, &transport.dns)
        };

        let mut request = client
            .request(Method::GET, url)
            .await
            .map_err(http_error)?
            .headers(headers);
        let response = request.send(&mut buffers.rx).await.map_err(http_error)?;
        let status = response.status.0;
        let body = response.body().read_to_end().await.map_err(http_error)?;
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(Response::new(status, body))
    }
}

impl Connection for NetConnection<'_> {
    async fn get(
        &mut self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base, path);
        with_timeout(self.timeout, self.exchange(&url, headers))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

fn http_error(e: reqwless::Error) -> TransportError {
    warn!("http: {}", e);
    match e {
        reqwless::Error::Dns => TransportError::Unreachable,
        reqwless::Error::Network(_) | reqwless::Error::ConnectionAborted => {
            TransportError::ConnectFailed
        }
        _ => TransportError::Io,
    }
}
