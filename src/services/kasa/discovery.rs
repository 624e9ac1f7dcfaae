use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use socket2::{Domain, Protocol, Socket, Type};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::codec::encrypt;
use super::transport::DEFAULT_PORT;

pub const DISCOVERY_QUERY: &str = r#"{"system":{"get_sysinfo":{}}}"#;

/// Replies at or under this size are our own broadcast echoing back.
pub const ECHO_THRESHOLD: usize = 50;

/// Global broadcast plus the private ranges home routers tend to use.
pub const BROADCAST_ADDRESSES: &[Ipv4Addr] = &[
    Ipv4Addr::new(255, 255, 255, 255),
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 0, 255),
    Ipv4Addr::new(192, 168, 255, 255),
    Ipv4Addr::new(10, 0, 255, 255),
    Ipv4Addr::new(10, 255, 255, 255),
    Ipv4Addr::new(172, 16, 255, 255),
    Ipv4Addr::new(100, 64, 255, 255),
];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Total listening window.
    pub timeout: Duration,
    pub port: u16,
    pub targets: Vec<IpAddr>,
    pub rounds: usize,
    pub round_interval: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            port: DEFAULT_PORT,
            targets: BROADCAST_ADDRESSES.iter().copied().map(IpAddr::V4).collect(),
            rounds: 5,
            round_interval: Duration::from_millis(200),
        }
    }
}

impl DiscoveryOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Broadcast a sysinfo query and collect the addresses that answer.
///
/// Never fails: socket errors are logged and whatever was collected so far
/// is returned.
pub async fn discover(options: &DiscoveryOptions) -> Vec<IpAddr> {
    let socket = match bind_socket(options.port).await {
        Some(socket) => socket,
        None => return Vec::new(),
    };

    let query = encrypt(DISCOVERY_QUERY.as_bytes());
    let mut found = BTreeSet::new();

    let send_rounds = async {
        for round in 0..options.rounds {
            for target in &options.targets {
                let dest = SocketAddr::new(*target, options.port);
                if let Err(e) = socket.send_to(&query, dest).await {
                    debug!("Discovery send to {} failed: {}", dest, e);
                }
            }
            if round + 1 < options.rounds {
                tokio::time::sleep(options.round_interval).await;
            }
        }
        // Keep listening until the window closes.
        std::future::pending::<()>().await;
    };

    let collect = async {
        let mut buf = [0u8; 4096];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) if len > ECHO_THRESHOLD => {
                    if found.insert(from.ip()) {
                        debug!("Discovery reply from {} ({} bytes)", from.ip(), len);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Discovery receive failed: {}", e);
                    break;
                }
            }
        }
        std::future::pending::<()>().await;
    };

    let _ = tokio::time::timeout(options.timeout, async {
        tokio::join!(send_rounds, collect);
    })
    .await;

    info!("Discovery found {} devices", found.len());
    found.into_iter().collect()
}

fn reusable_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    UdpSocket::from_std(socket.into())
}

/// Bind the well-known port so devices that answer to it reach us, else any
/// free port. The well-known port is bound with `SO_REUSEADDR`, so
/// concurrent discoveries can share it.
async fn bind_socket(port: u16) -> Option<UdpSocket> {
    let socket = match reusable_socket(port) {
        Ok(socket) => socket,
        Err(e) => {
            debug!("Port {} busy ({}), using an ephemeral port", port, e);
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("Discovery socket bind failed: {}", e);
                    return None;
                }
            }
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        warn!("Enabling broadcast failed: {}", e);
    }
    Some(socket)
}
