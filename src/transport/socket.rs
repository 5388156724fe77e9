use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Outbound half of the transport.
///
/// Sends never block: a datagram the kernel will not take right now is dropped
/// and left to the retry sweep, exactly like a datagram lost on the network.
pub trait DatagramSink: Send + Sync {
    fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize>;
}

/// A UDP socket bound to the cluster port and joined to the multicast group.
///
/// Every datagram goes to the group; the header's recipient id decides who
/// accepts it.
pub struct MulticastTransport {
    socket: UdpSocket,
    group: SocketAddr,
    local_address: IpAddr,
}

impl MulticastTransport {
    /// Binds `port` on the unspecified address with address reuse enabled, so
    /// several nodes can share one host. Must run inside a Tokio runtime.
    pub fn bind(group: IpAddr, port: u16, local_address: Option<IpAddr>) -> Result<Self> {
        anyhow::ensure!(
            group.is_multicast(),
            "{} is not a multicast group address",
            group
        );

        let socket = match group {
            IpAddr::V4(group_v4) => {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                prepare_socket(&socket)?;
                socket
                    .bind(&SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port).into())
                    .with_context(|| format!("Failed to bind UDP port {}", port))?;
                socket
                    .join_multicast_v4(&group_v4, &Ipv4Addr::UNSPECIFIED)
                    .with_context(|| format!("Failed to join multicast group {}", group))?;
                socket.set_multicast_loop_v4(true)?;
                socket
            }
            IpAddr::V6(group_v6) => {
                let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
                prepare_socket(&socket)?;
                socket
                    .bind(&SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port).into())
                    .with_context(|| format!("Failed to bind UDP port {}", port))?;
                socket
                    .join_multicast_v6(&group_v6, 0)
                    .with_context(|| format!("Failed to join multicast group {}", group))?;
                socket.set_multicast_loop_v6(true)?;
                socket
            }
        };

        let socket = UdpSocket::from_std(socket.into())?;
        let local_address = match local_address {
            Some(address) => address,
            None => discover_local_address(&group),
        };

        tracing::info!(
            "Cluster transport listening on port {} (group {}, local address {})",
            port,
            group,
            local_address
        );

        Ok(Self {
            socket,
            group: SocketAddr::new(group, port),
            local_address,
        })
    }

    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Address advertised in the sender field of every datagram.
    pub fn local_address(&self) -> IpAddr {
        self.local_address
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

impl DatagramSink for MulticastTransport {
    fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.try_send_to(datagram, self.group)
    }
}

fn prepare_socket(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)
}

/// Finds the address of the interface that routes outward, by connecting a
/// throwaway UDP socket (no packet is sent). Falls back to loopback.
pub fn discover_local_address(group: &IpAddr) -> IpAddr {
    let (bind, probe): (SocketAddr, SocketAddr) = match group {
        IpAddr::V4(_) => (
            (Ipv4Addr::UNSPECIFIED, 0).into(),
            (Ipv4Addr::new(8, 8, 8, 8), 65530).into(),
        ),
        IpAddr::V6(_) => (
            (Ipv6Addr::UNSPECIFIED, 0).into(),
            (Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888), 65530).into(),
        ),
    };

    let discovered = std::net::UdpSocket::bind(bind)
        .and_then(|socket| socket.connect(probe).map(|_| socket))
        .and_then(|socket| socket.local_addr());

    match discovered {
        Ok(address) => address.ip(),
        Err(e) => {
            let fallback = match group {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            tracing::warn!(
                "Could not determine local address ({}), advertising {}",
                e,
                fallback
            );
            fallback
        }
    }
}
