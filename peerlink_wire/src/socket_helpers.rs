//! Socket creation and configuration.
//!
//! Listeners are bound without address reuse so that a second listener on a port
//! already in use fails instead of silently sharing it. Outbound streams are created
//! through socket2 so that the connect can be timeboxed on a fully configured socket.

use crate::error::WireError;
use peerlink_io::tokio::net::{TcpListener, TcpStream};
use socket2::{Domain, SockAddr, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// The max number of unprocessed inbound TCP connections
const LISTEN_BACKLOG: i32 = 1024;

fn get_tcp_socket_builder(domain: Domain) -> Result<Socket, anyhow::Error> {
    Ok(socket2::Socket::new(domain, Type::STREAM, None)?)
}

fn setup_base_socket(addr: SocketAddr, socket: &Socket, reuse: bool) -> Result<(), anyhow::Error> {
    if reuse {
        socket.set_reuse_address(true)?;
    }

    socket.set_nonblocking(true)?;

    if !cfg!(windows) && addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    Ok(())
}

fn setup_bind(addr: SocketAddr, socket: &Socket, reuse: bool) -> Result<(), anyhow::Error> {
    setup_base_socket(addr, socket, reuse)?;
    socket.bind(&SockAddr::from(addr))?;

    Ok(())
}

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

fn first_addr<T: ToSocketAddrs>(addr: T) -> Result<SocketAddr, WireError> {
    addr.to_socket_addrs()
        .map_err(|err| WireError::BadAddress(err.to_string()))?
        .next()
        .ok_or_else(|| WireError::BadAddress("no address resolved".to_string()))
}

fn get_tcp_listener_inner(addr: SocketAddr, reuse: bool) -> Result<TcpListener, anyhow::Error> {
    log::trace!(target: "peerlink", "[Socket helper] Getting TCP listener (reuse={}) socket @ {:?} ...", reuse, &addr);

    let socket = get_tcp_socket_builder(domain_for(&addr))?;
    setup_bind(addr, &socket, reuse)?;
    socket.listen(LISTEN_BACKLOG)?;
    let std_tcp_socket: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_tcp_socket)?)
}

/// Binds a TCP listener at `addr`. Fails if the port is already taken
pub fn get_tcp_listener<T: ToSocketAddrs>(addr: T) -> Result<TcpListener, WireError> {
    let addr = first_addr(addr)?;
    get_tcp_listener_inner(addr, false).map_err(|err| WireError::Bind {
        addr,
        reason: err.to_string(),
    })
}

/// Opens a TCP stream to `addr`, failing with [`WireError::ConnectTimeout`] if the
/// handshake does not complete within `timeout`
pub async fn get_tcp_stream<T: ToSocketAddrs>(
    addr: T,
    timeout: Duration,
) -> Result<TcpStream, WireError> {
    let addr = first_addr(addr)?;
    log::trace!(target: "peerlink", "[Socket helper] Getting TCP connect socket to {:?} ...", &addr);

    let refused = |err: String| WireError::ConnectRefused {
        addr,
        reason: err,
    };

    let socket = get_tcp_socket_builder(domain_for(&addr)).map_err(|err| refused(err.to_string()))?;
    setup_base_socket(addr, &socket, true).map_err(|err| refused(err.to_string()))?;
    let socket = peerlink_io::tokio::net::TcpSocket::from_std_stream(socket.into());

    match peerlink_io::tokio::time::timeout(timeout, socket.connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(refused(err.to_string())),
        Err(_elapsed) => Err(WireError::ConnectTimeout(addr)),
    }
}

pub fn is_ipv6_enabled() -> bool {
    // this is a bit hacky, but, should prevent pipelines from failing
    // if runners don't have ipv6 compat
    if let Ok(sck) = std::net::TcpListener::bind("[::]:0") {
        sck.local_addr().map(|r| r.is_ipv6()).unwrap_or(false)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::error::WireError;
    use crate::socket_helpers::{get_tcp_listener, get_tcp_stream, is_ipv6_enabled};
    use peerlink_io::tokio;
    use peerlink_io::tokio::io::{AsyncReadExt, AsyncWriteExt};
    use rstest::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_millis(2000);

    #[rstest]
    #[case("127.0.0.1:0")]
    #[case("[::1]:0")]
    #[trace]
    #[tokio::test]
    async fn test_tcp(#[case] addr: SocketAddr) -> std::io::Result<()> {
        peerlink_logging::setup_log();
        if addr.is_ipv6() && !is_ipv6_enabled() {
            log::trace!(target: "peerlink", "Skipping IPv6 test since IPv6 is not enabled");
            return Ok(());
        }
        let server = get_tcp_listener(addr).unwrap();
        let addr = server.local_addr().unwrap();

        let server = peerlink_io::tokio::task::spawn(async move {
            log::trace!(target: "peerlink", "Starting server @ {:?}", addr);
            let (mut conn, addr) = server.accept().await.unwrap();
            log::trace!(target: "peerlink", "RECV {:?} from {:?}", &conn, addr);
            let buf = &mut [0u8; 3];
            conn.read_exact(buf as &mut [u8]).await.unwrap();
            assert_eq!(buf, &[1, 2, 3]);
        });

        let client = peerlink_io::tokio::task::spawn(async move {
            let mut client = get_tcp_stream(addr, TIMEOUT).await.unwrap();
            client.write_all(&[1, 2, 3]).await.unwrap();
        });

        let (r0, r1) = peerlink_io::tokio::join!(server, client);
        Ok(r0.and(r1)?)
    }

    #[tokio::test]
    async fn second_bind_on_same_port_fails() {
        peerlink_logging::setup_log();
        let first = get_tcp_listener("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap();
        match get_tcp_listener(addr) {
            Err(WireError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_refused() {
        peerlink_logging::setup_log();
        let addr = {
            let listener = get_tcp_listener("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let err = get_tcp_stream(addr, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectRefused { .. }), "{err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unanswered_connect_times_out() {
        peerlink_logging::setup_log();
        // non-routable: the SYN goes nowhere and nothing ever answers
        let addr: SocketAddr = "10.255.255.1:8888".parse().unwrap();
        let timeout = Duration::from_millis(300);

        let start = std::time::Instant::now();
        let err = get_tcp_stream(addr, timeout).await.unwrap_err();
        let elapsed = start.elapsed();

        if matches!(err, WireError::ConnectRefused { .. }) {
            log::trace!(target: "peerlink", "Skipping timeout test since {addr} is rejected locally: {err}");
            return;
        }

        assert_eq!(err, WireError::ConnectTimeout(addr));
        assert!(err.is_transient());
        assert!(elapsed >= timeout, "{elapsed:?}");
        assert!(elapsed < timeout * 5, "{elapsed:?}");
    }
}
