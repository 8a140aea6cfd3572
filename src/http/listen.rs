//! Listening sockets and the serve loop around the router.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Binds 127.0.0.1 alone, or 0.0.0.0 and `[::]` as two separate sockets.
///
/// Failing to get the IPv6 socket is not fatal; hosts without IPv6 still
/// serve over IPv4.
pub async fn bind(port: u16, localhost_only: bool) -> io::Result<Vec<TcpListener>> {
    if localhost_only {
        return Ok(vec![TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?]);
    }

    let v4 = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    // Port 0 lets the OS choose; the IPv6 socket follows whatever v4 got.
    let port = v4.local_addr()?.port();
    match bind_v6_only(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))) {
        Ok(v6) => Ok(vec![v4, v6]),
        Err(error) => {
            tracing::warn!(%error, port, "IPv6 listener unavailable, serving IPv4 only");
            Ok(vec![v4])
        }
    }
}

/// Linux maps IPv4 into IPv6 sockets by default, so without IPV6_V6ONLY the
/// second bind on the same port fails with EADDRINUSE.
fn bind_v6_only(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

/// Serves `app` on every listener until `shutdown` is cancelled, then waits
/// up to `drain` for open connections to finish.
///
/// Streams still running after that are dropped, which kills their engine
/// processes.
pub async fn serve(listeners: Vec<TcpListener>, app: Router, shutdown: CancellationToken, drain: Duration) {
    let mut servers = JoinSet::new();
    for listener in listeners {
        let addr = listener.local_addr().ok();
        let span = tracing::info_span!("listener", addr = ?addr);
        let server = axum::serve(listener, app.clone())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());
        servers.spawn(
            async move {
                if let Err(error) = server.await {
                    tracing::error!(%error, "HTTP server failed");
                }
            }
            .instrument(span),
        );
    }

    shutdown.cancelled().await;
    let drained = tokio::time::timeout(drain, async {
        while servers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(?drain, "Connections still open after shutdown grace period");
        servers.abort_all();
    }
}
