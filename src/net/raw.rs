//! Raw, unauthenticated transport listener.
//!
//! The accept loop never owns the socket. It polls through a [`SocketSlot`]
//! that `Listener::close` empties, so the socket is closed before `close`
//! returns.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::net::{TcpListener, TcpStream};

/// Source of raw TCP connections for a [`Listener`](super::Listener).
pub trait RawListener: Send + 'static {
    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl RawListener for TcpListener {
    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::poll_accept(self, cx)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Shared holder for the raw listener. Emptying it drops (closes) the socket.
pub(crate) struct SocketSlot {
    inner: Mutex<Option<Box<dyn RawListener>>>,
}

impl SocketSlot {
    pub(crate) fn new(raw: Box<dyn RawListener>) -> Self {
        Self {
            inner: Mutex::new(Some(raw)),
        }
    }

    /// Polls the held listener. Fails with `NotConnected` once closed.
    pub(crate) fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(raw) => raw.poll_accept(cx),
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotConnected, "listener closed"))),
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        std::future::poll_fn(|cx| self.poll_accept(cx)).await
    }

    /// Drops the socket. Returns `true` for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        let taken = self.inner.lock().unwrap_or_else(PoisonError::into_inner).take();
        taken.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_releases_socket_immediately() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let slot = SocketSlot::new(Box::new(tcp));

        assert!(slot.close());
        assert!(!slot.close());
        assert!(std::net::TcpStream::connect(addr).is_err());
    }

    #[tokio::test]
    async fn accept_after_close_fails() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let slot = SocketSlot::new(Box::new(tcp));
        slot.close();

        let err = slot.accept().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
