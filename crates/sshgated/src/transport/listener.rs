//! Bound TCP socket for the gateway.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use sshgate_config::ListenAddress;

use super::ListenerError;

/// TCP socket bound and ready to serve.
///
/// Binding is synchronous and needs no runtime, so callers learn the bound
/// address (including an ephemeral port) before serving starts.
#[derive(Debug)]
pub struct GatewayListener {
    addr: SocketAddr,
    listener: TcpListener,
}

impl GatewayListener {
    /// Resolves `address` and binds the first address it yields.
    ///
    /// # Errors
    ///
    /// Returns an error when resolution, binding or the switch to
    /// non-blocking mode fails.
    pub fn bind(address: &ListenAddress) -> Result<Self, ListenerError> {
        let (host, port) = (address.host(), address.port());
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| ListenerError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?;
        let requested = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
        let listener = TcpListener::bind(requested).map_err(|source| ListenerError::Bind {
            addr: requested,
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self { addr, listener })
    }

    /// Address the socket is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn into_std(self) -> TcpListener {
        self.listener
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn binds_ephemeral_port_on_loopback() {
        let listener =
            GatewayListener::bind(&ListenAddress::new("127.0.0.1", 0)).expect("bind loopback");
        let addr = listener.local_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[rstest]
    fn reports_address_in_use() {
        let first =
            GatewayListener::bind(&ListenAddress::new("127.0.0.1", 0)).expect("bind loopback");
        let taken = ListenAddress::new("127.0.0.1", first.local_addr().port());
        let error = GatewayListener::bind(&taken).expect_err("port is taken");
        assert!(matches!(error, ListenerError::Bind { .. }));
    }

    #[rstest]
    fn reports_unresolvable_hosts() {
        let error = GatewayListener::bind(&ListenAddress::new("no-such-host.invalid", 0))
            .expect_err("host should not resolve");
        assert!(matches!(
            error,
            ListenerError::Resolve { .. } | ListenerError::ResolveEmpty { .. }
        ));
    }
}
