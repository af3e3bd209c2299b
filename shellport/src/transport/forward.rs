//! TCP port forwarding over the SSH connection.
//!
//! `-L port:host:hostport` listens locally and opens a `direct-tcpip`
//! channel per accepted connection. `-R host:port` asks the server to listen
//! on `localhost:port` and relays each forwarded channel to the local
//! `host:port`. Tunnel failures are logged and never end the shell session.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::error::{ConfigError, TransportError};

/// Interface local listeners bind to.
const LOCAL_BIND: &str = "127.0.0.1";

/// Address the server is asked to bind for remote forwards.
pub(crate) const REMOTE_BIND: &str = "localhost";

/// Local-to-remote forward: `port:host:hostport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalForward {
    /// Local port to listen on.
    pub port: u16,
    /// Host to connect to, as seen from the server.
    pub host: String,
    /// Port to connect to on `host`.
    pub host_port: u16,
}

impl FromStr for LocalForward {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(port), Some(host), Some(host_port), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::LocalForwardParams);
        };
        if host.is_empty() {
            return Err(ConfigError::LocalForwardParams);
        }
        Ok(Self {
            port: parse_port(port).ok_or(ConfigError::LocalForwardParams)?,
            host: host.to_string(),
            host_port: parse_port(host_port).ok_or(ConfigError::LocalForwardParams)?,
        })
    }
}

impl fmt::Display for LocalForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.port, self.host, self.host_port)
    }
}

/// Remote-to-local forward: `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForward {
    /// Local host forwarded connections are relayed to.
    pub host: String,
    /// Port the server listens on, and the local port relayed to.
    pub port: u16,
}

impl FromStr for RemoteForward {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((host, port)) = s.split_once(':') else {
            return Err(ConfigError::RemoteForwardParams);
        };
        if host.is_empty() {
            return Err(ConfigError::RemoteForwardParams);
        }
        Ok(Self {
            host: host.to_string(),
            port: parse_port(port).ok_or(ConfigError::RemoteForwardParams)?,
        })
    }
}

impl fmt::Display for RemoteForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Remote listening port → local relay target, shared with the client handler.
#[derive(Debug, Clone, Default)]
pub(crate) struct ForwardTargets {
    inner: Arc<Mutex<HashMap<u32, (String, u16)>>>,
}

impl ForwardTargets {
    pub(crate) fn insert(&self, remote_port: u32, target: (String, u16)) {
        if let Ok(mut targets) = self.inner.lock() {
            targets.insert(remote_port, target);
        }
    }

    pub(crate) fn get(&self, remote_port: u32) -> Option<(String, u16)> {
        self.inner
            .lock()
            .ok()
            .and_then(|targets| targets.get(&remote_port).cloned())
    }
}

/// Start listening for a local forward.
///
/// Binding happens before this returns so bind errors surface to the caller;
/// accepted connections are served on a background task.
pub(crate) async fn listen_local<H>(
    session: Arc<tokio::sync::Mutex<Handle<H>>>,
    spec: LocalForward,
) -> Result<JoinHandle<()>, TransportError>
where
    H: client::Handler + 'static,
{
    let listener = TcpListener::bind((LOCAL_BIND, spec.port))
        .await
        .map_err(|e| TransportError::Forward {
            spec: spec.to_string(),
            message: e.to_string(),
        })?;
    info!("forwarding {}:{} -> {}:{}", LOCAL_BIND, spec.port, spec.host, spec.host_port);

    Ok(tokio::spawn(async move {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("forward {}: accept failed: {}", spec, e);
                    continue;
                }
            };
            debug!("forward {}: connection from {}", spec, peer);

            let channel = {
                let handle = session.lock().await;
                handle
                    .channel_open_direct_tcpip(
                        spec.host.clone(),
                        u32::from(spec.host_port),
                        peer.ip().to_string(),
                        u32::from(peer.port()),
                    )
                    .await
            };
            match channel {
                Ok(channel) => {
                    let label = spec.to_string();
                    tokio::spawn(pipe(channel, socket, label));
                }
                Err(e) => warn!("forward {}: direct-tcpip failed: {}", spec, e),
            }
        }
    }))
}

/// Relay a server-initiated forwarded channel to its local target.
pub(crate) async fn relay_remote(channel: Channel<Msg>, target: (String, u16)) {
    let label = format!("{}:{}", target.0, target.1);
    match TcpStream::connect((target.0.as_str(), target.1)).await {
        Ok(socket) => pipe(channel, socket, label).await,
        Err(e) => warn!("remote forward to {}: connect failed: {}", label, e),
    }
}

/// Copy bytes both ways until either side closes.
async fn pipe(channel: Channel<Msg>, mut socket: TcpStream, label: String) {
    let mut stream = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
        Ok((sent, received)) => {
            debug!("tunnel {} closed ({} bytes out, {} bytes in)", label, sent, received)
        }
        Err(e) => debug!("tunnel {} ended: {}", label, e),
    }
}
