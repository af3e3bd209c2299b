//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, ChannelWriteHalf};
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::forward::{self, ForwardTargets, LocalForward, RemoteForward};
use crate::channel::{RemoteWriter, ShellOutput};
use crate::error::{ChannelError, Result, TransportError};

/// Interval between keepalive requests on an idle connection.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the remote output queue, in chunks.
const OUTPUT_QUEUE: usize = 1024;

/// SSH transport wrapping russh client.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct SshTransport {
    /// The russh session handle.
    session: Arc<tokio::sync::Mutex<Handle<SshHandler>>>,

    /// Configuration used for this connection.
    config: SshConfig,

    /// Relay targets for remote forwards, shared with the handler.
    forwards: ForwardTargets,
}

/// The interactive shell opened on a connection.
pub struct RemoteShell {
    /// Output chunks, in arrival order.
    pub output: mpsc::Receiver<ShellOutput>,

    /// Writer for the shell's input.
    pub input: RemoteWriter,

    /// Exit status reported by the remote side, if any.
    pub exit_status: oneshot::Receiver<Option<u32>>,

    /// Fires once the channel has closed.
    pub closed: CancellationToken,

    /// Keeps the channel's control half alive as long as the shell is in use.
    _control: ChannelWriteHalf<Msg>,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: 3,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));
        let forwards = ForwardTargets::default();

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
            forwards: forwards.clone(),
        };

        info!("connecting to {}", config.socket_addr());
        let socket = tokio::time::timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect_stream(ssh_config, socket, handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic one.
            match host_key_error.lock().ok().and_then(|mut slot| slot.take()) {
                Some(hk_err) => hk_err,
                None => TransportError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, &config).await?;
        info!("authenticated as {}", config.username);

        Ok(Self {
            session: Arc::new(tokio::sync::Mutex::new(session)),
            config,
            forwards,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Open the interactive shell: PTY, shell request and an output pump.
    ///
    /// The pump forwards stdout and stderr chunks in arrival order, records
    /// the exit status and fires [`RemoteShell::closed`] when the channel ends.
    pub async fn open_shell(&self) -> Result<RemoteShell> {
        let channel = self.open_session().await?;

        channel
            .request_pty(
                true,
                &self.config.term,
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| {
                debug!("pty request failed: {}", e);
                ChannelError::PtyOpenFailed
            })?;

        channel.request_shell(true).await.map_err(|e| {
            debug!("shell request failed: {}", e);
            ChannelError::ShellRequestFailed
        })?;

        let (mut reader, control) = channel.split();
        let input: RemoteWriter = Box::pin(control.make_writer());

        let (tx, output) = mpsc::channel(OUTPUT_QUEUE);
        let (exit_tx, exit_status) = oneshot::channel();
        let closed = CancellationToken::new();
        let on_close = closed.clone();

        tokio::spawn(async move {
            let mut status = None;
            while let Some(msg) = reader.wait().await {
                let chunk = match msg {
                    ChannelMsg::Data { data } => ShellOutput::Stdout(Bytes::copy_from_slice(&data)),
                    ChannelMsg::ExtendedData { data, .. } => {
                        ShellOutput::Stderr(Bytes::copy_from_slice(&data))
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        debug!("remote exit status {}", exit_status);
                        status = Some(exit_status);
                        continue;
                    }
                    ChannelMsg::Eof => {
                        debug!("remote sent EOF");
                        continue;
                    }
                    ChannelMsg::Close => break,
                    _ => continue,
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            debug!("shell channel closed");
            on_close.cancel();
            let _ = exit_tx.send(status);
        });

        Ok(RemoteShell {
            output,
            input,
            exit_status,
            closed,
            _control: control,
        })
    }

    /// Open an `sftp` subsystem channel and return it as a byte stream.
    pub async fn open_sftp_stream(
        &self,
    ) -> std::result::Result<impl AsyncRead + AsyncWrite + Unpin + Send + 'static, russh::Error> {
        let channel = {
            let session = self.session.lock().await;
            session.channel_open_session().await?
        };
        channel.request_subsystem(true, "sftp").await?;
        Ok(channel.into_stream())
    }

    /// Start listening for a local-to-remote forward.
    pub async fn forward_local(&self, spec: LocalForward) -> Result<JoinHandle<()>> {
        Ok(forward::listen_local(self.session.clone(), spec).await?)
    }

    /// Ask the server to listen for a remote-to-local forward.
    ///
    /// Returns the port the server bound.
    pub async fn forward_remote(&self, spec: &RemoteForward) -> Result<u32> {
        let requested = u32::from(spec.port);
        let bound = {
            let mut session = self.session.lock().await;
            session
                .tcpip_forward(forward::REMOTE_BIND, requested)
                .await
                .map_err(|e| TransportError::Forward {
                    spec: spec.to_string(),
                    message: e.to_string(),
                })?
        };
        let bound = if bound == 0 { requested } else { bound };
        self.forwards.insert(bound, (spec.host.clone(), spec.port));
        info!(
            "remote {}:{} forwarded to {}:{}",
            forward::REMOTE_BIND,
            bound,
            spec.host,
            spec.port
        );
        Ok(bound)
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<()> {
        let session = self.session.lock().await;
        session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn open_session(&self) -> Result<Channel<Msg>> {
        let session = self.session.lock().await;
        Ok(session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?)
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(
                    path,
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
    forwards: ForwardTargets,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(
        &self,
        pubkey: &PublicKey,
    ) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        warn!("rejecting host key: {}", error);
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    info!("learning host key for {}:{}", self.host, self.port);
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            "forwarded connection to {}:{} from {}:{}",
            connected_address, connected_port, originator_address, originator_port
        );
        match self.forwards.get(connected_port) {
            Some(target) => {
                tokio::spawn(forward::relay_remote(channel, target));
            }
            None => warn!("no forward registered for remote port {}", connected_port),
        }
        Ok(())
    }
}
