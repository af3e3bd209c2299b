//! Error types for shellport.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for shellport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Shell channel and display errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// File transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Command line and builder configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors (SSH connection, authentication, tunnels).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Port forwarding could not be set up
    #[error("Forwarding {spec} failed: {message}")]
    Forward { spec: String, message: String },
}

/// Shell channel errors (PTY, remote input, local display).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Reading keystrokes, writing to the remote or to the display failed
    #[error("Channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// File transfer errors. These are reported to the user and never end
/// the session.
#[derive(Error, Debug)]
pub enum TransferError {
    /// SFTP protocol or server error
    #[error("{0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Local file error
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The SFTP subsystem channel could not be opened
    #[error("SFTP channel error: {0}")]
    Channel(#[from] russh::Error),
}

/// Configuration errors raised while parsing arguments or building a session.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The `user[:password]@host` target could not be parsed
    #[error("Connection params can't be parsed")]
    ConnectionParams,

    /// The `-L port:host:hostport` value could not be parsed
    #[error("Local to remote port forwarding params can't be parsed")]
    LocalForwardParams,

    /// The `-R host:port` value could not be parsed
    #[error("Remote to local port forwarding params can't be parsed")]
    RemoteForwardParams,

    /// Any other invalid builder setting
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type alias using shellport's Error.
pub type Result<T> = std::result::Result<T, Error>;
