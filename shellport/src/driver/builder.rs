//! Builder for creating sessions.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::intercept::InterceptConfig;
use super::session::{Session, SessionConfig};
use crate::channel::{DEFAULT_PROMPT_PATTERN, RegexPromptDetector, SettleStrategy};
use crate::command::{CommandTable, PromptCommandRecognizer};
use crate::error::{ChannelError, ConfigError, Result};
use crate::transport::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::transport::forward::{LocalForward, RemoteForward};

/// Builder for constructing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use shellport::SessionBuilder;
///
/// # async fn example() -> Result<(), shellport::Error> {
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .build()?;
///
/// session.open().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    timeout: Duration,
    term: String,
    terminal_width: u32,
    terminal_height: u32,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    local_forwards: Vec<LocalForward>,
    remote_forwards: Vec<RemoteForward>,
    prompt_pattern: String,
    commands: CommandTable,
    settle: SettleStrategy,
    transfer_timeout: Option<Duration>,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            term: "xterm".to_string(),
            terminal_width: 80,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            local_forwards: Vec::new(),
            remote_forwards: Vec::new(),
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            commands: CommandTable::default(),
            settle: SettleStrategy::default(),
            transfer_timeout: None,
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the terminal type requested for the PTY (default: `xterm`).
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set host key verification mode (default: accept new).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file instead of `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Add a local-to-remote forward.
    pub fn local_forward(mut self, spec: LocalForward) -> Self {
        self.local_forwards.push(spec);
        self
    }

    /// Add a remote-to-local forward.
    pub fn remote_forward(mut self, spec: RemoteForward) -> Self {
        self.remote_forwards.push(spec);
        self
    }

    /// Set the prompt pattern (default: [`DEFAULT_PROMPT_PATTERN`]).
    pub fn prompt_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.prompt_pattern = pattern.into();
        self
    }

    /// Replace the local command table.
    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    /// Set how trailing remote output is awaited after a transfer.
    pub fn settle(mut self, strategy: SettleStrategy) -> Self {
        self.settle = strategy;
        self
    }

    /// Bound each transfer. Without a limit transfers may run indefinitely.
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Build the session.
    ///
    /// This validates the configuration but does not connect. Call `open()`
    /// on the returned session to establish the connection.
    pub fn build(self) -> Result<Session> {
        Ok(Session::new(self.into_config()?))
    }

    fn into_config(self) -> Result<SessionConfig> {
        let username = self.username.ok_or_else(|| ConfigError::Invalid {
            message: "Username is required".to_string(),
        })?;
        if self.host.is_empty() {
            return Err(ConfigError::Invalid {
                message: "Host is required".to_string(),
            }
            .into());
        }
        if self.commands.is_empty() {
            return Err(ConfigError::Invalid {
                message: "At least one local command is required".to_string(),
            }
            .into());
        }

        let detector =
            RegexPromptDetector::new(&self.prompt_pattern).map_err(ChannelError::from)?;

        let ssh = SshConfig {
            host: self.host,
            port: self.port,
            username,
            auth: self.auth,
            timeout: self.timeout,
            term: self.term,
            terminal_width: self.terminal_width,
            terminal_height: self.terminal_height,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
            local_forwards: self.local_forwards,
            remote_forwards: self.remote_forwards,
        };

        Ok(SessionConfig {
            ssh,
            recognizer: PromptCommandRecognizer::new(detector, self.commands),
            intercept: InterceptConfig {
                settle: self.settle,
                transfer_timeout: self.transfer_timeout,
            },
        })
    }
}
