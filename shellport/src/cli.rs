//! Command line arguments.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{CommandFactory, Parser};

use crate::channel::SettleStrategy;
use crate::driver::SessionBuilder;
use crate::error::ConfigError;
use crate::transport::{HostKeyVerification, LocalForward, RemoteForward};

/// Keys tried, in order, when neither a password nor an identity is given.
const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

#[derive(Parser, Debug)]
#[command(
    name = "shellport",
    version,
    about = "Interactive SSH shell with local get/put file transfer",
    override_usage = "shellport username[:password]@host [-L port:host:hostport] [-R host:hostport]"
)]
pub struct Cli {
    /// Remote target, `username[:password]@host`
    pub target: Option<String>,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    pub port: u16,

    /// Private key file
    #[arg(short, long, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Forward local `port` to `host:hostport` as seen from the server
    #[arg(short = 'L', value_name = "port:host:hostport")]
    pub local: Vec<String>,

    /// Forward the server's `localhost:port` to local `host:port`
    #[arg(short = 'R', value_name = "host:port")]
    pub remote: Vec<String>,

    /// Refuse hosts missing from known_hosts
    #[arg(long, conflicts_with = "no_host_key_check")]
    pub strict_host_key: bool,

    /// Skip host key verification entirely
    #[arg(long)]
    pub no_host_key_check: bool,

    /// known_hosts file to use instead of ~/.ssh/known_hosts
    #[arg(long, value_name = "FILE")]
    pub known_hosts: Option<PathBuf>,

    /// Abandon a get/put after this many seconds
    #[arg(long, value_name = "SECS")]
    pub transfer_timeout: Option<u64>,

    /// Wait a fixed delay after a transfer instead of waiting for the shell to go quiet
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,
}

impl Cli {
    /// Turn the arguments into a session builder.
    ///
    /// `default_key` is used when neither a password nor `-i` was given.
    pub fn into_builder(self, default_key: Option<PathBuf>) -> Result<SessionBuilder, ConfigError> {
        let target: Target = self
            .target
            .as_deref()
            .ok_or(ConfigError::ConnectionParams)?
            .parse()?;

        let mut builder = SessionBuilder::new(target.host)
            .port(self.port)
            .username(target.username);

        builder = match (target.password, self.identity.or(default_key)) {
            (Some(password), _) => builder.password(password),
            (None, Some(key)) => builder.private_key(key),
            (None, None) => builder,
        };

        for spec in &self.local {
            builder = builder.local_forward(spec.parse::<LocalForward>()?);
        }
        for spec in &self.remote {
            builder = builder.remote_forward(spec.parse::<RemoteForward>()?);
        }

        if self.strict_host_key {
            builder = builder.host_key_verification(HostKeyVerification::Strict);
        } else if self.no_host_key_check {
            builder = builder.host_key_verification(HostKeyVerification::Disabled);
        }
        if let Some(path) = self.known_hosts {
            builder = builder.known_hosts_path(path);
        }
        if let Some(secs) = self.transfer_timeout {
            builder = builder.transfer_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.settle_ms {
            builder = builder.settle(SettleStrategy::Fixed(Duration::from_millis(ms)));
        }

        Ok(builder)
    }
}

/// The one-line usage text.
pub fn usage() -> String {
    Cli::command().render_usage().to_string()
}

/// First default private key that exists under `~/.ssh`.
pub fn default_identity() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    DEFAULT_IDENTITIES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
}

/// `username[:password]@host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub username: String,
    /// Empty passwords are treated as absent.
    pub password: Option<String>,
    pub host: String,
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (credentials, host) = s.split_once('@').ok_or(ConfigError::ConnectionParams)?;
        if host.is_empty() || host.contains('@') {
            return Err(ConfigError::ConnectionParams);
        }

        let (username, password) = match credentials.split_once(':') {
            Some((username, password)) => (username, Some(password)),
            None => (credentials, None),
        };
        if username.is_empty() {
            return Err(ConfigError::ConnectionParams);
        }

        Ok(Self {
            username: username.to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            host: host.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::AuthMethod;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shellport").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_target_with_password() {
        let target: Target = "admin:s3cr:et@10.0.0.1".parse().unwrap();
        assert_eq!(
            target,
            Target {
                username: "admin".into(),
                password: Some("s3cr:et".into()),
                host: "10.0.0.1".into(),
            }
        );
    }

    #[test]
    fn test_target_without_password() {
        let target: Target = "deploy@web01".parse().unwrap();
        assert_eq!(target.username, "deploy");
        assert_eq!(target.password, None);
        assert_eq!(target.host, "web01");

        let target: Target = "deploy:@web01".parse().unwrap();
        assert_eq!(target.password, None);
    }

    #[test]
    fn test_target_errors() {
        for bad in ["web01", "deploy@", "@web01", ":pw@web01", "a@b@c"] {
            assert!(
                matches!(bad.parse::<Target>(), Err(ConfigError::ConnectionParams)),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_no_target_is_not_a_parse_error() {
        let cli = parse(&[]);
        assert!(cli.target.is_none());
    }

    #[test]
    fn test_builder_from_arguments() {
        let cli = parse(&[
            "root:toor@lab",
            "-p",
            "2222",
            "-L",
            "8080:localhost:80",
            "-R",
            "localhost:3000",
            "--strict-host-key",
            "--transfer-timeout",
            "90",
            "--settle-ms",
            "500",
        ]);
        let session = cli.into_builder(None).unwrap().build().unwrap();
        let config = session.config();

        assert_eq!(config.ssh.socket_addr(), "lab:2222");
        assert_eq!(config.ssh.username, "root");
        assert!(matches!(config.ssh.auth, AuthMethod::Password(_)));
        assert_eq!(config.ssh.local_forwards[0].to_string(), "8080:localhost:80");
        assert_eq!(config.ssh.remote_forwards[0].to_string(), "localhost:3000");
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Strict);
        assert_eq!(config.intercept.transfer_timeout, Some(Duration::from_secs(90)));
        assert_eq!(
            config.intercept.settle,
            SettleStrategy::Fixed(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_identity_precedence() {
        let session = parse(&["ops@box", "-i", "/keys/ops"])
            .into_builder(Some(PathBuf::from("/home/ops/.ssh/id_rsa")))
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            &session.config().ssh.auth,
            AuthMethod::PrivateKey { path, .. } if path == &PathBuf::from("/keys/ops")
        ));

        let session = parse(&["ops@box"])
            .into_builder(Some(PathBuf::from("/home/ops/.ssh/id_rsa")))
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            &session.config().ssh.auth,
            AuthMethod::PrivateKey { path, .. } if path == &PathBuf::from("/home/ops/.ssh/id_rsa")
        ));

        let session = parse(&["ops:pw@box"])
            .into_builder(Some(PathBuf::from("/home/ops/.ssh/id_rsa")))
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(session.config().ssh.auth, AuthMethod::Password(_)));
    }

    #[test]
    fn test_forward_errors_keep_their_messages() {
        let err = parse(&["u@h", "-L", "8080:localhost"]).into_builder(None).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Local to remote port forwarding params can't be parsed"
        );

        let err = parse(&["u@h", "-R", "3000"]).into_builder(None).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Remote to local port forwarding params can't be parsed"
        );

        let err = parse(&["nohost"]).into_builder(None).err().unwrap();
        assert_eq!(err.to_string(), "Connection params can't be parsed");
    }

    #[test]
    fn test_conflicting_host_key_flags() {
        let err = Cli::try_parse_from(["shellport", "u@h", "--strict-host-key", "--no-host-key-check"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_usage_mentions_forwards() {
        let usage = usage();
        assert!(usage.contains("-L port:host:hostport"));
        assert!(usage.contains("-R host:hostport"));
    }
}
