//! Download/upload primitives over the SFTP subsystem.

use std::path::Path;

use log::{debug, info, warn};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;

use super::FileTransfer;
use crate::error::TransferError;
use crate::transport::SshTransport;

/// [`FileTransfer`] backed by an SFTP session on the same SSH connection.
pub struct SftpTransfer {
    inner: SftpSession,
}

impl SftpTransfer {
    /// Start an SFTP session over an already opened subsystem stream.
    pub async fn new<S>(stream: S) -> Result<Self, TransferError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inner = SftpSession::new(stream).await?;
        Ok(Self { inner })
    }
}

impl FileTransfer for SftpTransfer {
    async fn download(&self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        let mut source = self.inner.open(remote).await?;

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut target = tokio::fs::File::create(local).await?;

        let copied = match tokio::io::copy(&mut source, &mut target).await {
            Ok(copied) => copied,
            Err(e) => {
                drop(target);
                if let Err(remove) = tokio::fs::remove_file(local).await {
                    warn!("could not remove partial {}: {}", local.display(), remove);
                }
                return Err(e.into());
            }
        };
        target.flush().await?;

        debug!("downloaded {} bytes from {:?}", copied, remote);
        Ok(copied)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, TransferError> {
        let mut source = tokio::fs::File::open(local).await?;
        let mut target = self
            .inner
            .open_with_flags(
                remote,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await?;

        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.shutdown().await?;

        debug!("uploaded {} bytes to {:?}", copied, remote);
        Ok(copied)
    }
}

/// [`FileTransfer`] that opens the SFTP subsystem on first use.
///
/// A failure to open it is reported like any other transfer error and
/// retried on the next command.
pub struct OnDemandSftp {
    transport: SshTransport,
    sftp: OnceCell<SftpTransfer>,
}

impl OnDemandSftp {
    /// Create a transfer that will open SFTP channels on `transport`.
    pub fn new(transport: SshTransport) -> Self {
        Self {
            transport,
            sftp: OnceCell::new(),
        }
    }

    async fn sftp(&self) -> Result<&SftpTransfer, TransferError> {
        self.sftp
            .get_or_try_init(|| async {
                let stream = self.transport.open_sftp_stream().await?;
                let sftp = SftpTransfer::new(stream).await?;
                info!("sftp subsystem ready");
                Ok(sftp)
            })
            .await
    }
}

impl FileTransfer for OnDemandSftp {
    async fn download(&self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        self.sftp().await?.download(remote, local).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, TransferError> {
        self.sftp().await?.upload(local, remote).await
    }
}
