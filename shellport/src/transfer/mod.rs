//! File transfer: path resolution, the transfer primitives and the invoker
//! that reports on the display.

mod invoker;
pub mod path;
mod sftp;

pub use invoker::{TransferInvoker, TransferOutcome};
pub(crate) use invoker::report as report_status;
pub use sftp::{OnDemandSftp, SftpTransfer};

use std::future::Future;
use std::path::Path;

use crate::error::TransferError;

/// Byte-copy primitives between the local machine and the remote host.
///
/// Implementations are assumed to run over an already authenticated
/// connection. Both operations return the number of bytes copied.
pub trait FileTransfer: Send + Sync {
    /// Copy the remote file at `remote` to `local`.
    fn download(
        &self,
        remote: &str,
        local: &Path,
    ) -> impl Future<Output = Result<u64, TransferError>> + Send;

    /// Copy the local file at `local` to `remote`.
    fn upload(
        &self,
        local: &Path,
        remote: &str,
    ) -> impl Future<Output = Result<u64, TransferError>> + Send;
}
