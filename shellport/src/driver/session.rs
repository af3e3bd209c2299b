//! The interactive session.
//!
//! A single cooperative loop owns the shell channel, the display and the
//! line buffer. Keystrokes go straight to the remote shell; remote output
//! goes straight to the display and, for the terminal stream only, into
//! the line buffer. A completed line that the recognizer accepts is handed
//! to the interception controller, and the loop resumes once it returns.

use std::io::Write;

use bytes::Bytes;
use log::{debug, info, trace};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::intercept::{InterceptConfig, InterceptController};
use crate::channel::{Display, LineBuffer, ShellChannel, ShellEvent, ShellOutput, Writer};
use crate::command::{CommandRecognizer, PromptCommandRecognizer};
use crate::error::{ChannelError, Result, TransportError};
use crate::transfer::{FileTransfer, OnDemandSftp, TransferInvoker, report_status};
use crate::transport::{SshConfig, SshTransport};

/// Everything needed to open and run a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection, authentication and forwarding settings.
    pub ssh: SshConfig,

    /// Turns echoed lines into local commands.
    pub recognizer: PromptCommandRecognizer,

    /// Settle strategy and transfer timeout.
    pub intercept: InterceptConfig,
}

/// An interactive remote shell with local `get`/`put` commands.
///
/// Created by [`SessionBuilder`](super::SessionBuilder); call
/// [`open`](Session::open) to connect.
pub struct Session {
    config: SessionConfig,
    transport: Option<SshTransport>,
}

impl Session {
    /// Create an unconnected session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Connect and authenticate.
    pub async fn open(&mut self) -> Result<()> {
        let transport = SshTransport::connect(self.config.ssh.clone()).await?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Check if the session is connected.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start every configured tunnel.
    ///
    /// Returns the tasks serving local forwards. Remote forwards are served
    /// by the connection itself.
    pub async fn start_forwards(&self) -> Result<Vec<JoinHandle<()>>> {
        let transport = self.transport()?;
        let mut listeners = Vec::with_capacity(self.config.ssh.local_forwards.len());
        for spec in &self.config.ssh.local_forwards {
            listeners.push(transport.forward_local(spec.clone()).await?);
        }
        for spec in &self.config.ssh.remote_forwards {
            transport.forward_remote(spec).await?;
        }
        Ok(listeners)
    }

    /// Run the interactive shell until the remote side closes it.
    ///
    /// `input` carries the local keystrokes; `sink` is the local terminal.
    /// Returns the remote exit status, 0 when none was reported.
    pub async fn run<W: Write>(&self, input: mpsc::Receiver<Bytes>, sink: W) -> Result<u32> {
        let transport = self.transport()?;
        let shell = transport.open_shell().await?;

        let mut channel = ShellChannel::new(shell.output, input, shell.input);
        let mut controller = InterceptController::new(
            TransferInvoker::new(OnDemandSftp::new(transport.clone())),
            self.config.intercept,
            shell.closed.clone(),
        );
        let mut display = Display::new(sink);

        drive(
            &mut channel,
            &self.config.recognizer,
            &mut controller,
            &mut display,
        )
        .await?;

        let status = shell.exit_status.await.ok().flatten().unwrap_or(0);
        info!(
            "session ended with status {} after {} intercepted commands",
            status,
            controller.interceptions()
        );
        Ok(status)
    }

    /// Close the connection.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }

    fn transport(&self) -> Result<&SshTransport> {
        Ok(self.transport.as_ref().ok_or(TransportError::Disconnected)?)
    }
}

/// The session loop.
///
/// Lines are handled in arrival order. After an interception the rest of
/// the chunk and any partial line are dropped: they belong to output the
/// controller has already discarded.
async fn drive<S, R, T, W>(
    channel: &mut ShellChannel<S>,
    recognizer: &R,
    controller: &mut InterceptController<T>,
    display: &mut Display<W>,
) -> Result<()>
where
    S: AsyncWrite + Unpin + Send,
    R: CommandRecognizer,
    T: FileTransfer,
    W: Write,
{
    let mut lines = LineBuffer::default();

    loop {
        match channel.next_event().await {
            ShellEvent::Output(output) => {
                display
                    .passthrough(output.bytes())
                    .map_err(ChannelError::from)?;

                let ShellOutput::Stdout(data) = output else {
                    continue;
                };
                for line in lines.feed(&data) {
                    trace!("line: {:?}", line);
                    let Some(command) = recognizer.recognize(&line) else {
                        continue;
                    };
                    info!(
                        "intercepting `{}` of {:?} in {:?}",
                        command.kind, command.source, command.directory
                    );
                    controller.intercept(&command, channel, display).await;
                    lines.clear();
                    break;
                }
            }
            ShellEvent::Input(keys) => {
                if let Err(e) = channel.send(&keys).await {
                    if !controller.is_closed() {
                        return Err(e.into());
                    }
                    debug!("remote closed, dropping {} input bytes: {}", keys.len(), e);
                }
            }
            ShellEvent::InputClosed => {
                debug!("local input ended, sending EOF");
                if let Err(e) = channel.close_input().await {
                    if !controller.is_closed() {
                        return Err(e.into());
                    }
                    debug!("remote closed before EOF: {}", e);
                }
            }
            ShellEvent::Closed => break,
        }
    }

    display.handover(Writer::Status);
    report_status(display, "Connection closed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::channel::SettleStrategy;
    use crate::error::TransferError;

    /// Records the remote paths it was asked to download or upload.
    #[derive(Default)]
    struct RecordingTransfer {
        calls: Mutex<Vec<String>>,
    }

    impl FileTransfer for RecordingTransfer {
        async fn download(&self, remote: &str, _local: &Path) -> std::result::Result<u64, TransferError> {
            self.calls.lock().unwrap().push(format!("get {remote}"));
            Ok(1)
        }

        async fn upload(&self, _local: &Path, remote: &str) -> std::result::Result<u64, TransferError> {
            self.calls.lock().unwrap().push(format!("put {remote}"));
            Ok(1)
        }
    }

    fn controller() -> InterceptController<RecordingTransfer> {
        controller_with(CancellationToken::new())
    }

    fn controller_with(closed: CancellationToken) -> InterceptController<RecordingTransfer> {
        InterceptController::new(
            TransferInvoker::new(RecordingTransfer::default()),
            InterceptConfig {
                settle: SettleStrategy::Quiescence {
                    quiet: Duration::from_millis(20),
                    max: Duration::from_millis(200),
                },
                transfer_timeout: None,
            },
            closed,
        )
    }

    fn stdout(data: &'static [u8]) -> ShellOutput {
        ShellOutput::Stdout(Bytes::from_static(data))
    }

    /// Queue `chunks` as remote output, then close it, and run the loop.
    async fn run_with(
        remote: tokio_test::io::Mock,
        chunks: Vec<ShellOutput>,
        controller: &mut InterceptController<RecordingTransfer>,
    ) -> String {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (_in_tx, in_rx) = mpsc::channel(16);
        for chunk in chunks {
            out_tx.send(chunk).await.unwrap();
        }
        drop(out_tx);

        let mut channel = ShellChannel::new(out_rx, in_rx, remote);
        let mut display = Display::new(Vec::new());
        drive(
            &mut channel,
            &PromptCommandRecognizer::default(),
            controller,
            &mut display,
        )
        .await
        .unwrap();
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_commands_pass_through() {
        let mut controller = controller();
        let remote = tokio_test::io::Builder::new().build();
        let shown = run_with(
            remote,
            vec![
                stdout(b"user:/home/u$ ls -la\r\n"),
                stdout(b"total 0\r\n"),
                stdout(b"user:/home/u$ "),
            ],
            &mut controller,
        )
        .await;

        assert_eq!(controller.interceptions(), 0);
        assert!(controller.invoker_calls().is_empty());
        assert_eq!(
            shown,
            "user:/home/u$ ls -la\r\ntotal 0\r\nuser:/home/u$ Connection closed.\r\n"
        );
    }

    #[tokio::test]
    async fn test_get_is_intercepted_and_shell_reply_discarded() {
        let mut controller = controller();
        let remote = tokio_test::io::Builder::new().write(b"\n").build();
        let shown = run_with(
            remote,
            vec![
                stdout(b"user:/home/u$ get report.pdf\r\n"),
                stdout(b"bash: get: command not found\r\n"),
                stdout(b"user:/home/u$ "),
            ],
            &mut controller,
        )
        .await;

        assert_eq!(controller.interceptions(), 1);
        assert_eq!(controller.invoker_calls(), vec!["get /home/u/report.pdf"]);
        assert!(shown.starts_with("user:/home/u$ get report.pdf\r\n"));
        assert!(shown.contains("Downloading \"/home/u/report.pdf\"..."));
        assert!(shown.contains("File is downloaded successfully"));
        assert!(!shown.contains("command not found"));
    }

    #[tokio::test]
    async fn test_command_split_across_chunks() {
        let mut controller = controller();
        let remote = tokio_test::io::Builder::new().write(b"\n").build();
        run_with(
            remote,
            vec![stdout(b"me@box:~/src$ put a.t"), stdout(b"xt dst/a.txt\r\n")],
            &mut controller,
        )
        .await;

        assert_eq!(controller.invoker_calls(), vec!["put src/dst/a.txt"]);
    }

    #[tokio::test]
    async fn test_stderr_is_shown_but_not_recognized() {
        let mut controller = controller();
        let remote = tokio_test::io::Builder::new().build();
        let shown = run_with(
            remote,
            vec![ShellOutput::Stderr(Bytes::from_static(b"u:/tmp$ get x\r\n"))],
            &mut controller,
        )
        .await;

        assert_eq!(controller.interceptions(), 0);
        assert!(shown.starts_with("u:/tmp$ get x\r\n"));
    }

    #[tokio::test]
    async fn test_keystrokes_forwarded_then_eof() {
        let remote = tokio_test::io::Builder::new().write(b"ls\r").build();
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        let mut channel = ShellChannel::new(out_rx, in_rx, remote);
        let mut controller = controller();
        let mut display = Display::new(Vec::new());
        let recognizer = PromptCommandRecognizer::default();

        let feed = async move {
            in_tx.send(Bytes::from_static(b"ls\r")).await.unwrap();
            drop(in_tx);
            tokio::time::sleep(Duration::from_millis(50)).await;
            out_tx.send(stdout(b"logout\r\n")).await.unwrap();
        };
        let (result, ()) = tokio::join!(
            drive(&mut channel, &recognizer, &mut controller, &mut display),
            feed
        );

        result.unwrap();
        assert_eq!(
            String::from_utf8(display.into_inner()).unwrap(),
            "logout\r\nConnection closed.\r\n"
        );
    }

    fn broken_pipe() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "channel closed")
    }

    #[tokio::test]
    async fn test_keystrokes_after_remote_close_are_dropped() {
        let remote = tokio_test::io::Builder::new()
            .write_error(broken_pipe())
            .build();
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        let mut channel = ShellChannel::new(out_rx, in_rx, remote);
        let closed = CancellationToken::new();
        closed.cancel();
        let mut controller = controller_with(closed);
        let mut display = Display::new(Vec::new());
        let recognizer = PromptCommandRecognizer::default();

        in_tx.send(Bytes::from_static(b"x")).await.unwrap();
        let feed = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            out_tx.send(stdout(b"logout\r\n")).await.unwrap();
            drop(in_tx);
        };
        let (result, ()) = tokio::join!(
            drive(&mut channel, &recognizer, &mut controller, &mut display),
            feed
        );

        result.unwrap();
        assert_eq!(
            String::from_utf8(display.into_inner()).unwrap(),
            "logout\r\nConnection closed.\r\n"
        );
    }

    #[tokio::test]
    async fn test_write_error_on_open_channel_ends_session() {
        let remote = tokio_test::io::Builder::new()
            .write_error(broken_pipe())
            .build();
        let (_out_tx, out_rx) = mpsc::channel::<ShellOutput>(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        let mut channel = ShellChannel::new(out_rx, in_rx, remote);
        let mut controller = controller();
        let mut display = Display::new(Vec::new());

        in_tx.send(Bytes::from_static(b"x")).await.unwrap();
        let result = drive(
            &mut channel,
            &PromptCommandRecognizer::default(),
            &mut controller,
            &mut display,
        )
        .await;

        assert!(matches!(result, Err(crate::Error::Channel(ChannelError::Io(_)))));
    }

    impl InterceptController<RecordingTransfer> {
        fn invoker_calls(&self) -> Vec<String> {
            self.invoker().transfer().calls.lock().unwrap().clone()
        }
    }
}
