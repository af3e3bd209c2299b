//! Buffered PTY shell channel.
//!
//! Remote output and local keystrokes are queued in bounded channels and
//! consumed by the session loop one event at a time. While a transfer is
//! running nothing consumes them, so bytes pile up in the queues; the
//! [`StreamLink`] operations settle and discard that backlog afterwards.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ChannelError;

/// Writer for bytes destined to the remote shell's input.
pub type RemoteWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A chunk of output from the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutput {
    /// Regular channel data (the terminal stream).
    Stdout(Bytes),

    /// Extended data (stderr). Displayed but never line-buffered.
    Stderr(Bytes),
}

impl ShellOutput {
    /// The raw bytes of this chunk.
    pub fn bytes(&self) -> &Bytes {
        match self {
            ShellOutput::Stdout(data) | ShellOutput::Stderr(data) => data,
        }
    }

    /// Length of the chunk in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// One step of the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// The remote shell produced output.
    Output(ShellOutput),

    /// The local user typed something.
    Input(Bytes),

    /// Local input reached end of file.
    InputClosed,

    /// The remote shell closed its output.
    Closed,
}

/// How to decide that the remote side has finished emitting output
/// belonging to an intercepted command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Wait until no output arrives for `quiet`, but never longer than `max`.
    Quiescence { quiet: Duration, max: Duration },

    /// Wait a constant delay.
    Fixed(Duration),
}

impl Default for SettleStrategy {
    fn default() -> Self {
        SettleStrategy::Quiescence {
            quiet: Duration::from_millis(150),
            max: Duration::from_secs(2),
        }
    }
}

/// Operations the interception controller needs from the shell streams.
pub trait StreamLink: Send {
    /// Wait for the remote side to go quiet, discarding what arrives meanwhile.
    ///
    /// Returns the number of bytes discarded.
    fn settle(&mut self, strategy: SettleStrategy) -> impl Future<Output = usize> + Send;

    /// Discard everything already buffered in both directions.
    ///
    /// Returns the number of bytes discarded.
    fn drain(&mut self) -> usize;

    /// Send a newline so the remote shell renders a fresh prompt.
    fn request_prompt(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// The interactive shell channel as seen by the session loop.
pub struct ShellChannel<W = RemoteWriter> {
    /// Output chunks from the remote shell.
    output: mpsc::Receiver<ShellOutput>,

    /// Keystrokes read from the local terminal.
    input: mpsc::Receiver<Bytes>,

    /// Remote shell input.
    remote: W,

    /// Cleared once the keystroke queue reports end of input.
    input_open: bool,
}

impl<W: AsyncWrite + Unpin + Send> ShellChannel<W> {
    /// Create a channel from its output queue, keystroke queue and remote writer.
    pub fn new(
        output: mpsc::Receiver<ShellOutput>,
        input: mpsc::Receiver<Bytes>,
        remote: W,
    ) -> Self {
        Self {
            output,
            input,
            remote,
            input_open: true,
        }
    }

    /// Wait for whichever of remote output or local input comes first.
    ///
    /// Once [`ShellEvent::InputClosed`] has been returned only output is
    /// awaited.
    pub async fn next_event(&mut self) -> ShellEvent {
        tokio::select! {
            output = self.output.recv() => match output {
                Some(output) => ShellEvent::Output(output),
                None => ShellEvent::Closed,
            },
            keys = self.input.recv(), if self.input_open => match keys {
                Some(keys) => ShellEvent::Input(keys),
                None => {
                    self.input_open = false;
                    ShellEvent::InputClosed
                }
            },
        }
    }

    /// Wait for the next output chunk. `None` once the remote side closed.
    pub async fn next_output(&mut self) -> Option<ShellOutput> {
        self.output.recv().await
    }

    /// Write bytes to the remote shell.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.remote.write_all(data).await?;
        self.remote.flush().await?;
        Ok(())
    }

    /// Signal end of input to the remote shell.
    pub async fn close_input(&mut self) -> Result<(), ChannelError> {
        self.remote.shutdown().await?;
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin + Send> StreamLink for ShellChannel<W> {
    async fn settle(&mut self, strategy: SettleStrategy) -> usize {
        match strategy {
            SettleStrategy::Fixed(delay) => {
                tokio::time::sleep(delay).await;
                0
            }
            SettleStrategy::Quiescence { quiet, max } => {
                let deadline = Instant::now() + max;
                let mut discarded = 0;
                loop {
                    let wake = (Instant::now() + quiet).min(deadline);
                    match tokio::time::timeout_at(wake, self.output.recv()).await {
                        Ok(Some(chunk)) => {
                            trace!("settle: discarding {} bytes", chunk.len());
                            discarded += chunk.len();
                        }
                        // Closed, quiet for a full window, or out of time.
                        Ok(None) | Err(_) => break,
                    }
                }
                discarded
            }
        }
    }

    fn drain(&mut self) -> usize {
        let mut output = 0;
        while let Ok(chunk) = self.output.try_recv() {
            output += chunk.len();
        }
        let mut input = 0;
        while let Ok(keys) = self.input.try_recv() {
            input += keys.len();
        }
        debug!("drained {} output bytes, {} input bytes", output, input);
        output + input
    }

    async fn request_prompt(&mut self) -> Result<(), ChannelError> {
        self.send(b"\n").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with(
        remote: tokio_test::io::Mock,
    ) -> (
        ShellChannel<tokio_test::io::Mock>,
        mpsc::Sender<ShellOutput>,
        mpsc::Sender<Bytes>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        (ShellChannel::new(out_rx, in_rx, remote), out_tx, in_tx)
    }

    #[tokio::test]
    async fn test_send_writes_to_remote() {
        let remote = tokio_test::io::Builder::new().write(b"ls -la\r").build();
        let (mut channel, _out, _in) = channel_with(remote);
        channel.send(b"ls -la\r").await.unwrap();
    }

    #[tokio::test]
    async fn test_request_prompt_sends_newline() {
        let remote = tokio_test::io::Builder::new().write(b"\n").build();
        let (mut channel, _out, _in) = channel_with(remote);
        channel.request_prompt().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_empties_both_queues() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, out_tx, in_tx) = channel_with(remote);

        out_tx
            .send(ShellOutput::Stdout(Bytes::from_static(b"get: command not found\r\n")))
            .await
            .unwrap();
        out_tx
            .send(ShellOutput::Stderr(Bytes::from_static(b"warn")))
            .await
            .unwrap();
        in_tx.send(Bytes::from_static(b"abc")).await.unwrap();

        assert_eq!(channel.drain(), 24 + 4 + 3);
        assert_eq!(channel.drain(), 0);

        // Queues stay usable after draining.
        out_tx
            .send(ShellOutput::Stdout(Bytes::from_static(b"$ ")))
            .await
            .unwrap();
        assert_eq!(
            channel.next_output().await,
            Some(ShellOutput::Stdout(Bytes::from_static(b"$ ")))
        );
    }

    #[tokio::test]
    async fn test_next_event_input_closes_once() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, out_tx, in_tx) = channel_with(remote);

        in_tx.send(Bytes::from_static(b"l")).await.unwrap();
        drop(in_tx);
        assert_eq!(channel.next_event().await, ShellEvent::Input(Bytes::from_static(b"l")));
        assert_eq!(channel.next_event().await, ShellEvent::InputClosed);

        out_tx
            .send(ShellOutput::Stdout(Bytes::from_static(b"bye")))
            .await
            .unwrap();
        drop(out_tx);
        assert_eq!(
            channel.next_event().await,
            ShellEvent::Output(ShellOutput::Stdout(Bytes::from_static(b"bye")))
        );
        assert_eq!(channel.next_event().await, ShellEvent::Closed);
    }

    #[tokio::test]
    async fn test_quiescence_returns_after_quiet_window() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, out_tx, _in) = channel_with(remote);

        out_tx
            .send(ShellOutput::Stdout(Bytes::from_static(b"late echo")))
            .await
            .unwrap();

        let strategy = SettleStrategy::Quiescence {
            quiet: Duration::from_millis(20),
            max: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        assert_eq!(channel.settle(strategy).await, 9);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_quiescence_bounded_by_max() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, out_tx, _in) = channel_with(remote);

        let chatter = tokio::spawn(async move {
            for _ in 0..200 {
                if out_tx
                    .send(ShellOutput::Stdout(Bytes::from_static(b".")))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let strategy = SettleStrategy::Quiescence {
            quiet: Duration::from_millis(100),
            max: Duration::from_millis(150),
        };
        let started = std::time::Instant::now();
        let discarded = channel.settle(strategy).await;
        assert!(discarded > 0);
        assert!(started.elapsed() < Duration::from_millis(900));
        drop(channel);
        chatter.await.unwrap();
    }

    #[tokio::test]
    async fn test_quiescence_stops_when_closed() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, out_tx, _in) = channel_with(remote);
        drop(out_tx);
        assert_eq!(channel.settle(SettleStrategy::default()).await, 0);
    }

    #[tokio::test]
    async fn test_fixed_delay_waits() {
        let remote = tokio_test::io::Builder::new().build();
        let (mut channel, _out, _in) = channel_with(remote);
        let started = std::time::Instant::now();
        channel
            .settle(SettleStrategy::Fixed(Duration::from_millis(30)))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
