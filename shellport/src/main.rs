use std::io::{self, Read};
use std::thread;

use bytes::Bytes;
use clap::Parser;
use crossterm::terminal;
use log::{debug, warn};
use tokio::sync::mpsc;

use shellport::cli::{self, Cli};

/// Keystroke chunks buffered between the stdin thread and the session loop.
const INPUT_QUEUE: usize = 64;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let code = run().await;
    // The stdin thread may still be blocked in read(); exit without joining it.
    std::process::exit(code);
}

async fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { 1 } else { 0 };
        }
    };

    if cli.target.is_none() {
        println!("{}", cli::usage());
        return 0;
    }

    let builder = match cli.into_builder(cli::default_identity()) {
        Ok(builder) => builder,
        Err(e) => {
            println!("{}", e);
            println!("{}", cli::usage());
            return 1;
        }
    };

    let (width, height) = terminal::size()
        .map(|(w, h)| (u32::from(w), u32::from(h)))
        .unwrap_or((80, 24));

    let mut session = match builder.terminal_size(width, height).build() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    if let Err(e) = session.open().await {
        eprintln!("{}", e);
        return 1;
    }

    let _listeners = match session.start_forwards().await {
        Ok(listeners) => listeners,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    for spec in &session.config().ssh.local_forwards {
        println!("Listening for connections on local port {}", spec.port);
    }

    let (keys, input) = mpsc::channel(INPUT_QUEUE);
    if let Err(e) = spawn_stdin(keys) {
        eprintln!("could not read from stdin: {}", e);
        return 1;
    }

    let result = {
        let _raw = RawMode::enable();
        session.run(input, io::stdout()).await
    };

    let code = match result {
        Ok(status) => i32::try_from(status).unwrap_or(1),
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };

    if let Err(e) = session.close().await {
        debug!("close: {}", e);
    }
    code
}

/// Read raw keystrokes on a dedicated thread. Dropping the sender on EOF
/// ends the remote shell's input.
fn spawn_stdin(keys: mpsc::Sender<Bytes>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if keys.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .map(|_| ())
}

/// Keeps the local terminal in raw mode until dropped.
struct RawMode {
    enabled: bool,
}

impl RawMode {
    fn enable() -> Self {
        let enabled = match terminal::enable_raw_mode() {
            Ok(()) => true,
            Err(e) => {
                debug!("raw mode unavailable: {}", e);
                false
            }
        };
        Self { enabled }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if self.enabled {
            let _ = terminal::disable_raw_mode();
        }
    }
}
