//! Demo REPL binary: exercises `core_readline::Session` against a real
//! terminal. Reads one line at a time and echoes it back, the way a
//! minimal shell front-end would, until EOF.

use anyhow::Result;
use core_model::{DisplayController, ModelError, RenderOutput, TerminalCapabilities};
use core_readline::{Prompt, Session};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Once;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Writes composed frames straight to stdout: content bytes followed by a
/// cursor-positioning escape sequence, per the terminal wire protocol.
struct StdoutDisplay {
    capabilities: TerminalCapabilities,
}

impl StdoutDisplay {
    fn new() -> Self {
        Self {
            capabilities: TerminalCapabilities::detect(),
        }
    }
}

impl DisplayController for StdoutDisplay {
    fn submit(&mut self, output: &RenderOutput) -> Result<(), ModelError> {
        let mut stdout = io::stdout();
        stdout
            .write_all(&output.content_bytes)
            .and_then(|_| write!(stdout, "\x1b[{}G", output.cursor_terminal_col + 1))
            .and_then(|_| stdout.flush())
            .map_err(|e| ModelError::DisplaySubmit(e.to_string()))
    }

    fn capabilities(&self) -> TerminalCapabilities {
        self.capabilities
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("rl-demo.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "rl-demo.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();

    info!(target: "runtime", "startup");

    let mut session = Session::new(Box::new(StdoutDisplay::new()), 64);
    let prompt = Prompt::new("$ ");

    loop {
        match core_readline::readline(&mut session, &prompt) {
            Ok(Some(line)) => {
                println!("{line}");
            }
            Ok(None) => {
                info!(target: "runtime", "eof");
                break;
            }
            Err(e) => {
                error!(target: "runtime", error = %e, "readline_failed");
                return Err(e.into());
            }
        }
    }

    info!(target: "runtime", "shutdown");
    Ok(())
}
