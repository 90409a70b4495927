use anyhow::{Context, Result};
use display_guard::GuardConfig;
use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

fn setup_logs() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    setup_logs();

    let config = match std::env::args_os().nth(1) {
        Some(path) => GuardConfig::load(path)?,
        None => GuardConfig::default(),
    };

    let mut handle = config
        .builder()?
        .build()
        .context("Failed to start display guard")?
        .start()?;
    log::info!("Press [Enter] to exit.");

    // Enter on stdin stops the guard. Without a console, run until the
    // listener itself stops.
    let (enter_tx, enter_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                let _ = enter_tx.send(());
            }
        }
    });

    while handle.is_running() {
        match enter_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(250)),
        }
    }

    handle.stop().context("Display guard stopped unexpectedly")?;
    log::info!("Stopped.");
    Ok(())
}
