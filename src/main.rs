//! Burrow: a TUI manager for SSH local-port-forward tunnels.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads the persisted tunnel list, and runs the main event loop:
//! a single control task that applies user actions to the supervisor, feeds
//! client-exit notifications back into it, and drives the watchdog poll.

mod app;
mod client;
mod events;
mod record;
mod store;
mod supervisor;
mod tui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use crate::app::{App, AppAction};
use crate::events::Event;
use crate::store::TunnelStore;
use crate::supervisor::{ConnectionState, Supervisor, WATCHDOG_INTERVAL};

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "burrow",
    version,
    about = "Manage SSH local-port-forward tunnels from the terminal"
)]
struct Cli {
    /// Path to the tunnels file (default: the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,
    /// SSH client executable, resolved via PATH.
    #[arg(long, default_value = "ssh")]
    ssh: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store_path = match cli.config {
        Some(path) => path,
        None => TunnelStore::default_path()?,
    };
    let store = TunnelStore::new(store_path);

    let (event_tx, event_rx) = mpsc::channel(256);
    let supervisor = Supervisor::load(store, cli.ssh, event_tx.clone())?;

    let terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx);

    run(supervisor, event_rx, terminal).await
}

async fn run(
    mut supervisor: Supervisor,
    mut event_rx: mpsc::Receiver<Event>,
    mut terminal: tui::TuiTerminal,
) -> Result<()> {
    let mut app = App::new();
    let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
    watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut redraw = tokio::time::interval(Duration::from_millis(150));

    let result = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::Key(key) => {
                        let action = app.handle_key(key, &supervisor.snapshot());
                        apply_action(action, &mut app, &mut supervisor).await;
                    }
                    Event::ClientExited { id, generation } => {
                        supervisor.on_client_exited(id, generation);
                    }
                    Event::Resize => {
                        let _ = terminal.autoresize();
                    }
                    Event::Shutdown => {
                        app.should_quit = true;
                    }
                }
            }
            // The watchdog is armed only while something is connected; the
            // guard re-arms it idempotently whenever a tunnel comes up.
            _ = watchdog.tick(), if supervisor.any_connected() => {
                supervisor.watchdog_tick();
            }
            _ = redraw.tick() => {}
        }

        if app.should_quit {
            break Ok(());
        }
        let snapshot = supervisor.snapshot();
        app.clamp_selection(snapshot.len());
        if let Err(err) = tui::draw(&app, &snapshot, &mut terminal) {
            break Err(err.into());
        }
    };

    // Leave no client processes behind on exit.
    supervisor.disconnect_all().await;
    tui::restore_terminal(terminal)?;
    result
}

/// Applies a user action to the supervisor and updates the status line.
async fn apply_action(action: AppAction, app: &mut App, supervisor: &mut Supervisor) {
    match action {
        AppAction::None => {}
        AppAction::Quit => {}
        AppAction::Toggle(id) => {
            let state = supervisor
                .snapshot()
                .iter()
                .find(|entry| entry.id == id)
                .map(|entry| entry.state);
            match state {
                Some(ConnectionState::Disabled) => {
                    if let Err(err) = supervisor.toggle_on(id).await {
                        app.set_status_message(format!("Could not start ssh client: {err}"));
                    }
                }
                Some(ConnectionState::Connected) => supervisor.toggle_off(id).await,
                // Mid-transition or stale: nothing sensible to do.
                _ => {}
            }
        }
        AppAction::Add(record) => {
            let name = record.name.clone();
            supervisor.add(record);
            app.set_status_message(format!("Added {name}"));
        }
        AppAction::Edit(id, record) => match supervisor.edit(id, record) {
            Ok(()) => app.set_status_message("Saved"),
            Err(err) => app.set_status_message(err.to_string()),
        },
        AppAction::Clone(id) => {
            if supervisor.clone_entry(id).is_ok() {
                app.set_status_message("Cloned");
            }
        }
        AppAction::Delete(id) => {
            supervisor.delete(&[id]).await;
        }
        AppAction::ConnectAll => {
            let failures = supervisor.connect_all().await;
            if let Some((name, err)) = failures.first() {
                app.set_status_message(format!("{name}: could not start ssh client: {err}"));
            }
        }
        AppAction::DisconnectAll => {
            supervisor.disconnect_all().await;
        }
    }
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => {
                    let _ = tx.blocking_send(Event::Key(key));
                }
                Ok(crossterm::event::Event::Resize(_, _)) => {
                    let _ = tx.blocking_send(Event::Resize);
                }
                _ => {}
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            let _ = tx.send(Event::Shutdown).await;
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Event::Shutdown).await;
        }
    });
}
