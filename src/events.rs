//! Event definitions for the application event loop.
//!
//! All asynchronous inputs (user keystrokes, terminal resizes, tunnel client
//! exits) are funneled through a single channel of `Event` values so the
//! control loop is the only place state is mutated.

use crossterm::event::KeyEvent;

use crate::supervisor::EntryId;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A tunnel client process reached end-of-stream on stderr, which is a
    /// best-effort signal that it exited. `generation` identifies the process
    /// lifetime the notification belongs to; stale generations are ignored.
    ClientExited { id: EntryId, generation: u64 },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize,
    /// SIGINT/SIGTERM received; disconnect everything and exit.
    Shutdown,
}
