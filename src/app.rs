//! Application state and UI logic.
//!
//! `App` holds everything the renderer needs that is not supervisor state:
//! list selection, the status line, and the add/edit form. User input is
//! translated into `AppAction` values which the main loop applies to the
//! supervisor, so the UI never touches entries directly.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::record::ConnectionRecord;
use crate::supervisor::{ConnectionState, EntryId, EntrySnapshot};

const STATUS_TTL: Duration = Duration::from_secs(4);

/// Actions resulting from user interaction, applied by the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the application.
    Quit,
    /// Toggle the tunnel on or off depending on its state.
    Toggle(EntryId),
    /// Append a new tunnel.
    Add(ConnectionRecord),
    /// Replace a tunnel's record.
    Edit(EntryId, ConnectionRecord),
    /// Append a copy of a tunnel.
    Clone(EntryId),
    /// Remove a tunnel, stopping it first if live.
    Delete(EntryId),
    /// Connect every disabled tunnel.
    ConnectAll,
    /// Disconnect every connected tunnel.
    DisconnectAll,
}

/// Field positions in the edit form, in display order.
const FIELD_LABELS: [&str; 6] = [
    "Name",
    "Local port",
    "Remote port",
    "Remote address",
    "Server",
    "URL",
];

const FIELD_NAME: usize = 0;
const FIELD_LOCAL_PORT: usize = 1;
const FIELD_REMOTE_PORT: usize = 2;
const FIELD_REMOTE_ADDRESS: usize = 3;
const FIELD_SERVER: usize = 4;
const FIELD_URL: usize = 5;

/// The add/edit form. `target` is `None` when adding a new tunnel.
#[derive(Debug, Clone)]
pub struct Form {
    pub target: Option<EntryId>,
    pub values: [String; 6],
    pub focus: usize,
}

impl Form {
    fn blank() -> Self {
        let defaults = ConnectionRecord::default();
        Self {
            target: None,
            values: [
                String::new(),
                // Blank local port falls back to the remote port on submit.
                String::new(),
                defaults.remote_port.to_string(),
                String::new(),
                String::new(),
                defaults.url_template,
            ],
            focus: FIELD_NAME,
        }
    }

    fn for_record(target: EntryId, record: &ConnectionRecord) -> Self {
        Self {
            target: Some(target),
            values: [
                record.name.clone(),
                record.local_port.to_string(),
                record.remote_port.to_string(),
                record.remote_address.clone(),
                record.server.clone(),
                record.url_template.clone(),
            ],
            focus: FIELD_NAME,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.target.is_some() {
            "Edit tunnel"
        } else {
            "New tunnel"
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        &FIELD_LABELS
    }

    fn next_field(&mut self) {
        self.focus = (self.focus + 1) % self.values.len();
    }

    fn prev_field(&mut self) {
        self.focus = (self.focus + self.values.len() - 1) % self.values.len();
    }

    /// Validates the fields into a record. A blank local port reuses the
    /// remote port, the common case for forwards.
    fn parse(&self) -> Result<ConnectionRecord, String> {
        let remote_port = parse_port("remote port", &self.values[FIELD_REMOTE_PORT])?;
        let local_value = self.values[FIELD_LOCAL_PORT].trim();
        let local_port = if local_value.is_empty() {
            remote_port
        } else {
            parse_port("local port", local_value)?
        };
        Ok(ConnectionRecord {
            name: self.values[FIELD_NAME].trim().to_string(),
            local_port,
            remote_port,
            remote_address: self.values[FIELD_REMOTE_ADDRESS].trim().to_string(),
            server: self.values[FIELD_SERVER].trim().to_string(),
            url_template: self.values[FIELD_URL].trim().to_string(),
        })
    }
}

fn parse_port(label: &str, value: &str) -> Result<u16, String> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!("{label} must be a number between 1 and 65535")),
    }
}

/// Modes of user input interaction.
#[derive(Debug, Clone)]
pub enum InputMode {
    /// Navigating the tunnel list.
    List,
    /// Editing the add/edit form.
    Form(Form),
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
}

/// The main UI state container.
#[derive(Debug)]
pub struct App {
    /// Index of the currently selected tunnel in the snapshot order.
    pub selected: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Flag indicating if the application should exit.
    pub should_quit: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new() -> Self {
        Self {
            selected: 0,
            input_mode: InputMode::List,
            should_quit: false,
            status_message: None,
        }
    }

    /// Keeps the selection inside the list after deletions.
    pub fn clamp_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn set_status_message(&mut self, text: impl Into<String>) {
        self.status_message = Some(StatusMessage {
            text: text.into(),
            at: Instant::now(),
        });
    }

    /// Current status line, if it has not expired.
    pub fn status_line(&self) -> Option<&str> {
        self.status_message
            .as_ref()
            .filter(|message| message.at.elapsed() < STATUS_TTL)
            .map(|message| message.text.as_str())
    }

    /// Translates a key event into an action against the current snapshot.
    pub fn handle_key(&mut self, key: KeyEvent, snapshot: &[EntrySnapshot]) -> AppAction {
        match &mut self.input_mode {
            InputMode::List => self.handle_list_key(key, snapshot),
            InputMode::Form(_) => self.handle_form_key(key),
        }
    }

    fn selected_entry<'a>(&self, snapshot: &'a [EntrySnapshot]) -> Option<&'a EntrySnapshot> {
        snapshot.get(self.selected)
    }

    fn handle_list_key(&mut self, key: KeyEvent, snapshot: &[EntrySnapshot]) -> AppAction {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return AppAction::Quit;
        }
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !snapshot.is_empty() {
                    self.selected = (self.selected + 1).min(snapshot.len() - 1);
                }
                AppAction::None
            }
            KeyCode::Char(' ') | KeyCode::Enter => match self.selected_entry(snapshot) {
                Some(entry) => AppAction::Toggle(entry.id),
                None => AppAction::None,
            },
            KeyCode::Char('a') => {
                self.input_mode = InputMode::Form(Form::blank());
                AppAction::None
            }
            KeyCode::Char('e') => match self.selected_entry(snapshot) {
                Some(entry) if entry.state == ConnectionState::Disabled => {
                    self.input_mode = InputMode::Form(Form::for_record(entry.id, &entry.record));
                    AppAction::None
                }
                Some(_) => {
                    self.set_status_message("Disconnect the tunnel before editing");
                    AppAction::None
                }
                None => AppAction::None,
            },
            KeyCode::Char('c') => match self.selected_entry(snapshot) {
                Some(entry) => AppAction::Clone(entry.id),
                None => AppAction::None,
            },
            KeyCode::Char('d') | KeyCode::Delete => match self.selected_entry(snapshot) {
                Some(entry) => AppAction::Delete(entry.id),
                None => AppAction::None,
            },
            KeyCode::Char('C') => AppAction::ConnectAll,
            KeyCode::Char('D') => AppAction::DisconnectAll,
            _ => AppAction::None,
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> AppAction {
        let InputMode::Form(form) = &mut self.input_mode else {
            return AppAction::None;
        };
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::List;
                AppAction::None
            }
            KeyCode::Enter => {
                let action = match form.parse() {
                    Ok(record) => match form.target {
                        Some(id) => AppAction::Edit(id, record),
                        None => AppAction::Add(record),
                    },
                    Err(message) => {
                        self.set_status_message(message);
                        return AppAction::None;
                    }
                };
                self.input_mode = InputMode::List;
                action
            }
            KeyCode::Tab | KeyCode::Down => {
                form.next_field();
                AppAction::None
            }
            KeyCode::BackTab | KeyCode::Up => {
                form.prev_field();
                AppAction::None
            }
            KeyCode::Backspace => {
                form.values[form.focus].pop();
                AppAction::None
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.values[form.focus].push(c);
                AppAction::None
            }
            _ => AppAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn snapshot_entry(id: EntryId, state: ConnectionState) -> EntrySnapshot {
        EntrySnapshot {
            id,
            record: ConnectionRecord {
                name: format!("tunnel-{id}"),
                ..ConnectionRecord::default()
            },
            state,
            pid: None,
        }
    }

    #[test]
    fn space_toggles_the_selected_entry() {
        let mut app = App::new();
        let snapshot = vec![
            snapshot_entry(7, ConnectionState::Disabled),
            snapshot_entry(9, ConnectionState::Connected),
        ];
        app.selected = 1;
        assert_eq!(
            app.handle_key(key(KeyCode::Char(' ')), &snapshot),
            AppAction::Toggle(9)
        );
    }

    #[test]
    fn edit_of_connected_entry_is_refused_in_the_ui() {
        let mut app = App::new();
        let snapshot = vec![snapshot_entry(3, ConnectionState::Connected)];
        assert_eq!(app.handle_key(key(KeyCode::Char('e')), &snapshot), AppAction::None);
        assert!(matches!(app.input_mode, InputMode::List));
        assert!(app.status_line().is_some());
    }

    #[test]
    fn form_submit_produces_add_action() {
        let mut app = App::new();
        app.handle_key(key(KeyCode::Char('a')), &[]);
        let InputMode::Form(form) = &mut app.input_mode else {
            panic!("expected form mode");
        };
        form.values = [
            "db".to_string(),
            "".to_string(),
            "5432".to_string(),
            "127.0.0.1".to_string(),
            "bastion".to_string(),
            "postgres://localhost:%p".to_string(),
        ];
        let action = app.handle_key(key(KeyCode::Enter), &[]);
        let AppAction::Add(record) = action else {
            panic!("expected add action, got {action:?}");
        };
        // Blank local port reuses the remote port.
        assert_eq!(record.local_port, 5432);
        assert_eq!(record.remote_port, 5432);
        assert!(matches!(app.input_mode, InputMode::List));
    }

    #[test]
    fn invalid_port_keeps_the_form_open() {
        let mut app = App::new();
        app.handle_key(key(KeyCode::Char('a')), &[]);
        let InputMode::Form(form) = &mut app.input_mode else {
            panic!("expected form mode");
        };
        form.values[FIELD_REMOTE_PORT] = "70000".to_string();
        assert_eq!(app.handle_key(key(KeyCode::Enter), &[]), AppAction::None);
        assert!(matches!(app.input_mode, InputMode::Form(_)));
        assert!(app.status_line().unwrap().contains("remote port"));
    }

    #[test]
    fn selection_is_clamped_after_deletes() {
        let mut app = App::new();
        app.selected = 5;
        app.clamp_selection(2);
        assert_eq!(app.selected, 1);
        app.clamp_selection(0);
        assert_eq!(app.selected, 0);
    }
}
