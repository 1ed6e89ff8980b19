//! Key handling: crossterm key events to [`InputEvent`]s.
//!
//! The queue cursor is purely presentational, so it lives here rather than
//! in the transport state; only a confirmed selection reaches the loop.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::player::{InputEvent, Snapshot, View};

/// Maps keys to loop events and tracks the queue cursor.
#[derive(Debug, Default)]
pub struct InputMapper {
  cursor: usize,
}

impl InputMapper {
  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn map(&mut self, key: KeyEvent, snapshot: &Snapshot) -> Option<InputEvent> {
    if key.kind != KeyEventKind::Press {
      return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Some(InputEvent::Quit);
    }

    match snapshot.view {
      View::Player => self.map_player(key, snapshot),
      View::Queue => self.map_queue(key, snapshot),
    }
  }

  fn map_player(&mut self, key: KeyEvent, snapshot: &Snapshot) -> Option<InputEvent> {
    let event = match key.code {
      KeyCode::Char('q') => InputEvent::Quit,
      KeyCode::Char('p') | KeyCode::Char(' ') => InputEvent::TogglePause,
      KeyCode::Char('n') => InputEvent::Next,
      KeyCode::Char('b') => InputEvent::Previous,
      KeyCode::Char('s') => InputEvent::ToggleShuffle,
      KeyCode::Char('l') => InputEvent::ToggleRepeat,
      KeyCode::Char('m') => InputEvent::ToggleMute,
      KeyCode::Up => InputEvent::VolumeUp,
      KeyCode::Down => InputEvent::VolumeDown,
      KeyCode::Right => InputEvent::SeekForward,
      KeyCode::Left => InputEvent::SeekBackward,
      KeyCode::Tab => {
        self.cursor = snapshot.current_index;
        InputEvent::SwitchView
      }
      _ => return None,
    };
    Some(event)
  }

  fn map_queue(&mut self, key: KeyEvent, snapshot: &Snapshot) -> Option<InputEvent> {
    let last = snapshot.queue.len().saturating_sub(1);
    self.cursor = self.cursor.min(last);

    match key.code {
      KeyCode::Char('q') => Some(InputEvent::Quit),
      KeyCode::Tab | KeyCode::Esc => Some(InputEvent::SwitchView),
      KeyCode::Up | KeyCode::Char('k') => {
        self.cursor = self.cursor.saturating_sub(1);
        None
      }
      KeyCode::Down | KeyCode::Char('j') => {
        self.cursor = (self.cursor + 1).min(last);
        None
      }
      KeyCode::Enter if !snapshot.queue.is_empty() => Some(InputEvent::SelectQueueIndex(self.cursor)),
      _ => None,
    }
  }
}
