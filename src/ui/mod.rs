//! Terminal dashboard.
//!
//! Draws the latest [`Snapshot`] and the shared [`ArtState`], and forwards
//! key presses to the control loop. Never touches transport state itself.

mod input;

use std::io::{self, Stdout};
use std::time::Duration;

use async_channel::{Sender, TrySendError};
use crossterm::event::{Event, EventStream};
use crossterm::execute;
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::watch;

use crate::player::{truncate, ArtState, InputEvent, LoopPhase, SharedArt, Snapshot, View};

pub use input::InputMapper;

const FRAME_INTERVAL: Duration = Duration::from_millis(100);
const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];
const ACCENT: Color = Color::Rgb(0, 215, 255);
const DIM: Color = Color::DarkGray;
const WARN: Color = Color::Rgb(255, 95, 95);
const MIN_WIDTH: u16 = 82;
const MIN_HEIGHT: u16 = 24;

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Run the dashboard until the loop reaches a terminal phase or input is
/// closed. The terminal is restored even when drawing fails.
pub async fn run(
  snapshots: watch::Receiver<Snapshot>,
  art: SharedArt,
  input: Sender<InputEvent>,
) -> io::Result<()> {
  let mut terminal = init_terminal()?;
  let result = run_dashboard(&mut terminal, snapshots, art, input).await;
  let restored = restore_terminal(&mut terminal);
  result.and(restored)
}

fn init_terminal() -> io::Result<Tui> {
  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen)?;
  Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
  terminal.show_cursor()
}

async fn run_dashboard(
  terminal: &mut Tui,
  mut snapshots: watch::Receiver<Snapshot>,
  art: SharedArt,
  input: Sender<InputEvent>,
) -> io::Result<()> {
  let mut events = EventStream::new();
  let mut frames = tokio::time::interval(FRAME_INTERVAL);
  let mut mapper = InputMapper::default();
  let mut spin = 0usize;

  loop {
    tokio::select! {
      _ = frames.tick() => {
        spin = spin.wrapping_add(1);
      }
      changed = snapshots.changed() => {
        if changed.is_err() {
          break;
        }
      }
      event = events.next() => match event {
        Some(Ok(Event::Key(key))) => {
          let snapshot = snapshots.borrow().clone();
          if let Some(event) = mapper.map(key, &snapshot) {
            match input.try_send(event) {
              Ok(()) => {}
              Err(TrySendError::Full(event)) => log::debug!("Input queue full, dropping {:?}", event),
              Err(TrySendError::Closed(_)) => break,
            }
          }
        }
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          log::error!("Terminal input failed: {}", e);
          break;
        }
        None => break,
      },
    }

    let snapshot = snapshots.borrow().clone();
    if snapshot.phase.is_terminal() {
      break;
    }
    let art = art.lock().clone();
    terminal.draw(|frame| render(frame, &snapshot, &art, mapper.cursor(), spin))?;
  }

  input.close();
  Ok(())
}

/// Draw one frame.
pub fn render(frame: &mut Frame<'_>, snapshot: &Snapshot, art: &ArtState, cursor: usize, spin: usize) {
  let area = frame.area();
  if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
    render_too_small(frame, area);
    return;
  }

  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(3),
      Constraint::Min(8),
      Constraint::Length(3),
    ])
    .split(area);

  render_header(frame, rows[0]);

  let art_width = u16::try_from(art.width)
    .unwrap_or(u16::MAX)
    .max(20)
    .saturating_add(2);
  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Length(art_width), Constraint::Min(30)])
    .split(rows[1]);

  render_art(frame, cols[0], art, spin);
  match snapshot.view {
    View::Player => render_now_playing(frame, cols[1], snapshot, spin),
    View::Queue => render_queue(frame, cols[1], snapshot, art, cursor),
  }
  render_footer(frame, rows[2], snapshot.view);
}

fn render_too_small(frame: &mut Frame<'_>, area: Rect) {
  let message = format!(
    "Terminal too small ({}×{}). Need {}×{} minimum.",
    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
  );
  let mut lines = vec![Line::default(); (area.height / 2) as usize];
  lines.push(
    Line::styled(message, Style::default().fg(WARN).add_modifier(Modifier::BOLD)).centered(),
  );
  frame.render_widget(Paragraph::new(lines), area);
}

fn panel(title: &str, color: Color) -> Block<'_> {
  Block::default()
    .borders(Borders::ALL)
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
    .title(Line::from(format!("  {}  ", title)).centered().bold())
}

fn accent_of(art: &ArtState) -> Color {
  art
    .dominant
    .map(|[r, g, b]| Color::Rgb(r, g, b))
    .unwrap_or(ACCENT)
}

fn render_header(frame: &mut Frame<'_>, area: Rect) {
  let title = Line::from(vec![
    Span::styled("♪  ", Style::default().fg(Color::Magenta)),
    Span::styled(
      "M U S I C A L T E R M",
      Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    ),
    Span::styled("  ♪", Style::default().fg(Color::Magenta)),
  ])
  .centered();
  frame.render_widget(
    Paragraph::new(vec![Line::default(), title]),
    area,
  );
}

fn render_art(frame: &mut Frame<'_>, area: Rect, art: &ArtState, spin: usize) {
  let block = panel("A L B U M", accent_of(art));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let lines = if art.loading {
    let mut lines = vec![Line::default(); (inner.height / 2) as usize];
    lines.push(
      Line::from(format!("{}  loading…", SPINNER[spin % SPINNER.len()]))
        .centered()
        .style(Style::default().fg(DIM)),
    );
    lines
  } else if art.pixels.is_some() {
    half_block_lines(art)
  } else {
    placeholder_lines(inner.width, inner.height)
  };
  frame.render_widget(Paragraph::new(lines), inner);
}

/// Two pixel rows per terminal row: the upper pixel is the foreground of
/// `▀`, the lower one its background. An odd last row has no background.
fn half_block_lines(art: &ArtState) -> Vec<Line<'static>> {
  let Some(pixels) = art.pixels.as_ref() else {
    return Vec::new();
  };
  let width = art.width as usize;
  let rgb = |[r, g, b]: [u8; 3]| Color::Rgb(r, g, b);

  (0..(art.height as usize).div_ceil(2))
    .map(|row| {
      let spans: Vec<Span<'static>> = (0..width)
        .filter_map(|x| {
          let top = *pixels.get(2 * row * width + x)?;
          let style = match pixels.get((2 * row + 1) * width + x) {
            Some(&bottom) => Style::default().fg(rgb(top)).bg(rgb(bottom)),
            None => Style::default().fg(rgb(top)),
          };
          Some(Span::styled("▀", style))
        })
        .collect();
      Line::from(spans)
    })
    .collect()
}

fn placeholder_lines(width: u16, height: u16) -> Vec<Line<'static>> {
  let (w, h) = (width as i32, height as i32);
  let (cx, cy) = (w / 2, h / 2);
  let radius = w.min(h * 2) / 3;

  (0..h)
    .map(|y| {
      if y == cy {
        return Line::from("VINYL").centered().bold();
      }
      let row: String = (0..w)
        .map(|x| {
          let (dx, dy) = (x - cx, (y - cy) * 2);
          if dx * dx + dy * dy < radius * radius {
            '•'
          } else {
            ' '
          }
        })
        .collect();
      Line::from(Span::styled(row, Style::default().fg(DIM)))
    })
    .collect()
}

fn render_now_playing(frame: &mut Frame<'_>, area: Rect, snapshot: &Snapshot, spin: usize) {
  let block = panel("N O W  P L A Y I N G", ACCENT);
  let inner = block.inner(area);
  frame.render_widget(block, area);
  let width = inner.width as usize;

  let mut lines = Vec::new();
  let spinner = SPINNER[spin % SPINNER.len()];

  if snapshot.phase == LoopPhase::Loading {
    lines.push(Line::default());
    lines.push(Line::styled(
      format!("{}  fetching playlist…", spinner),
      Style::default().fg(DIM),
    ));
    frame.render_widget(Paragraph::new(lines), inner);
    return;
  }

  let title = snapshot
    .current_track()
    .map(|t| t.title.as_str())
    .unwrap_or("No track loaded");
  let counter = format!(
    "{:02}/{:02}",
    snapshot.current_index + 1,
    snapshot.queue.len()
  );
  lines.push(Line::from(vec![
    Span::styled(
      format!("❖ {}  ", truncate(title, width.saturating_sub(counter.len() + 4))),
      Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    ),
    Span::styled(counter, Style::default().fg(DIM)),
  ]));
  lines.push(Line::default());
  lines.push(mode_line(snapshot));
  lines.push(Line::default());
  lines.push(volume_line(snapshot, width));
  lines.push(Line::default());

  match (snapshot.position, snapshot.duration, snapshot.progress()) {
    (Some(position), Some(duration), Some(progress)) => {
      lines.push(Line::styled(
        format!("{}  ›  {}", format_time(Some(position)), format_time(Some(duration))),
        Style::default().fg(DIM),
      ));
      let bar_width = width.saturating_sub(6);
      let filled = (progress * bar_width as f64).round() as usize;
      lines.push(Line::from(vec![
        Span::styled("█".repeat(filled), Style::default().fg(ACCENT)),
        Span::styled(
          "░".repeat(bar_width.saturating_sub(filled)),
          Style::default().fg(DIM),
        ),
        Span::styled(
          format!(" {:3}%", (progress * 100.0) as u32),
          Style::default().fg(ACCENT),
        ),
      ]));
    }
    _ => {
      lines.push(Line::styled(
        format!("{}  buffering…", spinner),
        Style::default().fg(DIM),
      ));
      lines.push(Line::default());
    }
  }

  lines.push(Line::default());
  if let Some(status) = snapshot.status_message.as_deref() {
    lines.push(Line::styled(
      truncate(status, width),
      Style::default().fg(WARN),
    ));
  }

  frame.render_widget(Paragraph::new(lines), inner);
}

fn mode_line(snapshot: &Snapshot) -> Line<'static> {
  let on = |color: Color| Style::default().fg(color).add_modifier(Modifier::BOLD);
  let off = Style::default().fg(DIM);

  let mut spans = vec![if snapshot.paused {
    Span::styled("⏸ PAUSED  ", on(WARN))
  } else {
    Span::styled("▶ PLAYING  ", on(Color::White))
  }];
  spans.push(if snapshot.shuffle {
    Span::styled(
      format!(
        "⇄ SHUFFLE [{}/{}]  ",
        snapshot.shuffle_pool.len(),
        snapshot.queue.len()
      ),
      on(Color::Cyan),
    )
  } else {
    Span::styled("⇒ SHUFFLE  ", off)
  });
  spans.push(if snapshot.repeat {
    Span::styled("↺ REPEAT  ", on(Color::Magenta))
  } else {
    Span::styled("↷ REPEAT  ", off)
  });
  if snapshot.muted {
    spans.push(Span::styled("✕ MUTED", on(WARN)));
  }
  Line::from(spans)
}

fn volume_line(snapshot: &Snapshot, width: usize) -> Line<'static> {
  let label = format!("♪ {:3}%  ", snapshot.volume);
  let bar_width = width.saturating_sub(label.chars().count());
  let filled = (snapshot.volume as usize * bar_width) / 100;
  Line::from(vec![
    Span::styled(label, Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    Span::styled("▰".repeat(filled), Style::default().fg(Color::LightGreen)),
    Span::styled(
      "▱".repeat(bar_width.saturating_sub(filled)),
      Style::default().fg(DIM),
    ),
  ])
}

fn render_queue(frame: &mut Frame<'_>, area: Rect, snapshot: &Snapshot, art: &ArtState, cursor: usize) {
  let total = snapshot.queue.len();
  let title = if snapshot.shuffle {
    format!("Q U E U E  ({})  ⇄ SHUFFLE", total)
  } else {
    format!("Q U E U E  ({})", total)
  };
  let block = panel(&title, ACCENT);
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let visible = inner.height.saturating_sub(1) as usize;
  let offset = scroll_offset(cursor, total, visible);
  let width = inner.width as usize;
  let highlight = accent_of(art);

  let mut lines: Vec<Line> = snapshot
    .queue
    .iter()
    .enumerate()
    .skip(offset)
    .take(visible)
    .map(|(idx, track)| {
      let marker = if idx == cursor { "›" } else { " " };
      let label = truncate(&track.title, width.saturating_sub(8));
      if idx == snapshot.current_index {
        Line::styled(
          format!("{} ◆ {}", marker, label),
          Style::default()
            .fg(highlight)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        )
      } else if snapshot.played_this_cycle(idx) {
        Line::styled(
          format!("{}{:3}. {}", marker, idx + 1, label),
          Style::default().fg(DIM).add_modifier(Modifier::DIM),
        )
      } else {
        let style = if idx == cursor {
          Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
          Style::default().fg(Color::Gray)
        };
        Line::styled(format!("{}{:3}. {}", marker, idx + 1, label), style)
      }
    })
    .collect();

  if total > visible {
    let end = (offset + visible).min(total);
    lines.push(
      Line::styled(
        format!("{}–{}/{} ", offset + 1, end, total),
        Style::default().fg(DIM),
      )
      .right_aligned(),
    );
  }
  frame.render_widget(Paragraph::new(lines), inner);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, view: View) {
  let keys: &[(&str, &str)] = match view {
    View::Player => &[
      ("Q", "quit"),
      ("P", "pause"),
      ("N", "next"),
      ("B", "back"),
      ("S", "shuffle"),
      ("L", "loop"),
      ("M", "mute"),
      ("↑↓", "vol"),
      ("←→", "seek"),
      ("TAB", "queue"),
    ],
    View::Queue => &[("TAB", "player"), ("↑↓", "scroll"), ("↵", "play"), ("Q", "quit")],
  };

  let mut spans = Vec::new();
  for (i, (key, action)) in keys.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" ┃ ", Style::default().fg(ACCENT)));
    }
    spans.push(Span::styled(
      format!(" {} ", key),
      Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled(format!("· {}", action), Style::default().fg(DIM)));
  }

  frame.render_widget(
    Paragraph::new(Line::from(spans).centered()).block(
      Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(ACCENT)),
    ),
    area,
  );
}

/// First visible row so that `cursor` stays on screen.
fn scroll_offset(cursor: usize, total: usize, visible: usize) -> usize {
  if visible == 0 || total <= visible {
    return 0;
  }
  let max_offset = total - visible;
  cursor.saturating_sub(visible - 1).min(max_offset)
}

fn format_time(seconds: Option<f64>) -> String {
  match seconds {
    Some(s) if s.is_finite() && s >= 0.0 => {
      let s = s as u64;
      format!("{:02}:{:02}", s / 60, s % 60)
    }
    _ => "--:--".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::Track;
  use ratatui::backend::TestBackend;
  use std::sync::Arc;

  fn draw(snapshot: &Snapshot, art: &ArtState, cursor: usize) -> String {
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
    terminal
      .draw(|frame| render(frame, snapshot, art, cursor, 0))
      .unwrap();
    terminal
      .backend()
      .buffer()
      .content()
      .iter()
      .map(|cell| cell.symbol())
      .collect()
  }

  fn playing() -> Snapshot {
    Snapshot {
      phase: LoopPhase::Playing,
      queue: Arc::new(vec![
        Track::new("First Song", "a"),
        Track::new("Second Song", "b"),
      ]),
      volume: 70,
      position: Some(65.0),
      duration: Some(200.0),
      status_message: Some("♪  70%".to_string()),
      ..Snapshot::default()
    }
  }

  #[test]
  fn test_player_view_shows_track_and_progress() {
    let screen = draw(&playing(), &ArtState::default(), 0);
    assert!(screen.contains("First Song"));
    assert!(screen.contains("01/02"));
    assert!(screen.contains("01:05"));
    assert!(screen.contains("PLAYING"));
    assert!(screen.contains("VINYL"));
  }

  #[test]
  fn test_unknown_position_shows_buffering() {
    let mut snapshot = playing();
    snapshot.position = None;
    let screen = draw(&snapshot, &ArtState::default(), 0);
    assert!(screen.contains("buffering"));
  }

  #[test]
  fn test_queue_view_lists_tracks() {
    let mut snapshot = playing();
    snapshot.view = View::Queue;
    let screen = draw(&snapshot, &ArtState::default(), 1);
    assert!(screen.contains("Q U E U E"));
    assert!(screen.contains("Second Song"));
    assert!(screen.contains("play"));
  }

  #[test]
  fn test_art_renders_half_blocks() {
    let art = ArtState {
      pixels: Some(vec![[255, 0, 0]; 16]),
      width: 4,
      height: 4,
      ..ArtState::default()
    };
    let lines = half_block_lines(&art);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].spans.len(), 4);
    assert_eq!(lines[0].spans[0].style.fg, Some(Color::Rgb(255, 0, 0)));
  }

  #[test]
  fn test_odd_art_height_keeps_last_row() {
    let mut pixels = vec![[10, 10, 10]; 6];
    pixels.extend([[0, 200, 0]; 3]);
    let art = ArtState {
      pixels: Some(pixels),
      width: 3,
      height: 3,
      ..ArtState::default()
    };
    let lines = half_block_lines(&art);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].spans.len(), 3);
    assert_eq!(lines[1].spans[0].style.fg, Some(Color::Rgb(0, 200, 0)));
    assert_eq!(lines[1].spans[0].style.bg, None);
  }

  #[test]
  fn test_small_terminal_shows_size_hint() {
    let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
    terminal
      .draw(|frame| render(frame, &playing(), &ArtState::default(), 0, 0))
      .unwrap();
    let screen: String = terminal
      .backend()
      .buffer()
      .content()
      .iter()
      .map(|cell| cell.symbol())
      .collect();
    assert!(screen.contains("Terminal too small (60×20). Need 82×24 minimum."));
    assert!(!screen.contains("First Song"));
  }

  #[test]
  fn test_large_art_does_not_overflow_layout() {
    let art = ArtState {
      pixels: Some(vec![[1, 2, 3]; 4]),
      width: 65_534,
      height: 2,
      ..ArtState::default()
    };
    let screen = draw(&playing(), &art, 0);
    assert!(screen.contains("A L B U M"));
  }

  #[test]
  fn test_scroll_keeps_cursor_visible() {
    assert_eq!(scroll_offset(0, 5, 10), 0);
    assert_eq!(scroll_offset(3, 50, 10), 0);
    assert_eq!(scroll_offset(9, 50, 10), 0);
    assert_eq!(scroll_offset(10, 50, 10), 1);
    assert_eq!(scroll_offset(49, 50, 10), 40);
  }

  #[test]
  fn test_format_time() {
    assert_eq!(format_time(Some(0.0)), "00:00");
    assert_eq!(format_time(Some(201.7)), "03:21");
    assert_eq!(format_time(None), "--:--");
  }
}
