use crate::app::AppSnapshot;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        MouseButton,
        MouseEvent,
        MouseEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use scratch_engine::{
    card::{
        Card,
        Cell,
        Prize,
    },
    claim::ClaimPhase,
    detector::Point,
    grid::{
        ROW_WIDTH,
        RowHighlight,
    },
    reveal::Phase,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};

/// Terminal columns per grid cell.
pub const CELL_COLS: u16 = 12;
/// Terminal rows per grid cell.
pub const CELL_ROWS: u16 = 3;
/// Logical surface pixels covered by one terminal column.
pub const PX_PER_COL: f32 = 8.0;
/// Logical surface pixels covered by one terminal row.
pub const PX_PER_ROW: f32 = 16.0;

pub enum UserEvent {
    Quit,
    Claim,
    RetryPersistence,
    NewCard,
    ScratchBegin(Point),
    ScratchMove(Point),
    ScratchEnd,
    Redraw,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    input: Option<mpsc::UnboundedReceiver<Event>>,
    card_area: Rect,
    grid_rows: u16,
    scratching: bool,
}

/// Logical surface size for a grid of `rows` card rows.
pub fn surface_size(rows: u16) -> (u32, u32) {
    let cols = CELL_COLS * ROW_WIDTH as u16;
    let lines = CELL_ROWS * rows;
    (
        (f32::from(cols) * PX_PER_COL) as u32,
        (f32::from(lines) * PX_PER_ROW) as u32,
    )
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    spawn_input(state);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

/// Reads crossterm events on a plain thread so the async loop never blocks
/// on the terminal.
fn spawn_input(state: &mut UiState) {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if sender.send(ev).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "terminal input failed");
                    break;
                }
            }
        }
    });
    state.input = Some(receiver);
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot<'_>) -> Result<()> {
    state.grid_rows = snap.card.map(card_rows).unwrap_or(0);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub async fn next_event(state: &mut UiState) -> Result<UserEvent> {
    loop {
        let input = state
            .input
            .as_mut()
            .ok_or_else(|| eyre!("terminal input is not running"))?;
        let ev = input
            .recv()
            .await
            .ok_or_else(|| eyre!("terminal input closed"))?;
        match ev {
            Event::Key(k) => {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let Mode::QuitModal = state.mode {
                    match k.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(UserEvent::Quit),
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            state.mode = Mode::Normal;
                            return Ok(UserEvent::Redraw);
                        }
                        _ => continue,
                    }
                }
                return Ok(match k.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        state.mode = Mode::QuitModal;
                        UserEvent::Redraw
                    }
                    KeyCode::Char('c') => UserEvent::Claim,
                    KeyCode::Char('r') => UserEvent::RetryPersistence,
                    KeyCode::Char('n') => UserEvent::NewCard,
                    _ => continue,
                });
            }
            Event::Mouse(mouse) => {
                if let Some(user) = state.mouse(mouse) {
                    return Ok(user);
                }
            }
            Event::Resize(..) => return Ok(UserEvent::Redraw),
            _ => {}
        }
    }
}

impl UiState {
    fn mouse(&mut self, mouse: MouseEvent) -> Option<UserEvent> {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let p = self.to_surface(mouse.column, mouse.row)?;
                self.scratching = true;
                Some(UserEvent::ScratchBegin(p))
            }
            MouseEventKind::Drag(MouseButton::Left) if self.scratching => {
                let p = self.to_surface(mouse.column, mouse.row)?;
                Some(UserEvent::ScratchMove(p))
            }
            MouseEventKind::Up(MouseButton::Left) if self.scratching => {
                self.scratching = false;
                Some(UserEvent::ScratchEnd)
            }
            _ => None,
        }
    }

    /// Centre of the terminal cell at (`column`, `row`) in surface pixels.
    fn to_surface(&self, column: u16, row: u16) -> Option<Point> {
        let area = self.card_area;
        if column < area.x || row < area.y || column >= area.right() || row >= area.bottom() {
            return None;
        }
        let x = f32::from(column - area.x) * PX_PER_COL + PX_PER_COL / 2.0;
        let y = f32::from(row - area.y) * PX_PER_ROW + PX_PER_ROW / 2.0;
        Some(Point::new(x, y))
    }
}

fn ui(f: &mut Frame, state: &mut UiState, snap: &AppSnapshot<'_>) {
    f.render_widget(Clear, f.area());
    let card_height = CELL_ROWS * state.grid_rows.max(1) + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),           // status
            Constraint::Length(card_height), // card
            Constraint::Min(4),              // events
            Constraint::Length(3),           // help
        ])
        .split(f.area());
    draw_status(f, chunks[0], snap);
    draw_card(f, state, chunks[1], snap);
    draw_events(f, chunks[2], snap);
    draw_help(f, chunks[3]);
    if let Mode::QuitModal = state.mode {
        draw_quit_modal(f);
    }
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot<'_>) {
    let card = match snap.card {
        Some(card) => format!("Card {} (token #{})", card.id, card.token_id),
        None => String::from("No card"),
    };
    let phase = snap
        .reveal
        .map(|reveal| phase_label(reveal.phase))
        .unwrap_or_else(|| String::from("-"));
    let claim = match &snap.claim {
        Some(session) if session.phase != ClaimPhase::Idle => {
            let hash = session
                .tx_hash
                .map(|h| format!(" {}", short_hash(&h.to_string())))
                .unwrap_or_default();
            format!("{:?}{hash}", session.phase)
        }
        _ => String::from("-"),
    };
    let lines = vec![
        Line::from(format!(
            "{card} | Scratched: {:.0}% | Wallet: {}",
            snap.percent_cleared,
            short_hash(&snap.claimer.to_string())
        )),
        Line::from(format!(
            "Reveal: {phase} | Claim: {claim} | Pending writes: {}",
            snap.pending_writes
        )),
    ];
    let status = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, area);
}

fn draw_card(f: &mut Frame, state: &mut UiState, area: Rect, snap: &AppSnapshot<'_>) {
    let block = Block::default().borders(Borders::ALL).title("Scratch card");
    let inner = block.inner(area);
    f.render_widget(&block, area);
    let Some(card) = snap.card else {
        state.card_area = Rect::default();
        return;
    };
    let width = (CELL_COLS * ROW_WIDTH as u16).min(inner.width);
    let height = (CELL_ROWS * state.grid_rows).min(inner.height);
    state.card_area = Rect::new(inner.x, inner.y, width, height);

    let mut lines = Vec::with_capacity(height as usize);
    for row in 0..height {
        let grid_row = (row / CELL_ROWS) as usize;
        let highlight = snap
            .highlights
            .get(grid_row)
            .copied()
            .unwrap_or(RowHighlight::Neutral);
        let style = match highlight {
            RowHighlight::Winning => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            RowHighlight::Dimmed => Style::default().fg(Color::DarkGray),
            RowHighlight::Neutral => Style::default(),
        };
        let mut spans = Vec::with_capacity(width as usize);
        for cell_col in 0..ROW_WIDTH {
            let index = grid_row * ROW_WIDTH + cell_col;
            let text = if row % CELL_ROWS == CELL_ROWS / 2 {
                card.cells
                    .get(index)
                    .map(|cell| fit(&cell_label(cell), CELL_COLS as usize))
                    .unwrap_or_default()
            } else {
                " ".repeat(CELL_COLS as usize)
            };
            let mut col = cell_col as u16 * CELL_COLS;
            for ch in text.chars() {
                if col >= width {
                    break;
                }
                let w = ch.width().unwrap_or(1).max(1);
                if !snap.revealed && snap.is_covered(col, row) {
                    spans.push(Span::styled("░".repeat(w), Style::default().fg(Color::Gray)));
                } else {
                    spans.push(Span::styled(ch.to_string(), style));
                }
                col += w as u16;
            }
        }
        lines.push(Line::from(spans));
    }
    f.render_widget(Paragraph::new(lines), state.card_area);
}

fn draw_events(f: &mut Frame, area: Rect, snap: &AppSnapshot<'_>) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = snap
        .log
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|entry| Line::from(entry.as_str()))
        .collect();
    let events = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Events"));
    f.render_widget(events, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new("drag: scratch | c: claim | r: retry persistence | n: new card | q: quit")
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, area);
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(30, 5, f.area());
    f.render_widget(Clear, area);
    let modal = Paragraph::new("Quit? (y/n)")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Confirm"));
    f.render_widget(modal, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn phase_label(phase: Phase) -> String {
    match phase {
        Phase::Covered => String::from("covered"),
        Phase::Revealing => String::from("revealing"),
        Phase::Revealed(outcome) => format!("revealed ({outcome:?})"),
        Phase::ClaimPending => String::from("claim pending"),
        Phase::Claimed => String::from("claimed"),
        Phase::Error(kind) => format!("{kind} error"),
    }
}

fn short_hash(hex: &str) -> String {
    if hex.len() <= 12 {
        return hex.to_string();
    }
    format!("{}..{}", &hex[..6], &hex[hex.len() - 4..])
}

fn cell_label(cell: &Cell) -> String {
    match (&cell.amount, &cell.friend) {
        (_, Some(friend)) => match &friend.username {
            Some(name) => format!("FREE @{name}"),
            None => format!("FREE #{}", friend.fid),
        },
        (Prize::FreeCard, None) => String::from("FREE"),
        (Prize::NoWin, None) => String::from("-"),
        (Prize::Tokens(amount), None) => format_amount(*amount),
    }
}

/// Six-decimal token amount as dollars.
fn format_amount(amount: u128) -> String {
    let whole = amount / 1_000_000;
    let cents = (amount % 1_000_000) / 10_000;
    format!("${whole}.{cents:02}")
}

/// Centres `label` in `width` columns, truncating by display width.
fn fit(label: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in label.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    let pad = width - out.width();
    let left = pad / 2;
    format!("{}{out}{}", " ".repeat(left), " ".repeat(pad - left))
}

pub fn card_rows(card: &Card) -> u16 {
    (card.cells.len() / ROW_WIDTH) as u16
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn fit__wide_glyphs__truncates_by_display_width() {
        assert_eq!(fit("$10.00", 8), " $10.00 ");
        assert_eq!(fit("FREE @サトシナカモト", 12).width(), 12);
    }

    #[test]
    fn format_amount__six_decimals__dollars_and_cents() {
        assert_eq!(format_amount(25_000_000), "$25.00");
        assert_eq!(format_amount(1_500_000), "$1.50");
    }

    #[test]
    fn to_surface__cell_inside_card__maps_to_cell_centre() {
        // given
        let state = UiState {
            card_area: Rect::new(1, 5, 36, 12),
            ..UiState::default()
        };

        // when
        let inside = state.to_surface(1, 5);
        let outside = state.to_surface(0, 5);

        // then
        assert_eq!(inside, Some(Point::new(4.0, 8.0)));
        assert_eq!(outside, None);
    }
}
