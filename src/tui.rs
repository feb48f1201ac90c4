use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;

use ffbatch::core::error::FfbError;
use ffbatch::core::event::{classify_log_line, LineBuffer, LogLevel, PipelineUpdate, StreamKind};
use ffbatch::core::formatter::{format_progress_reading, format_step_counter};
use ffbatch::core::pipeline::{Pipeline, StepPlan};
use ffbatch::core::progress::ProgressReading;

use crate::app::{pipeline_result, Frontend};

const TICK: Duration = Duration::from_millis(50);
const DIVIDER_MARKER: &str = "<divider>";

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, FfbError> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Killed,
}

impl RunStatus {
    fn label(self) -> &'static str {
        match self {
            RunStatus::Idle => "Idle",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Killed => "Killed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Kill,
    Quit,
    Ignored,
}

#[derive(Debug)]
struct AppState {
    title: String,
    history: Vec<String>,
    status: RunStatus,
    step: Option<usize>,
    total_steps: Option<usize>,
    program: Option<String>,
    reading: Option<ProgressReading>,
    stderr_lines: LineBuffer,
    scroll_offset: usize,
    view_lines: usize,
    tick: u64,
}

impl AppState {
    fn new() -> Self {
        Self {
            title: "ffbatch".to_string(),
            history: Vec::new(),
            status: RunStatus::Idle,
            step: None,
            total_steps: None,
            program: None,
            reading: None,
            stderr_lines: LineBuffer::default(),
            scroll_offset: 0,
            view_lines: 1,
            tick: 0,
        }
    }

    fn begin(&mut self, title: &str, total_steps: Option<usize>) {
        if !self.history.is_empty() {
            self.push_history(DIVIDER_MARKER);
        }
        self.title = title.to_string();
        self.status = RunStatus::Running;
        self.step = None;
        self.total_steps = total_steps;
        self.program = None;
        self.reading = None;
    }

    /// The header keeps naming the last program once its step has ended.
    fn track_program(&mut self, active: Option<&str>) {
        if let Some(program) = active {
            if self.program.as_deref() != Some(program) {
                self.program = Some(program.to_string());
            }
        }
    }

    fn apply(&mut self, update: &PipelineUpdate) {
        match update {
            PipelineUpdate::StepStarted {
                index,
                command_line,
                ..
            } => {
                self.step = Some(*index);
                self.reading = None;
                self.stderr_lines = LineBuffer::default();
                self.push_history(format!(">> {command_line}"));
            }
            PipelineUpdate::StepRunning { .. } => {}
            PipelineUpdate::Output {
                stream: StreamKind::Stderr,
                text,
                ..
            } => {
                for line in self.stderr_lines.push(text) {
                    if classify_log_line(&line) != LogLevel::Progress {
                        self.push_history(line);
                    }
                }
            }
            PipelineUpdate::Output { .. } => {}
            PipelineUpdate::Progress { reading, .. } => self.reading = Some(reading.clone()),
            PipelineUpdate::StepCompleted { .. } => {
                if let Some(rest) = self.stderr_lines.flush() {
                    self.push_history(rest);
                }
            }
            PipelineUpdate::Completed => {
                self.status = RunStatus::Completed;
                self.push_history(format!("{} finished", self.title));
            }
            PipelineUpdate::Failed { index, reason, .. } => {
                self.status = RunStatus::Failed;
                self.push_history(format!("step {} failed:", index + 1));
                for line in reason.lines() {
                    self.push_history(format!("  {line}"));
                }
            }
            PipelineUpdate::Killed { index } => {
                self.status = RunStatus::Killed;
                self.push_history(format!("killed at step {}", index + 1));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        let running = self.status == RunStatus::Running;
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if running {
                    KeyAction::Kill
                } else {
                    KeyAction::Quit
                }
            }
            KeyCode::Char('k') if running => KeyAction::Kill,
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter if !running => KeyAction::Quit,
            KeyCode::PageUp => {
                self.scroll_up(self.view_lines.saturating_sub(1).max(1));
                KeyAction::Ignored
            }
            KeyCode::PageDown => {
                self.scroll_down(self.view_lines.saturating_sub(1).max(1));
                KeyAction::Ignored
            }
            KeyCode::Up => {
                self.scroll_up(1);
                KeyAction::Ignored
            }
            KeyCode::Down => {
                self.scroll_down(1);
                KeyAction::Ignored
            }
            KeyCode::Home => {
                self.scroll_top();
                KeyAction::Ignored
            }
            KeyCode::End => {
                self.scroll_bottom();
                KeyAction::Ignored
            }
            _ => KeyAction::Ignored,
        }
    }

    fn push_history(&mut self, line: impl Into<String>) {
        const MAX_LINES: usize = 500;
        if self.history.len() >= MAX_LINES {
            let drain_count = self.history.len().saturating_sub(MAX_LINES - 1);
            self.history.drain(0..drain_count);
        }
        self.history.push(line.into());
        self.clamp_scroll();
    }

    fn set_view_lines(&mut self, lines: usize) {
        self.view_lines = lines.max(1);
        self.clamp_scroll();
    }

    fn scroll_up(&mut self, lines: usize) {
        let max_scroll = self.max_scroll();
        self.scroll_offset = (self.scroll_offset + lines).min(max_scroll);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    fn scroll_top(&mut self) {
        self.scroll_offset = self.max_scroll();
    }

    fn scroll_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    fn max_scroll(&self) -> usize {
        self.history.len().saturating_sub(self.view_lines)
    }

    fn clamp_scroll(&mut self) {
        let max_scroll = self.max_scroll();
        if self.scroll_offset > max_scroll {
            self.scroll_offset = max_scroll;
        }
    }
}

/// Full-screen view of a running pipeline. Restores the terminal on drop.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    app: AppState,
    _guard: TerminalGuard,
}

impl Tui {
    pub fn enter() -> Result<Self, FfbError> {
        let guard = TerminalGuard::enter()?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Self {
            terminal,
            app: AppState::new(),
            _guard: guard,
        })
    }

    fn draw(&mut self) -> Result<(), FfbError> {
        let size = self.terminal.size()?;
        let history_height = size.height.saturating_sub(4).max(3) as usize;
        self.app.set_view_lines(history_height.saturating_sub(2).max(1));
        self.app.tick = self.app.tick.wrapping_add(1);

        let app = &self.app;
        self.terminal.draw(|frame| {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(4), Constraint::Min(3)])
                .split(frame.size());

            frame.render_widget(render_header(app, layout[0].width as usize), layout[0]);
            frame.render_widget(
                render_history(app, layout[1].height as usize, layout[1].width as usize),
                layout[1],
            );
        })?;
        Ok(())
    }

    fn next_key(&mut self) -> Result<Option<KeyEvent>, FfbError> {
        if !event::poll(TICK)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
            _ => Ok(None),
        }
    }
}

impl Frontend for Tui {
    fn drive<P: StepPlan>(
        &mut self,
        title: &str,
        pipeline: &mut Pipeline<P>,
    ) -> Result<(), FfbError> {
        self.app.begin(title, pipeline.plan().step_count_hint());
        let mut last_step = 0;
        let mut failure: Option<String> = None;
        let mut updates = pipeline.start();

        loop {
            for update in updates.drain(..) {
                match &update {
                    PipelineUpdate::StepStarted { index, .. } => last_step = *index,
                    PipelineUpdate::Failed { reason, .. } => failure = Some(reason.clone()),
                    _ => {}
                }
                self.app.apply(&update);
            }
            self.app.track_program(pipeline.active_program());

            if let Some(result) = pipeline_result(pipeline.state(), last_step, failure.as_deref()) {
                self.draw()?;
                return result;
            }

            if pipeline.is_awaiting_advance() {
                updates = pipeline.advance_requested();
                continue;
            }

            self.draw()?;
            if let Some(key) = self.next_key()? {
                if self.app.handle_key(key) == KeyAction::Kill {
                    updates = pipeline.kill();
                    continue;
                }
            }
            updates = pipeline.poll();
        }
    }

    fn notice(&mut self, line: &str) {
        self.app.push_history(line);
    }

    /// Keeps the final screen up until the user closes it.
    fn finish(&mut self) -> Result<(), FfbError> {
        if self.app.status == RunStatus::Running {
            self.app.status = RunStatus::Completed;
        }
        self.app.push_history("press q, Esc or Enter to close");
        loop {
            self.draw()?;
            if let Some(key) = self.next_key()? {
                if self.app.handle_key(key) == KeyAction::Quit {
                    return Ok(());
                }
            }
        }
    }
}

fn render_header(app: &AppState, width: usize) -> Paragraph<'static> {
    let step = match app.step {
        Some(index) => format!("step {}", format_step_counter(index, app.total_steps)),
        None => "step -".to_string(),
    };
    let program = app.program.clone().unwrap_or_default();
    let progress = match &app.reading {
        Some(reading) => format_progress_reading(reading),
        None => String::new(),
    };

    let bar_width = width.saturating_sub(60).clamp(10, 40);
    let progress_bar = render_progress_bar(app, bar_width);

    let text = vec![
        Line::from(vec![
            Span::raw("Status: "),
            Span::raw(app.status.label()),
            Span::raw("  "),
            Span::raw(step),
            Span::raw("  "),
            Span::raw(program),
        ]),
        Line::from(vec![Span::raw(progress_bar), Span::raw(" "), Span::raw(progress)]),
    ];

    Paragraph::new(text)
        .block(Block::default().title(app.title.clone()).borders(Borders::ALL))
        .wrap(Wrap { trim: true })
}

fn render_progress_bar(app: &AppState, width: usize) -> String {
    let width = width.max(10);
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');

    if app.status == RunStatus::Completed {
        bar.push_str(&"=".repeat(width));
        bar.push(']');
        return bar;
    }

    if app.status != RunStatus::Running {
        bar.push_str(&" ".repeat(width));
        bar.push(']');
        return bar;
    }

    if let Some(reading) = &app.reading {
        let filled = ((reading.fraction * width as f64).round() as usize).min(width);
        for idx in 0..width {
            if idx < filled {
                bar.push('=');
            } else if idx == filled {
                bar.push('>');
            } else {
                bar.push(' ');
            }
        }
        bar.push(']');
        return bar;
    }

    // No progress axis: the marker moves with the tick.
    let pos = (app.tick as usize) % width;
    for idx in 0..width {
        if idx == pos {
            bar.push('>');
        } else if idx < pos {
            bar.push('=');
        } else {
            bar.push(' ');
        }
    }
    bar.push(']');
    bar
}

fn render_history(app: &AppState, height: usize, width: usize) -> Paragraph<'static> {
    let max_lines = height.saturating_sub(2).max(1);
    let end = app.history.len().saturating_sub(app.scroll_offset);
    let start = end.saturating_sub(max_lines);
    let divider = "─".repeat(width.saturating_sub(2).max(1));
    let lines: Vec<Line> = app.history[start..end]
        .iter()
        .map(|line| {
            if line == DIVIDER_MARKER {
                Line::from(Span::raw(divider.clone()))
            } else {
                Line::from(line.clone())
            }
        })
        .collect();

    Paragraph::new(lines)
        .block(Block::default().title("Session").borders(Borders::ALL))
        .wrap(Wrap { trim: false })
}
