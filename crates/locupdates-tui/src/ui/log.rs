//! Log screen: every record from the core and the app, newest at the bottom.

use crate::{app::App, event::LogEntry};
use log::Level;
use ratatui::{
    Frame,
    layout::{Margin, Rect},
    style::Stylize,
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Widget},
};
use std::iter;

/// Width of the `HH:MM:SS LEVEL ` header, so continuation lines line up.
const CONTINUATION_INDENT: &str = "               ";

/// Scroll position and filter of the log screen.
#[derive(Debug)]
pub struct LogState {
    /// First visible line.
    offset: usize,
    /// Keep the newest line in view as entries arrive.
    follow: bool,
    /// Most verbose level shown.
    max_level: Level,

    lines: usize,
    height: usize,
    scrollbar: ScrollbarState,
}

impl Default for LogState {
    fn default() -> Self {
        Self {
            offset: 0,
            follow: true,
            max_level: Level::Debug,

            lines: 0,
            height: 0,
            scrollbar: ScrollbarState::default(),
        }
    }
}

impl LogState {
    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn max_level(&self) -> Level {
        self.max_level
    }

    fn last_offset(&self) -> usize {
        self.lines.saturating_sub(self.height)
    }

    fn scroll_by(&mut self, delta: isize) {
        self.offset = self
            .offset
            .saturating_add_signed(delta)
            .min(self.last_offset());
        // reaching the end by scrolling down resumes following
        self.follow = delta > 0 && self.offset == self.last_offset();
    }

    pub fn scroll_up(&mut self) {
        self.scroll_by(-1);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_by(1);
    }

    pub fn page_up(&mut self) {
        self.scroll_by(-(self.height.max(1) as isize));
    }

    pub fn page_down(&mut self) {
        self.scroll_by(self.height.max(1) as isize);
    }

    pub fn to_top(&mut self) {
        self.offset = 0;
        self.follow = false;
    }

    pub fn to_bottom(&mut self) {
        self.offset = self.last_offset();
        self.follow = true;
    }

    pub fn toggle_follow(&mut self) {
        if self.follow {
            self.follow = false;
        } else {
            self.to_bottom();
        }
    }

    /// Cycles debug, info, warn, error, trace, then debug again.
    pub fn cycle_level(&mut self) {
        self.max_level = match self.max_level {
            Level::Debug => Level::Info,
            Level::Info => Level::Warn,
            Level::Warn => Level::Error,
            Level::Error => Level::Trace,
            Level::Trace => Level::Debug,
        };
        // the line count changes under the current offset
        self.follow = true;
    }

    /// Records the content and viewport size from the latest draw.
    fn set_extent(&mut self, lines: usize, height: usize) {
        self.lines = lines;
        self.height = height;
        self.offset = if self.follow {
            self.last_offset()
        } else {
            self.offset.min(self.last_offset())
        };
        self.scrollbar = ScrollbarState::new(self.last_offset()).position(self.offset);
    }
}

impl<'a> App<'a> {
    pub(super) fn render_log_screen(&mut self, frame: &mut Frame, area: Rect) {
        let max_level = self.log_state.max_level();
        let lines = self
            .messages
            .iter()
            .filter(|entry| entry.level <= max_level)
            .flat_map(entry_lines)
            .collect::<Vec<_>>();

        let title = Line::from(vec![
            " Log ".bold(),
            format!("(up to {}) ", max_level.as_str().to_lowercase()).dark_gray(),
        ]);
        let top_instructions = Line::from(vec![
            " Command ".into(),
            "<:>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);
        let bottom_instructions = Line::from(vec![
            if self.log_state.is_following() {
                " Stop Following ".into()
            } else {
                " Follow ".into()
            },
            "<f>".blue().bold(),
            " Level ".into(),
            "<v> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .border_set(border::THICK)
            .title(title.centered())
            .title_top(top_instructions.right_aligned())
            .title_bottom(bottom_instructions.right_aligned());

        let inner_area = block.inner(area);
        self.log_state
            .set_extent(lines.len(), inner_area.height as usize);

        let position = if self.log_state.is_following() {
            " … following ".blue().bold()
        } else if self.log_state.offset >= self.log_state.last_offset() {
            " … at end ".blue().bold()
        } else {
            " ↓ more below ".blue().bold()
        };
        let block = block.title_bottom(Line::from(position).left_aligned());

        let offset = u16::try_from(self.log_state.offset).unwrap_or(u16::MAX);
        Paragraph::new(lines)
            .block(block)
            .scroll((offset, 0))
            .render(area, frame.buffer_mut());

        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .track_symbol(None)
            .end_symbol(None);
        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut self.log_state.scrollbar,
        );
    }
}

/// A header line with time, level and subsystem, then one line per
/// embedded newline of the message.
fn entry_lines(entry: &LogEntry) -> impl Iterator<Item = Line<'_>> {
    let mut message = entry.message.lines();
    let first = message.next().unwrap_or_default();

    let mut header = vec![
        entry.at.format("%H:%M:%S ").to_string().dark_gray(),
        level_span(entry.level),
    ];
    if let Some(subsystem) = &entry.subsystem {
        header.push(format!("{subsystem} ").magenta());
    }
    header.push(Span::raw(first));

    iter::once(Line::from(header))
        .chain(message.map(|line| Line::from(vec![Span::raw(CONTINUATION_INDENT), Span::raw(line)])))
}

fn level_span(level: Level) -> Span<'static> {
    let label = format!("{:<5} ", level.as_str());
    match level {
        Level::Error => label.red().bold(),
        Level::Warn => label.yellow(),
        Level::Info => label.green(),
        Level::Debug => label.blue(),
        Level::Trace => label.dark_gray(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(lines: usize, height: usize) -> LogState {
        let mut state = LogState::default();
        state.set_extent(lines, height);
        state
    }

    #[test]
    fn follows_new_lines() {
        let mut state = state(30, 10);
        assert_eq!(state.offset, 20);

        state.set_extent(35, 10);
        assert_eq!(state.offset, 25);
    }

    #[test]
    fn scrolling_up_pins_the_view() {
        let mut state = state(30, 10);
        state.scroll_up();
        assert!(!state.is_following());
        assert_eq!(state.offset, 19);

        state.set_extent(40, 10);
        assert_eq!(state.offset, 19);
    }

    #[test]
    fn scrolling_down_to_the_end_resumes_following() {
        let mut state = state(30, 10);
        state.page_up();
        assert_eq!(state.offset, 10);

        state.page_down();
        assert_eq!(state.offset, 20);
        assert!(state.is_following());
    }

    #[test]
    fn level_cycle_wraps() {
        let mut state = LogState::default();
        for _ in 0..5 {
            state.cycle_level();
        }
        assert_eq!(state.max_level(), Level::Debug);
    }

    #[test]
    fn continuation_lines_are_indented() {
        let entry = LogEntry::new(Level::Error, "controller: failed\ncaused by: denied");
        let lines = entry_lines(&entry).collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].spans[0].content, CONTINUATION_INDENT);
    }
}
