//! The app TUI.

pub mod log;

use crate::app::{App, AppMode, AppScreen, Attachment};
use locupdates::{
    model::{IndicatorAction, Sample},
    policy::{ReportingState, Visibility},
};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Stylize,
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Tabs, Widget},
};
use chrono::Utc;
use tui_widgets::prompts::{Prompt, TextPrompt};

impl<'a> App<'a> {
    // we're using this instead of Widget::render because we also need the
    // frame to use TextPrompt
    pub fn render(&mut self, frame: &mut Frame) {
        use Constraint::{Length, Min};

        let [header_area, inner_area] = {
            let show_command = self.mode == AppMode::Command;

            let mut constraints = vec![
                // header area
                Length(1),
                // inner area
                Min(0),
            ];
            if show_command {
                constraints.push(Length(3))
            }

            let areas = Layout::vertical(constraints).split(frame.area());

            if show_command {
                self.render_command(frame, areas[2]);
            }

            [areas[0], areas[1]]
        };

        let horizontal = Layout::horizontal([Min(0), Length(12), Length(17)]);
        let [tabs_area, state_area, title_area] = horizontal.areas(header_area);

        // tabs
        let selected_tab_index = match self.screen {
            AppScreen::Home => 0,
            AppScreen::Log => 1,
            AppScreen::Help => 2,
        };
        let titles = ["Home", "Log", "Help"]
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let key = if s == "Help" {
                    "?".blue().bold()
                } else {
                    (i + 1).to_string().blue().bold()
                };

                if i == selected_tab_index {
                    Line::from(vec!["[".blue().bold(), key, "] ".blue().bold(), s.into()])
                } else {
                    Line::from(vec!["<".blue().bold(), key, "> ".blue().bold(), s.into()])
                }
            })
            .collect::<Vec<_>>();
        Tabs::new(titles)
            .select(None)
            .padding("", "")
            .divider(" ")
            .render(tabs_area, frame.buffer_mut());

        // reporting state
        if let Some(model) = &self.model {
            reporting_span(model.reporting).render(state_area, frame.buffer_mut());
        }

        // title
        "locupdates TUI".bold().render(title_area, frame.buffer_mut());

        match self.screen {
            AppScreen::Home => {
                self.render_home_screen(frame, inner_area);
            }
            AppScreen::Log => {
                self.render_log_screen(frame, inner_area);
            }
            AppScreen::Help => {
                self.render_help_screen(frame, inner_area);
            }
        }
    }

    fn render_command(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().border_set(border::THICK);

        TextPrompt::from("Command")
            .with_block(block)
            .draw(frame, area, &mut self.command_state);
    }

    fn render_home_screen(&mut self, frame: &mut Frame, area: Rect) {
        use Constraint::{Length, Min, Percentage};

        let [top_area, samples_area] = Layout::vertical([Length(11), Min(0)]).areas(area);
        let [status_area, notification_area] =
            Layout::horizontal([Percentage(50), Percentage(50)]).areas(top_area);

        self.render_status(frame, status_area);
        self.render_notification(frame, notification_area);
        self.render_samples(frame, samples_area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let title = Line::from(" Service ".bold());
        let instructions = Line::from(vec![
            " Start ".into(),
            "<s>".blue().bold(),
            " Stop ".into(),
            "<x> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.right_aligned())
            .border_set(border::THICK);

        let Some(model) = &self.model else {
            Paragraph::new(Text::from("Waiting for controller..."))
                .block(block)
                .render(area, frame.buffer_mut());
            return;
        };

        let visibility = match model.visibility {
            Visibility::Attended => "attended".green(),
            Visibility::Unattended => "unattended".yellow(),
        };
        let permission = if self.provider.is_permission_granted() {
            "granted".green()
        } else {
            "denied".red()
        };
        let foreground = if self.foreground {
            "foreground".yellow()
        } else if self.termination_requested {
            "may terminate".dark_gray()
        } else {
            "background".into()
        };
        let last_location = model
            .last_location
            .as_ref()
            .map(format_sample)
            .unwrap_or_else(|| "unknown".to_string());

        let lines = vec![
            Line::from(vec!["Reporting: ".into(), reporting_span(model.reporting)]),
            Line::from(vec!["Visibility: ".into(), visibility]),
            Line::from(vec![
                "Attachments: ".into(),
                model.attachments.to_string().yellow(),
                if model.reconfiguring {
                    " (reconfiguring)".magenta()
                } else {
                    "".into()
                },
            ]),
            Line::from(vec!["Process: ".into(), foreground]),
            Line::from(vec!["Permission: ".into(), permission]),
            Line::from(vec![
                "Samples: ".into(),
                model.samples_received.to_string().yellow(),
            ]),
            Line::from(vec!["Last: ".into(), last_location.yellow()]),
        ];

        Paragraph::new(lines)
            .block(block)
            .render(area, frame.buffer_mut());
    }

    fn render_notification(&self, frame: &mut Frame, area: Rect) {
        let title = Line::from(" Notification ".bold());
        let block = Block::bordered()
            .title(title.centered())
            .border_set(border::THICK);

        let Some(content) = &self.indicator else {
            Paragraph::new(Text::from("No notification".dark_gray()))
                .block(block)
                .render(area, frame.buffer_mut());
            return;
        };

        let actions = content
            .actions
            .iter()
            .flat_map(|action| {
                let (label, command) = match action {
                    IndicatorAction::ReturnToApp => ("Launch activity", ":tap app"),
                    IndicatorAction::StopReporting => ("Remove location updates", ":tap stop"),
                };
                vec![
                    Span::from("[").blue(),
                    Span::from(label),
                    Span::from("] ").blue(),
                    Span::from(command).dark_gray(),
                    Span::from("  "),
                ]
            })
            .collect::<Vec<_>>();

        let lines = vec![
            Line::from(content.title.clone().bold()),
            Line::from(content.text.clone()),
            Line::from(""),
            Line::from(actions),
        ];

        Paragraph::new(lines)
            .block(block)
            .render(area, frame.buffer_mut());
    }

    fn render_samples(&self, frame: &mut Frame, area: Rect) {
        let title = Line::from(" Activity ".bold());
        let instructions = Line::from(vec![
            match self.attachment {
                Attachment::Attached(_) => " Detach ".into(),
                Attachment::Detached | Attachment::Pending => " Attach ".into(),
            },
            "<a>".blue().bold(),
            " Rotate ".into(),
            "<r> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.right_aligned())
            .border_set(border::THICK);

        let Some(id) = self.attachment.id() else {
            let status = if self.attachment == Attachment::Pending {
                "Attaching...".dark_gray()
            } else {
                "Not attached.".dark_gray()
            };
            Paragraph::new(Text::from(vec![
                Line::from(status),
                Line::from(vec![
                    "Attach with ".into(),
                    "<a>".blue(),
                    " to receive samples here.".into(),
                ]),
            ]))
            .block(block)
            .render(area, frame.buffer_mut());
            return;
        };

        let now_millis = Utc::now().timestamp_millis().max(0) as u64;

        let inner_height = block.inner(area).height as usize;
        let mut lines = vec![Line::from(vec![
            "Attached as ".into(),
            id.to_string().yellow(),
            ", ".into(),
            self.received.len().to_string().yellow(),
            " sample(s) received".into(),
        ])];

        // newest first
        lines.extend(
            self.received
                .iter()
                .rev()
                .take(inner_height.saturating_sub(1))
                .map(|sample| {
                    let age_secs = now_millis.saturating_sub(sample.timestamp_millis) / 1000;
                    Line::from(vec![
                        " - ".into(),
                        format_sample(sample).blue(),
                        format!(" {age_secs}s ago").dark_gray(),
                    ])
                }),
        );

        Paragraph::new(lines)
            .block(block)
            .render(area, frame.buffer_mut());
    }

    fn render_help_screen(&mut self, frame: &mut Frame, area: Rect) {
        let title = Line::from(" Help ".bold());
        let instructions = Line::from(vec![
            " Command ".into(),
            "<:>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_top(instructions.right_aligned())
            .border_set(border::THICK);

        let command = |name: &'static str, description: &'static str| {
            Line::from(vec![" - ".into(), name.blue(), " ".into(), description.into()])
        };

        let lines = vec![
            Line::from("Navigation".bold()),
            Line::from(vec![
                " - ".into(),
                "<1>".blue(),
                " and ".into(),
                "<2>".blue(),
                " to change screens.".into(),
            ]),
            Line::from(vec![
                " - ".into(),
                "<:>".blue(),
                " to open the command prompt.".into(),
            ]),
            Line::from(vec![
                " - ".into(),
                "<q>".blue(),
                " or ".into(),
                "<ctrl + c>".blue(),
                " to quit.".into(),
            ]),
            Line::from(""),
            Line::from("Commands".bold()),
            command(":start", "request location updates"),
            command(":stop", "remove location updates"),
            command(":attach / :detach", "bind or unbind the activity"),
            command(":rotate", "recreate the activity without leaving it"),
            command(":deny / :grant", "revoke or grant location permission"),
            command(":tap stop / :tap app", "press a notification action"),
            command(":last", "log the last known location"),
            command(":clear", "clear received samples"),
            Line::from(""),
            Line::from("Log screen".bold()),
            Line::from(vec![
                " - ".into(),
                "<f>".blue(),
                " to follow new entries, ".into(),
                "<v>".blue(),
                " to change the level shown.".into(),
            ]),
        ];

        Paragraph::new(lines)
            .block(block)
            .render(area, frame.buffer_mut());
    }
}

fn reporting_span(reporting: ReportingState) -> Span<'static> {
    match reporting {
        ReportingState::Active => "● reporting".green().bold(),
        ReportingState::Inactive => "○ idle".dark_gray(),
    }
}

fn format_sample(sample: &Sample) -> String {
    format!(
        "({:.6}, {:.6}) ±{:.0}m",
        sample.latitude, sample.longitude, sample.accuracy_meters
    )
}
