use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::AppState;
use crate::gallery::view::card_lines;
use crate::gallery::{GalleryView, NoticeKind, Phase, ViewRow};
use crate::session::SessionStatus;

pub fn draw_app(
    frame: &mut Frame,
    view: &GalleryView,
    status: &SessionStatus,
    state: &AppState,
    list_state: &mut ListState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(vertical[0]);

    let rows = view.rows();
    let list_width = columns[0].width.saturating_sub(4) as usize;
    let mut items: Vec<ListItem> = rows
        .iter()
        .map(|row| ListItem::new(row_line(row, list_width)))
        .collect();
    if items.is_empty() {
        items.push(ListItem::new("Nothing to show yet."));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Gallery ({})", status.kind))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, columns[0], list_state);

    let detail = Paragraph::new(detail_text(rows.get(state.selected)))
        .block(Block::default().title("Details").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, columns[1]);
    frame.render_widget(detail, columns[1]);

    let status_paragraph =
        Paragraph::new(build_status_line(status, state)).style(Style::default().fg(Color::Gray));
    frame.render_widget(status_paragraph, vertical[1]);
}

fn row_line(row: &ViewRow<'_>, width: usize) -> Line<'static> {
    match row {
        ViewRow::Placeholder(notice) | ViewRow::Notice(notice) => {
            let style = match notice.kind {
                NoticeKind::Loading => Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::ITALIC),
                NoticeKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            };
            Line::from(Span::styled(fit_width(&notice.message, width), style))
        }
        ViewRow::Header(header) => {
            let label = format!("{}  {}", header.key, header.calorie_label());
            Line::from(Span::styled(
                fit_width(&label, width),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ))
        }
        ViewRow::Card(card) => {
            let label = format!("  {}  {}", card.captured_label, card.name);
            Line::from(Span::raw(fit_width(&label, width)))
        }
        ViewRow::Control(control) => {
            let style = if control.enabled {
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Line::from(Span::styled(fit_width(&format!("[ {} ]", control.label()), width), style))
        }
    }
}

fn detail_text(row: Option<&ViewRow<'_>>) -> Text<'static> {
    match row {
        Some(ViewRow::Card(card)) => {
            let mut lines = card_lines(card).into_iter();
            let mut out = Vec::new();
            if let Some(first) = lines.next() {
                out.push(Line::from(Span::styled(
                    first,
                    Style::default().add_modifier(Modifier::BOLD),
                )));
            }
            out.extend(lines.map(|line| Line::from(line.trim_start().to_string())));
            Text::from(out)
        }
        Some(ViewRow::Header(header)) => Text::from(vec![
            Line::from(Span::styled(
                header.key.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(header.calorie_label()),
        ]),
        Some(ViewRow::Control(_)) => Text::from("Press l, Enter or Space to load more."),
        Some(ViewRow::Placeholder(notice)) | Some(ViewRow::Notice(notice)) => {
            Text::from(notice.message.clone())
        }
        None => Text::from("Select an item to see its nutrition."),
    }
}

fn build_status_line(status: &SessionStatus, state: &AppState) -> Text<'static> {
    let phase_style = match status.phase {
        Phase::Loading => Style::default().fg(Color::Yellow),
        Phase::Exhausted => Style::default().fg(Color::Green),
        Phase::Idle => Style::default(),
    };
    let phase = if status.fetching {
        "fetching".to_string()
    } else {
        status.phase.to_string()
    };
    let reloaded = status
        .last_reload
        .map(format_time_short)
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::raw(format!("Source: {} ", status.kind)),
        Span::raw(" | Phase: "),
        Span::styled(phase, phase_style.add_modifier(Modifier::BOLD)),
        Span::raw(" | Shown: "),
        Span::styled(
            format!("{}/{}", status.rendered, status.total),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | Reloaded: {reloaded}")),
    ];
    if status.unresolved > 0 {
        spans.push(Span::styled(
            format!(" | Skipped: {}", status.unresolved),
            Style::default().fg(Color::Red),
        ));
    }

    let mut lines = vec![Line::from(spans)];
    if let Some(message) = state.status_message() {
        lines.push(Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(check) = &status.last_check {
        lines.push(Line::from(Span::styled(
            format!("Source: {check}"),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Keys: j/k move • g/G top/bottom • l/Enter load more • r refresh • q quit",
        Style::default().fg(Color::DarkGray),
    )));
    Text::from(lines)
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Cuts `text` to at most `width` terminal columns, marking the cut with an
/// ellipsis.
fn fit_width(text: &str, width: usize) -> String {
    if width == 0 || text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let w = grapheme.width();
        if used + w + 1 > width {
            break;
        }
        out.push_str(grapheme);
        used += w;
    }
    out.push('…');
    out
}
