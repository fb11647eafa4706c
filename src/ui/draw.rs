use anyhow::Result;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use ratatui_image::{Resize, StatefulImage};

use crate::config::RgbColor;
use crate::photo;
use crate::record::ProfileRecord;

use super::app::{App, Focus};
use super::panes::Panel;

const LIST_HELP: &str = "j/k: nav  Enter: open  /: search  F5: refresh  q: quit";
const SEARCH_HELP: &str = "Type to filter  Tab: other box  Esc: back to list";
const OVERLAY_HELP: &str = "j/k: scroll  Esc/q: close";

pub fn render<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    terminal.draw(|frame| draw_frame(frame, app))?;
    Ok(())
}

fn draw_frame(frame: &mut Frame<'_>, app: &mut App) {
    let size = frame.area();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    draw_header(frame, layout[0], app);
    draw_search_row(frame, layout[1], app);
    draw_body(frame, layout[2], app);
    draw_footer(frame, layout[3], app);
    draw_overlay(frame, size, app);
}

fn color(c: RgbColor) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

fn accent_style(app: &App) -> Style {
    Style::default()
        .fg(color(app.config().ui.accent))
        .add_modifier(Modifier::BOLD)
}

fn border_style(app: &App, active: bool) -> Style {
    let colors = &app.config().ui.colors;
    if active {
        Style::default()
            .fg(color(colors.border))
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(color(colors.border))
    }
}

fn selection_style(app: &App) -> Style {
    let colors = &app.config().ui.colors;
    Style::default()
        .fg(color(colors.selection_fg))
        .bg(color(colors.selection_bg))
        .add_modifier(Modifier::BOLD)
}

fn draw_header(frame: &mut Frame<'_>, area: Rect, app: &App) {
    if area.height == 0 {
        return;
    }
    let roster = &app.config().roster;
    let mut lines = vec![Line::from(Span::styled(
        roster.page_title.clone(),
        accent_style(app),
    ))];
    if area.height > 1 {
        lines.push(Line::from(Span::styled(
            roster.page_subtitle.clone(),
            Style::default().add_modifier(Modifier::DIM),
        )));
    }
    frame.render_widget(Paragraph::new(lines), area);

    if app.loading {
        let label = "Loading profiles...";
        let width = label.len() as u16;
        if area.width > width {
            let right = Rect {
                x: area.x + area.width - width,
                y: area.y,
                width,
                height: 1,
            };
            frame.render_widget(
                Paragraph::new(Span::styled(label, accent_style(app))),
                right,
            );
        }
    }
}

fn draw_search_row(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    draw_search_box(frame, chunks[0], app, Focus::NameInput, "Search by name");
    draw_search_box(frame, chunks[1], app, Focus::RoleInput, "Search by role/title");
}

fn draw_search_box(frame: &mut Frame<'_>, area: Rect, app: &App, slot: Focus, placeholder: &str) {
    let active = app.focus == slot;
    let input = match slot {
        Focus::NameInput => &app.name_input,
        _ => &app.role_input,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app, active))
        .title(Panel::Search.title());
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let value = input.value();
    let content = if value.is_empty() && !active {
        Span::styled(placeholder.to_string(), Style::default().add_modifier(Modifier::DIM))
    } else {
        Span::raw(value.to_string())
    };
    frame.render_widget(Paragraph::new(Line::from(content)), inner);

    if active {
        let x = inner.x.saturating_add(input.visual_cursor() as u16);
        frame.set_cursor_position((x.min(inner.x + inner.width.saturating_sub(1)), inner.y));
    }
}

fn draw_body(frame: &mut Frame<'_>, area: Rect, app: &mut App) {
    let image_width = app.config().ui.pane.image.width.min(area.width);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(image_width)])
        .split(area);

    draw_cards(frame, chunks[0], app);
    draw_photo_pane(frame, chunks[1], app);
}

fn draw_cards(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let active = app.focus == Focus::List && app.overlay.is_none();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app, active))
        .title(Panel::Cards.title());
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    // Primary-read failure: visible error, no partial list.
    if let Some(error) = &app.load_error {
        let message = Paragraph::new(Line::from(Span::styled(
            format!("Load failed: {error}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )))
        .wrap(Wrap { trim: true });
        frame.render_widget(message, inner);
        return;
    }

    if app.loading && app.profiles.is_empty() {
        render_centered_words(frame, inner, "Loading profiles...");
        return;
    }

    let items: Vec<ListItem> = if app.visible.is_empty() {
        vec![ListItem::new(Line::from("No profiles"))]
    } else {
        app.visible
            .iter()
            .filter_map(|&idx| app.profiles.get(idx))
            .map(|record| {
                let badge = photo::initials(&record.name);
                let mut spans = vec![
                    Span::styled(format!("{badge:<2} "), accent_style(app)),
                    Span::styled(
                        record.name.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ];
                if !record.role.is_empty() {
                    spans.push(Span::raw("  "));
                    spans.push(Span::styled(
                        record.role.clone(),
                        Style::default().add_modifier(Modifier::DIM),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect()
    };

    let mut state = ListState::default();
    if !app.visible.is_empty() {
        state.select(Some(app.selected));
    }

    let list = List::new(items)
        .highlight_style(selection_style(app))
        .highlight_symbol(" ")
        .repeat_highlight_symbol(false);

    frame.render_stateful_widget(list, inner, &mut state);
}

fn draw_photo_pane(frame: &mut Frame<'_>, area: Rect, app: &mut App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app, false))
        .title(Panel::Image.title());
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    frame.render_widget(Clear, inner);

    let placeholder = app.avatar.placeholder.clone();
    if let Some(state) = app.avatar_image_state() {
        let widget = StatefulImage::new(None).resize(Resize::Fit(None));
        frame.render_stateful_widget(widget, inner, state);
        return;
    }

    match placeholder {
        Some(glyph) if !glyph.is_empty() => render_initials(frame, inner, app, &glyph),
        Some(_) => render_centered_words(frame, inner, "NO IMAGE AVAILABLE"),
        None => {
            if app.current_record().is_some() {
                render_centered_words(frame, inner, "FETCHING...");
            }
        }
    }
}

/// Placeholder glyph: the initials, centered and emphasized.
fn render_initials(frame: &mut Frame<'_>, area: Rect, app: &App, glyph: &str) {
    let y = area.y + area.height / 2;
    let row = Rect {
        x: area.x,
        y,
        width: area.width,
        height: 1,
    };
    let line = Line::from(Span::styled(
        glyph.to_string(),
        accent_style(app).add_modifier(Modifier::REVERSED),
    ));
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), row);
}

fn render_centered_words(frame: &mut Frame<'_>, area: Rect, words: &str) {
    let y = area.y + area.height / 2;
    let row = Rect {
        x: area.x,
        y,
        width: area.width,
        height: 1,
    };
    let line = Line::from(Span::styled(
        words.to_string(),
        Style::default().add_modifier(Modifier::DIM),
    ));
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), row);
}

fn draw_footer(frame: &mut Frame<'_>, area: Rect, app: &App) {
    if area.height == 0 {
        return;
    }
    let colors = &app.config().ui.colors;
    let style = Style::default()
        .fg(color(colors.status_fg))
        .bg(color(colors.status_bg));

    let help = if app.overlay.is_some() {
        OVERLAY_HELP
    } else if matches!(app.focus, Focus::NameInput | Focus::RoleInput) {
        SEARCH_HELP
    } else {
        LIST_HELP
    };

    let text = match &app.status {
        Some(status) => format!("{status}   {help}"),
        None => help.to_string(),
    };
    frame.render_widget(Paragraph::new(Span::styled(text, style)), area);
}

// =============================================================================
// Detail overlay
// =============================================================================

fn draw_overlay(frame: &mut Frame<'_>, area: Rect, app: &mut App) {
    if app.overlay.is_none() {
        return;
    }
    let Some(record) = app.overlay_record().cloned() else {
        return;
    };

    let modal_area = centered_rect(area, 80, 80);
    frame.render_widget(Clear, modal_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app, true))
        .title(Span::styled(record.name.clone(), accent_style(app)))
        .title_bottom(Line::from(OVERLAY_HELP).alignment(Alignment::Center));
    let inner = block.inner(modal_area);
    frame.render_widget(block, modal_area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(inner);

    draw_overlay_card(frame, columns[0], app, &record);
    draw_overlay_body(frame, columns[1], app);
}

fn draw_overlay_card(frame: &mut Frame<'_>, area: Rect, app: &mut App, record: &ProfileRecord) {
    // Portrait photo on top, meta below.
    let photo_height = area.height.saturating_sub(7).max(3).min(area.height);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(photo_height), Constraint::Min(0)])
        .split(area);

    let placeholder = app.portrait.placeholder.clone();
    if let Some(state) = app.portrait_image_state() {
        let widget = StatefulImage::new(None).resize(Resize::Fit(None));
        frame.render_stateful_widget(widget, chunks[0], state);
    } else if let Some(glyph) = placeholder.filter(|g| !g.is_empty()) {
        render_initials(frame, chunks[0], app, &glyph);
    } else {
        render_centered_words(frame, chunks[0], "FETCHING...");
    }

    let mut lines: Vec<Line> = Vec::new();
    if !record.role.is_empty() {
        lines.push(Line::from(Span::styled(
            record.role.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
    }
    if let Some(hire_date) = &record.hire_date {
        lines.push(Line::from(format!("Hire Date: {hire_date}")));
    }
    if let Some(birthday) = &record.birthday {
        lines.push(Line::from(format!("Birthday: {birthday}")));
    }
    if let Some(url) = &record.company_url {
        lines.push(Line::from(format!("Company: {url}")));
    }
    if let Some(url) = &record.linked_in_url {
        lines.push(Line::from(format!("LinkedIn: {url}")));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[1]);
}

fn draw_overlay_body(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let Some(overlay) = &app.overlay else {
        return;
    };
    let lines: Vec<Line> = overlay
        .body_lines
        .iter()
        .skip(overlay.scroll)
        .map(|line| Line::from(line.clone()))
        .collect();
    let body = if lines.is_empty() {
        Paragraph::new(Line::from(Span::styled(
            "No details",
            Style::default().add_modifier(Modifier::DIM),
        )))
    } else {
        Paragraph::new(lines).wrap(Wrap { trim: false })
    };
    frame.render_widget(body, area);
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}
