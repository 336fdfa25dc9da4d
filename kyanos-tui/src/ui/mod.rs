/*!
 * KYANOS TUI Interface
 * Adapter header, device lists and the pairing prompt
 */

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use kyanos_core::device::BatteryCategory;
use kyanos_core::{Device, DeviceKind, Focus};

use crate::app::App;

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);
const YELLOW: Color = Color::Rgb(218, 165, 32);
const RED: Color = Color::Rgb(220, 20, 60);

pub fn render_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Adapter
            Constraint::Min(6),    // Device lists
            Constraint::Length(3), // Status
            Constraint::Length(1), // Key help
        ])
        .split(f.area());

    let lists = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    render_adapter_header(f, chunks[0], app);
    render_device_list(f, lists[0], app, Focus::Available);
    render_device_list(f, lists[1], app, Focus::Connected);
    render_status(f, chunks[2], app);
    render_help(f, chunks[3], app);

    if let Some(exchange) = &app.pending {
        render_pairing_prompt(f, app, &exchange.device, &exchange.passkey_digits());
    } else if app.alias_input.is_some() {
        render_alias_editor(f, app);
    }
}

fn render_adapter_header(f: &mut Frame, area: Rect, app: &App) {
    let content = match &app.adapter {
        Some(adapter) => Line::from(vec![
            Span::styled(
                adapter.display_name().to_string(),
                Style::default().fg(WHITE).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", adapter.address), Style::default().fg(GRAY)),
            Span::raw("  "),
            flag("Power", adapter.powered),
            flag("Scan", app.scanning),
            flag("Visible", adapter.discoverable),
            flag("Pairable", adapter.pairable),
        ]),
        None => Line::from(Span::styled("Waiting for adapter...", Style::default().fg(GRAY))),
    };

    let header = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Adapter")
            .border_style(Style::default().fg(GRAY)),
    );
    f.render_widget(header, area);
}

fn flag(label: &str, on: bool) -> Span<'static> {
    let (marker, color) = if on { ("●", GREEN) } else { ("○", GRAY) };
    Span::styled(format!(" {} {} ", marker, label), Style::default().fg(color))
}

fn render_device_list(f: &mut Frame, area: Rect, app: &App, focus: Focus) {
    let focused = app.focus == focus;
    let border_style = if focused {
        Style::default().fg(BLUE)
    } else {
        Style::default().fg(GRAY)
    };

    let (devices, title) = match focus {
        Focus::Available => (app.available(), "Available Devices"),
        Focus::Connected => (app.connected(), "Connected"),
    };
    let selected = app.selected_index(focus);

    let items: Vec<ListItem> = if devices.is_empty() {
        let hint = match focus {
            Focus::Available if app.scanning => "Scanning...",
            Focus::Available => "No devices. Press [s] to scan",
            Focus::Connected => "Nothing connected",
        };
        vec![ListItem::new(Line::from(Span::styled(hint, Style::default().fg(GRAY))))]
    } else {
        devices
            .iter()
            .enumerate()
            .map(|(i, dev)| ListItem::new(device_line(app, dev, focused && i == selected)))
            .collect()
    };

    // The selection drives the scroll offset even when the panel is not focused
    let mut state = ListState::default();
    if !devices.is_empty() {
        state.select(Some(selected));
    }
    let highlight = if focused {
        Style::default().bg(BLUE).fg(WHITE)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", title, devices.len()))
                .border_style(border_style),
        )
        .highlight_style(highlight);
    f.render_stateful_widget(list, area, &mut state);
}

fn device_line<'a>(app: &App, dev: &'a Device, selected: bool) -> Line<'a> {
    let config = &app.config;
    let mut spans = vec![Span::raw(if selected { "▶ " } else { "  " })];

    if config.show_emojis {
        spans.push(Span::raw(format!("{} ", kind_icon(dev.kind()))));
    }

    let status_indicator = if dev.connected {
        Span::styled("● ", Style::default().fg(GREEN))
    } else if dev.paired {
        Span::styled("◐ ", Style::default().fg(BLUE))
    } else {
        Span::styled("○ ", Style::default().fg(GRAY))
    };
    spans.push(status_indicator);

    let name_style = if dev.has_real_name() {
        Style::default().fg(WHITE)
    } else {
        Style::default().fg(GRAY)
    };
    spans.push(Span::styled(dev.display_name(), name_style));

    if config.show_device_address && dev.display_name() != dev.address {
        spans.push(Span::styled(format!("  {}", dev.address), Style::default().fg(GRAY)));
    }

    if config.show_rssi && dev.rssi != 0 {
        spans.push(Span::styled(
            format!("  {} {}dBm", signal_bars(dev.rssi), dev.rssi),
            Style::default().fg(GRAY),
        ));
    }

    if config.show_battery {
        let category =
            dev.battery_category(config.battery_high_threshold, config.battery_low_threshold);
        if let (Some(level), Some(category)) = (dev.battery, category) {
            let color = match category {
                BatteryCategory::High => GREEN,
                BatteryCategory::Medium => YELLOW,
                BatteryCategory::Low => RED,
            };
            spans.push(Span::styled(format!("  {}%", level), Style::default().fg(color)));
        }
    }

    Line::from(spans)
}

fn kind_icon(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Audio => "🎧",
        DeviceKind::Phone => "📱",
        DeviceKind::Computer => "💻",
        DeviceKind::Keyboard => "⌨",
        DeviceKind::Mouse => "🖱",
        DeviceKind::Gaming => "🎮",
        DeviceKind::Camera => "📷",
        DeviceKind::Printer => "🖨",
        DeviceKind::Generic => "🔵",
    }
}

fn signal_bars(rssi: i16) -> &'static str {
    match rssi {
        r if r >= -55 => "▂▄▆█",
        r if r >= -67 => "▂▄▆▁",
        r if r >= -80 => "▂▄▁▁",
        _ => "▂▁▁▁",
    }
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let color = if app.status_is_error { RED } else { WHITE };
    let mut spans = Vec::new();
    if app.busy {
        spans.push(Span::styled("◐ ", Style::default().fg(BLUE)));
    }
    spans.push(Span::styled(app.status.as_str(), Style::default().fg(color)));

    let status = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Status")
            .border_style(Style::default().fg(GRAY)),
    );
    f.render_widget(status, area);
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let help = if app.pending.is_some() {
        "[y/Enter] Confirm  [n/Esc] Deny  [q] Deny and quit"
    } else if app.alias_input.is_some() {
        "[Enter] Save  [Esc] Cancel"
    } else {
        "[↑↓/jk] Move  [Tab] Panel  [Enter] Connect  [d] Forget  [s] Scan  [r] Refresh  [p] Power  [v] Visible  [b] Pairable  [a] Alias  [q] Quit"
    };
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(GRAY)),
        area,
    );
}

fn render_pairing_prompt(f: &mut Frame, app: &App, device: &str, passkey: &str) {
    let area = centered_rect(50, 9, f.area());
    let content = vec![
        Line::from(Span::styled(
            app.name_for_path(device),
            Style::default().fg(WHITE).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Passkey: ", Style::default().fg(GRAY)),
            Span::styled(
                passkey.to_string(),
                Style::default().fg(GREEN).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from("Does the passkey match the one on the device?"),
        Line::from("[y] Confirm   [n] Deny"),
    ];

    let prompt = Paragraph::new(content)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Pairing Request")
                .border_style(Style::default().fg(BLUE)),
        );
    f.render_widget(Clear, area);
    f.render_widget(prompt, area);
}

fn render_alias_editor(f: &mut Frame, app: &App) {
    let Some(input) = &app.alias_input else {
        return;
    };
    let area = centered_rect(50, 3, f.area());
    let width = area.width.saturating_sub(2) as usize;
    let scroll = input.visual_scroll(width);

    let editor = Paragraph::new(input.value())
        .style(Style::default().fg(WHITE))
        .scroll((0, scroll as u16))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Adapter Alias")
                .border_style(Style::default().fg(BLUE)),
        );
    f.render_widget(Clear, area);
    f.render_widget(editor, area);

    let cursor = input.visual_cursor().max(scroll) - scroll;
    f.set_cursor_position((area.x + 1 + cursor as u16, area.y + 1));
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
