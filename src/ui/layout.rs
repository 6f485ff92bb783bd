use crate::app::{App, AppView, Panel};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, LineGauge, Paragraph},
    Frame,
};
use speedprobe::report::{format_ping, format_speed, Rating};
use speedprobe::settings::SettingsField;
use speedprobe::speedtest::TestPhase;

// Color Palette
const ACCENT: Color = Color::Rgb(100, 149, 237);
const SUCCESS: Color = Color::Rgb(134, 194, 156);
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220);
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130);
const WARN_DIM: Color = Color::Rgb(130, 110, 80);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

const PANELS: [Panel; 3] = [Panel::Download, Panel::Upload, Panel::Ping];

/// What one panel shows, derived from the latest snapshot.
struct MetricView<'a> {
    title: &'static str,
    color: Color,
    dim: Color,
    value: String,
    rating: Option<Rating>,
    /// `None` hides the bar.
    progress: Option<f64>,
    samples: &'a [f64],
    unit: &'static str,
}

impl<'a> MetricView<'a> {
    fn of(app: &'a App, panel: Panel) -> Self {
        let state = &app.state;
        let results = &state.results;

        match panel {
            Panel::Download => Self {
                title: "Download",
                color: SUCCESS,
                dim: SUCCESS_DIM,
                value: format_speed(
                    results
                        .download_mbps
                        .or_else(|| state.download_samples.last().copied()),
                ),
                rating: results.download_mbps.map(Rating::for_download),
                progress: Some(match state.phase {
                    TestPhase::Download => state.progress_percent / 100.0,
                    _ if results.download_mbps.is_some() => 1.0,
                    _ => 0.0,
                }),
                samples: &state.download_samples,
                unit: "Mbps",
            },
            // Upload reports no partial progress, so the bar only fills once it is done
            Panel::Upload => Self {
                title: "Upload",
                color: INFO,
                dim: INFO_DIM,
                value: format_speed(results.upload_mbps),
                rating: results.upload_mbps.map(Rating::for_upload),
                progress: Some(if results.upload_mbps.is_some() { 1.0 } else { 0.0 }),
                samples: &[],
                unit: "Mbps",
            },
            Panel::Ping => Self {
                title: "Latency",
                color: WARN,
                dim: WARN_DIM,
                value: format_ping(results.ping_ms.or_else(|| state.ping_samples.last().copied())),
                rating: results.ping_ms.map(Rating::for_ping),
                progress: None,
                samples: &state.ping_samples,
                unit: "ms",
            },
        }
    }

    fn block(&self, selected: bool) -> Block<'static> {
        let (border, title) = if selected {
            (BORDER_ACTIVE, self.color)
        } else {
            (BORDER, TEXT_SECONDARY)
        };

        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(Span::styled(format!(" {} ", self.title), Style::default().fg(title)))
    }
}

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    if app.view == AppView::Settings {
        draw_settings_view(frame, area, app);
        return;
    }

    let [header, body, help] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .areas(area);

    draw_header(frame, header, app);

    if app.expanded {
        draw_expanded(frame, body, &MetricView::of(app, app.selected_panel));
    } else {
        let columns = Layout::horizontal([Constraint::Ratio(1, 3); 3]).split(body);
        for (area, panel) in columns.iter().zip(PANELS) {
            draw_panel(
                frame,
                *area,
                &MetricView::of(app, panel),
                app.selected_panel == panel,
            );
        }
    }

    draw_help(frame, help, app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [title, status, stages] = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new("speedprobe")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        title,
    );

    let (text, color) = match app.phase() {
        TestPhase::Idle if !app.state.results.is_empty() => ("Stopped early", WARN),
        TestPhase::Idle => ("Ready", TEXT_MUTED),
        TestPhase::Ping => ("Measuring latency...", WARN),
        TestPhase::Download => ("Testing download...", SUCCESS),
        TestPhase::Upload => ("Testing upload...", INFO),
        TestPhase::Complete => ("Complete", ACCENT),
    };
    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        status,
    );

    frame.render_widget(
        Paragraph::new(stage_line(app.phase())).alignment(Alignment::Right),
        stages,
    );
}

fn stage_line(phase: TestPhase) -> Line<'static> {
    let order = [TestPhase::Ping, TestPhase::Download, TestPhase::Upload];
    let position = |p: TestPhase| match p {
        TestPhase::Complete => order.len(),
        p => order.iter().position(|o| *o == p).unwrap_or(0),
    };

    let mut spans = Vec::new();
    for (i, (stage, label)) in order.iter().zip(["ping", "down", "up"]).enumerate() {
        let style = if phase == *stage {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if phase != TestPhase::Idle && i < position(phase) {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };

        if i > 0 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
        spans.push(Span::styled(label, style));
    }

    Line::from(spans)
}

fn draw_panel(frame: &mut Frame, area: Rect, view: &MetricView, selected: bool) {
    let block = view.block(selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [value, rating, progress, chart] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new(view.value.as_str())
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        value,
    );

    let rating_text = view.rating.map(|r| r.to_string()).unwrap_or_default();
    frame.render_widget(
        Paragraph::new(rating_text)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        rating,
    );

    draw_progress(frame, progress, view);
    draw_chart(frame, chart, view, false);
}

fn draw_expanded(frame: &mut Frame, area: Rect, view: &MetricView) {
    let block = view.block(true);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [summary, progress, chart] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .areas(inner);

    let mut spans = vec![Span::styled(
        view.value.clone(),
        Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
    )];
    if let Some(rating) = view.rating {
        spans.push(Span::styled(format!("  {rating}"), Style::default().fg(view.color)));
    }
    if let Some((avg, min, max)) = stats(view.samples) {
        for (label, value) in [("avg", avg), ("min", min), ("max", max)] {
            spans.push(Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)));
            spans.push(Span::styled(
                format!("{label} {value:.1} {}", view.unit),
                Style::default().fg(TEXT_MUTED),
            ));
        }
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        summary,
    );

    draw_progress(frame, progress, view);
    draw_chart(frame, chart, view, true);
}

fn draw_progress(frame: &mut Frame, area: Rect, view: &MetricView) {
    let Some(ratio) = view.progress else {
        return;
    };
    if area.width < 4 {
        return;
    }

    let gauge = LineGauge::default()
        .ratio(ratio.clamp(0.0, 1.0))
        .label("")
        .line_set(symbols::line::THICK)
        .filled_style(Style::default().fg(view.color))
        .unfilled_style(Style::default().fg(view.dim));

    let padded = Rect {
        x: area.x + 1,
        width: area.width - 2,
        ..area
    };
    frame.render_widget(gauge, padded);
}

/// Line chart of the samples; the detailed form adds an average line and
/// y-axis labels.
fn draw_chart(frame: &mut Frame, area: Rect, view: &MetricView, detailed: bool) {
    let Some((avg, min, max)) = stats(view.samples) else {
        return;
    };
    if area.width < 4 || area.height < 2 {
        return;
    }

    let range = (max - min).max(if detailed { 0.1 } else { 1.0 });
    let y_min = (min - range * 0.1).max(0.0);
    let y_max = max + range * 0.1;
    let len = view.samples.len() as f64;

    let points: Vec<(f64, f64)> = view
        .samples
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    let avg_line = [(0.0, avg), (len, avg)];

    let mut datasets = vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(view.color))
        .data(&points)];
    let mut y_axis = Axis::default().bounds([y_min, y_max]);

    if detailed {
        datasets.push(
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(TEXT_MUTED))
                .data(&avg_line),
        );
        y_axis = y_axis.style(Style::default().fg(BORDER)).labels(vec![
            Span::styled(format!("{y_min:.0}"), Style::default().fg(TEXT_MUTED)),
            Span::styled(format!("{y_max:.0} {}", view.unit), Style::default().fg(TEXT_MUTED)),
        ]);
    }

    let chart = Chart::new(datasets)
        .x_axis(Axis::default().style(Style::default().fg(BORDER)).bounds([0.0, len]))
        .y_axis(y_axis);

    frame.render_widget(chart, area);
}

fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let [header, body, help] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .areas(area);

    let header_block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    frame.render_widget(
        Paragraph::new(format!(
            "Settings · {}",
            app.settings.endpoints.ping.origin().ascii_serialization()
        ))
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
        .block(header_block),
        header,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let content = body.inner(ratatui::layout::Margin::new(2, 0));
    let inner = block.inner(content);
    frame.render_widget(block, content);

    let settings = &app.settings;
    let rows = [
        (SettingsField::PingCount, "Ping samples", settings.ping_count.to_string()),
        (
            SettingsField::DownloadSize,
            "Download size",
            format!("{} MiB", settings.download_size_mib),
        ),
        (
            SettingsField::UploadSize,
            "Upload size",
            format!("{} MiB", settings.upload_size_mib),
        ),
    ];
    let areas = Layout::vertical([Constraint::Length(3); 3]).split(inner);

    for (area, (field, label, value)) in areas.iter().zip(rows) {
        let selected = app.selected_setting == field;
        let [label_area, value_area] =
            Layout::horizontal([Constraint::Length(16), Constraint::Min(10)]).areas(*area);

        let (label_color, value_text, value_color) = if selected {
            (ACCENT, format!("< {value} >"), TEXT_PRIMARY)
        } else {
            (TEXT_SECONDARY, value, TEXT_MUTED)
        };

        frame.render_widget(
            Paragraph::new(format!(" {label}")).style(Style::default().fg(label_color)),
            label_area,
        );
        frame.render_widget(
            Paragraph::new(value_text).style(Style::default().fg(value_color)),
            value_area,
        );
    }

    frame.render_widget(
        Paragraph::new("↑↓ select · ←→ adjust · enter done")
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        help,
    );
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.expanded {
        "esc close · q quit"
    } else if app.state.is_running() {
        "tab select · space expand · esc cancel · q quit"
    } else if !app.state.results.is_empty() {
        "enter restart · r reset · s settings · tab select · space expand · q quit"
    } else {
        "enter start · s settings · tab select · space expand · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

/// Average, minimum and maximum, or `None` for no samples.
fn stats(data: &[f64]) -> Option<(f64, f64, f64)> {
    if data.is_empty() {
        return None;
    }
    let avg = data.iter().sum::<f64>() / data.len() as f64;
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((avg, min, max))
}
