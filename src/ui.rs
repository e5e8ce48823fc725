use crate::app::App;
use crate::braille::BrailleCanvas;
use crate::data::City;
use crate::map::MapLayers;
use crate::port::DialogContent;
use crate::progress::Storage;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
    Frame,
};

const RETRY_PROMPT: &str = "Not quite, try again";
const CORRECT_BANNER: &str = "Correct!";

/// Screen regions, shared by drawing and mouse hit-testing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenLayout {
    pub city_bar: Rect,
    pub map: Rect,
    pub map_inner: Rect,
    pub status: Rect,
}

pub fn screen_layout(area: Rect) -> ScreenLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // City switcher
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    ScreenLayout {
        city_bar: chunks[0],
        map: chunks[1],
        map_inner: map_block("").inner(chunks[1]),
        status: chunks[2],
    }
}

/// Dialog regions; `options` is one row per quiz option
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialogLayout {
    pub outer: Rect,
    pub header: Rect,
    pub options: Option<Rect>,
    pub body: Rect,
    pub footer: Rect,
}

pub fn dialog_layout(map: Rect, content: &DialogContent) -> DialogLayout {
    let width = map.width.saturating_sub(4).min(72);
    let height = map.height.saturating_sub(2).min(18);
    let outer = Rect::new(
        map.x + (map.width - width) / 2,
        map.y + (map.height - height) / 2,
        width,
        height,
    );
    let inner = dialog_block("").inner(outer);

    match content {
        DialogContent::Quiz { options, .. } => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Length(options.len() as u16),
                    Constraint::Min(1),
                    Constraint::Length(1),
                ])
                .split(inner);
            DialogLayout {
                outer,
                header: chunks[0],
                options: Some(chunks[1]),
                body: chunks[2],
                footer: chunks[3],
            }
        }
        DialogContent::Story { .. } => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Min(1),
                    Constraint::Length(1),
                ])
                .split(inner);
            DialogLayout {
                outer,
                header: chunks[0],
                options: None,
                body: chunks[1],
                footer: chunks[2],
            }
        }
    }
}

/// Tabs are " name " separated by one column, starting one column in
fn city_tab_spans(cities: &[City], bar: Rect) -> impl Iterator<Item = (u16, u16, &City)> {
    let mut x = bar.x + 1;
    cities.iter().map(move |city| {
        let width = city.name.chars().count() as u16 + 2;
        let start = x;
        x = x.saturating_add(width + 1);
        (start, width, city)
    })
}

/// City key of the tab at column `col`
pub fn city_tab_at(cities: &[City], bar: Rect, col: u16) -> Option<&str> {
    city_tab_spans(cities, bar)
        .find(|(start, width, _)| col >= *start && col < start + width)
        .map(|(_, _, city)| city.key.as_str())
}

fn map_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
}

fn dialog_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
}

/// Render the UI
pub fn render<S: Storage>(frame: &mut Frame, app: &App<S>) {
    let layout = screen_layout(frame.area());

    render_city_bar(frame, app, layout.city_bar);
    render_map(frame, app, layout.map);
    render_status_bar(frame, app, layout.status);

    if let Some(content) = app.view.dialog() {
        render_dialog(frame, content, layout.map);
    }
    if let Some(message) = app.view.notice() {
        render_notice(frame, message, layout.map);
    }
    if app.controller.reset_pending() {
        render_reset_prompt(frame, layout.map);
    }
}

fn render_city_bar<S: Storage>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let current = app.controller.current_city();
    let mut spans = vec![Span::raw(" ")];
    for (i, city) in app.controller.dataset().cities().iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
        }
        let style = if city.key == current {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        spans.push(Span::styled(format!(" {} ", city.name), style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_map<S: Storage>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let city_name = app
        .controller
        .dataset()
        .city(app.controller.current_city())
        .map_or("", |c| c.name.as_str());
    let title = format!(" {} ", city_name);
    let block = map_block(&title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Size the viewport to what is actually drawn this frame
    let mut viewport = app.view.viewport.clone();
    viewport.width = inner.width as usize * 2;
    viewport.height = inner.height as usize * 4;

    let layers = app.view.map_renderer.render(
        inner.width as usize,
        inner.height as usize,
        &viewport,
        app.view.markers(),
        app.view.selected(),
    );

    // Get mouse cursor position for marker
    let cursor_pos = app.mouse_pixel_pos().map(|(px, py)| ((px / 2) as u16, (py / 4) as u16));

    frame.render_widget(MapWidget { layers, cursor_pos }, inner);
}

/// Custom widget that renders braille map with place markers overlaid
struct MapWidget {
    layers: MapLayers,
    cursor_pos: Option<(u16, u16)>,
}

impl MapWidget {
    /// Render a braille canvas layer with a specific color
    fn render_layer(canvas: &BrailleCanvas, color: Color, area: Rect, buf: &mut Buffer) {
        let rows = canvas.height().min(area.height as usize);
        let cols = canvas.width().min(area.width as usize);
        for row in 0..rows {
            for col in 0..cols {
                if let Some(ch) = canvas.glyph(col, row) {
                    let x = area.x + col as u16;
                    let y = area.y + row as u16;
                    buf[(x, y)].set_char(ch).set_fg(color);
                }
            }
        }
    }
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Back to front: streets, coastlines, borders, selection ring
        Self::render_layer(&self.layers.streets, Color::DarkGray, area, buf);
        Self::render_layer(&self.layers.coastlines, Color::Cyan, area, buf);
        Self::render_layer(&self.layers.borders, Color::Yellow, area, buf);
        Self::render_layer(&self.layers.highlight, Color::Magenta, area, buf);

        for label in &self.layers.markers {
            if label.row >= area.height || label.col >= area.width {
                continue;
            }
            let mut style = if label.solved {
                Style::default().fg(Color::Black).bg(Color::Green)
            } else {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            };
            if label.selected {
                style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
            }

            let y = area.y + label.row;
            for (i, ch) in label.text.chars().enumerate() {
                let x = area.x + label.col + i as u16;
                if x < area.x + area.width {
                    buf[(x, y)].set_char(ch).set_style(style);
                }
            }
        }

        // Render cursor marker
        if let Some((cx, cy)) = self.cursor_pos {
            if cx < area.width && cy < area.height {
                let cell = &mut buf[(area.x + cx, area.y + cy)];
                if cell.symbol() == " " {
                    cell.set_char('╋').set_fg(Color::Red);
                }
            }
        }
    }
}

fn render_dialog(frame: &mut Frame, content: &DialogContent, map: Rect) {
    let layout = dialog_layout(map, content);
    frame.render_widget(Clear, layout.outer);
    frame.render_widget(dialog_block(&format!(" {} ", content.title())), layout.outer);

    let hint = Style::default().fg(Color::DarkGray);
    match content {
        DialogContent::Quiz {
            question,
            options,
            retry,
            ..
        } => {
            frame.render_widget(
                Paragraph::new(question.as_str()).wrap(Wrap { trim: true }),
                layout.header,
            );
            if let Some(area) = layout.options {
                let lines: Vec<Line> = options
                    .iter()
                    .enumerate()
                    .map(|(i, option)| {
                        Line::from(vec![
                            Span::styled(format!("[{}] ", i + 1), Style::default().fg(Color::Yellow)),
                            Span::raw(option.as_str()),
                        ])
                    })
                    .collect();
                frame.render_widget(Paragraph::new(lines), area);
            }
            if *retry {
                frame.render_widget(
                    Paragraph::new(Span::styled(RETRY_PROMPT, Style::default().fg(Color::Red))),
                    layout.body,
                );
            }
            frame.render_widget(
                Paragraph::new(Span::styled("number/click: answer  Esc: close", hint)),
                layout.footer,
            );
        }
        DialogContent::Story {
            story, just_solved, ..
        } => {
            if *just_solved {
                frame.render_widget(
                    Paragraph::new(Span::styled(
                        CORRECT_BANNER,
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    )),
                    layout.header,
                );
            }
            frame.render_widget(
                Paragraph::new(story.as_str()).wrap(Wrap { trim: true }),
                layout.body,
            );
            frame.render_widget(
                Paragraph::new(Span::styled("Enter/Esc: close", hint)),
                layout.footer,
            );
        }
    }
}

/// Small box centered horizontally near the top of `map`
fn top_box(map: Rect, text_width: u16, height: u16) -> Rect {
    let width = (text_width + 4).min(map.width);
    Rect::new(
        map.x + (map.width - width) / 2,
        map.y + 1.min(map.height),
        width,
        height.min(map.height),
    )
}

fn render_notice(frame: &mut Frame, message: &str, map: Rect) {
    let area = top_box(map, message.chars().count() as u16, 3);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Span::styled(message, Style::default().fg(Color::White)))
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red))),
        area,
    );
}

fn render_reset_prompt(frame: &mut Frame, map: Rect) {
    let text = "Reset all progress? [y/n]";
    let area = top_box(map, text.len() as u16, 3);
    let area = Rect::new(area.x, map.y + map.height.saturating_sub(3) / 2, area.width, area.height);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Span::styled(text, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)))
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Yellow))),
        area,
    );
}

fn render_status_bar<S: Storage>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let settings = &app.view.map_renderer.settings;
    let toggle = |on: bool, label: &'static str| {
        Span::styled(
            label,
            Style::default().fg(if on { Color::Green } else { Color::DarkGray }),
        )
    };

    let mut spans = vec![Span::styled(" ", Style::default())];
    if !app.pending_digits().is_empty() {
        spans.push(Span::styled(
            format!("#{}_ ", app.pending_digits()),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }
    spans.extend([
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.progress_summary(), Style::default().fg(Color::Green)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        toggle(settings.show_borders, "[b]order "),
        toggle(settings.show_streets, "[t]streets "),
        toggle(settings.show_coastlines, "c[o]ast "),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(
            " | Tab/number+Enter:place c:city 0:recenter R:reset q:quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    let status = Line::from(spans);

    frame.render_widget(Paragraph::new(status), area);
}

/// Full-screen message shown when startup cannot continue
pub fn render_fatal(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let height = 3.min(area.height);
    let rect = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(message, Style::default().fg(Color::White)))
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Red))),
        rect,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample;

    #[test]
    fn test_layout_regions() {
        let layout = screen_layout(Rect::new(0, 0, 100, 40));
        assert_eq!(layout.city_bar, Rect::new(0, 0, 100, 1));
        assert_eq!(layout.status, Rect::new(0, 39, 100, 1));
        assert_eq!(layout.map_inner, Rect::new(1, 2, 98, 36));
    }

    #[test]
    fn test_city_tabs() {
        let data = sample();
        let bar = Rect::new(0, 0, 80, 1);
        // " Kaliningrad " spans columns 1..14, " Grodno " 15..23
        assert_eq!(city_tab_at(data.cities(), bar, 0), None);
        assert_eq!(city_tab_at(data.cities(), bar, 1), Some("kaliningrad"));
        assert_eq!(city_tab_at(data.cities(), bar, 13), Some("kaliningrad"));
        assert_eq!(city_tab_at(data.cities(), bar, 14), None);
        assert_eq!(city_tab_at(data.cities(), bar, 15), Some("grodno"));
        assert_eq!(city_tab_at(data.cities(), bar, 23), None);
    }

    #[test]
    fn test_quiz_dialog_has_one_row_per_option() {
        let map = Rect::new(0, 1, 100, 38);
        let content = DialogContent::Quiz {
            title: "t".into(),
            question: "q".into(),
            options: vec!["a".into(), "b".into(), "c".into()],
            retry: false,
        };
        let layout = dialog_layout(map, &content);
        assert_eq!(layout.options.unwrap().height, 3);
        assert!(layout.outer.width <= 72);
        let retry = DialogContent::Quiz {
            title: "t".into(),
            question: "q".into(),
            options: vec!["a".into(), "b".into(), "c".into()],
            retry: true,
        };
        assert_eq!(dialog_layout(map, &retry), layout);
    }

    #[test]
    fn test_map_widget_draws_markers() {
        let data = sample();
        let renderer = crate::map::MapRenderer::new();
        let k1 = data.place("k1").unwrap();
        let vp = crate::map::Viewport::new(k1.lng, k1.lat, 15.0, 20, 20);
        let layers = renderer.render(10, 5, &vp, &[crate::port::MarkerSpec::new(k1, true)], None);
        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        MapWidget { layers, cursor_pos: None }.render(area, &mut buf);
        assert_eq!(buf[(5, 2)].symbol(), "1");
        assert_eq!(buf[(5, 2)].bg, Color::Green);
    }
}
