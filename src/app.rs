use crate::controller::{Controller, DeepLink, DialogState};
use crate::port::{DialogContent, RenderPort};
use crate::progress::Storage;
use crate::ui;
use crate::view::TuiView;
use crossterm::event::{KeyCode, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};
use std::time::Instant;

/// Application state: interaction logic plus its terminal view
pub struct App<S> {
    pub controller: Controller<S>,
    pub view: TuiView,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Current mouse position for cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// Whole terminal area, for hit-testing
    area: Rect,
    /// Digits typed so far while a longer number could still follow
    pending_digits: String,
}

impl<S: Storage> App<S> {
    pub fn new(controller: Controller<S>, view: TuiView, width: u16, height: u16) -> Self {
        let mut app = Self {
            controller,
            view,
            should_quit: false,
            last_mouse: None,
            mouse_pos: None,
            area: Rect::default(),
            pending_digits: String::new(),
        };
        app.resize(width, height);
        app
    }

    /// Initial paint plus deep-link handling
    pub fn start(&mut self, link: &DeepLink) {
        self.controller.start(&mut self.view, link);
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: u16, height: u16) {
        self.area = Rect::new(0, 0, width, height);
        let inner = ui::screen_layout(self.area).map_inner;
        // Braille gives 2x4 resolution per character
        self.view
            .resize(inner.width as usize * 2, inner.height as usize * 4);
    }

    pub fn tick(&mut self, now: Instant) {
        self.view.tick(now);
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.view.interrupt_animation();
        self.view.viewport.pan(dx, dy);
    }

    pub fn zoom_in(&mut self) {
        self.view.interrupt_animation();
        self.view.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.view.interrupt_animation();
        self.view.viewport.zoom_out();
    }

    /// Braille pixel position of a terminal cell inside the map, if it is inside
    fn map_pixel(&self, col: u16, row: u16) -> Option<(i32, i32)> {
        let inner = ui::screen_layout(self.area).map_inner;
        inner.contains(Position::new(col, row)).then(|| {
            (
                (col - inner.x) as i32 * 2,
                (row - inner.y) as i32 * 4,
            )
        })
    }

    /// Get mouse position in braille pixel coordinates (for rendering marker)
    pub fn mouse_pixel_pos(&self) -> Option<(i32, i32)> {
        self.mouse_pos.and_then(|(col, row)| self.map_pixel(col, row))
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        if self.controller.reset_pending() {
            match code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.controller.resolve_reset(&mut self.view, true)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.controller.resolve_reset(&mut self.view, false)
                }
                _ => {}
            }
            return;
        }

        if !self.pending_digits.is_empty() {
            match code {
                KeyCode::Char(c) if c.is_ascii_digit() => {}
                KeyCode::Enter => {
                    let typed = std::mem::take(&mut self.pending_digits);
                    if let Ok(n) = typed.parse() {
                        self.pick_number(n);
                    }
                    return;
                }
                KeyCode::Esc | KeyCode::Backspace => {
                    self.pending_digits.clear();
                    return;
                }
                _ => self.pending_digits.clear(),
            }
        }

        if self.controller.dialog().is_open() {
            match code {
                KeyCode::Esc | KeyCode::Char('x') => self.controller.close_dialog(&mut self.view),
                KeyCode::Enter
                    if matches!(self.controller.dialog(), DialogState::ShowingStory { .. }) =>
                {
                    self.controller.close_dialog(&mut self.view)
                }
                KeyCode::Char(c) if self.starts_or_extends_number(c) => {
                    let count = match self.view.dialog() {
                        Some(DialogContent::Quiz { options, .. }) => options.len() as u32,
                        _ => 0,
                    };
                    let candidates: Vec<u32> = (1..=count).collect();
                    if let Some(n) = self.push_digit(c, &candidates) {
                        self.pick_number(n);
                    }
                }
                KeyCode::Char('c') => self.controller.next_city(&mut self.view),
                KeyCode::Char('q') => self.quit(),
                _ => {}
            }
            return;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),

            // Pan with hjkl or arrow keys
            KeyCode::Left | KeyCode::Char('h') => self.pan(-10, 0),
            KeyCode::Right | KeyCode::Char('l') => self.pan(10, 0),
            KeyCode::Up | KeyCode::Char('k') => self.pan(0, -6),
            KeyCode::Down | KeyCode::Char('j') => self.pan(0, 6),

            // Zoom
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom_in(),
            KeyCode::Char('-') | KeyCode::Char('_') => self.zoom_out(),

            // Markers
            KeyCode::Tab => self.view.select_step(true),
            KeyCode::BackTab => self.view.select_step(false),
            KeyCode::Enter => {
                if let Some(id) = self.view.selected().map(str::to_string) {
                    self.controller.click_marker(&mut self.view, &id);
                }
            }
            KeyCode::Char(c) if self.starts_or_extends_number(c) => {
                let candidates: Vec<u32> = self.view.markers().iter().map(|m| m.order).collect();
                if let Some(n) = self.push_digit(c, &candidates) {
                    self.pick_number(n);
                }
            }

            KeyCode::Char('c') => self.controller.next_city(&mut self.view),
            KeyCode::Char('R') => self.controller.request_reset(),

            // Back to the city's own view
            KeyCode::Char('0') => {
                let city = self
                    .controller
                    .dataset()
                    .city(self.controller.current_city())
                    .cloned();
                if let Some(city) = city {
                    self.view.center_on_city(&city);
                }
            }

            // Layer toggles
            KeyCode::Char('b') => self.view.map_renderer.toggle_borders(),
            KeyCode::Char('t') => self.view.map_renderer.toggle_streets(),
            KeyCode::Char('o') => self.view.map_renderer.toggle_coastlines(),

            _ => {}
        }
    }

    /// Digits typed so far, shown in the status bar
    pub fn pending_digits(&self) -> &str {
        &self.pending_digits
    }

    /// A leading zero is not a number, it keeps its own key binding
    fn starts_or_extends_number(&self, c: char) -> bool {
        c.is_ascii_digit() && (c != '0' || !self.pending_digits.is_empty())
    }

    /// Add a typed digit. Returns the number once no candidate is a longer
    /// number starting with the digits typed so far.
    fn push_digit(&mut self, c: char, candidates: &[u32]) -> Option<u32> {
        self.pending_digits.push(c);
        let typed = self.pending_digits.as_str();
        let ambiguous = candidates.iter().any(|n| {
            let n = n.to_string();
            n.len() > typed.len() && n.starts_with(typed)
        });
        if ambiguous {
            return None;
        }
        std::mem::take(&mut self.pending_digits).parse().ok()
    }

    /// Quiz option `n` while a quiz is open, otherwise the marker with order `n`
    fn pick_number(&mut self, n: u32) {
        if self.controller.dialog().is_open() {
            if n >= 1 {
                self.controller.select_option(&mut self.view, n as usize - 1);
            }
        } else if let Some(id) = self.view.marker_with_order(n).map(|m| m.place_id.clone()) {
            self.controller.click_marker(&mut self.view, &id);
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        // Always track mouse position for cursor marker
        self.mouse_pos = Some((mouse.column, mouse.row));
        if self.controller.reset_pending() {
            return;
        }

        let layout = ui::screen_layout(self.area);
        let pos = Position::new(mouse.column, mouse.row);

        if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
            if layout.city_bar.contains(pos) {
                let key = ui::city_tab_at(self.controller.dataset().cities(), layout.city_bar, mouse.column)
                    .map(str::to_string);
                if let Some(key) = key {
                    self.controller.switch_city(&mut self.view, &key);
                }
                return;
            }
        }

        if self.controller.dialog().is_open() {
            if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                self.click_in_dialog(layout.map, pos);
            }
            return;
        }

        match mouse.kind {
            // Scroll wheel for zooming towards mouse position
            MouseEventKind::ScrollUp => {
                if let Some((px, py)) = self.map_pixel(mouse.column, mouse.row) {
                    self.view.interrupt_animation();
                    self.view.viewport.zoom_in_at(px, py);
                }
            }
            MouseEventKind::ScrollDown => {
                if let Some((px, py)) = self.map_pixel(mouse.column, mouse.row) {
                    self.view.interrupt_animation();
                    self.view.viewport.zoom_out_at(px, py);
                }
            }
            // Horizontal scroll for panning (trackpad two-finger swipe)
            MouseEventKind::ScrollLeft => self.pan(-15, 0),
            MouseEventKind::ScrollRight => self.pan(15, 0),
            MouseEventKind::Down(MouseButton::Left) => {
                let inner = layout.map_inner;
                let hit = inner
                    .contains(pos)
                    .then(|| self.view.marker_at(mouse.column - inner.x, mouse.row - inner.y))
                    .flatten()
                    .map(|m| m.place_id.clone());
                match hit {
                    Some(id) => self.controller.click_marker(&mut self.view, &id),
                    None => self.last_mouse = Some((mouse.column, mouse.row)),
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => self.handle_drag(mouse.column, mouse.row),
            MouseEventKind::Up(MouseButton::Left) => self.end_drag(),
            _ => {}
        }
    }

    /// Option rows answer the quiz, anything outside the dialog closes it
    fn click_in_dialog(&mut self, map_area: Rect, pos: Position) {
        let Some(content) = self.view.dialog().cloned() else {
            return;
        };
        let layout = ui::dialog_layout(map_area, &content);
        if !layout.outer.contains(pos) {
            self.controller.close_dialog(&mut self.view);
            return;
        }
        if let Some(options) = layout.options {
            if options.contains(pos) {
                let index = (pos.y - options.y) as usize;
                self.controller.select_option(&mut self.view, index);
            }
        }
    }

    /// Drag the map with the left button held
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = (last_x as i32 - x as i32) * 2;
            let dy = (last_y as i32 - y as i32) * 4;
            self.pan(dx, dy);
        }
        self.last_mouse = Some((x, y));
    }

    /// Reset drag state when mouse button released
    pub fn end_drag(&mut self) {
        self.last_mouse = None;
    }

    pub fn zoom_level(&self) -> String {
        format!("z{:.0}", self.view.viewport.level)
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        let vp = &self.view.viewport;
        format!(
            "{:.4}°{}, {:.4}°{}",
            vp.center_lat.abs(),
            if vp.center_lat >= 0.0 { "N" } else { "S" },
            vp.center_lon.abs(),
            if vp.center_lon >= 0.0 { "E" } else { "W" }
        )
    }

    /// "unlocked/total, solved" for the current city
    pub fn progress_summary(&self) -> String {
        let city = self.controller.current_city();
        let progress = self.controller.progress().city(city);
        let total = self.controller.dataset().places_in(city).count();
        format!(
            "{}/{} unlocked, {} solved",
            progress.unlocked_max_order.min(total as u32),
            total,
            progress.solved.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DEFAULT_FOCUS_LEVEL;
    use crate::data::sample;
    use crate::map::{MapRenderer, Viewport};
    use crate::progress::{MemoryStorage, ProgressStore, DEFAULT_STORAGE_KEY};
    use crate::view::ViewTiming;
    use crossterm::event::KeyModifiers;

    fn app() -> App<MemoryStorage> {
        let data = sample();
        let store = ProgressStore::load(MemoryStorage::default(), DEFAULT_STORAGE_KEY, &data);
        let controller = Controller::new(data, store, "kaliningrad", DEFAULT_FOCUS_LEVEL);
        let view = TuiView::new(
            Viewport::new(0.0, 0.0, 1.0, 0, 0),
            MapRenderer::new(),
            ViewTiming::default(),
        );
        let mut app = App::new(controller, view, 100, 40);
        app.start(&DeepLink::default());
        app
    }

    fn click(col: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: col,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_digit_opens_marker_then_answers() {
        let mut app = app();
        app.handle_key(KeyCode::Char('1'));
        assert!(matches!(app.controller.dialog(), DialogState::ShowingQuiz { .. }));
        app.handle_key(KeyCode::Char('1'));
        assert_eq!(app.controller.progress().unlocked_max_order("kaliningrad"), 2);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.controller.dialog(), &DialogState::Closed);
    }

    #[test]
    fn test_reset_prompt_swallows_keys() {
        let mut app = app();
        app.handle_key(KeyCode::Char('R'));
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.should_quit);
        app.handle_key(KeyCode::Char('n'));
        assert!(!app.controller.reset_pending());
        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn test_click_outside_dialog_closes_it() {
        let mut app = app();
        app.handle_key(KeyCode::Char('1'));
        let map = ui::screen_layout(Rect::new(0, 0, 100, 40)).map;
        app.handle_mouse(click(map.x + 1, map.y + map.height - 2));
        assert_eq!(app.controller.dialog(), &DialogState::Closed);
    }

    #[test]
    fn test_click_on_option_row_answers() {
        let mut app = app();
        app.handle_key(KeyCode::Char('1'));
        let map = ui::screen_layout(Rect::new(0, 0, 100, 40)).map;
        let content = app.view.dialog().cloned().unwrap();
        let options = ui::dialog_layout(map, &content).options.unwrap();
        // second option is wrong for k1
        app.handle_mouse(click(options.x + 2, options.y + 1));
        assert!(matches!(app.controller.dialog(), DialogState::ShowingQuiz { retry: true, .. }));
        app.handle_mouse(click(options.x + 2, options.y));
        assert!(matches!(app.controller.dialog(), DialogState::ShowingStory { just_solved: true, .. }));
    }

    #[test]
    fn test_click_on_marker_opens_it() {
        let mut app = app();
        // k1 relative to the Kaliningrad center
        let inner = ui::screen_layout(Rect::new(0, 0, 100, 40)).map_inner;
        let k1 = app.controller.dataset().place("k1").unwrap().clone();
        let (px, py) = app.view.viewport.project(k1.lng, k1.lat);
        app.handle_mouse(click(inner.x + (px / 2) as u16, inner.y + (py / 4) as u16));
        assert!(matches!(app.controller.dialog(), DialogState::ShowingQuiz { .. }));
    }

    #[test]
    fn test_city_tab_click_keeps_dialog() {
        let mut app = app();
        app.handle_key(KeyCode::Char('1'));
        let bar = ui::screen_layout(Rect::new(0, 0, 100, 40)).city_bar;
        let cities = app.controller.dataset().cities().to_vec();
        let col = (bar.x..bar.x + bar.width)
            .find(|&c| ui::city_tab_at(&cities, bar, c) == Some("grodno"))
            .unwrap();
        app.handle_mouse(click(col, bar.y));
        assert_eq!(app.controller.current_city(), "grodno");
        assert!(app.controller.dialog().is_open());
    }

    #[test]
    fn test_progress_summary() {
        let mut app = app();
        assert_eq!(app.progress_summary(), "1/3 unlocked, 0 solved");
        app.handle_key(KeyCode::Char('1'));
        app.handle_key(KeyCode::Char('1'));
        assert_eq!(app.progress_summary(), "2/3 unlocked, 1 solved");
    }

    /// One city with twelve places, all unlocked
    fn long_hunt() -> App<MemoryStorage> {
        let places: Vec<String> = (1..=12)
            .map(|n| {
                format!(
                    r#"{{"id": "p{n}", "city": "long", "order": {n}, "title": "P{n}",
                        "lat": 54.70{n:02}, "lng": 20.50{n:02},
                        "quiz": {{"question": "q", "options": ["a", "b"], "correctIndex": 0}}}}"#
                )
            })
            .collect();
        let raw = format!(
            r#"{{"places": [{}], "cities": {{"long": {{"name": "Long", "center": [54.706, 20.506], "zoom": 13}}}}}}"#,
            places.join(",")
        );
        let data = crate::data::Dataset::parse(raw.into_bytes()).unwrap();
        let storage = MemoryStorage::with_entry(DEFAULT_STORAGE_KEY, r#"{"long": {"unlockedMaxOrder": 12}}"#);
        let store = ProgressStore::load(storage, DEFAULT_STORAGE_KEY, &data);
        let controller = Controller::new(data, store, "long", DEFAULT_FOCUS_LEVEL);
        let view = TuiView::new(
            Viewport::new(0.0, 0.0, 1.0, 0, 0),
            MapRenderer::new(),
            ViewTiming::default(),
        );
        let mut app = App::new(controller, view, 100, 40);
        app.start(&DeepLink::default());
        app
    }

    fn open_place(app: &App<MemoryStorage>) -> Option<String> {
        match app.controller.dialog() {
            DialogState::ShowingQuiz { place_id, .. } => Some(place_id.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_two_digit_order_opens_marker() {
        let mut app = long_hunt();
        app.handle_key(KeyCode::Char('1'));
        // 10, 11 and 12 all start with 1
        assert_eq!(app.controller.dialog(), &DialogState::Closed);
        assert_eq!(app.pending_digits(), "1");
        app.handle_key(KeyCode::Char('2'));
        assert_eq!(open_place(&app).as_deref(), Some("p12"));
        assert_eq!(app.pending_digits(), "");
    }

    #[test]
    fn test_enter_commits_a_prefix_number() {
        let mut app = long_hunt();
        app.handle_key(KeyCode::Char('1'));
        app.handle_key(KeyCode::Enter);
        assert_eq!(open_place(&app).as_deref(), Some("p1"));

        let mut app = long_hunt();
        app.handle_key(KeyCode::Char('3'));
        assert_eq!(open_place(&app).as_deref(), Some("p3"));
    }

    #[test]
    fn test_pending_digits_cleared_by_other_keys() {
        let mut app = long_hunt();
        app.handle_key(KeyCode::Char('1'));
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.pending_digits(), "");
        assert!(!app.should_quit);

        app.handle_key(KeyCode::Char('1'));
        app.handle_key(KeyCode::Char('0'));
        assert_eq!(open_place(&app).as_deref(), Some("p10"));
    }
}
