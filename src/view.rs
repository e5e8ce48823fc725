use crate::data::{City, Place};
use crate::map::{MapRenderer, Viewport};
use crate::port::{DialogContent, MarkerSpec, RenderPort};
use crate::timer::{TimerId, Timers};
use std::time::{Duration, Instant};

/// Durations of the view's timed effects
#[derive(Clone, Copy, Debug)]
pub struct ViewTiming {
    pub notice: Duration,
    pub pan_delay: Duration,
    pub pan_duration: Duration,
}

impl Default for ViewTiming {
    fn default() -> Self {
        Self {
            notice: Duration::from_millis(2200),
            pan_delay: Duration::from_millis(300),
            pan_duration: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug)]
enum ViewEvent {
    DismissNotice,
    StartPan { lat: f64, lng: f64 },
}

struct PanAnimation {
    from: Viewport,
    to: Viewport,
    started: Instant,
    duration: Duration,
}

/// Terminal implementation of the render port. Holds everything that is
/// only presentation: viewport, drawn markers, dialog, notice, animations.
pub struct TuiView {
    pub viewport: Viewport,
    pub map_renderer: MapRenderer,
    markers: Vec<MarkerSpec>,
    dialog: Option<DialogContent>,
    notice: Option<String>,
    notice_timer: Option<TimerId>,
    pan_timer: Option<TimerId>,
    pan: Option<PanAnimation>,
    timers: Timers<ViewEvent>,
    timing: ViewTiming,
    /// Marker picked with the keyboard
    selected: Option<String>,
}

impl TuiView {
    pub fn new(viewport: Viewport, map_renderer: MapRenderer, timing: ViewTiming) -> Self {
        Self {
            viewport,
            map_renderer,
            markers: Vec::new(),
            dialog: None,
            notice: None,
            notice_timer: None,
            pan_timer: None,
            pan: None,
            timers: Timers::new(),
            timing,
            selected: None,
        }
    }

    pub fn markers(&self) -> &[MarkerSpec] {
        &self.markers
    }

    pub fn dialog(&self) -> Option<&DialogContent> {
        self.dialog.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    #[cfg(test)]
    pub fn is_animating(&self) -> bool {
        self.pan.is_some()
    }

    /// Canvas size in Braille pixels
    pub fn resize(&mut self, width: usize, height: usize) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Manual navigation wins over a running or scheduled pan
    pub fn interrupt_animation(&mut self) {
        if let Some(id) = self.pan_timer.take() {
            self.timers.cancel(id);
        }
        self.pan = None;
    }

    /// Fire due timers and advance the pan animation
    pub fn tick(&mut self, now: Instant) {
        for event in self.timers.drain_due(now) {
            match event {
                ViewEvent::DismissNotice => {
                    self.notice = None;
                    self.notice_timer = None;
                }
                ViewEvent::StartPan { lat, lng } => {
                    self.pan_timer = None;
                    let mut to = self.viewport.clone();
                    to.set_view(lat, lng, self.viewport.level);
                    self.pan = Some(PanAnimation {
                        from: self.viewport.clone(),
                        to,
                        started: now,
                        duration: self.timing.pan_duration,
                    });
                }
            }
        }

        if let Some(anim) = &self.pan {
            let elapsed = now.saturating_duration_since(anim.started);
            let t = if anim.duration.is_zero() {
                1.0
            } else {
                elapsed.as_secs_f64() / anim.duration.as_secs_f64()
            };
            // ease-out so the motion settles gently
            let eased = 1.0 - (1.0 - t.min(1.0)).powi(3);
            let mut next = anim.from.interpolate(&anim.to, eased);
            next.width = self.viewport.width;
            next.height = self.viewport.height;
            self.viewport = next;
            if t >= 1.0 {
                self.pan = None;
            }
        }
    }

    /// Move the keyboard selection through the drawn markers
    pub fn select_step(&mut self, forward: bool) {
        if self.markers.is_empty() {
            self.selected = None;
            return;
        }
        let len = self.markers.len();
        let current = self
            .selected
            .as_deref()
            .and_then(|id| self.markers.iter().position(|m| m.place_id == id));
        let next = match (current, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.selected = Some(self.markers[next].place_id.clone());
    }

    pub fn marker_with_order(&self, order: u32) -> Option<&MarkerSpec> {
        self.markers.iter().find(|m| m.order == order)
    }

    /// Marker whose label covers character cell (col, row) of the map area
    pub fn marker_at(&self, col: u16, row: u16) -> Option<&MarkerSpec> {
        self.markers.iter().find(|m| {
            let (px, py) = self.viewport.project(m.lng, m.lat);
            if !self.viewport.is_visible(px, py) {
                return false;
            }
            let (mc, mr) = ((px / 2) as u16, (py / 4) as u16);
            let width = m.order.to_string().len() as u16;
            row == mr && col + 1 >= mc && col <= mc + width
        })
    }
}

impl RenderPort for TuiView {
    fn render_markers(&mut self, markers: Vec<MarkerSpec>) {
        self.markers = markers;
        if let Some(id) = &self.selected {
            if !self.markers.iter().any(|m| &m.place_id == id) {
                self.selected = None;
            }
        }
    }

    fn center_on_city(&mut self, city: &City) {
        self.interrupt_animation();
        let (lat, lng) = city.center;
        self.viewport.set_view(lat, lng, city.zoom as f64);
    }

    fn focus_on(&mut self, place: &Place, level: u8) {
        self.interrupt_animation();
        self.viewport.set_view(place.lat, place.lng, level as f64);
        self.selected = Some(place.id.clone());
    }

    fn pan_to(&mut self, place: &Place) {
        self.interrupt_animation();
        let id = self.timers.schedule(
            Instant::now(),
            self.timing.pan_delay,
            ViewEvent::StartPan {
                lat: place.lat,
                lng: place.lng,
            },
        );
        self.pan_timer = Some(id);
        self.selected = Some(place.id.clone());
    }

    fn open_dialog(&mut self, content: DialogContent) {
        self.dialog = Some(content);
    }

    fn close_dialog(&mut self) {
        self.dialog = None;
    }

    fn show_notice(&mut self, message: &str) {
        // A newer notice gets its full display time
        if let Some(id) = self.notice_timer.take() {
            self.timers.cancel(id);
        }
        self.notice = Some(message.to_string());
        self.notice_timer = Some(self.timers.schedule(
            Instant::now(),
            self.timing.notice,
            ViewEvent::DismissNotice,
        ));
    }
}
