//! The seam between the interaction logic and whatever draws the map.

use crate::data::{City, Place};

/// One marker to draw: a visible place of the current city
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSpec {
    pub place_id: String,
    pub order: u32,
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    pub solved: bool,
}

impl MarkerSpec {
    pub fn new(place: &Place, solved: bool) -> Self {
        Self {
            place_id: place.id.clone(),
            order: place.order,
            title: place.title.clone(),
            lat: place.lat,
            lng: place.lng,
            solved,
        }
    }
}

/// What the dialog shows
#[derive(Clone, Debug, PartialEq)]
pub enum DialogContent {
    Quiz {
        title: String,
        question: String,
        options: Vec<String>,
        /// Set after a wrong answer
        retry: bool,
    },
    Story {
        title: String,
        story: String,
        /// Set right after the quiz was answered correctly
        just_solved: bool,
    },
}

impl DialogContent {
    pub fn title(&self) -> &str {
        match self {
            DialogContent::Quiz { title, .. } | DialogContent::Story { title, .. } => title,
        }
    }
}

/// Rendering operations the controller needs. Implementations own all
/// presentation state (viewport, marker glyphs, dialog, notices, animations).
pub trait RenderPort {
    /// Replace every drawn marker with `markers`
    fn render_markers(&mut self, markers: Vec<MarkerSpec>);
    fn center_on_city(&mut self, city: &City);
    /// Center on one place at `level` (already floored by the caller)
    fn focus_on(&mut self, place: &Place, level: u8);
    /// Smoothly bring `place` into view; cosmetic only
    fn pan_to(&mut self, place: &Place);
    fn open_dialog(&mut self, content: DialogContent);
    fn close_dialog(&mut self);
    /// Short-lived message that dismisses itself
    fn show_notice(&mut self, message: &str);
}
