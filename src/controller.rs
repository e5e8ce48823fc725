//! Dialog state machine and the application state it drives.

use crate::data::{Dataset, Place};
use crate::port::{DialogContent, MarkerSpec, RenderPort};
use crate::progress::{Progress, ProgressStore, Storage};
use crate::unlock;
use url::Url;

pub const LOCKED_NOTICE: &str = "This place is still locked";

/// Minimum zoom level when jumping straight to a place
pub const DEFAULT_FOCUS_LEVEL: u8 = 15;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogState {
    Closed,
    ShowingQuiz { place_id: String, retry: bool },
    ShowingStory { place_id: String, just_solved: bool },
}

impl DialogState {
    pub fn is_open(&self) -> bool {
        !matches!(self, DialogState::Closed)
    }

    pub fn place_id(&self) -> Option<&str> {
        match self {
            DialogState::Closed => None,
            DialogState::ShowingQuiz { place_id, .. } | DialogState::ShowingStory { place_id, .. } => {
                Some(place_id)
            }
        }
    }
}

/// Startup selection of a city and/or a place to open
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeepLink {
    pub city: Option<String>,
    pub focus: Option<String>,
}

impl DeepLink {
    /// Read `city` and `focus` from a full URL or a bare query string
    /// (`?city=grodno&focus=old-castle` or `city=grodno`)
    pub fn parse(link: &str) -> Result<Self, url::ParseError> {
        let url = match Url::parse(link) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse("quest-map://link/")?;
                base.join(&format!("?{}", link.trim_start_matches('?')))?
            }
            Err(e) => return Err(e),
        };

        let mut deep_link = DeepLink::default();
        for (name, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "city" => deep_link.city = Some(value.into_owned()),
                "focus" => deep_link.focus = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(deep_link)
    }

    /// Fields set in `other` win
    pub fn overridden_by(self, other: DeepLink) -> DeepLink {
        DeepLink {
            city: other.city.or(self.city),
            focus: other.focus.or(self.focus),
        }
    }
}

/// Application state: the dataset, the progress store, which city is on
/// screen and what the dialog shows. Every user action goes through here.
pub struct Controller<S> {
    dataset: Dataset,
    store: ProgressStore<S>,
    current_city: String,
    dialog: DialogState,
    reset_pending: bool,
    focus_level: u8,
}

impl<S: Storage> Controller<S> {
    /// `default_city` is used when present in the dataset, else the first city
    pub fn new(dataset: Dataset, store: ProgressStore<S>, default_city: &str, focus_level: u8) -> Self {
        let current_city = if dataset.city(default_city).is_some() {
            default_city.to_string()
        } else {
            dataset.city_keys().next().unwrap_or_default().to_string()
        };
        Self {
            dataset,
            store,
            current_city,
            dialog: DialogState::Closed,
            reset_pending: false,
            focus_level,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn progress(&self) -> &Progress {
        self.store.progress()
    }

    pub fn current_city(&self) -> &str {
        &self.current_city
    }

    pub fn dialog(&self) -> &DialogState {
        &self.dialog
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// First paint, then apply the deep link if any
    pub fn start(&mut self, port: &mut impl RenderPort, link: &DeepLink) {
        if let Some(city) = link.city.as_deref() {
            if self.dataset.city(city).is_some() {
                self.current_city = city.to_string();
            } else {
                tracing::debug!(city, "deep link names an unknown city");
            }
        }
        self.show_current_city(port);

        let Some(focus) = link.focus.as_deref() else {
            return;
        };
        let Some(place) = self.dataset.place(focus).cloned() else {
            tracing::debug!(focus, "deep link names an unknown place");
            return;
        };

        if place.city != self.current_city {
            self.current_city = place.city.clone();
            self.show_current_city(port);
        }

        if !unlock::is_visible(&place, self.store.progress()) {
            tracing::info!(place = %place.id, "deep link to a locked place");
            port.show_notice(LOCKED_NOTICE);
            return;
        }

        let city_level = self.dataset.city(&place.city).map_or(0, |c| c.zoom);
        port.focus_on(&place, city_level.max(self.focus_level));
        self.click_marker(port, &place.id);
    }

    /// Open a visible place: quiz while unsolved, story once solved
    pub fn click_marker(&mut self, port: &mut impl RenderPort, place_id: &str) {
        let Some(place) = self.dataset.place(place_id).cloned() else {
            return;
        };
        if !unlock::is_visible(&place, self.store.progress()) {
            tracing::debug!(place = %place.id, "ignoring click on a locked place");
            return;
        }

        if unlock::is_solved(&place, self.store.progress()) {
            self.dialog = DialogState::ShowingStory {
                place_id: place.id.clone(),
                just_solved: false,
            };
            port.open_dialog(story_content(&place, false));
            return;
        }

        match &place.quiz {
            Some(quiz) => {
                self.dialog = DialogState::ShowingQuiz {
                    place_id: place.id.clone(),
                    retry: false,
                };
                port.open_dialog(DialogContent::Quiz {
                    title: place.title.clone(),
                    question: quiz.question.clone(),
                    options: quiz.options.clone(),
                    retry: false,
                });
            }
            // Nothing to answer: the visit itself counts
            None => self.solve(port, &place),
        }
    }

    /// Answer the open quiz with option `index`
    pub fn select_option(&mut self, port: &mut impl RenderPort, index: usize) {
        let DialogState::ShowingQuiz { place_id, .. } = &self.dialog else {
            return;
        };
        let Some(place) = self.dataset.place(place_id).cloned() else {
            return;
        };
        let Some(quiz) = &place.quiz else {
            return;
        };
        if index >= quiz.options.len() {
            return;
        }

        if quiz.is_correct(index) {
            self.solve(port, &place);
        } else {
            self.dialog = DialogState::ShowingQuiz {
                place_id: place.id.clone(),
                retry: true,
            };
            port.open_dialog(DialogContent::Quiz {
                title: place.title.clone(),
                question: quiz.question.clone(),
                options: quiz.options.clone(),
                retry: true,
            });
        }
    }

    fn solve(&mut self, port: &mut impl RenderPort, place: &Place) {
        let city_max = self.dataset.max_order(&place.city);
        let next = unlock::record_correct_answer(place, self.store.progress(), city_max);
        if let Err(e) = self.store.commit(next) {
            tracing::error!("failed to save progress: {}", e);
        }
        tracing::info!(
            place = %place.id,
            unlocked = self.store.progress().unlocked_max_order(&place.city),
            "place solved"
        );

        self.refresh_markers(port);
        self.dialog = DialogState::ShowingStory {
            place_id: place.id.clone(),
            just_solved: true,
        };
        port.open_dialog(story_content(place, true));

        if let Some(next) = unlock::next_place(&self.dataset, place) {
            port.pan_to(next);
        }
    }

    /// Close button, Esc, or a click outside the dialog
    pub fn close_dialog(&mut self, port: &mut impl RenderPort) {
        if let Some(place_id) = self.dialog.place_id() {
            tracing::debug!(place = %place_id, "dialog closed");
            self.dialog = DialogState::Closed;
            port.close_dialog();
        }
    }

    /// Show another city. An open dialog stays open.
    pub fn switch_city(&mut self, port: &mut impl RenderPort, key: &str) {
        if key == self.current_city || self.dataset.city(key).is_none() {
            return;
        }
        self.current_city = key.to_string();
        self.show_current_city(port);
    }

    /// Cycle to the city after the current one, in dataset order
    pub fn next_city(&mut self, port: &mut impl RenderPort) {
        let keys: Vec<&str> = self.dataset.city_keys().collect();
        let Some(pos) = keys.iter().position(|k| *k == self.current_city) else {
            return;
        };
        let next = keys[(pos + 1) % keys.len()].to_string();
        self.switch_city(port, &next);
    }

    /// Ask for confirmation before wiping progress
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    /// Answer to the reset confirmation
    pub fn resolve_reset(&mut self, port: &mut impl RenderPort, confirmed: bool) {
        if !std::mem::take(&mut self.reset_pending) || !confirmed {
            return;
        }
        if let Err(e) = self.store.reset() {
            tracing::error!("failed to save reset progress: {}", e);
        }
        tracing::info!("progress reset");

        self.dialog = DialogState::Closed;
        port.close_dialog();
        self.show_current_city(port);
    }

    fn show_current_city(&self, port: &mut impl RenderPort) {
        if let Some(city) = self.dataset.city(&self.current_city) {
            port.center_on_city(city);
        }
        self.refresh_markers(port);
    }

    fn refresh_markers(&self, port: &mut impl RenderPort) {
        let progress = self.store.progress();
        let markers = unlock::visible_places(&self.dataset, &self.current_city, progress)
            .map(|p| MarkerSpec::new(p, unlock::is_solved(p, progress)))
            .collect();
        port.render_markers(markers);
    }
}

fn story_content(place: &Place, just_solved: bool) -> DialogContent {
    DialogContent::Story {
        title: place.title.clone(),
        story: place.story.clone(),
        just_solved,
    }
}
