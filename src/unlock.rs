//! Visibility and unlock rules. Pure functions over `Progress`; nothing here
//! touches storage or the screen.

use crate::data::{Dataset, Place};
use crate::progress::Progress;

/// A place shows on the map once its order is within the city's unlocked range
pub fn is_visible(place: &Place, progress: &Progress) -> bool {
    place.order <= progress.unlocked_max_order(&place.city)
}

pub fn is_solved(place: &Place, progress: &Progress) -> bool {
    progress.is_solved(&place.city, &place.id)
}

/// Progress after `place`'s quiz was answered correctly: the place is solved
/// and the next order is unlocked, never beyond `city_max_order` and never
/// lowering what is already unlocked. Applying it twice equals applying it once.
pub fn record_correct_answer(place: &Place, progress: &Progress, city_max_order: u32) -> Progress {
    let mut next = progress.clone();
    let city = next.city_mut(&place.city);
    city.solved.insert(place.id.clone());

    let candidate = place.order.saturating_add(1).min(city_max_order);
    city.unlocked_max_order = city.unlocked_max_order.max(candidate);
    next
}

/// Visible places of `city`, ascending by order
pub fn visible_places<'a>(
    dataset: &'a Dataset,
    city: &'a str,
    progress: &'a Progress,
) -> impl Iterator<Item = &'a Place> + 'a {
    dataset
        .places_in(city)
        .filter(move |p| is_visible(p, progress))
}

/// The place unlocked by solving `place`, if the city has one at the next order
pub fn next_place<'a>(dataset: &'a Dataset, place: &Place) -> Option<&'a Place> {
    dataset.place_at(&place.city, place.order + 1)
}
