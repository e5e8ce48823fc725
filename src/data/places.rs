use crate::error::DataLoadError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Multiple-choice question gating a place's story
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl Quiz {
    pub fn is_correct(&self, index: usize) -> bool {
        index == self.correct_index
    }
}

/// A point of interest with a fixed reveal order within its city
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub id: String,
    pub city: String,
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub story: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub quiz: Option<Quiz>,
}

/// Independently progressed collection of places with its own viewport defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    #[serde(skip)]
    pub key: String,
    pub name: String,
    /// (lat, lng), in the order web maps take it
    pub center: (f64, f64),
    pub zoom: u8,
}

/// Cities keyed by their document key, in document order
struct CityList(Vec<City>);

impl<'de> Deserialize<'de> for CityList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CityListVisitor;

        impl<'de> Visitor<'de> for CityListVisitor {
            type Value = CityList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of city key to city config")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<CityList, A::Error> {
                let mut cities = Vec::new();
                while let Some((key, mut city)) = map.next_entry::<String, City>()? {
                    city.key = key;
                    cities.push(city);
                }
                Ok(CityList(cities))
            }
        }

        deserializer.deserialize_map(CityListVisitor)
    }
}

#[derive(Deserialize)]
struct RawDataset {
    places: Vec<Place>,
    cities: CityList,
}

/// Immutable snapshot of every place and city, loaded once at startup
#[derive(Debug, Clone)]
pub struct Dataset {
    places: Vec<Place>,
    cities: Vec<City>,
    max_orders: BTreeMap<String, u32>,
}

impl Dataset {
    /// Read and validate the dataset document at `path`
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        let bytes = fs::read(path).map_err(|source| DataLoadError::Unreachable {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::parse(bytes)?;
        tracing::info!(
            path = %path.display(),
            places = dataset.places.len(),
            cities = dataset.cities.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Parse a dataset document. Places come out sorted by `order` (stable).
    pub fn parse(mut bytes: Vec<u8>) -> Result<Self, DataLoadError> {
        let raw: RawDataset = simd_json::serde::from_slice(&mut bytes)?;
        Self::from_parts(raw.places, raw.cities.0)
    }

    pub fn from_parts(mut places: Vec<Place>, cities: Vec<City>) -> Result<Self, DataLoadError> {
        validate(&places, &cities)?;
        places.sort_by_key(|p| p.order);

        let mut max_orders = BTreeMap::new();
        for place in &places {
            let max = max_orders.entry(place.city.clone()).or_insert(0);
            *max = (*max).max(place.order);
        }

        for (city, &max) in &max_orders {
            let count = places.iter().filter(|p| &p.city == city).count();
            if count as u32 != max {
                tracing::warn!(city = %city, max, count, "gap in place ordering");
            }
        }

        Ok(Self {
            places,
            cities,
            max_orders,
        })
    }

    #[cfg(test)]
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn city(&self, key: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.key == key)
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }

    /// Places of one city, ascending by order
    pub fn places_in<'a>(&'a self, city: &'a str) -> impl Iterator<Item = &'a Place> + 'a {
        self.places.iter().filter(move |p| p.city == city)
    }

    pub fn place_at(&self, city: &str, order: u32) -> Option<&Place> {
        self.places.iter().find(|p| p.city == city && p.order == order)
    }

    /// Highest order in the city; 0 for a city without places
    pub fn max_order(&self, city: &str) -> u32 {
        self.max_orders.get(city).copied().unwrap_or(0)
    }

    pub fn city_keys(&self) -> impl Iterator<Item = &str> {
        self.cities.iter().map(|c| c.key.as_str())
    }
}

fn validate(places: &[Place], cities: &[City]) -> Result<(), DataLoadError> {
    let invalid = |msg: String| Err(DataLoadError::Invalid(msg));

    if cities.is_empty() {
        return invalid("dataset has no cities".to_string());
    }

    let mut city_keys = HashSet::new();
    for city in cities {
        if !city_keys.insert(city.key.as_str()) {
            return invalid(format!("duplicate city key {:?}", city.key));
        }
    }

    let mut ids = HashSet::new();
    let mut slots = HashSet::new();
    for place in places {
        if !ids.insert(place.id.as_str()) {
            return invalid(format!("duplicate place id {:?}", place.id));
        }
        if !city_keys.contains(place.city.as_str()) {
            return invalid(format!("place {:?} references unknown city {:?}", place.id, place.city));
        }
        if place.order == 0 {
            return invalid(format!("place {:?} has order 0", place.id));
        }
        if !slots.insert((place.city.as_str(), place.order)) {
            return invalid(format!("order {} used twice in city {:?}", place.order, place.city));
        }
        if let Some(quiz) = &place.quiz {
            if quiz.options.len() < 2 {
                return invalid(format!("quiz of {:?} needs at least two options", place.id));
            }
            if quiz.correct_index >= quiz.options.len() {
                return invalid(format!(
                    "quiz of {:?} has correctIndex {} out of {} options",
                    place.id,
                    quiz.correct_index,
                    quiz.options.len()
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "places": [
            {"id": "k3", "city": "kaliningrad", "order": 3, "title": "Fishing Village", "story": "s3",
             "lat": 54.7033, "lng": 20.5180,
             "quiz": {"question": "q3", "options": ["a", "b", "c"], "correctIndex": 2}},
            {"id": "k1", "city": "kaliningrad", "order": 1, "title": "Cathedral", "story": "s1",
             "lat": 54.7065, "lng": 20.5120,
             "quiz": {"question": "q1", "options": ["a", "b"], "correctIndex": 0}},
            {"id": "k2", "city": "kaliningrad", "order": 2, "title": "King's Gate", "story": "s2",
             "lat": 54.7196, "lng": 20.5307,
             "quiz": {"question": "q2", "options": ["a", "b"], "correctIndex": 1}},
            {"id": "g1", "city": "grodno", "order": 1, "title": "Old Castle", "story": "g-s1",
             "lat": 53.6775, "lng": 23.8225,
             "quiz": {"question": "gq1", "options": ["a", "b"], "correctIndex": 1}},
            {"id": "g2", "city": "grodno", "order": 2, "title": "New Castle", "story": "g-s2",
             "lat": 53.6787, "lng": 23.8241,
             "quiz": {"question": "gq2", "options": ["a", "b"], "correctIndex": 0}},
            {"id": "g3", "city": "grodno", "order": 3, "title": "Farny Church", "story": "g-s3",
             "lat": 53.6771, "lng": 23.8301},
            {"id": "g4", "city": "grodno", "order": 4, "title": "Synagogue", "story": "g-s4",
             "lat": 53.6795, "lng": 23.8271,
             "quiz": {"question": "gq4", "options": ["a", "b"], "correctIndex": 0}},
            {"id": "g5", "city": "grodno", "order": 5, "title": "Kalozha", "story": "g-s5",
             "lat": 53.6757, "lng": 23.8142,
             "quiz": {"question": "gq5", "options": ["a", "b"], "correctIndex": 1}}
        ],
        "cities": {
            "kaliningrad": {"name": "Kaliningrad", "center": [54.7104, 20.4522], "zoom": 13},
            "grodno": {"name": "Grodno", "center": [53.6694, 23.8131], "zoom": 14}
        }
    }"#;

    pub(crate) fn sample() -> Dataset {
        Dataset::parse(SAMPLE.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_places_sorted_by_order() {
        let data = sample();
        let orders: Vec<u32> = data.places_in("kaliningrad").map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_cities_keep_document_order() {
        let data = sample();
        let keys: Vec<&str> = data.city_keys().collect();
        assert_eq!(keys, vec!["kaliningrad", "grodno"]);
        assert_eq!(data.city("grodno").unwrap().center, (53.6694, 23.8131));
    }

    #[test]
    fn test_max_order_per_city() {
        let data = sample();
        assert_eq!(data.max_order("kaliningrad"), 3);
        assert_eq!(data.max_order("grodno"), 5);
        assert_eq!(data.max_order("minsk"), 0);
    }

    #[test]
    fn test_lookups() {
        let data = sample();
        assert_eq!(data.place("k2").unwrap().title, "King's Gate");
        assert_eq!(data.place_at("grodno", 4).unwrap().id, "g4");
        assert!(data.place_at("grodno", 6).is_none());
        assert!(data.place("g3").unwrap().quiz.is_none());
        assert!(data.place("k3").unwrap().quiz.as_ref().unwrap().is_correct(2));
    }

    #[test]
    fn test_malformed_document() {
        let err = Dataset::parse(b"{\"places\": [".to_vec()).unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed(_)));
    }

    #[test]
    fn test_missing_file_is_unreachable() {
        let err = Dataset::load(Path::new("/nonexistent/places.json")).unwrap_err();
        assert!(matches!(err, DataLoadError::Unreachable { .. }));
    }

    #[test]
    fn test_rejects_duplicate_order() {
        let doc = SAMPLE.replace("\"order\": 3, \"title\": \"Fishing", "\"order\": 2, \"title\": \"Fishing");
        let err = Dataset::parse(doc.into_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid(_)));
    }

    #[test]
    fn test_rejects_out_of_range_answer() {
        let doc = SAMPLE.replace("\"correctIndex\": 2", "\"correctIndex\": 3");
        let err = Dataset::parse(doc.into_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_city() {
        let doc = SAMPLE.replace("\"city\": \"grodno\", \"order\": 5", "\"city\": \"minsk\", \"order\": 5");
        let err = Dataset::parse(doc.into_bytes()).unwrap_err();
        assert!(matches!(err, DataLoadError::Invalid(_)));
    }
}
