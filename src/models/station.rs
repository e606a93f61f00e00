use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// A GeoJSON position: longitude, latitude and an optional altitude.
pub type Position = Vec<f64>;

/// Station location as published in the station list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

impl Geometry {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Geometry::Point {
            coordinates: vec![longitude, latitude],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
        }
    }

    /// Check every position and ring of the geometry.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Geometry::Point { coordinates } => check_position(coordinates),
            Geometry::MultiPoint { coordinates } => check_positions(coordinates, 1),
            Geometry::LineString { coordinates } => check_positions(coordinates, 2),
            Geometry::MultiLineString { coordinates } => coordinates
                .iter()
                .try_for_each(|line| check_positions(line, 2)),
            Geometry::Polygon { coordinates } => check_polygon(coordinates),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().try_for_each(|p| check_polygon(p))
            }
        }
    }
}

fn check_position(position: &Position) -> Result<(), String> {
    if position.len() < 2 {
        return Err(format!(
            "position needs at least 2 coordinates, got {}",
            position.len()
        ));
    }
    if position.iter().any(|c| !c.is_finite()) {
        return Err(format!("position {:?} has a non-finite coordinate", position));
    }

    let (longitude, latitude) = (position[0], position[1]);
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude {} out of range", longitude));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude {} out of range", latitude));
    }
    Ok(())
}

fn check_positions(positions: &[Position], min_len: usize) -> Result<(), String> {
    if positions.len() < min_len {
        return Err(format!(
            "expected at least {} positions, got {}",
            min_len,
            positions.len()
        ));
    }
    positions.iter().try_for_each(check_position)
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), String> {
    if rings.is_empty() {
        return Err("polygon has no rings".to_string());
    }
    rings.iter().try_for_each(|ring| check_positions(ring, 4))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub code: String,

    /// Display name with broker-forbidden characters already removed
    pub name: String,

    pub location: Geometry,
}

impl Station {
    pub fn new(code: String, name: String, location: Geometry) -> Self {
        Self {
            code,
            name,
            location,
        }
    }
}

/// Stations known for the current run, keyed by code, remembering source order.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: HashMap<String, Station>,
    order: Vec<String>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a station, returning the entry it replaced if the code was already known.
    pub fn insert(&mut self, station: Station) -> Option<Station> {
        let code = station.code.clone();
        let previous = self.stations.insert(code.clone(), station);
        if previous.is_none() {
            self.order.push(code);
        }
        previous
    }

    pub fn get(&self, code: &str) -> Option<&Station> {
        self.stations.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.stations.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.order.iter().filter_map(|code| self.stations.get(code))
    }
}

impl FromIterator<Station> for StationRegistry {
    fn from_iter<I: IntoIterator<Item = Station>>(iter: I) -> Self {
        let mut registry = StationRegistry::new();
        for station in iter {
            registry.insert(station);
        }
        registry
    }
}
