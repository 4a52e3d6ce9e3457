use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Region sentinel meaning "no specific city".
pub const NATIONWIDE: &str = "全国";

/// Whole-country default view.
pub const NATIONWIDE_CENTER: Coordinate = Coordinate {
    lng: 104.195_397,
    lat: 35.861_66,
};
pub const NATIONWIDE_ZOOM: u8 = 4;

/// Zoom after a city has been resolved.
pub const CITY_ZOOM: u8 = 11;

/// Zoom when focusing a single place (search hit, existing position).
pub const FOCUS_ZOOM: u8 = 15;

/// A longitude/latitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lng, self.lat)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid coordinate: {0:?}")]
pub struct ParseCoordinateError(String);

/// Parses the provider's `"lng,lat"` wire form.
impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordinateError(s.to_string());
        let (lng, lat) = s.split_once(',').ok_or_else(err)?;
        let lng: f64 = lng.trim().parse().map_err(|_| err())?;
        let lat: f64 = lat.trim().parse().map_err(|_| err())?;
        if !lng.is_finite() || !lat.is_finite() {
            return Err(err());
        }
        Ok(Self { lng, lat })
    }
}

/// A named place produced by keyword search or reverse geocoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub address: String,
    pub coordinate: Coordinate,
}

/// True when `city` names something the geocoder should resolve.
pub fn is_specific_city(city: &str) -> bool {
    let city = city.trim();
    !city.is_empty() && city != NATIONWIDE
}
