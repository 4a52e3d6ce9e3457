//! The position record as edited by the add/edit dialogs.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, PlaceResult};

/// Form state for a position record. Map callbacks write into it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub location: String,
    pub custom_name: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl PositionDraft {
    /// Draft for editing an existing record.
    pub fn existing(id: i64, location: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: Some(id),
            location: location.into(),
            custom_name: String::new(),
            longitude: coordinate.lng,
            latitude: coordinate.lat,
        }
    }

    /// Stored coordinate, if the record has one. `(0, 0)` means unset.
    pub fn coordinate(&self) -> Option<Coordinate> {
        if self.longitude == 0.0 && self.latitude == 0.0 {
            None
        } else {
            Some(Coordinate::new(self.longitude, self.latitude))
        }
    }

    /// A keyword search hit fills the location and the coordinate.
    pub fn apply_place(&mut self, place: &PlaceResult) {
        self.location = if place.address.is_empty() {
            place.name.clone()
        } else {
            format!("{} {}", place.name, place.address)
        };
        self.set_coordinate(place.coordinate);
    }

    /// A click or drag: the coordinate always updates, the address only when resolved.
    pub fn apply_resolved(&mut self, address: &str, coordinate: Coordinate) {
        if !address.is_empty() {
            self.location = address.to_string();
        }
        self.set_coordinate(coordinate);
    }

    fn set_coordinate(&mut self, coordinate: Coordinate) {
        self.longitude = coordinate.lng;
        self.latitude = coordinate.lat;
    }

    /// Payload for create/update, with the city taken from the service region.
    pub fn submission(&self, region: &str) -> PositionSubmission {
        PositionSubmission {
            draft: self.clone(),
            city: region.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionSubmission {
    #[serde(flatten)]
    pub draft: PositionDraft,
    pub city: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place() -> PlaceResult {
        PlaceResult {
            name: "Tiananmen".into(),
            address: "Dongcheng".into(),
            coordinate: Coordinate::new(116.397, 39.908),
        }
    }

    #[test]
    fn new_draft_has_no_coordinate() {
        assert!(PositionDraft::default().coordinate().is_none());
    }

    #[test]
    fn apply_place_sets_location_and_coordinate() {
        let mut draft = PositionDraft::default();
        draft.apply_place(&place());
        assert_eq!(draft.location, "Tiananmen Dongcheng");
        assert_eq!(draft.coordinate(), Some(Coordinate::new(116.397, 39.908)));
    }

    #[test]
    fn apply_place_without_address_uses_name() {
        let mut draft = PositionDraft::default();
        let mut p = place();
        p.address.clear();
        draft.apply_place(&p);
        assert_eq!(draft.location, "Tiananmen");
    }

    #[test]
    fn empty_address_keeps_previous_location() {
        let mut draft = PositionDraft::existing(7, "Old Street", Coordinate::new(1.0, 2.0));
        draft.apply_resolved("", Coordinate::new(3.0, 4.0));
        assert_eq!(draft.location, "Old Street");
        assert_eq!(draft.longitude, 3.0);
        assert_eq!(draft.latitude, 4.0);
    }

    #[test]
    fn submission_adds_city() {
        let draft = PositionDraft::existing(7, "Somewhere", Coordinate::new(116.4, 39.9));
        let json = serde_json::to_value(draft.submission("北京市")).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["city"], "北京市");
        assert_eq!(json["location"], "Somewhere");
        assert_eq!(json["longitude"], 116.4);
    }
}
