use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::geo::{Coordinate, PlaceResult, CITY_ZOOM};
use crate::settings::ProviderCredentials;

/// Callback receiving a coordinate from a map click or a marker drag.
pub type CoordinateHandler = Arc<dyn Fn(Coordinate) + Send + Sync>;

/// Only the flat view is used; the provider also has a tilted 3D mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "2D")]
    TwoD,
}

/// Map surface constructor options.
#[derive(Clone, Debug)]
pub struct MapOptions {
    /// Initial center; the provider picks its own default when absent.
    pub center: Option<Coordinate>,
    pub zoom: u8,
    pub view_mode: ViewMode,
    pub resize_enable: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: None,
            zoom: CITY_ZOOM,
            view_mode: ViewMode::TwoD,
            resize_enable: true,
        }
    }
}

/// On-map widgets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapControl {
    ControlBar { right_px: u32, top_px: u32 },
    Scale,
}

#[derive(Clone, Debug)]
pub struct MarkerOptions {
    pub position: Coordinate,
    pub draggable: bool,
}

/// Place-search service options.
#[derive(Clone, Debug)]
pub struct PlaceSearchOptions {
    pub city: String,
    pub page_size: u32,
    pub page_index: u32,
    /// `"all"` returns full POI details, including the address.
    pub extensions: String,
}

impl PlaceSearchOptions {
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            page_size: 5,
            page_index: 1,
            extensions: "all".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GeocoderOptions {
    pub city: String,
}

/// An interactive map instance rendered into an anchor.
pub trait MapSurface: Send {
    fn center(&self) -> Coordinate;
    fn set_center(&mut self, center: Coordinate);
    fn zoom(&self) -> u8;
    fn set_zoom(&mut self, zoom: u8);
    fn add_control(&mut self, control: MapControl);
    fn on_click(&mut self, handler: CoordinateHandler);
    /// Creates a marker attached to this map.
    fn add_marker(&mut self, options: &MarkerOptions) -> Box<dyn Marker>;
    /// Releases the native map. Further calls are no-ops.
    fn destroy(&mut self);
}

pub trait Marker: Send {
    fn position(&self) -> Coordinate;
    fn set_position(&mut self, position: Coordinate);
    fn on_drag_end(&mut self, handler: CoordinateHandler);
}

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Keyword search, results in provider ranking order.
    async fn search(&self, keyword: &str) -> Result<Vec<PlaceResult>, ProviderError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Forward geocode.
    async fn locate(&self, address: &str) -> Result<Vec<Coordinate>, ProviderError>;
    /// Reverse geocode to a formatted address.
    async fn reverse(&self, coordinate: Coordinate) -> Result<String, ProviderError>;
}

/// The mapping SDK: script bootstrap plus constructors for every native handle.
#[async_trait]
pub trait MapProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches and evaluates the provider script. Callers guarantee this runs
    /// at most once per process.
    async fn load_script(&self, credentials: &ProviderCredentials) -> Result<(), ProviderError>;

    fn has_anchor(&self, anchor: &str) -> bool;

    fn create_map(
        &self,
        anchor: &str,
        options: &MapOptions,
    ) -> Result<Box<dyn MapSurface>, ProviderError>;

    fn create_place_search(&self, options: &PlaceSearchOptions) -> Arc<dyn PlaceSearch>;

    fn create_geocoder(&self, options: &GeocoderOptions) -> Arc<dyn Geocoder>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_options_defaults() {
        let opts = MapOptions::default();
        assert!(opts.center.is_none());
        assert_eq!(opts.zoom, 11);
        assert_eq!(opts.view_mode, ViewMode::TwoD);
        assert!(opts.resize_enable);
    }

    #[test]
    fn place_search_defaults() {
        let opts = PlaceSearchOptions::for_city("Beijing");
        assert_eq!(opts.city, "Beijing");
        assert_eq!(opts.page_size, 5);
        assert_eq!(opts.page_index, 1);
        assert_eq!(opts.extensions, "all");
    }

    #[test]
    fn view_mode_serde() {
        assert_eq!(serde_json::to_string(&ViewMode::TwoD).unwrap(), "\"2D\"");
    }

    #[test]
    fn control_serde() {
        let json = serde_json::to_value(MapControl::ControlBar {
            right_px: 10,
            top_px: 10,
        })
        .unwrap();
        assert_eq!(json["type"], "control_bar");
        assert_eq!(json["right_px"], 10);
    }
}
