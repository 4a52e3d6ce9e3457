//! Headless map surfaces.
//!
//! `MapPage` stands in for the host page: it owns the named anchors maps are
//! mounted into, exposes what each mounted map currently shows, and lets the
//! host dispatch user input (clicks, marker drags) into them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use geopin_core::errors::ProviderError;
use geopin_core::geo::Coordinate;
use geopin_core::provider::{
    CoordinateHandler, MapControl, MapOptions, MapSurface, Marker, MarkerOptions, ViewMode,
};

/// Observable state of one mounted map.
#[derive(Clone, Debug, PartialEq)]
pub struct MapSnapshot {
    pub center: Coordinate,
    pub zoom: u8,
    pub view_mode: ViewMode,
    pub resize_enable: bool,
    pub controls: Vec<MapControl>,
    pub markers: Vec<Coordinate>,
    pub destroyed: bool,
}

struct MarkerState {
    position: Coordinate,
    draggable: bool,
    drag_handlers: Vec<CoordinateHandler>,
}

struct ViewState {
    center: Coordinate,
    zoom: u8,
    view_mode: ViewMode,
    resize_enable: bool,
    controls: Vec<MapControl>,
    markers: Vec<Arc<Mutex<MarkerState>>>,
    click_handlers: Vec<CoordinateHandler>,
    destroyed: bool,
}

impl ViewState {
    fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            center: self.center,
            zoom: self.zoom,
            view_mode: self.view_mode,
            resize_enable: self.resize_enable,
            controls: self.controls.clone(),
            markers: self.markers.iter().map(|m| m.lock().position).collect(),
            destroyed: self.destroyed,
        }
    }
}

#[derive(Default)]
struct PageState {
    anchors: HashMap<String, Option<Arc<Mutex<ViewState>>>>,
}

/// Shared handle to the host page.
#[derive(Clone, Default)]
pub struct MapPage {
    state: Arc<Mutex<PageState>>,
    maps_created: Arc<AtomicUsize>,
}

impl MapPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page with the given anchors already present.
    pub fn with_anchors<'a>(anchors: impl IntoIterator<Item = &'a str>) -> Self {
        let page = Self::new();
        for anchor in anchors {
            page.add_anchor(anchor);
        }
        page
    }

    pub fn add_anchor(&self, anchor: &str) {
        let _ = self
            .state
            .lock()
            .anchors
            .entry(anchor.to_string())
            .or_insert(None);
    }

    pub fn has_anchor(&self, anchor: &str) -> bool {
        self.state.lock().anchors.contains_key(anchor)
    }

    /// Total map surfaces ever mounted on this page.
    pub fn maps_created(&self) -> usize {
        self.maps_created.load(Ordering::Relaxed)
    }

    /// Mounted maps that have not been destroyed.
    pub fn live_maps(&self) -> usize {
        self.state
            .lock()
            .anchors
            .values()
            .flatten()
            .filter(|v| !v.lock().destroyed)
            .count()
    }

    pub fn snapshot(&self, anchor: &str) -> Option<MapSnapshot> {
        let view = self.view(anchor)?;
        let snapshot = view.lock().snapshot();
        Some(snapshot)
    }

    /// Dispatch a user click. Returns false if no live map is mounted there.
    pub fn click(&self, anchor: &str, at: Coordinate) -> bool {
        let Some(view) = self.view(anchor) else {
            return false;
        };
        let handlers = {
            let view = view.lock();
            if view.destroyed {
                return false;
            }
            view.click_handlers.clone()
        };
        for handler in handlers {
            handler(at);
        }
        true
    }

    /// Drag the most recently placed marker to `to` and fire its drag-end handlers.
    pub fn drag_marker(&self, anchor: &str, to: Coordinate) -> bool {
        let Some(view) = self.view(anchor) else {
            return false;
        };
        let marker = {
            let view = view.lock();
            if view.destroyed {
                return false;
            }
            match view.markers.last() {
                Some(m) => Arc::clone(m),
                None => return false,
            }
        };
        let handlers = {
            let mut marker = marker.lock();
            if !marker.draggable {
                return false;
            }
            marker.position = to;
            marker.drag_handlers.clone()
        };
        for handler in handlers {
            handler(to);
        }
        true
    }

    pub(crate) fn mount(
        &self,
        anchor: &str,
        options: &MapOptions,
    ) -> Result<Box<dyn MapSurface>, ProviderError> {
        let mut page = self.state.lock();
        let slot = page
            .anchors
            .get_mut(anchor)
            .ok_or_else(|| ProviderError::Script(format!("anchor {anchor} is not on the page")))?;

        let view = Arc::new(Mutex::new(ViewState {
            center: options.center.unwrap_or(geopin_core::geo::NATIONWIDE_CENTER),
            zoom: options.zoom,
            view_mode: options.view_mode,
            resize_enable: options.resize_enable,
            controls: Vec::new(),
            markers: Vec::new(),
            click_handlers: Vec::new(),
            destroyed: false,
        }));
        *slot = Some(Arc::clone(&view));
        let _ = self.maps_created.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(HeadlessMap { view }))
    }

    fn view(&self, anchor: &str) -> Option<Arc<Mutex<ViewState>>> {
        self.state.lock().anchors.get(anchor).cloned().flatten()
    }
}

/// A map surface mounted on a [`MapPage`] anchor.
pub struct HeadlessMap {
    view: Arc<Mutex<ViewState>>,
}

impl MapSurface for HeadlessMap {
    fn center(&self) -> Coordinate {
        self.view.lock().center
    }

    fn set_center(&mut self, center: Coordinate) {
        self.view.lock().center = center;
    }

    fn zoom(&self) -> u8 {
        self.view.lock().zoom
    }

    fn set_zoom(&mut self, zoom: u8) {
        self.view.lock().zoom = zoom;
    }

    fn add_control(&mut self, control: MapControl) {
        self.view.lock().controls.push(control);
    }

    fn on_click(&mut self, handler: CoordinateHandler) {
        self.view.lock().click_handlers.push(handler);
    }

    fn add_marker(&mut self, options: &MarkerOptions) -> Box<dyn Marker> {
        let state = Arc::new(Mutex::new(MarkerState {
            position: options.position,
            draggable: options.draggable,
            drag_handlers: Vec::new(),
        }));
        self.view.lock().markers.push(Arc::clone(&state));
        Box::new(HeadlessMarker { state })
    }

    fn destroy(&mut self) {
        let mut view = self.view.lock();
        view.destroyed = true;
        view.markers.clear();
        view.click_handlers.clear();
    }
}

pub struct HeadlessMarker {
    state: Arc<Mutex<MarkerState>>,
}

impl Marker for HeadlessMarker {
    fn position(&self) -> Coordinate {
        self.state.lock().position
    }

    fn set_position(&mut self, position: Coordinate) {
        self.state.lock().position = position;
    }

    fn on_drag_end(&mut self, handler: CoordinateHandler) {
        self.state.lock().drag_handlers.push(handler);
    }
}
