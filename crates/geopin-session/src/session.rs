//! One interactive map session (the add dialog or the edit dialog).
//!
//! A session exclusively owns its map, marker, place-search service, and
//! geocoder. Network calls run without holding the session lock; their results
//! are applied only if the session is still `Ready` when they arrive, so a
//! response that lands after `destroy()` is dropped instead of touching
//! released handles.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use geopin_core::errors::MapError;
use geopin_core::geo::{
    is_specific_city, Coordinate, PlaceResult, CITY_ZOOM, FOCUS_ZOOM, NATIONWIDE_CENTER,
    NATIONWIDE_ZOOM,
};
use geopin_core::ids::{SessionId, SessionKind, SessionStatus};
use geopin_core::notices::{MapNotice, NoticeLevel};
use geopin_core::provider::{
    CoordinateHandler, Geocoder, GeocoderOptions, MapControl, MapOptions, MapProvider,
    MapSurface, Marker, MarkerOptions, PlaceSearch, PlaceSearchOptions,
};

use crate::loader::ScriptLoader;

/// Receives the reverse-geocoded address (possibly empty) and the coordinate.
pub type LocationHandler = Arc<dyn Fn(String, Coordinate) + Send + Sync>;

/// Parameters for [`GeoSession::init`].
#[derive(Clone)]
pub struct SessionInit {
    pub anchor: String,
    /// Scopes search and geocoding; also the initial view when no position is given.
    pub city: String,
    /// Existing position of the record being edited.
    pub position: Option<Coordinate>,
    pub on_map_click: CoordinateHandler,
    /// Fired after the marker is dragged, once its new position is resolved.
    pub on_location_resolved: LocationHandler,
}

/// Outcome of centering on a city by name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CityCentering {
    /// Empty city: nothing changed.
    Skipped,
    Resolved(Coordinate),
    /// City unknown to the geocoder; the whole-country view is shown.
    Fallback,
}

struct Handles {
    map: Box<dyn MapSurface>,
    marker: Option<Box<dyn Marker>>,
    search: Arc<dyn PlaceSearch>,
    geocoder: Arc<dyn Geocoder>,
}

impl Handles {
    /// At most one marker per session: an existing marker is moved, never duplicated.
    fn place_marker(&mut self, at: Coordinate, on_drag_end: Option<&CoordinateHandler>) {
        if let Some(marker) = self.marker.as_mut() {
            marker.set_position(at);
            return;
        }
        let mut marker = self.map.add_marker(&MarkerOptions {
            position: at,
            draggable: true,
        });
        if let Some(handler) = on_drag_end {
            marker.on_drag_end(Arc::clone(handler));
        }
        self.marker = Some(marker);
    }

    fn focus(&mut self, at: Coordinate, zoom: u8) {
        self.map.set_center(at);
        self.map.set_zoom(zoom);
    }

    fn release(mut self) {
        self.map.destroy();
    }
}

struct SessionState {
    status: SessionStatus,
    handles: Option<Handles>,
    city: String,
    on_drag_end: Option<CoordinateHandler>,
}

pub struct GeoSession {
    id: SessionId,
    kind: SessionKind,
    provider: Arc<dyn MapProvider>,
    loader: Arc<ScriptLoader>,
    notices: broadcast::Sender<MapNotice>,
    state: Arc<Mutex<SessionState>>,
}

impl GeoSession {
    pub fn new(
        kind: SessionKind,
        provider: Arc<dyn MapProvider>,
        loader: Arc<ScriptLoader>,
        notices: broadcast::Sender<MapNotice>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            provider,
            loader,
            notices,
            state: Arc::new(Mutex::new(SessionState {
                status: SessionStatus::Uninitialized,
                handles: None,
                city: String::new(),
                on_drag_end: None,
            })),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn city(&self) -> String {
        self.state.lock().city.clone()
    }

    pub fn center(&self) -> Option<Coordinate> {
        self.state.lock().handles.as_ref().map(|h| h.map.center())
    }

    pub fn zoom(&self) -> Option<u8> {
        self.state.lock().handles.as_ref().map(|h| h.map.zoom())
    }

    pub fn marker_position(&self) -> Option<Coordinate> {
        let state = self.state.lock();
        state.handles.as_ref()?.marker.as_ref().map(|m| m.position())
    }

    /// Load the provider script if needed, mount the map, and apply the initial view.
    ///
    /// On failure the session returns to `Uninitialized` with nothing mounted,
    /// exactly one `map_load_failed` notice is emitted, and `init` may be retried.
    pub async fn init(&self, params: SessionInit) -> Result<(), MapError> {
        {
            let mut state = self.state.lock();
            match state.status {
                SessionStatus::Uninitialized => state.status = SessionStatus::Initializing,
                SessionStatus::Initializing | SessionStatus::Ready => {
                    return Err(MapError::AlreadyInitialized(self.kind));
                }
                SessionStatus::Destroyed => return Err(MapError::SessionDestroyed(self.kind)),
            }
        }
        tracing::info!(session = %self.kind, id = %self.id, anchor = %params.anchor, city = %params.city, "initializing map session");

        let loaded = self.loader.ensure_loaded().await;
        if self.status() != SessionStatus::Initializing {
            tracing::debug!(session = %self.kind, "session destroyed while the script loaded");
            return Err(MapError::SessionDestroyed(self.kind));
        }
        if let Err(e) = loaded {
            return Err(self.fail_init(e));
        }

        let mut handles = match self.mount(&params) {
            Ok(handles) => handles,
            Err(e) => return Err(self.fail_init(e)),
        };

        let on_drag_end = self.drag_resolver(
            Arc::clone(&handles.geocoder),
            Arc::clone(&params.on_location_resolved),
        );

        // Centering priority: existing position, then a specific city, then nationwide.
        let mut warning = None;
        if let Some(position) = params.position {
            handles.focus(position, FOCUS_ZOOM);
            handles.place_marker(position, on_drag_end.as_ref());
        } else if is_specific_city(&params.city) {
            let found = resolve_city(handles.geocoder.as_ref(), &params.city).await;
            if self.apply_city(&mut handles, &params.city, found) == CityCentering::Fallback {
                warning = Some(MapNotice::CityNotFound {
                    session: self.kind,
                    city: params.city.clone(),
                });
            }
        } else {
            handles.focus(NATIONWIDE_CENTER, NATIONWIDE_ZOOM);
        }

        {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Initializing {
                drop(state);
                tracing::debug!(session = %self.kind, "session destroyed during init, releasing map");
                handles.release();
                return Err(MapError::SessionDestroyed(self.kind));
            }
            state.handles = Some(handles);
            state.city = params.city;
            state.on_drag_end = on_drag_end;
            state.status = SessionStatus::Ready;
        }

        if let Some(warning) = warning {
            self.notify(warning);
        }
        self.notify(MapNotice::MapReady { session: self.kind });
        Ok(())
    }

    /// Forward-geocode `city` and center there at city zoom, falling back to
    /// the whole-country view (with a warning) when the city is unknown.
    pub async fn set_center_by_city(&self, city: &str) -> Result<CityCentering, MapError> {
        if city.trim().is_empty() {
            return Ok(CityCentering::Skipped);
        }
        let geocoder = self.ready(|h| Arc::clone(&h.geocoder))?;
        let found = resolve_city(geocoder.as_ref(), city).await;

        let outcome = {
            let mut state = self.state.lock();
            let Some(handles) = live_handles(&mut state) else {
                tracing::debug!(session = %self.kind, city, "dropping stale city lookup");
                return Ok(CityCentering::Skipped);
            };
            self.apply_city(handles, city, found)
        };
        if outcome == CityCentering::Fallback {
            self.notify(MapNotice::CityNotFound {
                session: self.kind,
                city: city.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Keyword search. Only the first hit is used: the map centers on it at
    /// focus zoom, the marker moves there, and `on_found` receives it.
    /// No hit leaves the map untouched and emits a `location_not_found` warning.
    pub async fn search<F>(&self, keyword: &str, on_found: F) -> Result<Option<PlaceResult>, MapError>
    where
        F: FnOnce(&PlaceResult) + Send,
    {
        if keyword.trim().is_empty() {
            return Ok(None);
        }
        let search = self.ready(|h| Arc::clone(&h.search))?;

        let hits = match search.search(keyword).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(session = %self.kind, keyword, error = %e, "place search failed");
                Vec::new()
            }
        };

        let place = {
            let mut state = self.state.lock();
            let drag = state.on_drag_end.clone();
            let Some(handles) = live_handles(&mut state) else {
                tracing::debug!(session = %self.kind, keyword, "dropping stale search result");
                return Ok(None);
            };
            let Some(place) = hits.into_iter().next() else {
                drop(state);
                self.notify(MapNotice::LocationNotFound {
                    session: self.kind,
                    keyword: keyword.to_string(),
                });
                return Ok(None);
            };
            handles.focus(place.coordinate, FOCUS_ZOOM);
            handles.place_marker(place.coordinate, drag.as_ref());
            place
        };

        on_found(&place);
        Ok(Some(place))
    }

    /// Move the marker to `at`, then reverse-geocode it. `on_resolved` fires
    /// exactly once with the address, or an empty string when the lookup fails.
    /// A marker drag runs the same lookup and reports to `on_location_resolved`.
    pub async fn handle_click<F>(&self, at: Coordinate, on_resolved: F) -> Result<(), MapError>
    where
        F: FnOnce(String, Coordinate) + Send,
    {
        let geocoder = {
            let mut state = self.state.lock();
            let drag = state.on_drag_end.clone();
            let handles = self.require_ready(&mut state)?;
            handles.place_marker(at, drag.as_ref());
            Arc::clone(&handles.geocoder)
        };

        let address = reverse_address(geocoder.as_ref(), at, self.kind).await;

        if !is_ready(&self.state) {
            tracing::debug!(session = %self.kind, %at, "dropping stale reverse geocode");
            return Ok(());
        }
        on_resolved(address, at);
        Ok(())
    }

    /// Place the session's single marker at `at`, creating it on first use.
    pub fn place_or_update_marker(&self, at: Coordinate) -> Result<(), MapError> {
        let mut state = self.state.lock();
        let drag = state.on_drag_end.clone();
        let handles = self.require_ready(&mut state)?;
        handles.place_marker(at, drag.as_ref());
        Ok(())
    }

    /// Release every handle. Idempotent; a no-op on an uninitialized session.
    /// Destroying during `init` makes the in-flight init release what it built.
    pub fn destroy(&self) {
        let handles = {
            let mut state = self.state.lock();
            match state.status {
                SessionStatus::Uninitialized | SessionStatus::Destroyed => return,
                SessionStatus::Initializing | SessionStatus::Ready => {}
            }
            state.status = SessionStatus::Destroyed;
            state.on_drag_end = None;
            state.handles.take()
        };
        if let Some(handles) = handles {
            handles.release();
        }
        tracing::info!(session = %self.kind, id = %self.id, "map session destroyed");
    }

    fn mount(&self, params: &SessionInit) -> Result<Handles, MapError> {
        if !self.provider.has_anchor(&params.anchor) {
            return Err(MapError::ContainerNotFound(params.anchor.clone()));
        }
        let options = MapOptions {
            center: params.position,
            ..MapOptions::default()
        };
        let mut map = self.provider.create_map(&params.anchor, &options)?;
        map.add_control(MapControl::ControlBar {
            right_px: 10,
            top_px: 10,
        });
        map.add_control(MapControl::Scale);
        map.on_click(Arc::clone(&params.on_map_click));

        Ok(Handles {
            map,
            marker: None,
            search: self
                .provider
                .create_place_search(&PlaceSearchOptions::for_city(params.city.clone())),
            geocoder: self.provider.create_geocoder(&GeocoderOptions {
                city: params.city.clone(),
            }),
        })
    }

    /// Drag-end handler for the session marker. The lookup runs on the runtime
    /// that initialized the session and is dropped if the session is no longer
    /// ready when it completes.
    fn drag_resolver(
        &self,
        geocoder: Arc<dyn Geocoder>,
        on_resolved: LocationHandler,
    ) -> Option<CoordinateHandler> {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(session = %self.kind, "no tokio runtime, marker drags will not resolve addresses");
            return None;
        };
        let state = Arc::downgrade(&self.state);
        let kind = self.kind;
        Some(Arc::new(move |at: Coordinate| {
            let state = Weak::clone(&state);
            let geocoder = Arc::clone(&geocoder);
            let on_resolved = Arc::clone(&on_resolved);
            let _ = runtime.spawn(async move {
                let address = reverse_address(geocoder.as_ref(), at, kind).await;
                match state.upgrade() {
                    Some(state) if is_ready(&state) => on_resolved(address, at),
                    _ => tracing::debug!(session = %kind, %at, "dropping stale drag lookup"),
                }
            });
        }))
    }

    fn apply_city(&self, handles: &mut Handles, city: &str, found: Option<Coordinate>) -> CityCentering {
        match found {
            Some(at) => {
                handles.focus(at, CITY_ZOOM);
                CityCentering::Resolved(at)
            }
            None => {
                tracing::warn!(session = %self.kind, city, "city not found, showing whole country");
                handles.focus(NATIONWIDE_CENTER, NATIONWIDE_ZOOM);
                CityCentering::Fallback
            }
        }
    }

    fn fail_init(&self, error: MapError) -> MapError {
        {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Initializing {
                state.status = SessionStatus::Uninitialized;
            }
        }
        tracing::error!(session = %self.kind, error = %error, kind = error.error_kind(), "map init failed");
        self.notify(MapNotice::MapLoadFailed {
            session: self.kind,
            reason: error.to_string(),
        });
        error
    }

    fn ready<T>(&self, f: impl FnOnce(&mut Handles) -> T) -> Result<T, MapError> {
        let mut state = self.state.lock();
        let handles = self.require_ready(&mut state)?;
        Ok(f(handles))
    }

    fn require_ready<'a>(&self, state: &'a mut SessionState) -> Result<&'a mut Handles, MapError> {
        let status = state.status;
        live_handles(state).ok_or(MapError::SessionNotReady {
            session: self.kind,
            status,
        })
    }

    fn notify(&self, notice: MapNotice) {
        match notice.level() {
            NoticeLevel::Error => tracing::error!(event = notice.event_type(), session = %self.kind, "user notice"),
            NoticeLevel::Warning => tracing::warn!(event = notice.event_type(), session = %self.kind, "user notice"),
            NoticeLevel::Info => tracing::info!(event = notice.event_type(), session = %self.kind, "user notice"),
        }
        if self.notices.send(notice).is_err() {
            tracing::debug!("no notice receivers");
        }
    }
}

fn is_ready(state: &Mutex<SessionState>) -> bool {
    state.lock().status == SessionStatus::Ready
}

/// Reverse geocode; a failed lookup yields an empty address.
async fn reverse_address(geocoder: &dyn Geocoder, at: Coordinate, kind: SessionKind) -> String {
    match geocoder.reverse(at).await {
        Ok(address) => address,
        Err(e) => {
            tracing::warn!(session = %kind, %at, error = %e, "reverse geocode failed");
            String::new()
        }
    }
}

fn live_handles(state: &mut SessionState) -> Option<&mut Handles> {
    if state.status == SessionStatus::Ready {
        state.handles.as_mut()
    } else {
        None
    }
}

/// First geocode hit wins; lookup failures count as "not found".
async fn resolve_city(geocoder: &dyn Geocoder, city: &str) -> Option<Coordinate> {
    match geocoder.locate(city).await {
        Ok(hits) => hits.into_iter().next(),
        Err(e) => {
            tracing::warn!(city, error = %e, "city geocode failed");
            None
        }
    }
}
