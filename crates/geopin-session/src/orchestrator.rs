//! Orchestrator: owns the add and edit sessions and routes UI actions to them.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use geopin_core::errors::MapError;
use geopin_core::geo::{Coordinate, PlaceResult, NATIONWIDE};
use geopin_core::ids::{SessionKind, SessionStatus};
use geopin_core::notices::MapNotice;
use geopin_core::provider::{CoordinateHandler, MapProvider};
use geopin_core::settings::GeopinSettings;

use crate::loader::ScriptLoader;
use crate::session::{CityCentering, GeoSession, LocationHandler, SessionInit};

const NOTICE_CAPACITY: usize = 64;

/// Coordinator for the two map dialogs.
///
/// Both sessions share one [`ScriptLoader`] and nothing else. A destroyed
/// session is replaced by a fresh one the next time its dialog opens.
pub struct MapOrchestrator {
    provider: Arc<dyn MapProvider>,
    loader: Arc<ScriptLoader>,
    notices: broadcast::Sender<MapNotice>,
    /// Service region: default city for the add dialog and the search scope for edits.
    region: String,
    add: Mutex<Arc<GeoSession>>,
    edit: Mutex<Arc<GeoSession>>,
}

impl MapOrchestrator {
    pub fn new(provider: Arc<dyn MapProvider>, loader: Arc<ScriptLoader>, region: impl Into<String>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let add = Self::build(SessionKind::Add, &provider, &loader, &notices);
        let edit = Self::build(SessionKind::Edit, &provider, &loader, &notices);
        Self {
            provider,
            loader,
            notices,
            region: region.into(),
            add: Mutex::new(add),
            edit: Mutex::new(edit),
        }
    }

    /// Wire a loader from the configured credentials.
    pub fn from_settings(provider: Arc<dyn MapProvider>, settings: &GeopinSettings) -> Self {
        let loader = Arc::new(ScriptLoader::new(Arc::clone(&provider), settings.credentials()));
        Self::new(provider, loader, settings.service.region.clone())
    }

    /// Subscribe to user-facing notices from both sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<MapNotice> {
        self.notices.subscribe()
    }

    /// True once the provider script is available.
    pub fn map_loaded(&self) -> bool {
        self.loader.is_loaded()
    }

    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.loader
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Current session for `kind`.
    pub fn session(&self, kind: SessionKind) -> Arc<GeoSession> {
        Arc::clone(&self.slot(kind).lock())
    }

    /// Open the add dialog's map. The city is `initial_city`, else the
    /// service region, else the whole country.
    #[instrument(skip(self, on_map_click, on_location_resolved))]
    pub async fn init_add_session(
        &self,
        anchor: &str,
        initial_city: Option<&str>,
        on_map_click: CoordinateHandler,
        on_location_resolved: LocationHandler,
    ) -> Result<(), MapError> {
        let city = initial_city
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_city());
        let session = self.fresh_session(SessionKind::Add);
        session
            .init(SessionInit {
                anchor: anchor.to_string(),
                city,
                position: None,
                on_map_click,
                on_location_resolved,
            })
            .await
    }

    /// Open the edit dialog's map, centered on the record's existing position if it has one.
    #[instrument(skip(self, on_map_click, on_location_resolved))]
    pub async fn init_edit_session(
        &self,
        anchor: &str,
        position: Option<Coordinate>,
        on_map_click: CoordinateHandler,
        on_location_resolved: LocationHandler,
    ) -> Result<(), MapError> {
        let session = self.fresh_session(SessionKind::Edit);
        session
            .init(SessionInit {
                anchor: anchor.to_string(),
                city: self.default_city(),
                position,
                on_map_click,
                on_location_resolved,
            })
            .await
    }

    pub async fn search_add<F>(&self, keyword: &str, on_found: F) -> Result<Option<PlaceResult>, MapError>
    where
        F: FnOnce(&PlaceResult) + Send,
    {
        self.session(SessionKind::Add).search(keyword, on_found).await
    }

    pub async fn search_edit<F>(&self, keyword: &str, on_found: F) -> Result<Option<PlaceResult>, MapError>
    where
        F: FnOnce(&PlaceResult) + Send,
    {
        self.session(SessionKind::Edit).search(keyword, on_found).await
    }

    pub async fn handle_add_click<F>(&self, at: Coordinate, on_resolved: F) -> Result<(), MapError>
    where
        F: FnOnce(String, Coordinate) + Send,
    {
        self.session(SessionKind::Add).handle_click(at, on_resolved).await
    }

    pub async fn handle_edit_click<F>(&self, at: Coordinate, on_resolved: F) -> Result<(), MapError>
    where
        F: FnOnce(String, Coordinate) + Send,
    {
        self.session(SessionKind::Edit).handle_click(at, on_resolved).await
    }

    /// Re-center the add dialog's map when the user picks a different city.
    pub async fn set_add_city(&self, city: &str) -> Result<CityCentering, MapError> {
        self.session(SessionKind::Add).set_center_by_city(city).await
    }

    pub fn destroy_add(&self) {
        self.session(SessionKind::Add).destroy();
    }

    pub fn destroy_edit(&self) {
        self.session(SessionKind::Edit).destroy();
    }

    fn default_city(&self) -> String {
        if self.region.is_empty() {
            NATIONWIDE.to_string()
        } else {
            self.region.clone()
        }
    }

    fn slot(&self, kind: SessionKind) -> &Mutex<Arc<GeoSession>> {
        match kind {
            SessionKind::Add => &self.add,
            SessionKind::Edit => &self.edit,
        }
    }

    /// The session to initialize for `kind`, replacing a destroyed one.
    fn fresh_session(&self, kind: SessionKind) -> Arc<GeoSession> {
        let mut slot = self.slot(kind).lock();
        if slot.status() == SessionStatus::Destroyed {
            *slot = Self::build(kind, &self.provider, &self.loader, &self.notices);
            debug!(session = %kind, id = %slot.id(), "replaced destroyed session");
        }
        Arc::clone(&slot)
    }

    fn build(
        kind: SessionKind,
        provider: &Arc<dyn MapProvider>,
        loader: &Arc<ScriptLoader>,
        notices: &broadcast::Sender<MapNotice>,
    ) -> Arc<GeoSession> {
        Arc::new(GeoSession::new(
            kind,
            Arc::clone(provider),
            Arc::clone(loader),
            notices.clone(),
        ))
    }
}
