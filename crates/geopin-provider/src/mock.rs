use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use geopin_core::errors::ProviderError;
use geopin_core::geo::{Coordinate, PlaceResult};
use geopin_core::ids::SessionKind;
use geopin_core::provider::{
    Geocoder, GeocoderOptions, MapOptions, MapProvider, MapSurface, PlaceSearch,
    PlaceSearchOptions,
};
use geopin_core::settings::ProviderCredentials;

use crate::headless::MapPage;

/// Pre-programmed reply for deterministic testing without network calls.
#[derive(Clone, Debug)]
pub enum MockReply<T> {
    Ready(Result<T, ProviderError>),
    /// Wait a duration, then yield the inner reply.
    Delay(Duration, Box<MockReply<T>>),
}

impl<T: Clone> MockReply<T> {
    pub fn ok(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    pub fn err(error: ProviderError) -> Self {
        Self::Ready(Err(error))
    }

    pub fn delayed(delay: Duration, inner: MockReply<T>) -> Self {
        Self::Delay(delay, Box::new(inner))
    }

    /// Unrolls nested delays iteratively to avoid recursive async.
    async fn resolve(&self) -> Result<T, ProviderError> {
        let mut current = self;
        loop {
            match current {
                Self::Ready(result) => return result.clone(),
                Self::Delay(duration, inner) => {
                    tokio::time::sleep(*duration).await;
                    current = inner;
                }
            }
        }
    }
}

struct MockState {
    script: Mutex<MockReply<()>>,
    cities: Mutex<HashMap<String, MockReply<Vec<Coordinate>>>>,
    places: Mutex<HashMap<String, MockReply<Vec<PlaceResult>>>>,
    reverse: Mutex<MockReply<String>>,
    script_loads: AtomicUsize,
    geocodes: AtomicUsize,
    searches: AtomicUsize,
    reverses: AtomicUsize,
    geocoder_cities: Mutex<Vec<String>>,
    search_cities: Mutex<Vec<String>>,
}

/// Scripted provider backed by a headless [`MapPage`].
///
/// Unknown cities and keywords resolve to an empty result list.
#[derive(Clone)]
pub struct MockProvider {
    page: MapPage,
    state: Arc<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Script loads succeed; both default session anchors exist.
    pub fn new() -> Self {
        Self::with_page(MapPage::with_anchors([
            SessionKind::Add.default_anchor(),
            SessionKind::Edit.default_anchor(),
        ]))
    }

    pub fn with_page(page: MapPage) -> Self {
        Self {
            page,
            state: Arc::new(MockState {
                script: Mutex::new(MockReply::ok(())),
                cities: Mutex::new(HashMap::new()),
                places: Mutex::new(HashMap::new()),
                reverse: Mutex::new(MockReply::err(ProviderError::Service {
                    code: "mock".into(),
                    info: "no reverse geocode configured".into(),
                })),
                script_loads: AtomicUsize::new(0),
                geocodes: AtomicUsize::new(0),
                searches: AtomicUsize::new(0),
                reverses: AtomicUsize::new(0),
                geocoder_cities: Mutex::new(Vec::new()),
                search_cities: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_script(self, reply: MockReply<()>) -> Self {
        *self.state.script.lock() = reply;
        self
    }

    pub fn with_city(self, city: &str, at: Coordinate) -> Self {
        self.with_city_reply(city, MockReply::ok(vec![at]))
    }

    pub fn with_city_reply(self, city: &str, reply: MockReply<Vec<Coordinate>>) -> Self {
        let _ = self.state.cities.lock().insert(city.to_string(), reply);
        self
    }

    pub fn with_place(self, keyword: &str, place: PlaceResult) -> Self {
        self.with_search_reply(keyword, MockReply::ok(vec![place]))
    }

    pub fn with_search_reply(self, keyword: &str, reply: MockReply<Vec<PlaceResult>>) -> Self {
        let _ = self.state.places.lock().insert(keyword.to_string(), reply);
        self
    }

    pub fn with_reverse(self, reply: MockReply<String>) -> Self {
        *self.state.reverse.lock() = reply;
        self
    }

    pub fn page(&self) -> &MapPage {
        &self.page
    }

    pub fn script_loads(&self) -> usize {
        self.state.script_loads.load(Ordering::Relaxed)
    }

    pub fn geocodes(&self) -> usize {
        self.state.geocodes.load(Ordering::Relaxed)
    }

    pub fn searches(&self) -> usize {
        self.state.searches.load(Ordering::Relaxed)
    }

    pub fn reverses(&self) -> usize {
        self.state.reverses.load(Ordering::Relaxed)
    }

    /// City scope of every geocoder created so far.
    pub fn geocoder_cities(&self) -> Vec<String> {
        self.state.geocoder_cities.lock().clone()
    }

    /// City scope of every place-search service created so far.
    pub fn search_cities(&self) -> Vec<String> {
        self.state.search_cities.lock().clone()
    }
}

#[async_trait]
impl MapProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load_script(&self, _credentials: &ProviderCredentials) -> Result<(), ProviderError> {
        let _ = self.state.script_loads.fetch_add(1, Ordering::Relaxed);
        let reply = self.state.script.lock().clone();
        reply.resolve().await
    }

    fn has_anchor(&self, anchor: &str) -> bool {
        self.page.has_anchor(anchor)
    }

    fn create_map(
        &self,
        anchor: &str,
        options: &MapOptions,
    ) -> Result<Box<dyn MapSurface>, ProviderError> {
        self.page.mount(anchor, options)
    }

    fn create_place_search(&self, options: &PlaceSearchOptions) -> Arc<dyn PlaceSearch> {
        self.state.search_cities.lock().push(options.city.clone());
        Arc::new(MockPlaceSearch {
            state: Arc::clone(&self.state),
        })
    }

    fn create_geocoder(&self, options: &GeocoderOptions) -> Arc<dyn Geocoder> {
        self.state.geocoder_cities.lock().push(options.city.clone());
        Arc::new(MockGeocoder {
            state: Arc::clone(&self.state),
        })
    }
}

struct MockPlaceSearch {
    state: Arc<MockState>,
}

#[async_trait]
impl PlaceSearch for MockPlaceSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<PlaceResult>, ProviderError> {
        let _ = self.state.searches.fetch_add(1, Ordering::Relaxed);
        let reply = self.state.places.lock().get(keyword).cloned();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }
}

struct MockGeocoder {
    state: Arc<MockState>,
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn locate(&self, address: &str) -> Result<Vec<Coordinate>, ProviderError> {
        let _ = self.state.geocodes.fetch_add(1, Ordering::Relaxed);
        let reply = self.state.cities.lock().get(address).cloned();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn reverse(&self, _coordinate: Coordinate) -> Result<String, ProviderError> {
        let _ = self.state.reverses.fetch_add(1, Ordering::Relaxed);
        let reply = self.state.reverse.lock().clone();
        reply.resolve().await
    }
}
