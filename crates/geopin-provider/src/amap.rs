//! AMap provider: script bootstrap plus the REST web services for place search
//! and geocoding. Map surfaces are mounted on a headless [`MapPage`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::instrument;

use geopin_core::errors::ProviderError;
use geopin_core::geo::{Coordinate, PlaceResult};
use geopin_core::provider::{
    Geocoder, GeocoderOptions, MapOptions, MapProvider, MapSurface, PlaceSearch,
    PlaceSearchOptions,
};
use geopin_core::settings::{AmapSettings, ProviderCredentials};

use crate::headless::MapPage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SCRIPT_VERSION: &str = "2.0";
const SCRIPT_PLUGINS: &str = "AMap.PlaceSearch,AMap.Geocoder";

/// Shared by the provider and every service it creates.
struct RestClient {
    client: Client,
    base_url: String,
    key: Option<SecretString>,
    security_code: Option<SecretString>,
}

impl RestClient {
    #[instrument(skip(self, params))]
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let key = self.key.as_ref().ok_or_else(|| ProviderError::Service {
            code: "INVALID_USER_KEY".into(),
            info: "no AMap key configured".into(),
        })?;

        let mut query: Vec<(&str, String)> = vec![("key", key.expose_secret().to_string())];
        if let Some(code) = &self.security_code {
            query.push(("jscode", code.expose_secret().to_string()));
        }
        query.extend(params.iter().cloned());

        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let envelope: Envelope = serde_json::from_value(body.clone())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if envelope.status != "1" {
            return Err(ProviderError::Service {
                code: envelope.infocode,
                info: envelope.info,
            });
        }

        serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    infocode: String,
}

/// AMap encodes an absent string as `[]`.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

#[derive(Deserialize)]
struct GeoResponse {
    #[serde(default)]
    geocodes: Vec<GeoEntry>,
}

#[derive(Deserialize)]
struct GeoEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    location: String,
}

#[derive(Deserialize)]
struct RegeoResponse {
    regeocode: Option<Regeocode>,
}

#[derive(Deserialize)]
struct Regeocode {
    #[serde(default, deserialize_with = "lenient_string")]
    formatted_address: String,
}

#[derive(Deserialize)]
struct PlaceResponse {
    #[serde(default)]
    pois: Vec<Poi>,
}

#[derive(Deserialize)]
struct Poi {
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    location: String,
}

pub struct AmapProvider {
    client: Client,
    script_url: String,
    rest: Arc<RestClient>,
    page: MapPage,
}

impl AmapProvider {
    pub fn new(settings: &AmapSettings, page: MapPage) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let rest = Arc::new(RestClient {
            client: client.clone(),
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            key: settings.key.clone(),
            security_code: settings.security_code.clone(),
        });

        Ok(Self {
            client,
            script_url: settings.script_url.clone(),
            rest,
            page,
        })
    }

    pub fn page(&self) -> &MapPage {
        &self.page
    }
}

#[async_trait]
impl MapProvider for AmapProvider {
    fn name(&self) -> &str {
        "amap"
    }

    #[instrument(skip(self, credentials), fields(url = %self.script_url))]
    async fn load_script(&self, credentials: &ProviderCredentials) -> Result<(), ProviderError> {
        let resp = self
            .client
            .get(&self.script_url)
            .query(&[
                ("v", SCRIPT_VERSION),
                ("key", credentials.key.expose_secret()),
                ("plugin", SCRIPT_PLUGINS),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Script(format!("http {status}: {body}")));
        }

        let script = resp
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if script.trim().is_empty() {
            return Err(ProviderError::Script("empty script body".into()));
        }
        tracing::info!(bytes = script.len(), "map script loaded");
        Ok(())
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
        Arc::new(AmapPlaceSearch {
            rest: Arc::clone(&self.rest),
            options: options.clone(),
        })
    }

    fn create_geocoder(&self, options: &GeocoderOptions) -> Arc<dyn Geocoder> {
        Arc::new(AmapGeocoder {
            rest: Arc::clone(&self.rest),
            city: options.city.clone(),
        })
    }
}

struct AmapPlaceSearch {
    rest: Arc<RestClient>,
    options: PlaceSearchOptions,
}

#[async_trait]
impl PlaceSearch for AmapPlaceSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<PlaceResult>, ProviderError> {
        let resp: PlaceResponse = self
            .rest
            .get(
                "/v3/place/text",
                &[
                    ("keywords", keyword.to_string()),
                    ("city", self.options.city.clone()),
                    ("offset", self.options.page_size.to_string()),
                    ("page", self.options.page_index.to_string()),
                    ("extensions", self.options.extensions.clone()),
                ],
            )
            .await?;

        // POIs without a usable location cannot be placed on the map.
        Ok(resp
            .pois
            .into_iter()
            .filter_map(|poi| {
                let coordinate = poi.location.parse().ok()?;
                Some(PlaceResult {
                    name: poi.name,
                    address: poi.address,
                    coordinate,
                })
            })
            .collect())
    }
}

struct AmapGeocoder {
    rest: Arc<RestClient>,
    city: String,
}

#[async_trait]
impl Geocoder for AmapGeocoder {
    async fn locate(&self, address: &str) -> Result<Vec<Coordinate>, ProviderError> {
        let resp: GeoResponse = self
            .rest
            .get(
                "/v3/geocode/geo",
                &[
                    ("address", address.to_string()),
                    ("city", self.city.clone()),
                ],
            )
            .await?;
        Ok(resp
            .geocodes
            .iter()
            .filter_map(|g| g.location.parse().ok())
            .collect())
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<String, ProviderError> {
        let resp: RegeoResponse = self
            .rest
            .get("/v3/geocode/regeo", &[("location", coordinate.to_string())])
            .await?;
        resp.regeocode
            .map(|r| r.formatted_address)
            .ok_or_else(|| ProviderError::InvalidResponse("missing regeocode".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> AmapSettings {
        AmapSettings {
            key: Some("test-key".into()),
            security_code: Some("test-code".into()),
            script_url: format!("{}/maps", server.uri()),
            rest_base_url: server.uri(),
        }
    }

    fn provider(server: &MockServer) -> AmapProvider {
        AmapProvider::new(&settings(server), MapPage::with_anchors(["a"])).unwrap()
    }

    fn creds() -> ProviderCredentials {
        ProviderCredentials {
            key: SecretString::from("test-key"),
            security_code: SecretString::from("test-code"),
        }
    }

    #[tokio::test]
    async fn script_load_sends_key_and_plugins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps"))
            .and(query_param("key", "test-key"))
            .and(query_param("v", "2.0"))
            .and(query_param("plugin", "AMap.PlaceSearch,AMap.Geocoder"))
            .respond_with(ResponseTemplate::new(200).set_body_string("window.AMap = {};"))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).load_script(&creds()).await.unwrap();
    }

    #[tokio::test]
    async fn script_load_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let result = provider(&server).load_script(&creds()).await;
        assert!(matches!(result, Err(ProviderError::Script(_))));
    }

    #[tokio::test]
    async fn forward_geocode_parses_locations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/geocode/geo"))
            .and(query_param("address", "北京市"))
            .and(query_param("jscode", "test-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "1",
                "info": "OK",
                "infocode": "10000",
                "count": "1",
                "geocodes": [{"formatted_address": "北京市", "location": "116.407387,39.904179"}]
            })))
            .mount(&server)
            .await;

        let geocoder = provider(&server).create_geocoder(&GeocoderOptions {
            city: "北京市".into(),
        });
        let found = geocoder.locate("北京市").await.unwrap();
        assert_eq!(found, vec![Coordinate::new(116.407387, 39.904179)]);
    }

    #[tokio::test]
    async fn service_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/geocode/geo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "0",
                "info": "INVALID_USER_KEY",
                "infocode": "10001"
            })))
            .mount(&server)
            .await;

        let geocoder = provider(&server).create_geocoder(&GeocoderOptions { city: String::new() });
        match geocoder.locate("x").await {
            Err(ProviderError::Service { code, info }) => {
                assert_eq!(code, "10001");
                assert_eq!(info, "INVALID_USER_KEY");
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reverse_geocode_empty_address_quirk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/geocode/regeo"))
            .and(query_param("location", "116.4,39.9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "1",
                "info": "OK",
                "regeocode": {"formatted_address": []}
            })))
            .mount(&server)
            .await;

        let geocoder = provider(&server).create_geocoder(&GeocoderOptions { city: String::new() });
        let address = geocoder.reverse(Coordinate::new(116.4, 39.9)).await.unwrap();
        assert_eq!(address, "");
    }

    #[tokio::test]
    async fn place_search_skips_unlocated_pois() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .and(query_param("keywords", "coffee"))
            .and(query_param("offset", "5"))
            .and(query_param("page", "1"))
            .and(query_param("extensions", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "1",
                "count": "2",
                "pois": [
                    {"name": "Cafe A", "address": [], "location": "120.1,30.2"},
                    {"name": "Cafe B", "address": "Somewhere", "location": []}
                ]
            })))
            .mount(&server)
            .await;

        let search = provider(&server).create_place_search(&PlaceSearchOptions::for_city("杭州市"));
        let found = search.search("coffee").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Cafe A");
        assert_eq!(found[0].address, "");
        assert_eq!(found[0].coordinate, Coordinate::new(120.1, 30.2));
    }

    #[tokio::test]
    async fn http_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let search = provider(&server).create_place_search(&PlaceSearchOptions::for_city(""));
        let result = search.search("anything").await;
        assert!(matches!(result, Err(ProviderError::Status { status: 502, .. })));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        let mut s = settings(&server);
        s.key = None;
        let provider = AmapProvider::new(&s, MapPage::new()).unwrap();
        let geocoder = provider.create_geocoder(&GeocoderOptions { city: String::new() });
        assert!(matches!(
            geocoder.locate("x").await,
            Err(ProviderError::Service { .. })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn maps_mount_on_page() {
        let page = MapPage::with_anchors(["a"]);
        let provider = AmapProvider::new(&AmapSettings::default(), page.clone()).unwrap();
        assert!(provider.has_anchor("a"));
        let _map = provider.create_map("a", &MapOptions::default()).unwrap();
        assert_eq!(page.maps_created(), 1);
        assert!(provider.create_map("b", &MapOptions::default()).is_err());
    }
}
