use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use geopin_core::errors::MapError;
use geopin_core::provider::MapProvider;
use geopin_core::settings::ProviderCredentials;

type PendingLoad = Shared<BoxFuture<'static, Result<(), MapError>>>;

enum LoadState {
    NotStarted,
    Loading(PendingLoad),
    Ready,
    Failed(MapError),
}

/// Observable load state, for readiness flags and diagnostics.
#[derive(Clone, Debug)]
pub enum ScriptLoadState {
    NotStarted,
    Loading,
    Ready,
    Failed(MapError),
}

/// Loads the provider script at most once for the lifetime of the loader.
///
/// Concurrent callers share one in-flight load. A failure is terminal: it is
/// returned to every current and future caller and the fetch is never retried.
/// Share one loader (behind an `Arc`) between all sessions.
pub struct ScriptLoader {
    provider: Arc<dyn MapProvider>,
    credentials: Option<ProviderCredentials>,
    state: Mutex<LoadState>,
}

impl ScriptLoader {
    pub fn new(provider: Arc<dyn MapProvider>, credentials: Option<ProviderCredentials>) -> Self {
        Self {
            provider,
            credentials,
            state: Mutex::new(LoadState::NotStarted),
        }
    }

    pub fn state(&self) -> ScriptLoadState {
        match &*self.state.lock() {
            LoadState::NotStarted => ScriptLoadState::NotStarted,
            LoadState::Loading(_) => ScriptLoadState::Loading,
            LoadState::Ready => ScriptLoadState::Ready,
            LoadState::Failed(e) => ScriptLoadState::Failed(e.clone()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LoadState::Ready)
    }

    pub async fn ensure_loaded(&self) -> Result<(), MapError> {
        let pending = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready => return Ok(()),
                LoadState::Failed(e) => return Err(e.clone()),
                LoadState::Loading(pending) => pending.clone(),
                LoadState::NotStarted => {
                    let Some(credentials) = self.credentials.clone() else {
                        tracing::error!(provider = self.provider.name(), "map credentials missing");
                        *state = LoadState::Failed(MapError::ConfigMissing);
                        return Err(MapError::ConfigMissing);
                    };
                    let provider = Arc::clone(&self.provider);
                    tracing::info!(provider = provider.name(), "loading map script");
                    let pending = async move {
                        provider
                            .load_script(&credentials)
                            .await
                            .map_err(|e| MapError::ScriptLoad(e.to_string()))
                    }
                    .boxed()
                    .shared();
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };

        let result = pending.await;

        let mut state = self.state.lock();
        if matches!(*state, LoadState::Loading(_)) {
            *state = match &result {
                Ok(()) => {
                    tracing::info!("map script ready");
                    LoadState::Ready
                }
                Err(e) => {
                    tracing::error!(error = %e, "map script failed to load");
                    LoadState::Failed(e.clone())
                }
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use geopin_core::errors::ProviderError;
    use geopin_provider::{MockProvider, MockReply};
    use secrecy::SecretString;

    fn creds() -> Option<ProviderCredentials> {
        Some(ProviderCredentials {
            key: SecretString::from("key"),
            security_code: SecretString::from("code"),
        })
    }

    #[tokio::test]
    async fn loads_once() {
        let mock = MockProvider::new();
        let loader = ScriptLoader::new(Arc::new(mock.clone()), creds());

        loader.ensure_loaded().await.unwrap();
        loader.ensure_loaded().await.unwrap();

        assert_eq!(mock.script_loads(), 1);
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        tokio::time::pause();
        let mock = MockProvider::new().with_script(MockReply::delayed(
            Duration::from_millis(200),
            MockReply::ok(()),
        ));
        let loader = ScriptLoader::new(Arc::new(mock.clone()), creds());

        let (a, b, c) = tokio::join!(
            loader.ensure_loaded(),
            loader.ensure_loaded(),
            loader.ensure_loaded()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(mock.script_loads(), 1);
    }

    #[tokio::test]
    async fn missing_credentials_skip_fetch() {
        let mock = MockProvider::new();
        let loader = ScriptLoader::new(Arc::new(mock.clone()), None);

        assert!(matches!(loader.ensure_loaded().await, Err(MapError::ConfigMissing)));
        assert!(matches!(loader.ensure_loaded().await, Err(MapError::ConfigMissing)));
        assert_eq!(mock.script_loads(), 0);
        assert!(matches!(loader.state(), ScriptLoadState::Failed(MapError::ConfigMissing)));
    }

    #[tokio::test]
    async fn failure_is_sticky() {
        let mock = MockProvider::new().with_script(MockReply::err(ProviderError::Network(
            "offline".into(),
        )));
        let loader = ScriptLoader::new(Arc::new(mock.clone()), creds());

        assert!(matches!(loader.ensure_loaded().await, Err(MapError::ScriptLoad(_))));

        // Even once the network recovers, the loader does not retry.
        let _ = mock.clone().with_script(MockReply::ok(()));
        assert!(matches!(loader.ensure_loaded().await, Err(MapError::ScriptLoad(_))));
        assert_eq!(mock.script_loads(), 1);
        assert!(!loader.is_loaded());
    }

    #[tokio::test]
    async fn concurrent_waiters_all_see_failure() {
        tokio::time::pause();
        let mock = MockProvider::new().with_script(MockReply::delayed(
            Duration::from_millis(50),
            MockReply::err(ProviderError::Script("bad".into())),
        ));
        let loader = ScriptLoader::new(Arc::new(mock.clone()), creds());

        let (a, b) = tokio::join!(loader.ensure_loaded(), loader.ensure_loaded());
        assert!(matches!(a, Err(MapError::ScriptLoad(_))));
        assert!(matches!(b, Err(MapError::ScriptLoad(_))));
        assert_eq!(mock.script_loads(), 1);
    }

    #[test]
    fn starts_not_started() {
        let loader = ScriptLoader::new(Arc::new(MockProvider::new()), creds());
        assert!(matches!(loader.state(), ScriptLoadState::NotStarted));
        assert!(!loader.is_loaded());
    }
}
