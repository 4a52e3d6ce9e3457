use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use geopin_core::geo::Coordinate;
use geopin_core::ids::SessionKind;
use geopin_core::position::PositionDraft;
use geopin_core::provider::{CoordinateHandler, MapProvider};
use geopin_core::settings::{self, GeopinSettings};
use geopin_provider::{AmapProvider, MapPage};
use geopin_session::{LocationHandler, MapOrchestrator};
use geopin_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "geopin", about = "Pick a position on the map and print the record payload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a place by keyword and pin the first hit.
    Search {
        keyword: String,
        /// Search scope; defaults to the configured service region.
        #[arg(long)]
        city: Option<String>,
    },
    /// Pin a coordinate and resolve its address.
    Pin {
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },
    /// Move an existing record to the first hit for `keyword`.
    Edit {
        keyword: String,
        #[arg(long)]
        id: i64,
        /// Current location text of the record.
        #[arg(long, default_value = "")]
        location: String,
        /// Current longitude; `0` with `--lat 0` means the record has no position.
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        lat: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, load_error) = match settings::load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (GeopinSettings::default(), Some(e)),
    };
    let telemetry = init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));
    tracing::debug!(filter = telemetry.filter(), installed = telemetry.installed(), "telemetry ready");
    if let Some(e) = load_error {
        tracing::warn!(error = %e, path = %settings::settings_path().display(), "failed to load settings, using defaults");
    }

    let page = MapPage::with_anchors([
        SessionKind::Add.default_anchor(),
        SessionKind::Edit.default_anchor(),
    ]);
    let provider: Arc<dyn MapProvider> = Arc::new(
        AmapProvider::new(&settings.amap, page).context("failed to build map provider")?,
    );
    let orchestrator = MapOrchestrator::from_settings(provider, &settings);
    let anchor = SessionKind::Add.default_anchor();
    // Headless: nothing dispatches clicks or drags into the page.
    let on_map_click: CoordinateHandler = Arc::new(|at| tracing::debug!(%at, "map clicked"));
    let on_location_resolved: LocationHandler =
        Arc::new(|address, at| tracing::debug!(%address, %at, "marker moved"));

    let mut draft = PositionDraft::default();
    let outcome = match cli.command {
        Command::Search { keyword, city } => {
            orchestrator
                .init_add_session(anchor, city.as_deref(), on_map_click, on_location_resolved)
                .await
                .context("map init failed")?;
            let hit = orchestrator
                .search_add(&keyword, |place| draft.apply_place(place))
                .await;
            match hit {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(anyhow::anyhow!("no place matches {keyword:?}")),
                Err(e) => Err(e.into()),
            }
        }
        Command::Pin { lng, lat } => {
            let at = Coordinate::new(lng, lat);
            if !(-180.0..=180.0).contains(&at.lng) || !(-90.0..=90.0).contains(&at.lat) {
                bail!("coordinate out of range: {at}");
            }
            orchestrator
                .init_add_session(anchor, None, on_map_click, on_location_resolved)
                .await
                .context("map init failed")?;
            orchestrator
                .handle_add_click(at, |address, c| draft.apply_resolved(&address, c))
                .await
                .map_err(anyhow::Error::from)
        }
        Command::Edit {
            keyword,
            id,
            location,
            lng,
            lat,
        } => {
            draft = PositionDraft::existing(id, location, Coordinate::new(lng, lat));
            orchestrator
                .init_edit_session(
                    SessionKind::Edit.default_anchor(),
                    draft.coordinate(),
                    on_map_click,
                    on_location_resolved,
                )
                .await
                .context("map init failed")?;
            let hit = orchestrator
                .search_edit(&keyword, |place| draft.apply_place(place))
                .await;
            match hit {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(anyhow::anyhow!("no place matches {keyword:?}")),
                Err(e) => Err(e.into()),
            }
        }
    };
    orchestrator.destroy_add();
    orchestrator.destroy_edit();
    outcome?;

    let payload = draft.submission(orchestrator.region());
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
