//! Map-session lifecycle: exactly-once provider script loading, independently
//! owned add/edit sessions, and the orchestrator the UI layer talks to.

pub mod loader;
pub mod orchestrator;
pub mod session;

pub use loader::{ScriptLoadState, ScriptLoader};
pub use orchestrator::MapOrchestrator;
pub use session::{CityCentering, GeoSession, LocationHandler, SessionInit};
