pub mod amap;
pub mod headless;

pub mod mock;

pub use amap::AmapProvider;
pub use headless::{MapPage, MapSnapshot};
pub use mock::{MockProvider, MockReply};
