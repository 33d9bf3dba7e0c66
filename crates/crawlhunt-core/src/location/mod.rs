mod engine;
mod types;

pub use engine::LocationEngine;
pub use types::{AuthorizationStatus, LocationSample, LocationSnapshot};
