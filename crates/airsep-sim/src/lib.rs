pub mod scenario;
pub mod traffic;

pub use scenario::{build, ScenarioKind};
pub use traffic::{SimAircraft, SimTraffic};
