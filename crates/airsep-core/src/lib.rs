pub mod areas;
pub mod asas;
pub mod config;
pub mod detect;
pub mod geometry;
pub mod lifecycle;
pub mod resolve;
pub mod traffic;

pub use areas::{AreaRegistry, AreaShape};
pub use asas::Asas;
pub use config::{
    AreaFilterPolicy, AsasConfig, ConfigError, PriorityPolicy, ResolutionDof, SensorMode,
};
pub use detect::{ConflictDetector, ConflictPair, CpaPoint, Detection, StateBasedDetector};
pub use geometry::{bearing_distance, east_north, position_at, track_speed, FPM, FT, NM};
pub use lifecycle::{ConflictRecord, LifecycleTracker, LosRecord, PairKey};
pub use resolve::{
    ConflictResolver, Exemptions, MvpResolver, NoResolver, ResolutionCommand,
};
pub use traffic::{AircraftState, Traffic};
