pub mod body;
pub mod clock;
pub mod computer;
pub mod dive;
pub mod environment;
pub mod error;
pub mod ffi;
pub mod gas;
pub mod metrics;
pub mod physio;
pub mod settings;
pub mod stops;
pub mod storage;
pub mod surface;
pub mod tank;

uniffi::setup_scaffolding!();

pub use body::{BodyState, BodyStateSnapshot, NearestEffect};
pub use clock::{Clock, ManualClock, SystemClock};
pub use computer::{DiveComputer, LimitingFactor, PlanReport, PlannedDive};
pub use dive::{AlertKind, Dive, DiveEvent, DiveStatus};
pub use environment::{DiveSite, DiveSiteEnv};
pub use error::{MixError, SettingsError, StateError, StoreError};
pub use ffi::{mix_limits, plan_dives, ComputeError, MixLimits, PlanEntry, PlanSummary};
pub use gas::{GasLimits, GasMix, AIR, OXYGEN};
pub use metrics::{DepthClass, DepthStats};
pub use physio::{Cns, DecoModel, GradientFactors, Otu, PhysioEffect, Stop};
pub use settings::{Settings, TankConfig};
pub use stops::{CurrentStop, DecoStops};
pub use storage::{KeyValueStore, MemoryStore, StoreNotConfigured};
pub use surface::{SurfaceInterval, SurfaceRecord};
pub use tank::Tank;
