//! Engine-agnostic simulation: terrain, surface queries and the car
//! integrator. Everything here uses a y-down world where one unit is one
//! pixel at zoom 1 and velocities are expressed per fixed tick.

pub mod car;
pub mod level;
pub mod surface;
pub mod terrain;

pub use car::{Car, CarSnapshot, CarTuning, CrashCause, TickEvent};
pub use level::LevelTheme;
pub use terrain::{Collectible, CollectibleKind, Terrain};
