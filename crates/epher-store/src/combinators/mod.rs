//! Composable wrappers around [`crate::Store`]. Each one implements `Store`
//! itself, so they nest freely: `Log::new(SingleFlight::new(Race::new(...)))`.

pub mod circuitbreak;
pub mod intercept;
pub mod layer;
pub mod loadbalance;
pub mod pool;
pub mod race;
pub mod singleflight;

pub use circuitbreak::CircuitBreak;
pub use intercept::Log;
pub use layer::Layer;
pub use loadbalance::{LoadBalance, Picker, Random, RoundRobin};
pub use pool::Pool;
pub use race::{growth_log2, growth_log2_square, PoolRace, Race};
pub use singleflight::SingleFlight;
