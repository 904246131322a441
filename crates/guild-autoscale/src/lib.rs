//! guild-autoscale: provisioned-concurrency scaling.
//!
//! Reads the newest unseen `MetricsSnapshot` from the state store, compares the
//! period's peak utilization against the target, and resizes the warm pool
//! through a callback.
//!
//! # Scaling Algorithm
//!
//! ```text
//! observed = peak_concurrency / current_capacity * 100
//! desired  = ceil(current_capacity * observed / target)
//!
//! if observed > target and scale-out cooldown elapsed:
//!     ScaleOut(min(desired, max_capacity))
//!
//! if observed < target and scale-in cooldown elapsed:
//!     ScaleIn(max(desired, min_capacity))
//! ```
//!
//! A desired capacity equal to the current one is `NoChange` and leaves the
//! cooldown clocks alone. Cooldowns are tracked per direction, so a recent
//! scale-out never delays a scale-in and vice versa.

pub mod pool;
pub mod scaler;

pub use pool::{ConcurrencyPool, ScaleDecision};
pub use scaler::{Autoscaler, BoxFuture, ScaleCallback};
