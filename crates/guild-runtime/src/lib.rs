//! guild-runtime: execution slots for the hello handler.
//!
//! A [`WarmPool`] keeps `capacity` pre-built handler contexts ready
//! ("provisioned concurrency"). Each invocation leases one slot; when every
//! provisioned slot is busy the pool cold-starts an on-demand slot instead
//! of rejecting the request.
//!
//! ```text
//! WarmPool<T>
//!   ├── idle: VecDeque<ExecutionSlot<T>>   (warm, ready)
//!   ├── capacity (target provisioned slots, set by the autoscaler)
//!   ├── in_flight / peak_in_flight         (atomics, read once per period)
//!   └── SlotFactory<T>                     (builds a context on warm-up or cold start)
//! ```

pub mod pool;

pub use pool::{ConcurrencyReading, ExecutionSlot, PoolStats, SlotFactory, SlotKind, SlotLease, WarmPool};
