//! Warm pool: provisioned execution slots for the hello handler.
//!
//! Slots are built ahead of time up to `capacity` and recycled after each
//! invocation. When no idle slot exists the pool cold-starts an on-demand
//! slot; on-demand slots are adopted into the provisioned set on release if
//! the pool is below capacity, and dropped otherwise.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use guild_core::epoch_secs;

/// Builds the per-slot handler context.
pub type SlotFactory<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;

/// How a lease was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Taken from the idle provisioned set.
    Warm,
    /// Built on demand because no idle slot was available.
    Cold,
}

/// One pre-built handler context.
pub struct ExecutionSlot<T> {
    id: u64,
    context: T,
    created_at: u64,
    served: u64,
}

impl<T> ExecutionSlot<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &T {
        &self.context
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Invocations completed on this slot.
    pub fn served(&self) -> u64 {
        self.served
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: u32,
    pub provisioned: u32,
    pub idle: u32,
    pub in_flight: u32,
    pub cold_starts: u64,
}

/// Concurrency observed since the previous reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyReading {
    pub peak_in_flight: u32,
    pub capacity: u32,
}

struct PoolInner<T> {
    idle: VecDeque<ExecutionSlot<T>>,
    /// Provisioned slots in existence (idle + leased).
    provisioned: u32,
}

/// Pool of warm execution slots.
pub struct WarmPool<T> {
    factory: SlotFactory<T>,
    inner: Mutex<PoolInner<T>>,
    capacity: AtomicU32,
    in_flight: AtomicU32,
    peak_in_flight: AtomicU32,
    cold_starts: AtomicU64,
    next_id: AtomicU64,
}

/// A leased slot. Returned to the pool on drop.
pub struct SlotLease<T> {
    pool: Arc<WarmPool<T>>,
    slot: Option<ExecutionSlot<T>>,
    kind: SlotKind,
    provisioned: bool,
}

impl<T> SlotLease<T> {
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn slot(&self) -> &ExecutionSlot<T> {
        self.slot
            .as_ref()
            .expect("slot is present until the lease drops")
    }

    pub fn context(&self) -> &T {
        self.slot().context()
    }
}

impl<T> Drop for SlotLease<T> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.served += 1;
            self.pool.release(slot, self.provisioned);
        }
    }
}

impl<T> WarmPool<T> {
    /// Create an empty pool. Call [`WarmPool::resize`] to warm it.
    pub fn new(factory: SlotFactory<T>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                provisioned: 0,
            }),
            capacity: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            peak_in_flight: AtomicU32::new(0),
            cold_starts: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_slot(&self) -> anyhow::Result<ExecutionSlot<T>> {
        let context = (self.factory)()?;
        Ok(ExecutionSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            context,
            created_at: epoch_secs(),
            served: 0,
        })
    }

    /// Lease a slot, cold-starting one if no warm slot is idle.
    pub fn acquire(self: &Arc<Self>) -> anyhow::Result<SlotLease<T>> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::AcqRel);

        if let Some(slot) = self.lock().idle.pop_front() {
            debug!(slot = slot.id, "acquired warm slot");
            return Ok(SlotLease {
                pool: Arc::clone(self),
                slot: Some(slot),
                kind: SlotKind::Warm,
                provisioned: true,
            });
        }

        match self.build_slot() {
            Ok(slot) => {
                self.cold_starts.fetch_add(1, Ordering::Relaxed);
                debug!(slot = slot.id, in_flight = now_in_flight, "cold-started slot");
                Ok(SlotLease {
                    pool: Arc::clone(self),
                    slot: Some(slot),
                    kind: SlotKind::Cold,
                    provisioned: false,
                })
            }
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn release(&self, slot: ExecutionSlot<T>, provisioned: bool) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        let capacity = self.capacity.load(Ordering::Acquire);
        let mut inner = self.lock();

        if provisioned {
            if inner.provisioned <= capacity {
                inner.idle.push_back(slot);
            } else {
                // Pool shrank while this slot was leased.
                inner.provisioned -= 1;
                debug!(slot = slot.id, "retired provisioned slot after scale-in");
            }
        } else if inner.provisioned < capacity {
            inner.provisioned += 1;
            inner.idle.push_back(slot);
            debug!("adopted on-demand slot into provisioned set");
        }
    }

    /// Set the provisioned capacity, warming or retiring idle slots.
    ///
    /// Leased slots above a lowered capacity are retired when released.
    /// Resizing to the current capacity is a no-op.
    pub fn resize(&self, target: u32) -> anyhow::Result<()> {
        let previous = self.capacity.swap(target, Ordering::AcqRel);

        let needed = {
            let mut inner = self.lock();
            while inner.provisioned > target && !inner.idle.is_empty() {
                inner.idle.pop_back();
                inner.provisioned -= 1;
            }
            target.saturating_sub(inner.provisioned)
        };

        let mut warmed = 0;
        for _ in 0..needed {
            let slot = match self.build_slot() {
                Ok(slot) => slot,
                Err(e) => {
                    self.capacity.store(previous.max(self.stats().provisioned), Ordering::Release);
                    return Err(e.context(format!("warming slot {} of {needed}", warmed + 1)));
                }
            };
            let mut inner = self.lock();
            if inner.provisioned >= target {
                break;
            }
            inner.provisioned += 1;
            inner.idle.push_back(slot);
            warmed += 1;
        }

        if previous != target {
            info!(from = previous, to = target, warmed, "warm pool resized");
        }
        Ok(())
    }

    /// Peak concurrency since the last reading; resets the peak to the
    /// current in-flight count.
    pub fn take_reading(&self) -> ConcurrencyReading {
        let current = self.in_flight.load(Ordering::Acquire);
        ConcurrencyReading {
            peak_in_flight: self.peak_in_flight.swap(current, Ordering::AcqRel),
            capacity: self.capacity.load(Ordering::Acquire),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            capacity: self.capacity.load(Ordering::Acquire),
            provisioned: inner.provisioned,
            idle: inner.idle.len() as u32,
            in_flight: self.in_flight.load(Ordering::Acquire),
            cold_starts: self.cold_starts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn counting_pool() -> (Arc<WarmPool<u64>>, Arc<AtomicU64>) {
        let built = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&built);
        let pool = WarmPool::new(Arc::new(move || {
            Ok(counter.fetch_add(1, Ordering::Relaxed))
        }));
        (pool, built)
    }

    #[test]
    fn resize_warms_to_capacity() {
        let (pool, built) = counting_pool();
        pool.resize(3).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.provisioned, 3);
        assert_eq!(stats.idle, 3);
        assert_eq!(built.load(Ordering::Relaxed), 3);

        // Same capacity again builds nothing.
        pool.resize(3).unwrap();
        assert_eq!(built.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn warm_then_cold_when_exhausted() {
        let (pool, _) = counting_pool();
        pool.resize(1).unwrap();

        let first = pool.acquire().unwrap();
        assert_eq!(first.kind(), SlotKind::Warm);

        let second = pool.acquire().unwrap();
        assert_eq!(second.kind(), SlotKind::Cold);
        assert_eq!(pool.in_flight(), 2);
        assert_eq!(pool.stats().cold_starts, 1);

        drop(first);
        drop(second);
        assert_eq!(pool.in_flight(), 0);
        // The cold slot is not adopted: the pool is already at capacity.
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn lease_returns_slot_and_counts_service() {
        let (pool, _) = counting_pool();
        pool.resize(1).unwrap();

        let id = {
            let lease = pool.acquire().unwrap();
            lease.slot().id()
        };
        let lease = pool.acquire().unwrap();
        assert_eq!(lease.kind(), SlotKind::Warm);
        assert_eq!(lease.slot().id(), id);
        assert_eq!(lease.slot().served(), 1);
    }

    #[test]
    fn scale_in_retires_idle_and_released_slots() {
        let (pool, _) = counting_pool();
        pool.resize(3).unwrap();

        let leased = pool.acquire().unwrap();
        pool.resize(1).unwrap();
        // Two idle slots can go immediately; the leased one is still out.
        let stats = pool.stats();
        assert_eq!(stats.provisioned, 1);
        assert_eq!(stats.idle, 0);

        drop(leased);
        let stats = pool.stats();
        assert_eq!(stats.provisioned, 1);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    fn cold_slot_adopted_when_below_capacity() {
        let (pool, _) = counting_pool();
        let lease = pool.acquire().unwrap();
        assert_eq!(lease.kind(), SlotKind::Cold);

        pool.capacity.store(1, Ordering::Release);
        drop(lease);
        assert_eq!(pool.stats().provisioned, 1);
        assert_eq!(pool.acquire().unwrap().kind(), SlotKind::Warm);
    }

    #[test]
    fn reading_reports_and_resets_peak() {
        let (pool, _) = counting_pool();
        pool.resize(4).unwrap();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        drop(b);
        drop(c);

        let reading = pool.take_reading();
        assert_eq!(reading.peak_in_flight, 3);
        assert_eq!(reading.capacity, 4);

        // Peak restarts from what is still in flight.
        assert_eq!(pool.take_reading().peak_in_flight, 1);
        drop(a);
        assert_eq!(pool.take_reading().peak_in_flight, 1);
        assert_eq!(pool.take_reading().peak_in_flight, 0);
    }

    #[test]
    fn failed_cold_start_does_not_leak_in_flight() {
        let fail = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let pool: Arc<WarmPool<()>> = WarmPool::new(Arc::new(move || {
            if flag.load(Ordering::Relaxed) {
                anyhow::bail!("context init failed");
            }
            Ok(())
        }));

        fail.store(true, Ordering::Relaxed);
        assert!(pool.acquire().is_err());
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.resize(2).is_err());
        assert_eq!(pool.stats().provisioned, 0);
    }

    #[test]
    fn concurrent_leases_balance_out() {
        let (pool, _) = counting_pool();
        pool.resize(8).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let lease = pool.acquire().unwrap();
                        std::hint::black_box(lease.context());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.provisioned, 8);
        assert_eq!(stats.idle, 8);
    }
}
