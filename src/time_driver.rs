//! Time-warp clock registered as the embassy-time driver.
//!
//! Virtual time runs at `percent / 100` of host time. The mapping is kept
//! continuous across speed changes: the virtual "now" is the same
//! immediately before and after a change, only its slope differs. Timers
//! registered through `schedule_wake` are fired by a dedicated scheduler
//! thread that converts each virtual deadline back to a host instant.

use core::task::Waker;
use embassy_time_driver::{Driver, TICK_HZ, time_driver_impl};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant as StdInstant};

pub const MIN_TIME_WARP_PERCENT: u32 = 1;
pub const MAX_TIME_WARP_PERCENT: u32 = 1000;

// Warp factor in Q32.32 fixed point; 1.0 == 1 << 32.
const Q32_ONE: u128 = 1u128 << 32;

/// Longest single wait of the scheduler thread, so warp changes are picked up promptly.
const MAX_SCHEDULER_WAIT: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct WarpMapping {
    real_origin: StdInstant,
    virtual_origin: u64,
    factor_q32: u128,
    percent: u32,
}

impl WarpMapping {
    fn to_virtual(&self, real: StdInstant) -> u64 {
        let real_ticks = nanos_to_ticks(real.saturating_duration_since(self.real_origin).as_nanos());
        let warped = real_ticks * self.factor_q32 / Q32_ONE;
        self.virtual_origin.wrapping_add(warped.min(u64::MAX as u128) as u64)
    }

    fn to_real(&self, virtual_ticks: u64) -> StdInstant {
        // Deadlines before the origin are already due
        let Some(virtual_dt) = virtual_ticks.checked_sub(self.virtual_origin) else {
            return self.real_origin;
        };
        let real_ticks = virtual_dt as u128 * Q32_ONE / self.factor_q32;
        self.real_origin + Duration::from_nanos(ticks_to_nanos(real_ticks).min(u64::MAX as u128) as u64)
    }
}

#[derive(Default)]
struct WakeQueue {
    // Virtual deadline -> wakers due at that deadline
    pending: BTreeMap<u64, Vec<Waker>>,
    // Bumped on warp changes so a sleeping scheduler re-evaluates its wait
    generation: u64,
}

struct WarpClock {
    mapping: Mutex<WarpMapping>,
    queue: Mutex<WakeQueue>,
    wakeup: Condvar,
    scheduler: OnceLock<()>,
}

fn warp_clock() -> &'static WarpClock {
    static CLOCK: OnceLock<WarpClock> = OnceLock::new();
    CLOCK.get_or_init(|| WarpClock {
        mapping: Mutex::new(WarpMapping {
            real_origin: StdInstant::now(),
            virtual_origin: 0,
            factor_q32: Q32_ONE,
            percent: 100,
        }),
        queue: Mutex::new(WakeQueue::default()),
        wakeup: Condvar::new(),
        scheduler: OnceLock::new(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn nanos_to_ticks(nanos: u128) -> u128 {
    nanos * TICK_HZ as u128 / 1_000_000_000
}

fn ticks_to_nanos(ticks: u128) -> u128 {
    ticks * 1_000_000_000 / TICK_HZ as u128
}

impl WarpClock {
    fn virtual_now(&self) -> u64 {
        lock(&self.mapping).to_virtual(StdInstant::now())
    }

    fn ensure_scheduler(&'static self) {
        self.scheduler.get_or_init(|| {
            if let Err(err) = std::thread::Builder::new().name("time-warp-scheduler".into()).spawn(move || self.run_scheduler()) {
                log::error!("Failed to start time-warp scheduler thread: {}", err);
            }
        });
    }

    fn run_scheduler(&self) {
        loop {
            // Never hold the queue lock while taking the mapping lock.
            let (deadline, generation) = {
                let mut queue = lock(&self.queue);
                loop {
                    if let Some((&deadline, _)) = queue.pending.iter().next() {
                        break (deadline, queue.generation);
                    }
                    queue = self.wakeup.wait(queue).unwrap_or_else(PoisonError::into_inner);
                }
            };

            let due_at = lock(&self.mapping).to_real(deadline);
            let now = StdInstant::now();
            if due_at > now {
                let queue = lock(&self.queue);
                if queue.generation == generation {
                    let wait = (due_at - now).min(MAX_SCHEDULER_WAIT);
                    drop(self.wakeup.wait_timeout(queue, wait).unwrap_or_else(PoisonError::into_inner));
                }
                continue;
            }

            let virtual_now = self.virtual_now();
            let due: Vec<Waker> = {
                let mut queue = lock(&self.queue);
                let later = queue.pending.split_off(&virtual_now.saturating_add(1));
                std::mem::replace(&mut queue.pending, later).into_values().flatten().collect()
            };
            for waker in due {
                waker.wake();
            }
        }
    }

    fn set_percent(&self, percent: u32) {
        let now = StdInstant::now();
        {
            let mut mapping = lock(&self.mapping);
            if mapping.percent == percent {
                return;
            }
            let factor_q32 = percent as u128 * Q32_ONE / 100;
            // Keep virtual_origin fixed so queued deadlines never move into the
            // past; re-anchor the real origin so virtual "now" is unchanged.
            let elapsed_virtual = mapping.to_virtual(now).saturating_sub(mapping.virtual_origin) as u128;
            let elapsed_real = Duration::from_nanos(ticks_to_nanos(elapsed_virtual * Q32_ONE / factor_q32).min(u64::MAX as u128) as u64);
            mapping.real_origin = now.checked_sub(elapsed_real).unwrap_or(now);
            mapping.factor_q32 = factor_q32;
            mapping.percent = percent;
        }
        {
            let mut queue = lock(&self.queue);
            queue.generation = queue.generation.wrapping_add(1);
        }
        self.wakeup.notify_all();
    }
}

struct WarpDriver;

impl Driver for WarpDriver {
    fn now(&self) -> u64 {
        warp_clock().virtual_now()
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        let clock = warp_clock();
        clock.ensure_scheduler();
        lock(&clock.queue).pending.entry(at).or_default().push(waker.clone());
        clock.wakeup.notify_all();
    }
}

time_driver_impl!(static DRIVER: WarpDriver = WarpDriver);

/// Set the virtual clock speed in percent of host time, clamped to 1-1000.
pub fn set_time_warp_percent(percent: u32) {
    let percent = percent.clamp(MIN_TIME_WARP_PERCENT, MAX_TIME_WARP_PERCENT);
    warp_clock().set_percent(percent);
    log::debug!("Time warp set to {}%", percent);
}

pub fn get_time_warp_percent() -> u32 {
    lock(&warp_clock().mapping).percent
}
