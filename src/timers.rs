//! # Timer Slots
//!
//! The clock has four hardware timers. Each slot is tagged with the role it is
//! currently playing so the state machine can tell a refresh timer from a
//! countdown timer, and so a slot is never armed twice.
//!
//! ## Firing
//!
//! An armed slot runs a small tokio task that sleeps for the period and then
//! posts a [`TimerFired`] message onto the scheduler queue. That is all it
//! does: no rendering and no network access happen on the timer side.
//!
//! ## One firing in flight
//!
//! Every slot has an in-flight flag. A tick that comes due while the previous
//! firing is still queued or being handled is skipped. The flag is owned by
//! the message and cleared when the message is dropped, so a handler that
//! runs long simply causes missed ticks instead of a backlog.
//!
//! ## Stale firings
//!
//! Arming bumps the slot's generation. A firing that was queued before its
//! slot was disarmed or re-armed carries the old generation (or the old role)
//! and [`TimerSlots::accepts`] rejects it before the handler body runs.

use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Number of hardware timers
pub const SLOT_COUNT: usize = 4;

pub const REFRESH_SLOT: usize = 0;
pub const COUNTDOWN_SLOT: usize = 1;
pub const CONFIG_WATCH_SLOT: usize = 2;
pub const SCROLL_SLOT: usize = 3;

/// Shortest period a slot accepts; tokio intervals reject zero
const MIN_PERIOD: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerRole {
    #[default]
    Inactive,
    RefreshData,
    Countdown,
    HttpConfigWatch,
    /// One-shot delay between a saved configuration and the restart
    RestartDelay,
    NameScroll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    Periodic,
    OneShot,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// The slot already holds a role and must be disarmed first
    #[error("timer slot {slot} is already armed as {role:?}")]
    Conflict { slot: usize, role: TimerRole },

    #[error("there is no timer slot {0}")]
    NoSuchSlot(usize),
}

/// Clears the slot's in-flight flag when the firing is dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A timer firing, as delivered to the scheduler.
pub struct TimerFired {
    pub slot: usize,
    pub role: TimerRole,
    pub generation: u64,
    _in_flight: InFlight,
}

impl fmt::Debug for TimerFired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerFired")
            .field("slot", &self.slot)
            .field("role", &self.role)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    role: TimerRole,
    period: Duration,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// The fixed set of timer slots, posting their firings as `M` messages.
pub struct TimerSlots<M> {
    slots: [Slot; SLOT_COUNT],
    deferred: Vec<JoinHandle<()>>,
    tx: UnboundedSender<M>,
}

impl<M> TimerSlots<M>
where
    M: From<TimerFired> + Send + 'static,
{
    pub fn new(tx: UnboundedSender<M>) -> Self {
        Self {
            slots: Default::default(),
            deferred: Vec::new(),
            tx,
        }
    }

    fn slot(&self, slot: usize) -> Result<&Slot, TimerError> {
        self.slots.get(slot).ok_or(TimerError::NoSuchSlot(slot))
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Slot, TimerError> {
        self.slots.get_mut(slot).ok_or(TimerError::NoSuchSlot(slot))
    }

    pub fn role(&self, slot: usize) -> TimerRole {
        self.slot(slot).map(|s| s.role).unwrap_or_default()
    }

    pub fn period(&self, slot: usize) -> Option<Duration> {
        self.slot(slot)
            .ok()
            .filter(|s| s.role != TimerRole::Inactive)
            .map(|s| s.period)
    }

    /// Number of slots currently holding `role`
    pub fn count(&self, role: TimerRole) -> usize {
        self.slots.iter().filter(|s| s.role == role).count()
    }

    /// Arm an inactive slot.
    ///
    /// Fails with [`TimerError::Conflict`] when the slot already holds a role;
    /// use [`ensure_armed`](Self::ensure_armed) for the idempotent variant.
    pub fn arm(
        &mut self,
        slot: usize,
        role: TimerRole,
        period: Duration,
        mode: TimerMode,
    ) -> Result<(), TimerError> {
        let tx = self.tx.clone();
        let state = self.slot_mut(slot)?;
        if state.role != TimerRole::Inactive {
            return Err(TimerError::Conflict {
                slot,
                role: state.role,
            });
        }

        let period = period.max(MIN_PERIOD);
        let generation = state.generation + 1;
        let in_flight = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if in_flight.swap(true, Ordering::AcqRel) {
                    debug!("Timer slot {slot} ({role:?}) still busy, skipping tick");
                    continue;
                }
                let fired = TimerFired {
                    slot,
                    role,
                    generation,
                    _in_flight: InFlight(in_flight.clone()),
                };
                if tx.send(M::from(fired)).is_err() || mode == TimerMode::OneShot {
                    break;
                }
            }
        });

        *state = Slot {
            role,
            period,
            generation,
            task: Some(task),
        };
        debug!("Armed timer slot {slot} as {role:?} every {period:?}");
        Ok(())
    }

    /// Make sure `slot` runs periodically as `role`.
    ///
    /// Does nothing when the slot already holds that role. A slot holding a
    /// different role is disarmed first. Returns whether a timer was started.
    pub fn ensure_armed(
        &mut self,
        slot: usize,
        role: TimerRole,
        period: Duration,
    ) -> Result<bool, TimerError> {
        let current = self.slot(slot)?.role;
        if current == role {
            return Ok(false);
        }
        if current != TimerRole::Inactive {
            self.disarm(slot);
        }
        self.arm(slot, role, period, TimerMode::Periodic)?;
        Ok(true)
    }

    /// Stop the timer in `slot` and mark it inactive.
    ///
    /// Disarming an inactive slot is a no-op. Returns whether a timer was
    /// stopped.
    pub fn disarm(&mut self, slot: usize) -> bool {
        let Ok(state) = self.slot_mut(slot) else {
            return false;
        };
        if state.role == TimerRole::Inactive {
            return false;
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }
        debug!("Disarmed timer slot {slot} ({:?})", state.role);
        state.role = TimerRole::Inactive;
        state.generation += 1;
        true
    }

    /// Whether a firing still matches its slot's current role and arming.
    pub fn accepts(&self, fired: &TimerFired) -> bool {
        self.slot(fired.slot)
            .is_ok_and(|s| s.role == fired.role && s.generation == fired.generation)
    }

    /// Post a message onto the queue right away.
    pub fn post(&self, message: M) {
        if self.tx.send(message).is_err() {
            debug!("Scheduler queue closed, dropping message");
        }
    }

    /// Post a message once after `delay`. Not tied to a slot, so the
    /// receiving handler must check that it still applies.
    pub fn after(&mut self, delay: Duration, message: M) {
        self.deferred.retain(|task| !task.is_finished());
        let tx = self.tx.clone();
        self.deferred.push(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(message);
        }));
    }
}

impl<M> Drop for TimerSlots<M> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
        for task in self.deferred.drain(..) {
            task.abort();
        }
    }
}
