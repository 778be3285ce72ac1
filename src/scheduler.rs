//! # Scheduler
//!
//! One queue, one loop. Timer tasks, deferred one-shots and the button only
//! ever enqueue a [`Message`]; the loop hands each message to the
//! [`DisplayStateMachine`] and waits for it to finish before taking the next.
//! Nothing else touches the display or the event snapshot.

use crate::display_state::DisplayStateMachine;
use crate::event::EventSource;
use crate::framebuffer::LedStrip;
use crate::platform::{ConfigPortal, Platform};
use crate::timers::TimerFired;
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub enum Message {
    /// A timer slot fired
    Timer(TimerFired),
    /// The configuration button was pressed (already debounced)
    ButtonPressed,
    /// Show page `n` of the configuration splash
    SplashStep(usize),
    /// Refresh event data now, outside the refresh timer
    RefreshNow,
    /// Leave the loop so the caller can reload configuration
    Restart,
}

impl From<TimerFired> for Message {
    fn from(fired: TimerFired) -> Self {
        Message::Timer(fired)
    }
}

/// Why the loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    /// Reload configuration and start over
    Restart,
    /// Every sender is gone
    Shutdown,
}

pub fn mailbox() -> (UnboundedSender<Message>, UnboundedReceiver<Message>) {
    mpsc::unbounded_channel()
}

/// Drain `rx` until the state machine asks to restart or the queue closes.
///
/// Anything left in the queue from a previous run is discarded first.
pub async fn run<S, E, P, C>(
    machine: &mut DisplayStateMachine<S, E, P, C>,
    rx: &mut UnboundedReceiver<Message>,
) -> Exit
where
    S: LedStrip,
    E: EventSource,
    P: Platform,
    C: ConfigPortal,
{
    let mut stale = 0;
    while rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!("Discarded {stale} messages from the previous run");
    }

    machine.start();
    while let Some(message) = rx.recv().await {
        if let Some(exit) = machine.handle(message).await {
            info!("Scheduler exiting: {exit:?}");
            return exit;
        }
    }
    Exit::Shutdown
}
