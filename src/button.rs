//! Configuration button.
//!
//! On the host every line typed on stdin counts as one press. Presses closer
//! together than [`DEBOUNCE`] are treated as contact bounce and dropped. The
//! listener only enqueues [`Message::ButtonPressed`]; the state machine does
//! the rest.

use crate::scheduler::Message;
use log::debug;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Accepts a press only if the previous accepted one is at least `window` old.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Spawn the stdin button listener.
pub fn spawn_stdin_button(tx: UnboundedSender<Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut debouncer = Debouncer::new(DEBOUNCE);
        while let Ok(Some(_)) = lines.next_line().await {
            if !debouncer.accept(Instant::now()) {
                debug!("Button bounce ignored");
                continue;
            }
            if tx.send(Message::ButtonPressed).is_err() {
                break;
            }
        }
        debug!("Button listener stopped");
    })
}
