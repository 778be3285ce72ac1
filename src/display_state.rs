//! # Display State Machine
//!
//! Owns the frame buffer, the fonts, the timer slots and the last event
//! snapshot, and decides what the matrix shows.
//!
//! ## States
//!
//! ```text
//!            first refresh
//! Bootup ───────────────────► EventName ◄──► RoundNumber ◄──► Countdown
//!   ▲                              │               │               │
//!   │ splash done                  └───────────────┴───────────────┘
//!   │                                              │ button
//!   └───────────────────────────────────── ConfigScroll
//! ```
//!
//! - **EventName**: the event has not started or has ended; long names scroll
//! - **RoundNumber**: the event runs but the round has no timer
//! - **Countdown**: the event runs and the round timer is set
//! - **ConfigScroll**: the configuration splash is on screen
//!
//! ## Timers
//!
//! Slot 0 refreshes event data, slot 1 redraws the countdown while in
//! Countdown, slot 2 polls the configuration portal while it is open and then
//! holds the one-shot restart delay. Slot 3 scrolls event names too wide for
//! the matrix.

use crate::config::Config;
use crate::countdown::CountdownFace;
use crate::event::{fetch_snapshot, EventSource};
use crate::font::{FontLibrary, TextStyle, DEFAULT_FONT, LARGE_FONT, NARROW_FONT};
use crate::framebuffer::{FrameBuffer, LedStrip, WIDTH};
use crate::platform::{ConfigPortal, Platform};
use crate::round_strip;
use crate::scheduler::{Exit, Message};
use crate::timers::{
    TimerFired, TimerMode, TimerRole, TimerSlots, CONFIG_WATCH_SLOT, COUNTDOWN_SLOT,
    REFRESH_SLOT, SCROLL_SLOT,
};
use crate::EventSnapshot;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// How long each configuration splash page stays up
pub const SPLASH_PAGE: Duration = Duration::from_secs(5);
/// Polling period of the configuration watch
pub const WATCH_PERIOD: Duration = Duration::from_secs(1);
/// Delay between a saved configuration and the restart
pub const RESTART_DELAY: Duration = Duration::from_secs(1);
/// The portal closes and the clock restarts after this long without a save
pub const CONFIG_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// One pixel of event name scrolling
pub const SCROLL_PERIOD: Duration = Duration::from_millis(100);
/// Blank columns between the end of a scrolling name and its next pass
pub const SCROLL_GAP: i32 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayState {
    #[default]
    Bootup,
    EventName,
    RoundNumber,
    Countdown,
    ConfigScroll,
}

/// Pick the state a snapshot should be shown in.
pub fn classify(snapshot: &EventSnapshot) -> DisplayState {
    if !snapshot.status.is_running() {
        DisplayState::EventName
    } else if snapshot.timer.is_none() {
        DisplayState::RoundNumber
    } else {
        DisplayState::Countdown
    }
}

/// Split a dotted address into two halves that each fit the matrix.
///
/// IPv4 addresses split after the second octet, keeping the dot on the
/// first half. Anything else is cut in the middle.
pub fn split_address(address: &str) -> (String, String) {
    let dots: Vec<usize> = address.match_indices('.').map(|(i, _)| i).collect();
    let cut = match dots[..] {
        [_, second, _] => second + 1,
        _ => address
            .char_indices()
            .nth(address.chars().count() / 2)
            .map_or(address.len(), |(i, _)| i),
    };
    let (first, second) = address.split_at(cut);
    (first.to_string(), second.to_string())
}

/// One page of the configuration splash
#[derive(Clone, Debug, PartialEq, Eq)]
struct SplashPage {
    text: String,
    font: &'static str,
}

/// An event name wider than the matrix, moving left one pixel per tick.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Marquee {
    text: String,
    width: i32,
    offset: i32,
}

impl Marquee {
    /// Pixels from one pass of the text to the next
    fn cycle(&self) -> i32 {
        self.width + SCROLL_GAP
    }
}

pub struct DisplayStateMachine<S, E, P, C> {
    config: Config,
    fb: FrameBuffer<S>,
    fonts: FontLibrary,
    timers: TimerSlots<Message>,
    source: E,
    platform: P,
    portal: C,
    state: DisplayState,
    snapshot: Option<EventSnapshot>,
    /// Static text currently on screen, so unchanged frames are not redrawn
    shown: Option<String>,
    splash: Vec<SplashPage>,
    marquee: Option<Marquee>,
    config_deadline: Option<Instant>,
}

impl<S, E, P, C> DisplayStateMachine<S, E, P, C>
where
    S: LedStrip,
    E: EventSource,
    P: Platform,
    C: ConfigPortal,
{
    pub fn new(
        config: Config,
        fb: FrameBuffer<S>,
        source: E,
        platform: P,
        portal: C,
        tx: UnboundedSender<Message>,
    ) -> Self {
        let fonts = FontLibrary::new(config.device.font_dir.clone());
        Self {
            config,
            fb,
            fonts,
            timers: TimerSlots::new(tx),
            source,
            platform,
            portal,
            state: DisplayState::Bootup,
            snapshot: None,
            shown: None,
            splash: Vec::new(),
            marquee: None,
            config_deadline: None,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&EventSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn timers(&self) -> &TimerSlots<Message> {
        &self.timers
    }

    pub fn framebuffer(&self) -> &FrameBuffer<S> {
        &self.fb
    }

    pub fn portal(&self) -> &C {
        &self.portal
    }

    /// Show the boot screen, arm the refresh timer and queue a first refresh.
    pub fn start(&mut self) {
        self.state = DisplayState::Bootup;
        self.shown = None;
        self.draw_boot_label();

        let period = self.config.timer.refresh_period();
        self.ensure_armed(REFRESH_SLOT, TimerRole::RefreshData, period);
        self.timers.post(Message::RefreshNow);
    }

    fn draw_boot_label(&mut self) {
        let style = TextStyle::default().font(NARROW_FONT);
        self.fb.clear();
        self.fonts.render_text(&mut self.fb, "BCP", 0, 1, &style);
        let width = self.fonts.text_width("clock", &style);
        self.fonts
            .render_text(&mut self.fb, "clock", WIDTH - width, 1, &style);
        self.show();
    }

    /// Handle one message to completion.
    pub async fn handle(&mut self, message: Message) -> Option<Exit> {
        match message {
            Message::Timer(fired) => return self.on_timer(&fired).await,
            Message::RefreshNow => self.refresh().await,
            Message::ButtonPressed => self.button_pressed(),
            Message::SplashStep(page) => self.splash_step(page),
            Message::Restart => {
                self.portal.stop();
                return Some(Exit::Restart);
            }
        }
        None
    }

    async fn on_timer(&mut self, fired: &TimerFired) -> Option<Exit> {
        if !self.timers.accepts(fired) {
            debug!("Dropping stale timer firing {fired:?}");
            return None;
        }
        match fired.role {
            TimerRole::RefreshData => self.refresh().await,
            TimerRole::Countdown => self.countdown_tick(),
            TimerRole::HttpConfigWatch => self.config_watch_tick(),
            TimerRole::NameScroll => self.scroll_tick(),
            TimerRole::RestartDelay => {
                self.timers.disarm(fired.slot);
                self.portal.stop();
                return Some(Exit::Restart);
            }
            TimerRole::Inactive => {}
        }
        None
    }

    fn ensure_armed(&mut self, slot: usize, role: TimerRole, period: Duration) -> bool {
        self.timers
            .ensure_armed(slot, role, period)
            .unwrap_or_else(|e| {
                error!("Cannot arm {role:?} timer: {e}");
                false
            })
    }

    fn show(&mut self) {
        if let Err(e) = self.fb.show() {
            error!("Failed to write LED frame: {e}");
        }
    }

    async fn refresh(&mut self) {
        let snapshot = match fetch_snapshot(&self.source, &self.config.event.id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Error refreshing event data: {e}");
                return;
            }
        };
        if self.state == DisplayState::ConfigScroll {
            debug!("Ignoring refresh while the configuration splash is up");
            return;
        }

        let target = classify(&snapshot);
        self.snapshot = Some(snapshot);

        if target != self.state {
            info!("Display state {:?} -> {target:?}", self.state);
            if self.timers.disarm(COUNTDOWN_SLOT) {
                info!("Countdown timer stopped");
            }
            self.stop_scroll();
        }

        match target {
            DisplayState::Countdown => {
                self.shown = None;
                let period = self.config.timer.countdown_period();
                if self.ensure_armed(COUNTDOWN_SLOT, TimerRole::Countdown, period) {
                    info!("Countdown timer started");
                }
            }
            DisplayState::EventName | DisplayState::RoundNumber => self.render_static(target),
            DisplayState::Bootup | DisplayState::ConfigScroll => {}
        }
        self.state = target;
    }

    fn render_static(&mut self, state: DisplayState) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let (text, x, y, style) = match state {
            DisplayState::EventName => (snapshot.name.clone(), 0, 1, TextStyle::default()),
            DisplayState::RoundNumber => (
                format!("[{}]", snapshot.status.current_round),
                0,
                0,
                TextStyle::default().font(LARGE_FONT).centered(),
            ),
            _ => return,
        };
        if self.state == state && self.shown.as_deref() == Some(text.as_str()) {
            return;
        }

        self.stop_scroll();
        self.fb.clear();
        self.fonts.render_text(&mut self.fb, &text, x, y, &style);
        self.show();

        let width = self.fonts.text_width(&text, &style);
        if state == DisplayState::EventName && width > WIDTH {
            self.marquee = Some(Marquee {
                text: text.clone(),
                width,
                offset: 0,
            });
            self.ensure_armed(SCROLL_SLOT, TimerRole::NameScroll, SCROLL_PERIOD);
        }
        self.shown = Some(text);
    }

    fn stop_scroll(&mut self) {
        self.marquee = None;
        self.timers.disarm(SCROLL_SLOT);
    }

    /// Move the event name one pixel left and draw the column that came in.
    fn scroll_tick(&mut self) {
        if self.state != DisplayState::EventName {
            return;
        }
        let Some(marquee) = &mut self.marquee else {
            self.timers.disarm(SCROLL_SLOT);
            return;
        };
        marquee.offset = (marquee.offset + 1) % marquee.cycle();
        let x = -marquee.offset;
        let next = x + marquee.cycle();

        self.fb.scroll(-1, 0);
        let style = TextStyle::default();
        self.fonts.render_text(&mut self.fb, &marquee.text, x, 1, &style);
        if next < WIDTH {
            self.fonts
                .render_text(&mut self.fb, &marquee.text, next, 1, &style);
        }
        self.show();
    }

    fn countdown_tick(&mut self) {
        if self.state == DisplayState::ConfigScroll {
            return;
        }
        let running = self
            .snapshot
            .as_ref()
            .filter(|s| s.status.is_running())
            .and_then(|s| Some((s.timer.clone()?, s.status.clone())));
        let Some((timer, status)) = running else {
            self.timers.disarm(COUNTDOWN_SLOT);
            info!("No round timer, countdown stopped");
            return;
        };

        let remaining = (timer.end_time - self.platform.now()).num_seconds();
        let face = CountdownFace::new(
            remaining,
            timer.timer_length,
            self.config.timer.yellow,
            self.config.timer.red,
        );
        let style = TextStyle::default().font(face.font).color(face.color);

        self.fb.clear();
        self.fonts
            .render_text(&mut self.fb, &face.text, face.x, face.y, &style);
        if let Err(e) =
            round_strip::render(&mut self.fb, status.current_round, status.number_of_rounds)
        {
            warn!("Cannot draw round strip: {e}");
        }
        self.show();
    }

    fn button_pressed(&mut self) {
        if self.state == DisplayState::ConfigScroll {
            debug!("Configuration splash already running");
            return;
        }
        info!("Entering configuration mode");
        self.state = DisplayState::ConfigScroll;
        self.shown = None;
        self.stop_scroll();

        if let Err(e) = self.portal.start() {
            error!("Cannot start configuration portal: {e}");
        }
        if self.ensure_armed(CONFIG_WATCH_SLOT, TimerRole::HttpConfigWatch, WATCH_PERIOD) {
            self.config_deadline = Some(Instant::now() + CONFIG_TIMEOUT);
        }

        let (first, second) = split_address(&self.platform.network_address());
        self.splash = vec![
            SplashPage {
                text: "Config".to_string(),
                font: DEFAULT_FONT,
            },
            SplashPage {
                text: first,
                font: NARROW_FONT,
            },
            SplashPage {
                text: second,
                font: NARROW_FONT,
            },
        ];
        self.splash_step(0);
    }

    fn splash_step(&mut self, page: usize) {
        if self.state != DisplayState::ConfigScroll {
            debug!("Ignoring splash page {page} outside configuration mode");
            return;
        }
        match self.splash.get(page).cloned() {
            Some(SplashPage { text, font }) => {
                let style = TextStyle::default().font(font).centered();
                self.fb.clear();
                self.fonts.render_text(&mut self.fb, &text, 0, 1, &style);
                self.show();
                self.timers.after(SPLASH_PAGE, Message::SplashStep(page + 1));
            }
            None => {
                debug!("Configuration splash done");
                self.state = DisplayState::Bootup;
                self.draw_boot_label();
                self.timers.post(Message::RefreshNow);
            }
        }
    }

    fn config_watch_tick(&mut self) {
        if self.portal.take_saved() {
            info!("Configuration saved, restarting in {RESTART_DELAY:?}");
            self.timers.disarm(CONFIG_WATCH_SLOT);
            if let Err(e) = self.timers.arm(
                CONFIG_WATCH_SLOT,
                TimerRole::RestartDelay,
                RESTART_DELAY,
                TimerMode::OneShot,
            ) {
                error!("Cannot arm restart delay: {e}");
                self.timers.post(Message::Restart);
            }
        } else if self
            .config_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            warn!("No configuration saved within {CONFIG_TIMEOUT:?}, restarting");
            self.timers.disarm(CONFIG_WATCH_SLOT);
            self.timers.post(Message::Restart);
        }
    }
}
