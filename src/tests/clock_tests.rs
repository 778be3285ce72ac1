//! # Clock Scenario Tests
//!
//! Each test builds a [`DisplayStateMachine`] around in-memory collaborators,
//! then feeds it messages from the real queue under tokio's paused clock, so
//! timer behaviour is exercised exactly as it runs on the device.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::config::Config;
use crate::display_state::{DisplayState, DisplayStateMachine, CONFIG_TIMEOUT, SCROLL_GAP};
use crate::event::{EventSource, RefreshError};
use crate::font::{FontLibrary, TextStyle, DEFAULT_FONT, LARGE_FONT, NARROW_FONT};
use crate::framebuffer::{FrameBuffer, NUM_LEDS, WIDTH};
use crate::platform::{ConfigPortal, Platform};
use crate::round_strip::{self, ACTIVE_COLOR, STRIP_ROW};
use crate::scheduler::{self, Exit, Message};
use crate::countdown::PRESTART_COLOR;
use crate::timers::{TimerRole, CONFIG_WATCH_SLOT, COUNTDOWN_SLOT, REFRESH_SLOT, SCROLL_SLOT};
use crate::{EventOverview, EventStatus, RoundTimer};

type Frames = Vec<[Rgb888; NUM_LEDS]>;

fn font_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fonts")
}

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-10-04T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Event data served by the fake BCP; `None` simulates a network failure.
#[derive(Clone, Default)]
struct FakeBcp {
    data: Rc<RefCell<Option<(EventOverview, Option<RoundTimer>)>>>,
    fetches: Rc<Cell<u32>>,
}

impl FakeBcp {
    fn serve(&self, status: EventStatus, timer: Option<RoundTimer>) {
        self.serve_named("Open", status, timer);
    }

    fn serve_named(&self, name: &str, status: EventStatus, timer: Option<RoundTimer>) {
        let overview = EventOverview {
            name: name.to_string(),
            status,
        };
        *self.data.borrow_mut() = Some((overview, timer));
    }

    fn go_offline(&self) {
        *self.data.borrow_mut() = None;
    }
}

impl EventSource for FakeBcp {
    async fn fetch_overview(&self, event_id: &str) -> Result<EventOverview, RefreshError> {
        self.fetches.set(self.fetches.get() + 1);
        match &*self.data.borrow() {
            Some((overview, _)) => Ok(overview.clone()),
            None => Err(RefreshError::InvalidEventId(event_id.to_string())),
        }
    }

    async fn fetch_round_timer(
        &self,
        event_id: &str,
        _round: i32,
    ) -> Result<Option<RoundTimer>, RefreshError> {
        match &*self.data.borrow() {
            Some((_, timer)) => Ok(timer.clone()),
            None => Err(RefreshError::InvalidEventId(event_id.to_string())),
        }
    }
}

#[derive(Clone)]
struct FakePlatform {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl Platform for FakePlatform {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn network_address(&self) -> String {
        "192.168.1.42".to_string()
    }
}

#[derive(Clone, Default)]
struct FakePortal {
    starts: Rc<Cell<u32>>,
    running: Rc<Cell<bool>>,
    saved: Rc<Cell<bool>>,
}

impl ConfigPortal for FakePortal {
    fn start(&mut self) -> std::io::Result<()> {
        if !self.running.replace(true) {
            self.starts.set(self.starts.get() + 1);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running.set(false);
    }

    fn take_saved(&mut self) -> bool {
        self.running.get() && self.saved.replace(false)
    }
}

struct Clock {
    machine: DisplayStateMachine<Frames, FakeBcp, FakePlatform, FakePortal>,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    bcp: FakeBcp,
    portal: FakePortal,
}

impl Clock {
    fn new() -> Self {
        let mut config = Config::default();
        config.device.font_dir = font_dir();
        let bcp = FakeBcp::default();
        let portal = FakePortal::default();
        let platform = FakePlatform {
            now: Rc::new(Cell::new(t0())),
        };
        let (tx, rx) = scheduler::mailbox();
        let machine = DisplayStateMachine::new(
            config,
            FrameBuffer::new(Frames::new()),
            bcp.clone(),
            platform,
            portal.clone(),
            tx.clone(),
        );
        Self {
            machine,
            tx,
            rx,
            bcp,
            portal,
        }
    }

    /// Handle the next queued message, waiting (in paused time) if needed
    async fn step(&mut self) -> Option<Exit> {
        let message = self.rx.recv().await.expect("queue closed");
        self.machine.handle(message).await
    }

    /// Step until `done` holds, giving up after `limit` messages
    async fn step_until(&mut self, limit: usize, done: impl Fn(&Self) -> bool) {
        for _ in 0..limit {
            if done(self) {
                return;
            }
            assert_eq!(self.step().await, None);
        }
        assert!(done(self), "condition not reached within {limit} messages");
    }

    /// Step until the machine asks to restart
    async fn run_to_restart(&mut self, limit: usize) {
        for _ in 0..limit {
            if self.step().await == Some(Exit::Restart) {
                return;
            }
        }
        panic!("no restart within {limit} messages");
    }

    fn frames(&self) -> &Frames {
        self.machine.framebuffer().strip()
    }

    fn leds(&self) -> [Rgb888; NUM_LEDS] {
        *self.machine.framebuffer().leds()
    }
}

fn running(round: i32, of: i32) -> EventStatus {
    EventStatus {
        started: true,
        ended: false,
        current_round: round,
        number_of_rounds: of,
    }
}

fn ended() -> EventStatus {
    EventStatus {
        started: true,
        ended: true,
        current_round: 5,
        number_of_rounds: 5,
    }
}

fn timer_ending_in(seconds: i64, timer_length: i64) -> Option<RoundTimer> {
    Some(RoundTimer {
        timer_length,
        end_time: t0() + chrono::Duration::seconds(seconds),
    })
}

/// Draw `text` the way the clock would, on a fresh buffer
fn expected_text(text: &str, x: i32, y: i32, style: &TextStyle) -> FrameBuffer<Frames> {
    let mut fb = FrameBuffer::new(Frames::new());
    FontLibrary::new(font_dir()).render_text(&mut fb, text, x, y, style);
    fb
}

/// The "BCP clock" boot screen
fn boot_label() -> FrameBuffer<Frames> {
    let fonts = FontLibrary::new(font_dir());
    let style = TextStyle::default().font(NARROW_FONT);
    let mut fb = expected_text("BCP", 0, 1, &style);
    let width = fonts.text_width("clock", &style);
    fonts.render_text(&mut fb, "clock", WIDTH - width, 1, &style);
    fb
}

#[tokio::test(start_paused = true)]
async fn countdown_round_renders_time_and_strip() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(2, 5), timer_ending_in(30, 600));

    clock.machine.start();
    assert_eq!(clock.machine.state(), DisplayState::Bootup);
    assert_eq!(clock.machine.timers().role(REFRESH_SLOT), TimerRole::RefreshData);
    assert_eq!(clock.leds(), *boot_label().leds());

    // the immediate refresh
    clock.step().await;
    assert_eq!(clock.machine.state(), DisplayState::Countdown);
    assert_eq!(clock.machine.timers().role(COUNTDOWN_SLOT), TimerRole::Countdown);
    assert_eq!(clock.frames().len(), 1, "only the boot screen so far");

    // the first countdown tick
    clock.step().await;
    assert_eq!(clock.frames().len(), 2);

    let mut expected = expected_text("00:30", 5, 0, &TextStyle::default().color(Rgb888::YELLOW));
    round_strip::render(&mut expected, 2, 5).unwrap();
    assert_eq!(clock.leds(), *expected.leds());
    assert_eq!(
        clock.machine.framebuffer().get_pixel(8, STRIP_ROW).unwrap(),
        ACTIVE_COLOR
    );
}

#[tokio::test(start_paused = true)]
async fn long_round_uses_the_narrow_font() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(1, 3), timer_ending_in(5400, 5400));
    clock.machine.start();
    clock.step().await;
    clock.step().await;

    let mut expected = expected_text("1:30:00", 3, 1, &TextStyle::default().font(NARROW_FONT));
    round_strip::render(&mut expected, 1, 3).unwrap();
    assert_eq!(clock.leds(), *expected.leds());
}

#[tokio::test(start_paused = true)]
async fn hour_round_shows_minutes_from_the_start() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(1, 5), timer_ending_in(3599, 3600));
    clock.machine.start();
    clock.step().await;
    clock.step().await;

    let mut expected = expected_text("59:59", 5, 0, &TextStyle::default());
    round_strip::render(&mut expected, 1, 5).unwrap();
    assert_eq!(clock.leds(), *expected.leds());
}

#[tokio::test(start_paused = true)]
async fn round_not_started_counts_down_to_the_start_in_green() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(1, 5), timer_ending_in(3600 + 90, 3600));
    clock.machine.start();
    clock.step().await;
    clock.step().await;

    let style = TextStyle::default().color(PRESTART_COLOR);
    let mut expected = expected_text("01:30", 5, 0, &style);
    round_strip::render(&mut expected, 1, 5).unwrap();
    assert_eq!(clock.leds(), *expected.leds());
}

#[tokio::test(start_paused = true)]
async fn repeated_refreshes_keep_one_countdown_timer() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(2, 5), timer_ending_in(600, 600));
    clock.machine.start();

    clock
        .step_until(200, |c| c.bcp.fetches.get() >= 3)
        .await;
    assert_eq!(clock.machine.state(), DisplayState::Countdown);
    assert_eq!(clock.machine.timers().count(TimerRole::Countdown), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_picks_event_name_and_round_number() {
    let mut clock = Clock::new();
    clock.bcp.serve(
        EventStatus {
            started: false,
            ..running(0, 5)
        },
        None,
    );
    clock.machine.start();
    clock.step().await;
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    assert_eq!(clock.leds(), *expected_text("Open", 0, 1, &TextStyle::default()).leds());
    assert_eq!(
        clock.machine.timers().role(SCROLL_SLOT),
        TimerRole::Inactive,
        "short names stay put"
    );

    clock.bcp.serve(running(3, 5), None);
    clock.step().await; // refresh timer, 60 s later
    assert_eq!(clock.machine.state(), DisplayState::RoundNumber);
    let style = TextStyle::default().font(LARGE_FONT).centered();
    assert_eq!(clock.leds(), *expected_text("[3]", 0, 0, &style).leds());
    assert_eq!(clock.machine.timers().role(COUNTDOWN_SLOT), TimerRole::Inactive);

    // next round, same state: the number still changes
    clock.bcp.serve(running(4, 5), None);
    clock.step().await;
    assert_eq!(clock.leds(), *expected_text("[4]", 0, 0, &style).leds());

    // unchanged content is not pushed again
    let frames = clock.frames().len();
    clock.step().await;
    assert_eq!(clock.frames().len(), frames);
}

#[tokio::test(start_paused = true)]
async fn long_event_name_scrolls_in_a_loop() {
    let name = "Czech Major 2025";
    let style = TextStyle::default();
    let width = FontLibrary::new(font_dir()).text_width(name, &style);
    assert!(width > WIDTH);

    let mut clock = Clock::new();
    clock.bcp.serve_named(name, ended(), None);
    clock.machine.start();
    clock.step().await;
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    assert_eq!(clock.machine.timers().role(SCROLL_SLOT), TimerRole::NameScroll);
    let first = clock.leds();
    assert_eq!(first, *expected_text(name, 0, 1, &style).leds());

    // one pixel per tick, each tick a new frame
    for shift in 1..=3 {
        let before = clock.leds();
        clock.step().await;
        assert_ne!(clock.leds(), before);
        assert_eq!(clock.leds(), *expected_text(name, -shift, 1, &style).leds());
    }

    // the next pass follows after a gap and the loop returns to the start
    let cycle = width + SCROLL_GAP;
    for _ in 3..cycle - WIDTH + 2 {
        clock.step().await;
    }
    let mut wrapped = expected_text(name, WIDTH - cycle - 2, 1, &style);
    FontLibrary::new(font_dir()).render_text(&mut wrapped, name, WIDTH - 2, 1, &style);
    assert_eq!(clock.leds(), *wrapped.leds());

    for _ in cycle - WIDTH + 2..cycle {
        clock.step().await;
    }
    assert_eq!(clock.leds(), first);

    // a running round takes the screen and stops the scroll
    clock.bcp.serve_named(name, running(2, 5), None);
    clock.machine.handle(Message::RefreshNow).await;
    assert_eq!(clock.machine.state(), DisplayState::RoundNumber);
    assert_eq!(clock.machine.timers().role(SCROLL_SLOT), TimerRole::Inactive);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_the_display() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.machine.start();
    clock.step().await;
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    let shown = clock.leds();
    let frames = clock.frames().len();

    clock.bcp.go_offline();
    clock.step().await;
    assert_eq!(clock.bcp.fetches.get(), 2);
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    assert_eq!(clock.leds(), shown);
    assert_eq!(clock.frames().len(), frames);
    assert_eq!(clock.machine.snapshot().unwrap().status, ended());
}

#[tokio::test(start_paused = true)]
async fn leaving_countdown_disarms_its_timer() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(5, 5), timer_ending_in(600, 600));
    clock.machine.start();
    clock.step().await;
    assert_eq!(clock.machine.state(), DisplayState::Countdown);

    clock.bcp.serve(ended(), None);
    clock
        .step_until(100, |c| c.machine.state() != DisplayState::Countdown)
        .await;
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    assert_eq!(clock.machine.timers().role(COUNTDOWN_SLOT), TimerRole::Inactive);

    // ticks queued before the disarm are dropped without drawing
    let frames = clock.frames().len();
    let fetches = clock.bcp.fetches.get();
    clock
        .step_until(5, |c| c.bcp.fetches.get() > fetches)
        .await;
    assert_eq!(clock.frames().len(), frames);
}

#[tokio::test(start_paused = true)]
async fn round_without_timer_stops_the_countdown() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(2, 5), timer_ending_in(600, 600));
    clock.machine.start();
    clock.step().await;

    // the round timer vanishes between refreshes
    clock.bcp.serve(running(2, 5), None);
    clock.machine.handle(Message::RefreshNow).await;
    assert_eq!(clock.machine.state(), DisplayState::RoundNumber);
    assert_eq!(clock.machine.timers().role(COUNTDOWN_SLOT), TimerRole::Inactive);

    // no countdown ticks arrive after the disarm
    let frames = clock.frames().len();
    let start = Instant::now();
    clock.step().await;
    assert_eq!(clock.frames().len(), frames);
    assert!(start.elapsed() >= Duration::from_secs(59));
}

#[tokio::test(start_paused = true)]
async fn button_runs_the_config_splash() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.machine.start();
    clock.step().await;

    clock.machine.handle(Message::ButtonPressed).await;
    assert_eq!(clock.machine.state(), DisplayState::ConfigScroll);
    assert_eq!(clock.portal.starts.get(), 1);
    assert_eq!(
        clock.machine.timers().role(CONFIG_WATCH_SLOT),
        TimerRole::HttpConfigWatch
    );
    let centered = |font| TextStyle::default().font(font).centered();
    assert_eq!(
        clock.leds(),
        *expected_text("Config", 0, 1, &centered(DEFAULT_FONT)).leds()
    );

    // a second press during the splash changes nothing
    clock.machine.handle(Message::ButtonPressed).await;
    assert_eq!(clock.portal.starts.get(), 1);

    let entered = Instant::now();
    clock
        .step_until(20, |c| {
            *c.machine.framebuffer().leds()
                == *expected_text("192.168.", 0, 1, &centered(NARROW_FONT)).leds()
        })
        .await;
    assert!(entered.elapsed() >= Duration::from_secs(5));

    clock
        .step_until(20, |c| {
            *c.machine.framebuffer().leds()
                == *expected_text("1.42", 0, 1, &centered(NARROW_FONT)).leds()
        })
        .await;

    clock
        .step_until(20, |c| c.machine.state() != DisplayState::ConfigScroll)
        .await;
    assert_eq!(clock.machine.state(), DisplayState::Bootup);
    assert!(entered.elapsed() >= Duration::from_secs(15));
    assert!(clock.portal.running.get(), "portal stays up after the splash");

    // the queued refresh restores the event display straight away
    let fetches = clock.bcp.fetches.get();
    clock
        .step_until(5, |c| c.bcp.fetches.get() > fetches)
        .await;
    assert_eq!(clock.machine.state(), DisplayState::EventName);
    assert!(entered.elapsed() < Duration::from_secs(16));
}

#[tokio::test(start_paused = true)]
async fn splash_ends_on_the_boot_label() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.machine.start();
    clock.step().await;
    clock.machine.handle(Message::ButtonPressed).await;
    clock.bcp.go_offline();

    clock
        .step_until(40, |c| c.machine.state() == DisplayState::Bootup)
        .await;
    assert_eq!(clock.leds(), *boot_label().leds());

    // the refresh that follows fails, the boot label stays
    let fetches = clock.bcp.fetches.get();
    clock
        .step_until(5, |c| c.bcp.fetches.get() > fetches)
        .await;
    assert_eq!(clock.machine.state(), DisplayState::Bootup);
    assert_eq!(clock.leds(), *boot_label().leds());
}

#[tokio::test(start_paused = true)]
async fn config_splash_pauses_the_countdown() {
    let mut clock = Clock::new();
    clock.bcp.serve(running(2, 5), timer_ending_in(600, 600));
    clock.machine.start();
    clock.step().await;
    clock.machine.handle(Message::ButtonPressed).await;
    let config_page = clock.leds();
    let frames = clock.frames().len();

    // countdown and watch ticks during the first page draw nothing
    let entered = Instant::now();
    clock
        .step_until(20, move |_| Instant::now() >= entered + Duration::from_secs(3))
        .await;
    assert_eq!(clock.frames().len(), frames);
    assert_eq!(clock.leds(), config_page);

    // refreshes are ignored too
    clock.bcp.serve(ended(), None);
    clock.machine.handle(Message::RefreshNow).await;
    assert_eq!(clock.machine.state(), DisplayState::ConfigScroll);
    assert_eq!(clock.machine.snapshot().unwrap().status, running(2, 5));
}

#[tokio::test(start_paused = true)]
async fn saved_config_restarts_after_a_second() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.machine.start();
    clock.step().await;
    clock.machine.handle(Message::ButtonPressed).await;

    let entered = Instant::now();
    clock.portal.saved.set(true);
    clock
        .step_until(5, |c| {
            c.machine.timers().role(CONFIG_WATCH_SLOT) == TimerRole::RestartDelay
        })
        .await;
    assert!(clock.portal.running.get(), "portal stays up during the delay");
    clock.run_to_restart(20).await;

    assert!(entered.elapsed() >= Duration::from_secs(2));
    assert!(entered.elapsed() < Duration::from_secs(5));
    assert!(!clock.portal.saved.get(), "saved flag is cleared");
    assert!(!clock.portal.running.get(), "portal stops on restart");
    assert_eq!(
        clock.machine.timers().role(CONFIG_WATCH_SLOT),
        TimerRole::Inactive
    );
}

#[tokio::test(start_paused = true)]
async fn unsaved_config_times_out() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.machine.start();
    clock.step().await;
    clock.machine.handle(Message::ButtonPressed).await;

    let entered = Instant::now();
    clock.run_to_restart(400).await;
    assert!(entered.elapsed() >= CONFIG_TIMEOUT);
    assert!(entered.elapsed() < CONFIG_TIMEOUT + Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn scheduler_loop_exits_for_restart() {
    let mut clock = Clock::new();
    clock.bcp.serve(ended(), None);
    clock.portal.saved.set(true);

    let tx = clock.tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = tx.send(Message::ButtonPressed);
    });

    // left over from an earlier run, discarded before the loop starts
    clock.tx.send(Message::Restart).unwrap();

    let exit = scheduler::run(&mut clock.machine, &mut clock.rx).await;
    assert_eq!(exit, Exit::Restart);
    assert_eq!(clock.portal.starts.get(), 1);
    assert_eq!(clock.machine.state(), DisplayState::ConfigScroll);
}
