//! # BCP Event Data
//!
//! Everything the clock knows about the tournament comes through the
//! [`EventSource`] trait: the event overview (name, started/ended, current
//! round, number of rounds) and, while the event runs, the timer of the
//! current round.
//!
//! ## Sources
//!
//! - [`BcpClient`]: the live Best Coast Pairings API over HTTPS
//! - [`SampleEventSource`]: offline demo data for running without a network
//!
//! ## Event ids
//!
//! The configured event may be pasted straight from the browser, e.g.
//! `https://www.bestcoastpairings.com/event/fsRXYbsuNaWX?active_tab=pairings`.
//! [`normalize_event_id`] reduces that to the bare id the API expects.

use crate::config::EventConfig;
use crate::{EventOverview, EventSnapshot, EventStatus, RoundTimer};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while refreshing event data.
///
/// None of these are fatal: the state machine logs them and keeps showing
/// what it had.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// HTTP request failed (network, timeout, or non-success status)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the JSON we expected
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no event id in {0:?}")]
    InvalidEventId(String),
}

/// Source of event overview and round timer data.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    async fn fetch_overview(&self, event_id: &str) -> Result<EventOverview, RefreshError>;

    /// Timer of `round`, or `None` when the round has no timer set.
    async fn fetch_round_timer(
        &self,
        event_id: &str,
        round: i32,
    ) -> Result<Option<RoundTimer>, RefreshError>;
}

/// Fetch the overview and, while the event runs, the current round's timer.
pub async fn fetch_snapshot<E: EventSource>(
    source: &E,
    event_id: &str,
) -> Result<EventSnapshot, RefreshError> {
    let overview = source.fetch_overview(event_id).await?;
    let timer = if overview.status.is_running() {
        source
            .fetch_round_timer(event_id, overview.status.current_round)
            .await?
    } else {
        None
    };

    Ok(EventSnapshot {
        name: overview.name,
        status: overview.status,
        timer,
    })
}

/// Extract the bare event id from an id or a BCP event URL.
///
/// ```
/// use bcp_clock_lib::event::normalize_event_id;
///
/// let url = "https://www.bestcoastpairings.com/organize/event/fsRXYbsuNaWX?tab=1";
/// assert_eq!(normalize_event_id(url).unwrap(), "fsRXYbsuNaWX");
/// assert_eq!(normalize_event_id("fsRXYbsuNaWX").unwrap(), "fsRXYbsuNaWX");
/// ```
pub fn normalize_event_id(input: &str) -> Result<String, RefreshError> {
    let trimmed = input.trim();
    let rest = match trimmed.find("event/") {
        Some(pos) => &trimmed[pos + "event/".len()..],
        None => trimmed,
    };
    let id = rest.split(['?', '#', '/']).next().unwrap_or_default();

    if id.is_empty() || id.contains(':') {
        return Err(RefreshError::InvalidEventId(input.to_string()));
    }
    Ok(id.to_string())
}

/// Round timer as the API sends it; rounds without a timer lack the fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerResponse {
    timer_length: Option<i64>,
    end_time: Option<DateTime<Utc>>,
}

impl From<TimerResponse> for Option<RoundTimer> {
    fn from(response: TimerResponse) -> Self {
        Some(RoundTimer {
            timer_length: response.timer_length?,
            end_time: response.end_time?,
        })
    }
}

/// Client for the Best Coast Pairings API.
pub struct BcpClient {
    http: reqwest::Client,
    api_base: String,
    timer_path: String,
}

impl BcpClient {
    pub fn new(config: &EventConfig) -> Result<Self, RefreshError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timer_path: config.timer_path.clone(),
        })
    }

    fn overview_url(&self, id: &str) -> String {
        format!("{}/v1/events/{id}/overview", self.api_base)
    }

    fn timer_url(&self, id: &str, round: i32) -> String {
        let path = self
            .timer_path
            .replace("{id}", id)
            .replace("{round}", &round.to_string());
        format!("{}{path}", self.api_base)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RefreshError> {
        debug!("GET {url}");
        let body = self
            .http
            .get(url)
            .header("client-id", "web-app")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl EventSource for BcpClient {
    async fn fetch_overview(&self, event_id: &str) -> Result<EventOverview, RefreshError> {
        let id = normalize_event_id(event_id)?;
        self.get_json(&self.overview_url(&id)).await
    }

    async fn fetch_round_timer(
        &self,
        event_id: &str,
        round: i32,
    ) -> Result<Option<RoundTimer>, RefreshError> {
        let id = normalize_event_id(event_id)?;
        let response: TimerResponse = self.get_json(&self.timer_url(&id, round)).await?;
        Ok(response.into())
    }
}

/// Offline demo event.
///
/// Five rounds of one hour each with a five minute break in between, the
/// first round starting at `anchor`. The timer keeps running into the break
/// so overtime shows on the display before the next round starts.
pub struct SampleEventSource {
    anchor: DateTime<Utc>,
}

impl SampleEventSource {
    pub const NAME: &'static str = "Czech Major 2025";
    pub const ROUNDS: i32 = 5;
    pub const TIMER_LENGTH: i64 = 3600;
    const BREAK: i64 = 300;

    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self { anchor }
    }

    fn round_index(&self, now: DateTime<Utc>) -> i64 {
        (now - self.anchor)
            .num_seconds()
            .div_euclid(Self::TIMER_LENGTH + Self::BREAK)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> EventStatus {
        let index = self.round_index(now);
        let started = index >= 0;
        let ended = index >= i64::from(Self::ROUNDS);
        EventStatus {
            started,
            ended,
            current_round: if started && !ended { index as i32 + 1 } else { 0 },
            number_of_rounds: Self::ROUNDS,
        }
    }

    pub fn timer_at(&self, round: i32) -> Option<RoundTimer> {
        if !(1..=Self::ROUNDS).contains(&round) {
            return None;
        }
        let start = i64::from(round - 1) * (Self::TIMER_LENGTH + Self::BREAK);
        Some(RoundTimer {
            timer_length: Self::TIMER_LENGTH,
            end_time: self.anchor + Duration::seconds(start + Self::TIMER_LENGTH),
        })
    }
}

impl EventSource for SampleEventSource {
    async fn fetch_overview(&self, _event_id: &str) -> Result<EventOverview, RefreshError> {
        Ok(EventOverview {
            name: Self::NAME.to_string(),
            status: self.status_at(Utc::now()),
        })
    }

    async fn fetch_round_timer(
        &self,
        _event_id: &str,
        round: i32,
    ) -> Result<Option<RoundTimer>, RefreshError> {
        Ok(self.timer_at(round))
    }
}
