//! Channel state machine.
//!
//! ```text
//!             connect()            transport ok
//!  Created ───────────▶ Connecting ────────────▶ Connected ◀──┐
//!     ▲                     │                     │   │       │ value
//!     │        transport    │          disconnect │   │ watchdog
//!     │        failure      ▼                     ▼   ▼       │
//!     │                Disconnected ◀──────────────  Timeout ─┘
//!     │                     │ connect()
//!     └─ (any) delete() ──▶ Deregistered (terminal)
//! ```
//!
//! [`Channel`] is a plain value guarded by the registry; it performs no I/O.
//! Every connection attempt bumps a generation counter, and events tagged
//! with an older generation are reported as [`Admission::Stale`] so late
//! data from a superseded connection is discarded.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ChannelStateError, ValidationError};

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Created,
    Connecting,
    Connected,
    Disconnected,
    Timeout,
    Deregistered,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Created => "created",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Disconnected => "disconnected",
            ChannelState::Timeout => "timeout",
            ChannelState::Deregistered => "deregistered",
        }
    }

    /// Values are accepted in these states.
    pub fn is_receiving(&self) -> bool {
        matches!(self, ChannelState::Connected | ChannelState::Timeout)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest accepted silence timeout: one year.
pub const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 3600;

pub fn validate_timeout(secs: u64) -> Result<(), ValidationError> {
    if secs > MAX_TIMEOUT_SECS {
        return Err(ValidationError::Channel(format!(
            "timeout of {}s exceeds {}s",
            secs, MAX_TIMEOUT_SECS
        )));
    }
    Ok(())
}

/// User-supplied channel definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Transport type tag, e.g. `tcp-json`.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Silence after which the channel times out; 0 disables the watchdog.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl ChannelSpec {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        type_tag: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            type_tag: type_tag.into(),
            timeout_secs: 0,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Channel("name must not be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::Channel(format!(
                "channel {:?} has no address",
                self.name
            )));
        }
        validate_timeout(self.timeout_secs)
    }
}

/// Outcome of offering a value to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Accepted, and the channel left Timeout.
    Resumed,
    /// From a superseded connection; discard.
    Stale,
}

/// Outcome of a watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The channel moved to Timeout (or already was).
    Expired,
    /// Data arrived since the check was scheduled.
    NotDue,
    /// The watched connection is gone.
    Gone,
}

/// Values counted over the last full second.
#[derive(Debug, Clone)]
struct RateCounter {
    window_start: Instant,
    current: u32,
    previous: u32,
}

impl RateCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            current: 0,
            previous: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.previous = if elapsed < Duration::from_secs(2) {
                self.current
            } else {
                0
            };
            self.current = 0;
            self.window_start = now;
        }
    }

    fn record(&mut self, now: Instant) {
        self.roll(now);
        self.current += 1;
    }

    fn per_second(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(2) {
            0
        } else if elapsed >= Duration::from_secs(1) {
            self.current
        } else {
            self.previous
        }
    }
}

/// One channel's logical state.
#[derive(Debug, Clone)]
pub struct Channel {
    spec: ChannelSpec,
    state: ChannelState,
    generation: u64,
    last_update: Instant,
    rate: RateCounter,
}

impl Channel {
    pub fn new(spec: ChannelSpec, now: Instant) -> Self {
        Self {
            spec,
            state: ChannelState::Created,
            generation: 0,
            last_update: now,
            rate: RateCounter::new(now),
        }
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn messages_per_second(&self, now: Instant) -> u32 {
        self.rate.per_second(now)
    }

    pub fn set_timeout(&mut self, secs: u64) {
        self.spec.timeout_secs = secs;
    }

    fn reject(&self, action: &'static str) -> ChannelStateError {
        ChannelStateError {
            channel: self.spec.name.clone(),
            state: self.state,
            action,
        }
    }

    /// Created/Disconnected → Connecting. Returns the new generation.
    pub fn begin_connect(&mut self) -> Result<u64, ChannelStateError> {
        match self.state {
            ChannelState::Created | ChannelState::Disconnected => {
                self.generation += 1;
                self.state = ChannelState::Connecting;
                Ok(self.generation)
            }
            _ => Err(self.reject("connect")),
        }
    }

    /// Connecting → Connected. False when the attempt was superseded.
    pub fn connected(&mut self, generation: u64, now: Instant) -> bool {
        if generation != self.generation || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Connected;
        self.last_update = now;
        self.rate = RateCounter::new(now);
        true
    }

    /// Connecting → Disconnected after a failed attempt.
    pub fn connect_failed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Disconnected;
        true
    }

    /// Any live state → Disconnected. Invalidates in-flight events.
    pub fn disconnect(&mut self) -> Result<(), ChannelStateError> {
        if self.state == ChannelState::Deregistered {
            return Err(self.reject("disconnect"));
        }
        self.generation += 1;
        self.state = ChannelState::Disconnected;
        Ok(())
    }

    /// The connection's stream ended on its own.
    pub fn lost(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.state.is_receiving() {
            return false;
        }
        self.generation += 1;
        self.state = ChannelState::Disconnected;
        true
    }

    /// Offer a value from connection `generation`.
    pub fn accept_value(
        &mut self,
        generation: u64,
        now: Instant,
    ) -> Result<Admission, ChannelStateError> {
        if self.state == ChannelState::Deregistered {
            return Err(self.reject("accept values"));
        }
        if generation != self.generation {
            return Ok(Admission::Stale);
        }

        let admission = match self.state {
            ChannelState::Connected => Admission::Accepted,
            ChannelState::Timeout => {
                self.state = ChannelState::Connected;
                Admission::Resumed
            }
            _ => return Err(self.reject("accept values")),
        };
        self.last_update = now;
        self.rate.record(now);
        Ok(admission)
    }

    /// Watchdog check: Connected → Timeout once the silence reaches the
    /// configured timeout.
    pub fn expire(&mut self, generation: u64, now: Instant) -> Expiry {
        if generation != self.generation {
            return Expiry::Gone;
        }
        let Some(timeout) = self.spec.timeout() else {
            return Expiry::Gone;
        };
        match self.state {
            ChannelState::Timeout => Expiry::Expired,
            ChannelState::Connected => {
                if now.saturating_duration_since(self.last_update) >= timeout {
                    self.state = ChannelState::Timeout;
                    Expiry::Expired
                } else {
                    Expiry::NotDue
                }
            }
            _ => Expiry::Gone,
        }
    }

    /// Any state → Deregistered. Irreversible.
    pub fn deregister(&mut self) {
        self.generation += 1;
        self.state = ChannelState::Deregistered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Channel {
        Channel::new(
            ChannelSpec::new("north", "10.0.0.1", 9000, "tcp-json").with_timeout(30),
            Instant::now(),
        )
    }

    fn connected() -> (Channel, u64) {
        let mut ch = channel();
        let generation = ch.begin_connect().unwrap();
        assert!(ch.connected(generation, Instant::now()));
        (ch, generation)
    }

    #[test]
    fn connect_lifecycle() {
        let mut ch = channel();
        assert_eq!(ch.state(), ChannelState::Created);

        let generation = ch.begin_connect().unwrap();
        assert_eq!(ch.state(), ChannelState::Connecting);
        assert!(ch.begin_connect().is_err());

        assert!(ch.connect_failed(generation));
        assert_eq!(ch.state(), ChannelState::Disconnected);

        let generation = ch.begin_connect().unwrap();
        assert!(ch.connected(generation, Instant::now()));
        assert_eq!(ch.state(), ChannelState::Connected);
        assert!(ch.begin_connect().is_err());
    }

    #[test]
    fn superseded_attempt_cannot_complete() {
        let mut ch = channel();
        let generation = ch.begin_connect().unwrap();
        ch.disconnect().unwrap();
        assert!(!ch.connected(generation, Instant::now()));
        assert_eq!(ch.state(), ChannelState::Disconnected);
    }

    #[test]
    fn values_from_old_generation_are_stale() {
        let (mut ch, generation) = connected();
        ch.disconnect().unwrap();
        let next = ch.begin_connect().unwrap();
        assert!(ch.connected(next, Instant::now()));

        assert_eq!(
            ch.accept_value(generation, Instant::now()).unwrap(),
            Admission::Stale
        );
        assert_eq!(
            ch.accept_value(next, Instant::now()).unwrap(),
            Admission::Accepted
        );
    }

    #[test]
    fn deregistered_rejects_values() {
        let (mut ch, generation) = connected();
        ch.deregister();
        let err = ch.accept_value(generation, Instant::now()).unwrap_err();
        assert_eq!(err.state, ChannelState::Deregistered);
        assert!(ch.disconnect().is_err());
        assert!(ch.begin_connect().is_err());
    }

    #[test]
    fn timeout_and_resume() {
        let (mut ch, generation) = connected();
        let start = ch.last_update();

        assert_eq!(
            ch.expire(generation, start + Duration::from_secs(29)),
            Expiry::NotDue
        );
        assert_eq!(
            ch.expire(generation, start + Duration::from_secs(30)),
            Expiry::Expired
        );
        assert_eq!(ch.state(), ChannelState::Timeout);

        let later = start + Duration::from_secs(45);
        assert_eq!(ch.accept_value(generation, later).unwrap(), Admission::Resumed);
        assert_eq!(ch.state(), ChannelState::Connected);
        assert_eq!(ch.last_update(), later);
    }

    #[test]
    fn zero_timeout_never_expires() {
        let mut ch = channel();
        ch.set_timeout(0);
        let generation = ch.begin_connect().unwrap();
        ch.connected(generation, Instant::now());
        assert_eq!(
            ch.expire(generation, Instant::now() + Duration::from_secs(3600)),
            Expiry::Gone
        );
        assert_eq!(ch.state(), ChannelState::Connected);
    }

    #[test]
    fn lost_stream_disconnects_once() {
        let (mut ch, generation) = connected();
        assert!(ch.lost(generation));
        assert_eq!(ch.state(), ChannelState::Disconnected);
        assert!(!ch.lost(generation));
    }

    #[test]
    fn rate_counts_last_full_second() {
        let (mut ch, generation) = connected();
        let t0 = ch.last_update();
        for ms in [0, 100, 200] {
            ch.accept_value(generation, t0 + Duration::from_millis(ms)).unwrap();
        }
        assert_eq!(ch.messages_per_second(t0 + Duration::from_millis(1100)), 3);
        assert_eq!(ch.messages_per_second(t0 + Duration::from_secs(5)), 0);
    }

    #[test]
    fn spec_validation() {
        assert!(ChannelSpec::new("", "h", 1, "memory").validate().is_err());
        assert!(ChannelSpec::new("a", " ", 1, "memory").validate().is_err());
        let spec = ChannelSpec::new("a", "h", 1, "memory");
        assert!(spec.validate().is_ok());
        assert_eq!(spec.endpoint(), "h:1");
        assert_eq!(spec.timeout(), None);

        let year = spec.clone().with_timeout(MAX_TIMEOUT_SECS);
        assert!(year.validate().is_ok());
        let forever = spec.with_timeout(u64::MAX);
        assert!(matches!(forever.validate(), Err(ValidationError::Channel(_))));
    }
}
