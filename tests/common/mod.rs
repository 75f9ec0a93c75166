//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synheart_tier_digest::analysis::{
    AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse, RetryConfig,
};
use synheart_tier_digest::collector::{CollectorError, Evidence, EvidenceSource};
use synheart_tier_digest::gate::AllowedTimeGate;
use synheart_tier_digest::scheduler::{Clock, SchedulerOptions};
use synheart_tier_digest::Tier;

/// 10:00 UTC, on every tier's window boundary.
pub fn boundary() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
}

/// Clock moved by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Wall clock that follows tokio's (pausable) time.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + chrono::Duration::from_std(elapsed).unwrap()
    }
}

/// Tokio-driven clock that steps back by `step` once `after` has elapsed,
/// like a wall clock corrected by NTP.
pub struct SteppedClock {
    clock: Arc<TokioClock>,
    after: Duration,
    step: chrono::Duration,
}

impl SteppedClock {
    pub fn new(base: DateTime<Utc>, after: Duration, step: chrono::Duration) -> Arc<Self> {
        Arc::new(Self {
            clock: TokioClock::new(base),
            after,
            step,
        })
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        if tokio::time::Instant::now() - self.clock.start >= self.after {
            now - self.step
        } else {
            now
        }
    }
}

/// Evidence source returning two items per call.
pub struct FakeEvidence {
    identical: bool,
    calls: AtomicUsize,
}

impl FakeEvidence {
    pub fn identical() -> Arc<Self> {
        Arc::new(Self {
            identical: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn changing() -> Arc<Self> {
        Arc::new(Self {
            identical: false,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EvidenceSource for FakeEvidence {
    async fn recent_evidence(
        &self,
        _window_minutes: u32,
        _max_count: usize,
    ) -> Result<Vec<Evidence>, CollectorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u8;
        if self.identical {
            Ok(vec![Evidence::new("image/png", vec![7; 16]); 3])
        } else {
            Ok(vec![
                Evidence::new("image/png", vec![n, 0]),
                Evidence::new("image/png", vec![n, 1]),
            ])
        }
    }
}

type Reply = Box<dyn Fn(&AnalysisRequest, usize) -> Result<AnalysisResponse, AnalysisError> + Send + Sync>;

/// Analysis client that records concurrency and answers from a closure.
pub struct FakeAnalysis {
    delay: Duration,
    reply: Reply,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub tiers: Mutex<Vec<Tier>>,
}

impl FakeAnalysis {
    pub fn new(
        delay: Duration,
        reply: impl Fn(&AnalysisRequest, usize) -> Result<AnalysisResponse, AnalysisError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            delay,
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            tiers: Mutex::new(Vec::new()),
        })
    }

    /// Answers every tier with a well-formed reply naming `activity`.
    pub fn answering(delay: Duration, activity: &'static str) -> Arc<Self> {
        Self::new(delay, move |request, _| Ok(default_reply(request, activity)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn default_reply(request: &AnalysisRequest, activity: &str) -> AnalysisResponse {
    match request.tier {
        Tier::Base => AnalysisResponse::text(format!(
            "```json\n{{\"claims\": [{{\"category_type\": \"task\", \"category_name\": \"{activity}\"}}], \"summary\": \"working on {activity}\"}}\n```"
        )),
        _ => AnalysisResponse::text(format!("{{\"summary\": \"mostly {activity}\"}}")),
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysis {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.tiers.lock().unwrap().push(request.tier);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.reply)(request, call)
    }
}

/// Gate toggled by the test.
#[derive(Default)]
pub struct SwitchGate {
    pub closed: AtomicBool,
}

impl AllowedTimeGate for SwitchGate {
    fn is_allowed_now(&self, _now: DateTime<Utc>) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Options with only the given tiers enabled and fast retries.
pub fn options(tiers: &[Tier]) -> SchedulerOptions {
    SchedulerOptions {
        enabled: Tier::ALL.map(|t| tiers.contains(&t)),
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 40,
        },
        ..SchedulerOptions::default()
    }
}
