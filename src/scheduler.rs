//! The tier scheduler: three independent periodic loops, one per tier.
//!
//! Each enabled tier ticks at its window length, aligned to wall-clock window
//! boundaries. A tick runs the tier's pipeline in its own task unless the
//! previous run of that tier is still in flight, in which case the tick is
//! dropped and counted. Runs of different tiers never wait on each other;
//! they only meet in the record store, where each tier writes its own keys.

use crate::analysis::{
    analyze_with_retry, AnalysisClient, AnalysisError, AnalysisRequest, BaseAnalysis,
    RequestContext, RetryConfig, SummaryAnalysis,
};
use crate::collector::{ContextTimeline, EvidenceSource};
use crate::config::Config;
use crate::core::change::{all_identical, all_no_change, build_no_change_record, NoChangeBasis};
use crate::core::gap::detect_gap;
use crate::core::record::{SummaryRecord, TierPayload, MAX_CLAIMS};
use crate::core::response::{parse_response, ParsedResponse};
use crate::core::tier::{Tier, TierWindows};
use crate::core::timeline::{aggregate, Aggregation, AggregationRule};
use crate::core::windowing::{until_next_boundary, TimeWindow};
use crate::gate::{AllowedTimeGate, AlwaysAllowed};
use crate::registry::ClassificationRegistry;
use crate::store::{RecordStore, StoreError};
use crate::transparency::{ExecutionLog, RunOutcome, SchedulerStatus, TierStatus};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Interval at which `stop()` checks for in-flight runs.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default delay before a parent tier reads the child records of its window.
pub const DEFAULT_PARENT_SETTLE: Duration = Duration::from_secs(30);

/// Source of wall-clock time for window computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Errors from a single tier run.
#[derive(Debug)]
pub enum PipelineError {
    /// The tier already has a run in flight
    Busy(Tier),
    /// Analysis failed after retries
    Analysis(AnalysisError),
    /// The record could not be saved
    Store(StoreError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Busy(tier) => write!(f, "{tier} tier is already executing"),
            PipelineError::Analysis(e) => write!(f, "{e}"),
            PipelineError::Store(e) => write!(f, "Failed to save record: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<AnalysisError> for PipelineError {
    fn from(e: AnalysisError) -> Self {
        PipelineError::Analysis(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub windows: TierWindows,
    /// Indexed by [`Tier::index`]
    pub enabled: [bool; 3],
    /// Evidence items requested per Base window
    pub max_evidence: usize,
    pub retry: RetryConfig,
    /// How long a scheduled Mid/Top run waits for the child tier's run on
    /// the same boundary before reading child records
    pub parent_settle: Duration,
    /// Where to write the status snapshot after each run
    pub status_path: Option<PathBuf>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            windows: TierWindows::default(),
            enabled: [true; 3],
            max_evidence: 5,
            retry: RetryConfig::default(),
            parent_settle: DEFAULT_PARENT_SETTLE,
            status_path: None,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            windows: config.tiers.windows(),
            enabled: Tier::ALL.map(|t| config.tiers.is_enabled(t)),
            max_evidence: config.evidence.max_count,
            retry: config.analysis.retry.clone(),
            parent_settle: Duration::from_secs(config.tiers.parent_settle_secs),
            status_path: Some(config.status_path()),
        }
    }

    pub fn is_enabled(&self, tier: Tier) -> bool {
        self.enabled[tier.index()]
    }
}

struct Inner {
    options: SchedulerOptions,
    evidence: Arc<dyn EvidenceSource>,
    records: Arc<dyn RecordStore>,
    analysis: Arc<dyn AnalysisClient>,
    registry: Option<Arc<ClassificationRegistry>>,
    context: Option<Arc<dyn ContextTimeline>>,
    gate: Arc<dyn AllowedTimeGate>,
    clock: Arc<dyn Clock>,
    /// Per-tier mutual exclusion, indexed by [`Tier::index`]
    executing: [AtomicBool; 3],
    log: ExecutionLog,
    /// Serializes status snapshot writes from concurrent tier runs
    status_lock: Mutex<()>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

/// Holds a tier's execution flag; clears it when dropped.
struct ExecutionGuard {
    inner: Arc<Inner>,
    tier: Tier,
}

impl ExecutionGuard {
    fn try_acquire(inner: &Arc<Inner>, tier: Tier) -> Option<Self> {
        inner.executing[tier.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: Arc::clone(inner),
                tier,
            })
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.inner.executing[self.tier.index()].store(false, Ordering::Release);
    }
}

/// Builder for [`TierScheduler`].
pub struct TierSchedulerBuilder {
    options: SchedulerOptions,
    evidence: Arc<dyn EvidenceSource>,
    records: Arc<dyn RecordStore>,
    analysis: Arc<dyn AnalysisClient>,
    registry: Option<Arc<ClassificationRegistry>>,
    context: Option<Arc<dyn ContextTimeline>>,
    gate: Arc<dyn AllowedTimeGate>,
    clock: Arc<dyn Clock>,
}

impl TierSchedulerBuilder {
    pub fn registry(mut self, registry: Arc<ClassificationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn context(mut self, context: Arc<dyn ContextTimeline>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn gate(mut self, gate: Arc<dyn AllowedTimeGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> TierScheduler {
        TierScheduler {
            inner: Arc::new(Inner {
                options: self.options,
                evidence: self.evidence,
                records: self.records,
                analysis: self.analysis,
                registry: self.registry,
                context: self.context,
                gate: self.gate,
                clock: self.clock,
                executing: Default::default(),
                log: ExecutionLog::new(),
                status_lock: Mutex::new(()),
                running: AtomicBool::new(false),
                cancel: Mutex::new(None),
                loops: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Owns the per-tier loops and their execution state.
///
/// Cloning is cheap and yields a handle to the same scheduler.
#[derive(Clone)]
pub struct TierScheduler {
    inner: Arc<Inner>,
}

impl TierScheduler {
    pub fn builder(
        options: SchedulerOptions,
        evidence: Arc<dyn EvidenceSource>,
        records: Arc<dyn RecordStore>,
        analysis: Arc<dyn AnalysisClient>,
    ) -> TierSchedulerBuilder {
        TierSchedulerBuilder {
            options,
            evidence,
            records,
            analysis,
            registry: None,
            context: None,
            gate: Arc::new(AlwaysAllowed),
            clock: Arc::new(SystemClock),
        }
    }

    /// Arm one ticking loop per enabled tier. Must be called inside a tokio runtime.
    ///
    /// Calling `start` on a running scheduler does nothing.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("Scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let mut handles = Vec::new();
        for tier in Tier::ALL {
            if !self.inner.options.is_enabled(tier) {
                continue;
            }
            let inner = Arc::clone(&self.inner);
            handles.push(tokio::spawn(tier_loop(inner, tier, token.clone())));
            tracing::info!(
                tier = %tier,
                window_minutes = self.inner.options.windows.minutes(tier),
                "Tier loop started"
            );
        }

        if let Ok(mut cancel) = self.inner.cancel.lock() {
            *cancel = Some(token);
        }
        if let Ok(mut loops) = self.inner.loops.lock() {
            *loops = handles;
        }
        self.inner.persist_status();
    }

    /// Stop ticking and wait for in-flight runs to finish.
    ///
    /// No run is interrupted; this returns once every tier is idle.
    pub async fn stop(&self) {
        let token = self.inner.cancel.lock().ok().and_then(|mut c| c.take());
        if let Some(token) = token {
            token.cancel();
        }

        let handles = self
            .inner
            .loops
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default();
        for handle in handles {
            let _ = handle.await;
        }

        while self.is_executing() {
            tracing::debug!("Waiting for in-flight tier runs to finish");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.inner.running.store(false, Ordering::Release);
        self.inner.persist_status();
        tracing::info!("Scheduler stopped");
    }

    /// Run one tier now, under the same mutual exclusion as its ticks.
    ///
    /// Returns [`PipelineError::Busy`] if the tier is already executing.
    pub async fn trigger(&self, tier: Tier) -> Result<RunOutcome, PipelineError> {
        let Some(guard) = ExecutionGuard::try_acquire(&self.inner, tier) else {
            return Err(PipelineError::Busy(tier));
        };
        let window = TimeWindow::ending_at_or_before(
            self.inner.clock.now(),
            self.inner.options.windows.minutes(tier),
        );
        let result = self.inner.execute(tier, window).await;
        drop(guard);
        self.inner.persist_status();
        result
    }

    /// Whether any tier has a run in flight.
    pub fn is_executing(&self) -> bool {
        self.inner
            .executing
            .iter()
            .any(|flag| flag.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SchedulerStatus {
        self.inner.status()
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.inner.log
    }
}

async fn tier_loop(inner: Arc<Inner>, tier: Tier, cancel: CancellationToken) {
    let minutes = inner.options.windows.minutes(tier);
    let period = Duration::from_secs(u64::from(minutes.max(1)) * 60);
    let first = Instant::now() + until_next_boundary(inner.clock.now(), minutes);

    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // The tick belongs to the boundary it was aligned to, even if
                // the wall clock has drifted a little since start.
                let window = TimeWindow::nearest(inner.clock.now(), minutes);
                match ExecutionGuard::try_acquire(&inner, tier) {
                    Some(guard) => {
                        let inner = Arc::clone(&inner);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Some(child) = tier.child() {
                                inner.settle(child, &cancel).await;
                            }
                            // Failures are counted and logged inside execute
                            let _ = inner.execute(tier, window).await;
                            drop(guard);
                            inner.persist_status();
                        });
                    }
                    None => {
                        inner.log.tier(tier).record_dropped();
                        tracing::debug!(tier = %tier, "Previous run still executing, tick dropped");
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!(tier = %tier, "Tier loop shutting down");
                break;
            }
        }
    }
}

/// What a successful run produced.
struct RunReport {
    outcome: RunOutcome,
    window_end: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(outcome: RunOutcome, window: Option<&TimeWindow>) -> Self {
        Self {
            outcome,
            window_end: window.map(|w| w.end),
        }
    }
}

impl Inner {
    /// Run the tier pipeline once and account for the outcome.
    ///
    /// The caller must hold the tier's [`ExecutionGuard`].
    async fn execute(&self, tier: Tier, window: TimeWindow) -> Result<RunOutcome, PipelineError> {
        let now = self.clock.now();

        let stats = self.log.tier(tier);
        match self.run_tier(tier, now, window).await {
            Ok(report) => {
                stats.record(report.outcome, report.window_end, now);
                Ok(report.outcome)
            }
            Err(e) => {
                tracing::error!(tier = %tier, window_end = %window.end, "Tier run failed: {}", e);
                stats.record(RunOutcome::Failed, Some(window.end), now);
                Err(e)
            }
        }
    }

    async fn run_tier(
        &self,
        tier: Tier,
        now: DateTime<Utc>,
        window: TimeWindow,
    ) -> Result<RunReport, PipelineError> {
        if !self.gate.is_allowed_now(now) {
            tracing::debug!(tier = %tier, "Outside allowed time, skipping run");
            return Ok(RunReport::new(RunOutcome::NotAllowed, None));
        }

        match tier.child() {
            None => self.run_base(now, window).await,
            Some(child) => self.run_parent(tier, child, window).await,
        }
    }

    async fn run_base(
        &self,
        now: DateTime<Utc>,
        window: TimeWindow,
    ) -> Result<RunReport, PipelineError> {
        let minutes = self.options.windows.base_minutes;
        let evidence = match self
            .evidence
            .recent_evidence(minutes, self.options.max_evidence)
            .await
        {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(tier = %Tier::Base, "Could not read evidence: {}", e);
                Vec::new()
            }
        };

        if evidence.is_empty() {
            tracing::info!(tier = %Tier::Base, window_end = %window.end, "No evidence for window");
            return Ok(RunReport::new(RunOutcome::Empty, Some(&window)));
        }

        if all_identical(&evidence) {
            let record =
                build_no_change_record(Tier::Base, &window, NoChangeBasis::Evidence(&evidence));
            self.records.save(&record).await?;
            tracing::info!(
                tier = %Tier::Base,
                window_end = %window.end,
                evidence = evidence.len(),
                "Evidence unchanged, analysis skipped"
            );
            return Ok(RunReport::new(RunOutcome::Skipped, Some(&window)));
        }

        // Only records from earlier windows count as history
        let history: Vec<SummaryRecord> = self
            .read_recent(Tier::Base, 2)
            .await
            .into_iter()
            .filter(|r| r.timestamp < window.end)
            .collect();
        let gap = detect_gap(&history, now, minutes);
        if let Some(gap) = &gap {
            tracing::info!(
                tier = %Tier::Base,
                gap_minutes = gap.gap_minutes,
                last_record = %gap.last_record_time,
                "Gap detected since last record"
            );
        }
        let previous = if gap.is_none() {
            history.last().cloned()
        } else {
            None
        };

        let taxonomy = match &self.registry {
            Some(registry) => registry.render_context(now).await,
            None => None,
        };

        let context = RequestContext {
            gap,
            taxonomy,
            focus: self.focus_context(&window).await,
            previous: previous.clone(),
            timeline: Vec::new(),
        };
        let evidence_count = evidence.len();
        let request = AnalysisRequest::for_evidence(window, evidence, context);
        let response =
            analyze_with_retry(self.analysis.as_ref(), &request, &self.options.retry).await?;

        let record = base_record(
            &window,
            evidence_count,
            previous.as_ref(),
            parse_response::<BaseAnalysis>(&response.text),
            response.usage,
        );
        self.records.save(&record).await?;
        tracing::info!(
            tier = %Tier::Base,
            window_end = %window.end,
            claims = record.claims().len(),
            parsed = record.raw_response.is_none(),
            "Base record saved"
        );

        if let Some(registry) = &self.registry {
            registry.write_back(&record).await;
        }

        Ok(RunReport::new(RunOutcome::Saved, Some(&window)))
    }

    async fn run_parent(
        &self,
        tier: Tier,
        child: Tier,
        window: TimeWindow,
    ) -> Result<RunReport, PipelineError> {
        let expected = self.options.windows.children_per_window(tier);
        let children: Vec<SummaryRecord> = self
            .read_recent(child, expected)
            .await
            .into_iter()
            .filter(|r| window.owns_child_end(r.timestamp))
            .collect();

        if children.is_empty() {
            tracing::info!(tier = %tier, window_end = %window.end, "No {} records for window", child);
            return Ok(RunReport::new(RunOutcome::Empty, Some(&window)));
        }

        if all_no_change(&children) {
            let record = build_no_change_record(tier, &window, NoChangeBasis::Children(&children));
            self.records.save(&record).await?;
            tracing::info!(
                tier = %tier,
                window_end = %window.end,
                children = children.len(),
                "All children unchanged, analysis skipped"
            );
            return Ok(RunReport::new(RunOutcome::Skipped, Some(&window)));
        }

        let child_minutes = self.options.windows.minutes(child);
        let aggregation = match AggregationRule::for_parent(tier) {
            Some(rule) => aggregate(&children, &window, child_minutes, &rule),
            None => Aggregation::default(),
        };

        let context = RequestContext {
            focus: self.focus_context(&window).await,
            timeline: aggregation.entries.clone(),
            ..RequestContext::default()
        };
        let child_count = children.len();
        let no_change_count = children.iter().filter(|r| r.no_change).count();
        let request = AnalysisRequest::for_children(tier, window, children, context);
        let response =
            analyze_with_retry(self.analysis.as_ref(), &request, &self.options.retry).await?;

        let mut record = SummaryRecord::new(tier, window.end);
        record.usage = response.usage;
        let summary = match parse_response::<SummaryAnalysis>(&response.text) {
            ParsedResponse::Structured(parsed) => Some(parsed.summary),
            ParsedResponse::Raw(text) => {
                tracing::warn!(tier = %tier, "Analysis output not structured, keeping raw text");
                record.raw_response = Some(text);
                None
            }
        };

        match &mut record.payload {
            TierPayload::Mid(mid) => {
                mid.timeline = aggregation.entries;
                mid.summary = summary;
                mid.child_count = child_count;
                mid.no_change_child_count = Some(no_change_count);
            }
            TierPayload::Top(top) => {
                top.distribution = aggregation.entries;
                top.miscellaneous = aggregation.miscellaneous;
                top.summary = summary;
                top.child_count = child_count;
                top.no_change_child_count = Some(no_change_count);
            }
            TierPayload::Base(_) => {}
        }

        self.records.save(&record).await?;
        tracing::info!(
            tier = %tier,
            window_end = %window.end,
            children = child_count,
            entries = record.entries().len(),
            "{} record saved",
            tier
        );

        Ok(RunReport::new(RunOutcome::Saved, Some(&window)))
    }

    /// Let the child tier's run for the same boundary reach the store.
    ///
    /// Waits `parent_settle`, then for as long as the child tier is still
    /// executing, up to one child window. Returns at once on shutdown.
    async fn settle(&self, child: Tier, cancel: &CancellationToken) {
        let limit = Duration::from_secs(u64::from(self.options.windows.minutes(child)) * 60);
        let wait = async {
            tokio::time::sleep(self.options.parent_settle).await;
            let deadline = Instant::now() + limit;
            while self.executing[child.index()].load(Ordering::Acquire) && Instant::now() < deadline
            {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        tokio::select! {
            _ = wait => {}
            _ = cancel.cancelled() => {
                tracing::debug!(child = %child, "Shutting down, not waiting for child tier");
            }
        }
    }

    async fn read_recent(&self, tier: Tier, count: usize) -> Vec<SummaryRecord> {
        match self.records.get_recent(tier, count).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(tier = %tier, "Could not read records: {}", e);
                Vec::new()
            }
        }
    }

    async fn focus_context(&self, window: &TimeWindow) -> Option<String> {
        match &self.context {
            Some(context) => context.context_in_range(window.start, window.end).await,
            None => None,
        }
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            version: crate::VERSION.to_string(),
            running: self.running.load(Ordering::Acquire),
            session_start: self.log.session_start(),
            updated_at: Utc::now(),
            tiers: Tier::ALL
                .iter()
                .map(|&tier| TierStatus {
                    tier,
                    enabled: self.options.is_enabled(tier),
                    window_minutes: self.options.windows.minutes(tier),
                    is_executing: self.executing[tier.index()].load(Ordering::Acquire),
                    stats: self.log.tier(tier).snapshot(),
                })
                .collect(),
        }
    }

    fn persist_status(&self) {
        if let Some(path) = &self.options.status_path {
            let _writing = self
                .status_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = self.status().save(path) {
                tracing::warn!(path = ?path, "Could not write status snapshot: {}", e);
            }
        }
    }
}

/// Build the Base record from a parsed (or unparsed) analysis answer.
///
/// The primary activity's duration carries over from `previous` when the
/// primary claim is unchanged; otherwise it restarts at one window.
fn base_record(
    window: &TimeWindow,
    evidence_count: usize,
    previous: Option<&SummaryRecord>,
    parsed: ParsedResponse<BaseAnalysis>,
    usage: Option<crate::core::record::UsageMetadata>,
) -> SummaryRecord {
    let mut record = SummaryRecord::new(Tier::Base, window.end);
    record.usage = usage;
    let window_minutes = window.minutes().max(0) as u32;

    let (mut claims, summary) = match parsed {
        ParsedResponse::Structured(parsed) => (parsed.claims, parsed.summary),
        ParsedResponse::Raw(text) => {
            tracing::warn!(tier = %Tier::Base, "Analysis output not structured, keeping raw text");
            record.raw_response = Some(text);
            (Vec::new(), None)
        }
    };
    claims.retain(|c| !c.category_name.trim().is_empty());
    claims.truncate(MAX_CLAIMS);

    let continued = match (previous.and_then(|p| p.primary_claim()), claims.first()) {
        (Some(before), Some(now)) => before.key() == now.key(),
        _ => false,
    };
    let duration = if continued {
        previous
            .and_then(|p| p.duration_minutes())
            .unwrap_or(window_minutes)
            + window_minutes
    } else {
        window_minutes
    };

    if let TierPayload::Base(base) = &mut record.payload {
        base.claims = claims;
        base.summary = summary;
        base.duration_minutes = Some(duration);
        base.evidence_count = evidence_count;
    }
    record
}
