//! Classification registry: the taxonomy as seen by the analysis pipeline.
//!
//! The read path renders the taxonomy into request context. Behaviors the
//! analysis proposed are only offered back to it while they keep being used:
//! a proposed behavior with no matching Base claim in the recency window is
//! left out, which stops one-off suggestions from piling up.
//!
//! The write path turns newly proposed claims into taxonomy entries.

use crate::core::record::{CategoryType, SummaryRecord};
use crate::core::tier::Tier;
use crate::store::taxonomy::names_match;
use crate::store::{EntryKind, EntryOrigin, RecordStore, Taxonomy, TaxonomyStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

/// Default recency window for proposed behaviors.
pub const DEFAULT_RECENCY_DAYS: u32 = 7;

/// Base records read per page when checking proposed behavior usage.
const USAGE_PAGE_SIZE: usize = 60;

/// Read/write adapter over the taxonomy store.
pub struct ClassificationRegistry {
    taxonomy: Arc<dyn TaxonomyStore>,
    records: Arc<dyn RecordStore>,
    recency_days: u32,
    base_minutes: u32,
}

impl ClassificationRegistry {
    pub fn new(
        taxonomy: Arc<dyn TaxonomyStore>,
        records: Arc<dyn RecordStore>,
        recency_days: u32,
        base_minutes: u32,
    ) -> Self {
        Self {
            taxonomy,
            records,
            recency_days,
            base_minutes: base_minutes.max(1),
        }
    }

    /// Render the taxonomy for inclusion in an analysis request.
    ///
    /// Returns `None` when the taxonomy cannot be read or is empty.
    pub async fn render_context(&self, now: DateTime<Utc>) -> Option<String> {
        let taxonomy = match self.taxonomy.read_taxonomy().await {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                tracing::warn!("Could not read taxonomy: {}", e);
                return None;
            }
        };

        let cutoff = now - Duration::days(i64::from(self.recency_days));
        let proposed: Vec<&str> = taxonomy
            .behaviors
            .iter()
            .filter(|b| b.origin == EntryOrigin::Proposed)
            .map(|b| b.name.as_str())
            .collect();
        let recent = self.recent_usage(&proposed, cutoff).await;
        let filtered = filter_stale_proposals(taxonomy, &recent, cutoff);
        let rendered = render_taxonomy(&filtered);
        (!rendered.is_empty()).then_some(rendered)
    }

    /// Base records since `cutoff`, newest first, read page by page.
    ///
    /// Stops as soon as every name in `proposed` has a matching behavior
    /// claim, so a taxonomy whose proposals are in regular use costs one page
    /// per tick rather than the whole recency window.
    async fn recent_usage(&self, proposed: &[&str], cutoff: DateTime<Utc>) -> Vec<SummaryRecord> {
        let lookback = (self.recency_days as usize * 24 * 60) / self.base_minutes as usize;
        let mut pending: Vec<&str> = proposed.to_vec();
        let mut recent = Vec::new();
        let mut skip = 0;

        while !pending.is_empty() && skip < lookback {
            let count = USAGE_PAGE_SIZE.min(lookback - skip);
            let page = match self.records.get_earlier(Tier::Base, count, skip).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Could not read recent base records: {}", e);
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            for record in page.into_iter().rev() {
                if record.timestamp < cutoff {
                    return recent;
                }
                pending.retain(|name| !claims_behavior(&record, name));
                recent.push(record);
            }
            skip += count;
        }

        tracing::debug!(
            records = recent.len(),
            unused = pending.len(),
            "Checked proposed behavior usage"
        );
        recent
    }

    /// Create taxonomy entries for the newly proposed claims of a Base record.
    ///
    /// Returns the number of entries proposed. Failures are logged and do not
    /// affect the already-persisted record.
    pub async fn write_back(&self, record: &SummaryRecord) -> usize {
        let proposed: Vec<_> = record
            .claims()
            .iter()
            .filter(|c| c.category_type.is_proposed())
            .collect();
        if proposed.is_empty() {
            return 0;
        }

        let mut taxonomy = match self.taxonomy.read_taxonomy().await {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                tracing::warn!("Skipping taxonomy write-back, read failed: {}", e);
                return 0;
            }
        };

        let mut created = 0;
        for claim in proposed {
            let name = claim.category_name.trim();
            if name.is_empty() {
                continue;
            }

            let mut wanted: Vec<(EntryKind, &str, Option<&str>)> = Vec::new();
            match claim.category_type {
                CategoryType::NewBehavior => {
                    if !taxonomy.has_behavior(name) {
                        wanted.push((EntryKind::Behavior, name, None));
                    }
                }
                CategoryType::NewTask => {
                    if taxonomy.find_task(name).is_none() {
                        wanted.push((EntryKind::Task, name, None));
                    }
                    if let Some(subtask) = claim.subtask_name.as_deref().map(str::trim) {
                        if !subtask.is_empty() && !taxonomy.has_subtask(name, subtask) {
                            wanted.push((EntryKind::Task, subtask, Some(name)));
                        }
                    }
                }
                _ => {}
            }

            for (kind, entry, parent) in wanted {
                match self.taxonomy.propose_entry(kind, entry, parent).await {
                    Ok(()) => {
                        taxonomy.insert(kind, entry, parent);
                        created += 1;
                        tracing::info!(kind = ?kind, name = entry, parent = ?parent, "Added proposed taxonomy entry");
                    }
                    Err(e) => {
                        tracing::warn!(kind = ?kind, name = entry, "Taxonomy write-back failed: {}", e);
                    }
                }
            }
        }

        created
    }
}

fn claims_behavior(record: &SummaryRecord, name: &str) -> bool {
    record
        .claims()
        .iter()
        .any(|c| {
            c.category_type.settled() == CategoryType::Behavior
                && names_match(&c.category_name, name)
        })
}

/// Drop proposed behaviors that no Base record since `cutoff` has claimed.
///
/// User-authored entries and all tasks are kept.
pub fn filter_stale_proposals(
    mut taxonomy: Taxonomy,
    recent: &[SummaryRecord],
    cutoff: DateTime<Utc>,
) -> Taxonomy {
    let used: HashSet<String> = recent
        .iter()
        .filter(|r| r.timestamp >= cutoff)
        .flat_map(|r| r.claims())
        .filter(|c| c.category_type.settled() == CategoryType::Behavior)
        .map(|c| c.category_name.trim().to_lowercase())
        .collect();

    taxonomy.behaviors.retain(|b| {
        b.origin == EntryOrigin::User || used.iter().any(|u| names_match(u, &b.name))
    });
    taxonomy
}

/// Plain-text rendering used as request context.
pub fn render_taxonomy(taxonomy: &Taxonomy) -> String {
    let mut out = String::new();

    if !taxonomy.tasks.is_empty() {
        out.push_str("Tasks:\n");
        for task in &taxonomy.tasks {
            if task.subtasks.is_empty() {
                let _ = writeln!(out, "- {}", task.name);
            } else {
                let _ = writeln!(out, "- {} (subtasks: {})", task.name, task.subtasks.join(", "));
            }
        }
    }

    if !taxonomy.behaviors.is_empty() {
        out.push_str("Behaviors:\n");
        for behavior in &taxonomy.behaviors {
            let _ = writeln!(out, "- {}", behavior.name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{ActivityClaim, TierPayload};
    use crate::store::{BehaviorEntry, MemoryRecordStore, StoreError, TaskEntry};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryTaxonomy {
        taxonomy: Mutex<Taxonomy>,
        fail_writes: bool,
    }

    #[async_trait]
    impl TaxonomyStore for MemoryTaxonomy {
        async fn read_taxonomy(&self) -> Result<Taxonomy, StoreError> {
            Ok(self.taxonomy.lock().await.clone())
        }

        async fn propose_entry(
            &self,
            kind: EntryKind,
            name: &str,
            parent: Option<&str>,
        ) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::IoError("read-only".to_string()));
            }
            self.taxonomy.lock().await.insert(kind, name, parent);
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn base_with(ts: DateTime<Utc>, claims: Vec<ActivityClaim>) -> SummaryRecord {
        let mut record = SummaryRecord::new(Tier::Base, ts);
        if let TierPayload::Base(base) = &mut record.payload {
            base.claims = claims;
        }
        record
    }

    fn behavior(name: &str, origin: EntryOrigin) -> BehaviorEntry {
        BehaviorEntry {
            name: name.to_string(),
            origin,
        }
    }

    #[test]
    fn test_filter_stale_proposals() {
        let taxonomy = Taxonomy {
            tasks: vec![],
            behaviors: vec![
                behavior("Reading", EntryOrigin::User),
                behavior("Doomscrolling", EntryOrigin::Proposed),
                behavior("Tab hoarding", EntryOrigin::Proposed),
                behavior("Old habit", EntryOrigin::Proposed),
            ],
        };
        let recent = vec![
            base_with(
                now() - Duration::days(1),
                vec![ActivityClaim::new(CategoryType::Behavior, "doomscrolling")],
            ),
            base_with(
                now() - Duration::days(9),
                vec![ActivityClaim::new(CategoryType::Behavior, "Old habit")],
            ),
        ];

        let filtered = filter_stale_proposals(taxonomy, &recent, now() - Duration::days(7));
        let names: Vec<&str> = filtered.behaviors.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Reading", "Doomscrolling"]);
    }

    #[test]
    fn test_render_taxonomy() {
        let taxonomy = Taxonomy {
            tasks: vec![TaskEntry {
                name: "Thesis".to_string(),
                subtasks: vec!["Outline".to_string(), "Draft".to_string()],
                origin: EntryOrigin::User,
            }],
            behaviors: vec![behavior("Reading", EntryOrigin::User)],
        };
        let text = render_taxonomy(&taxonomy);
        assert!(text.contains("- Thesis (subtasks: Outline, Draft)"));
        assert!(text.contains("Behaviors:\n- Reading"));
        assert!(render_taxonomy(&Taxonomy::default()).is_empty());
    }

    #[tokio::test]
    async fn test_write_back_creates_missing_entries_once() {
        let taxonomy = Arc::new(MemoryTaxonomy::default());
        let records = Arc::new(MemoryRecordStore::new());
        let registry = ClassificationRegistry::new(taxonomy.clone(), records, 7, 2);

        let record = base_with(
            now(),
            vec![
                ActivityClaim::new(CategoryType::NewTask, "Taxes").with_subtask("Receipts"),
                ActivityClaim::new(CategoryType::NewBehavior, "Doomscrolling"),
                ActivityClaim::new(CategoryType::Task, "Existing"),
            ],
        );

        assert_eq!(registry.write_back(&record).await, 3);
        assert_eq!(registry.write_back(&record).await, 0);

        let stored = taxonomy.read_taxonomy().await.unwrap();
        assert!(stored.has_subtask("Taxes", "Receipts"));
        assert!(stored.has_behavior("Doomscrolling"));
        assert!(stored.find_task("Existing").is_none());
    }

    #[tokio::test]
    async fn test_write_back_failure_is_contained() {
        let taxonomy = Arc::new(MemoryTaxonomy {
            fail_writes: true,
            ..MemoryTaxonomy::default()
        });
        let registry =
            ClassificationRegistry::new(taxonomy, Arc::new(MemoryRecordStore::new()), 7, 2);

        let record = base_with(
            now(),
            vec![ActivityClaim::new(CategoryType::NewBehavior, "Pacing")],
        );
        assert_eq!(registry.write_back(&record).await, 0);
    }

    /// Record store that counts how many records were read.
    #[derive(Default)]
    struct CountingRecords {
        inner: MemoryRecordStore,
        read: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for CountingRecords {
        async fn save(&self, record: &SummaryRecord) -> Result<(), StoreError> {
            self.inner.save(record).await
        }

        async fn get_earlier(
            &self,
            tier: Tier,
            count: usize,
            skip: usize,
        ) -> Result<Vec<SummaryRecord>, StoreError> {
            let page = self.inner.get_earlier(tier, count, skip).await?;
            self.read.fetch_add(page.len(), Ordering::SeqCst);
            Ok(page)
        }
    }

    #[tokio::test]
    async fn test_render_context_reads_only_what_it_needs() {
        let records = Arc::new(CountingRecords::default());
        for i in 0..200 {
            records
                .save(&base_with(
                    now() - Duration::minutes(2 * i),
                    vec![ActivityClaim::new(CategoryType::Behavior, "Doomscrolling")],
                ))
                .await
                .unwrap();
        }

        // The newest page already shows the proposal in use
        let taxonomy = Arc::new(MemoryTaxonomy::default());
        taxonomy.taxonomy.lock().await.behaviors =
            vec![behavior("Doomscrolling", EntryOrigin::Proposed)];
        let registry = ClassificationRegistry::new(taxonomy, records.clone(), 7, 2);
        assert!(registry.render_context(now()).await.unwrap().contains("Doomscrolling"));
        assert_eq!(records.read.load(Ordering::SeqCst), USAGE_PAGE_SIZE);

        // Nothing proposed, nothing to check
        records.read.store(0, Ordering::SeqCst);
        let taxonomy = Arc::new(MemoryTaxonomy::default());
        taxonomy.taxonomy.lock().await.behaviors = vec![behavior("Reading", EntryOrigin::User)];
        let registry = ClassificationRegistry::new(taxonomy, records.clone(), 7, 2);
        assert!(registry.render_context(now()).await.unwrap().contains("Reading"));
        assert_eq!(records.read.load(Ordering::SeqCst), 0);

        // An unused proposal is checked against the whole history, then hidden
        records.read.store(0, Ordering::SeqCst);
        let taxonomy = Arc::new(MemoryTaxonomy::default());
        taxonomy.taxonomy.lock().await.behaviors = vec![
            behavior("Reading", EntryOrigin::User),
            behavior("Old habit", EntryOrigin::Proposed),
        ];
        let registry = ClassificationRegistry::new(taxonomy, records.clone(), 7, 2);
        let context = registry.render_context(now()).await.unwrap();
        assert!(!context.contains("Old habit"));
        assert_eq!(records.read.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn test_render_context_stops_at_cutoff() {
        let records = Arc::new(CountingRecords::default());
        for hour in 0..10 {
            records
                .save(&base_with(
                    now() - Duration::hours(hour),
                    vec![ActivityClaim::new(CategoryType::Behavior, "Reading")],
                ))
                .await
                .unwrap();
        }
        for minute in 0..100 {
            records
                .save(&base_with(
                    now() - Duration::days(8) - Duration::minutes(2 * minute),
                    vec![ActivityClaim::new(CategoryType::NewBehavior, "Old habit")],
                ))
                .await
                .unwrap();
        }

        let taxonomy = Arc::new(MemoryTaxonomy::default());
        taxonomy.taxonomy.lock().await.behaviors = vec![
            behavior("Reading", EntryOrigin::User),
            behavior("Old habit", EntryOrigin::Proposed),
        ];
        let registry = ClassificationRegistry::new(taxonomy, records.clone(), 7, 2);
        let context = registry.render_context(now()).await.unwrap();
        assert!(!context.contains("Old habit"));
        // The first page already reaches past the cutoff, so no second page is read
        assert_eq!(records.read.load(Ordering::SeqCst), USAGE_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_render_context_uses_recent_records() {
        let taxonomy = Arc::new(MemoryTaxonomy::default());
        taxonomy.taxonomy.lock().await.behaviors = vec![
            behavior("Doomscrolling", EntryOrigin::Proposed),
            behavior("Tab hoarding", EntryOrigin::Proposed),
        ];
        let records = Arc::new(MemoryRecordStore::new());
        records
            .save(&base_with(
                now() - Duration::hours(3),
                vec![ActivityClaim::new(CategoryType::NewBehavior, "Doomscrolling")],
            ))
            .await
            .unwrap();

        let registry = ClassificationRegistry::new(taxonomy, records, 7, 2);
        let context = registry.render_context(now()).await.unwrap();
        assert!(context.contains("Doomscrolling"));
        assert!(!context.contains("Tab hoarding"));
    }
}
