//! End-to-end runs: resume → discover → score → dedup → select → sequence →
//! collect → draft → gate → publish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use errorpress_discovery::{
    DroppedRecord, QueryParams, RawRecord, SignalSource, discover_all, fingerprint, normalize,
};
use errorpress_shared::{
    AppConfig, ArticleGenerator, Candidate, Item, ItemState, PressError, PublishRef, Publisher,
    Result, Solution, SolutionCollector, Source,
};
use errorpress_storage::Storage;

use crate::dedup::{Deduplicator, Verdict, dedup_batch};
use crate::lifecycle;
use crate::quality::QualityGate;
use crate::scoring::score_candidate;
use crate::selection::{Exclusion, select};
use crate::sequencer::{Admission, Sequencer};
use crate::slots::SlotStore;

/// Confidence given to hand-injected errors.
const INJECTED_CONFIDENCE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when an item stops advancing for this run.
    fn item_finished(&self, item: &Item, outcome: &ItemOutcome, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_finished(&self, _item: &Item, _outcome: &ItemOutcome, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Where an item stopped in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Published(PublishRef),
    /// Passed the gate; publishing is disabled.
    AwaitingPublish,
    Rejected(String),
    /// A transient failure; the item resumes from its state next run.
    Deferred(String),
    /// An error specific to this item, such as an invalid transition.
    Failed(String),
}

/// Counters for one run, stored as the run's stats.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: Option<String>,
    pub resumed: usize,
    pub discovered: usize,
    pub dropped_records: usize,
    pub failed_sources: Vec<Source>,
    pub duplicates: usize,
    pub excluded: usize,
    pub sequenced: usize,
    pub published: usize,
    pub awaiting_publish: usize,
    pub rejected: usize,
    pub deferred: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn tally(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Published(_) => self.published += 1,
            ItemOutcome::AwaitingPublish => self.awaiting_publish += 1,
            ItemOutcome::Rejected(_) => self.rejected += 1,
            ItemOutcome::Deferred(_) => self.deferred += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Candidates from one discovery pass, split by what happened to them.
#[derive(Debug, Default)]
pub struct DiscoveryPlan {
    /// Ready for sequencing, best first.
    pub admitted: Vec<Candidate>,
    pub duplicates: Vec<(Candidate, Verdict)>,
    pub excluded: Vec<Exclusion>,
    pub dropped: Vec<DroppedRecord>,
    pub failed_sources: Vec<Source>,
    /// Normalized candidates before dedup.
    pub discovered: usize,
}

/// The external services an item passes through.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub collector: &'a dyn SolutionCollector,
    pub generator: &'a dyn ArticleGenerator,
    /// `None` leaves gated items in QualityChecked.
    pub publisher: Option<&'a dyn Publisher>,
}

// ---------------------------------------------------------------------------
// Discovery (no writes)
// ---------------------------------------------------------------------------

/// Discover, score, dedup against `indexed` fingerprints, and select.
#[instrument(skip_all, fields(sources = sources.len(), indexed = indexed.len()))]
pub async fn plan_batch(
    config: &AppConfig,
    sources: &[Box<dyn SignalSource>],
    indexed: Vec<String>,
) -> DiscoveryPlan {
    let report = discover_all(sources, &QueryParams::default()).await;
    let discovered = report.candidates.len();

    let mut candidates = report.candidates;
    for candidate in &mut candidates {
        score_candidate(candidate, &config.scoring);
    }

    let mut dedup = Deduplicator::new(&config.dedup, indexed);
    let deduped = dedup_batch(&mut dedup, candidates);
    let accepted = deduped.accepted.into_iter().map(|(c, _)| c).collect();
    let selection = select(accepted, &config.selection);

    info!(
        discovered,
        duplicates = deduped.dropped.len(),
        excluded = selection.excluded.len(),
        admitted = selection.admitted.len(),
        "batch planned"
    );

    DiscoveryPlan {
        admitted: selection.admitted,
        duplicates: deduped.dropped,
        excluded: selection.excluded,
        dropped: report.dropped,
        failed_sources: report.failed_sources,
        discovered,
    }
}

/// Plan a batch using the persisted index, if a database exists. Writes nothing.
pub async fn discover(
    config: &AppConfig,
    sources: &[Box<dyn SignalSource>],
    storage: Option<&Storage>,
) -> Result<DiscoveryPlan> {
    let indexed = match storage {
        Some(storage) => storage.fingerprints().await?,
        None => Vec::new(),
    };
    Ok(plan_batch(config, sources, indexed).await)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline<'a> {
    config: &'a AppConfig,
    storage: &'a Storage,
    slots: SlotStore,
    sequencer: Sequencer<'a>,
    gate: QualityGate,
    collab: Collaborators<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        storage: &'a Storage,
        slots: SlotStore,
        collab: Collaborators<'a>,
    ) -> Self {
        Self {
            config,
            storage,
            sequencer: Sequencer::new(storage, slots.clone()),
            slots,
            gate: QualityGate::from_config(&config.quality),
            collab,
        }
    }

    /// Full run. Pending items from earlier runs go first, then a fresh batch.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        sources: &[Box<dyn SignalSource>],
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let run_id = self.storage.start_run("run").await?;
        let mut summary = RunSummary {
            run_id: Some(run_id.clone()),
            ..RunSummary::default()
        };

        info!(%run_id, "starting run");

        // --- Phase 1: Resume ---
        progress.phase("Resuming pending items");
        let pending = self.load_pending().await?;
        summary.resumed = pending.len();
        for outcome in self.advance_all(pending, progress).await? {
            summary.tally(&outcome);
        }

        // --- Phase 2: Discovery ---
        progress.phase("Discovering candidates");
        let indexed = self.storage.fingerprints().await?;
        let plan = plan_batch(self.config, sources, indexed).await;
        summary.discovered = plan.discovered;
        summary.dropped_records = plan.dropped.len();
        summary.failed_sources = plan.failed_sources;
        summary.duplicates = plan.duplicates.len();
        summary.excluded = plan.excluded.len();

        for exclusion in &plan.excluded {
            debug!(fingerprint = %exclusion.candidate.fingerprint, reason = %exclusion.reason, "excluded");
        }

        // --- Phase 3: Sequencing ---
        progress.phase("Sequencing");
        let mut items = Vec::with_capacity(plan.admitted.len());
        for candidate in plan.admitted {
            match self.sequencer.assign(candidate, Admission::Selected).await? {
                Some(item) => items.push(item),
                None => summary.duplicates += 1,
            }
        }
        summary.sequenced = items.len();

        // --- Phase 4: Collect, draft, gate, publish ---
        progress.phase("Collecting and drafting");
        for outcome in self.advance_all(items, progress).await? {
            summary.tally(&outcome);
        }

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        let stats = serde_json::to_string(&summary)
            .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))?;
        self.storage.finish_run(&run_id, &stats).await?;

        progress.done(&summary);
        info!(
            %run_id,
            sequenced = summary.sequenced,
            published = summary.published,
            rejected = summary.rejected,
            deferred = summary.deferred,
            elapsed_ms = summary.elapsed_ms,
            "run complete"
        );

        Ok(summary)
    }

    /// Enter an error by hand. It skips discovery, scoring and dedup and
    /// starts in Collecting.
    #[instrument(skip_all)]
    pub async fn inject(
        &self,
        error_text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(Item, ItemOutcome)> {
        let mut candidate = normalize(&RawRecord {
            source: Source::Manual,
            text: error_text.to_string(),
            url: None,
            fields: serde_json::Map::new(),
        })
        .map_err(|e| PressError::validation(format!("cannot inject '{error_text}': {e}")))?;
        candidate.confidence_score = INJECTED_CONFIDENCE;

        let run_id = self.storage.start_run("inject").await?;
        let item = self
            .sequencer
            .assign(candidate, Admission::Injected)
            .await?
            .ok_or_else(|| PressError::validation("injected item was not sequenced"))?;

        let (item, outcome) = self.advance(item).await?;
        progress.item_finished(&item, &outcome, 1, 1);

        let mut summary = RunSummary {
            run_id: Some(run_id.clone()),
            sequenced: 1,
            ..RunSummary::default()
        };
        summary.tally(&outcome);
        let stats = serde_json::to_string(&summary)
            .map_err(|e| PressError::validation(format!("JSON serialization failed: {e}")))?;
        self.storage.finish_run(&run_id, &stats).await?;
        progress.done(&summary);

        Ok((item, outcome))
    }

    /// Publish a gated item once. A second call, or a call after the
    /// acknowledgement was logged but the state write was lost, returns the
    /// recorded reference without contacting the target.
    #[instrument(skip_all, fields(sequence_id = item.sequence_id))]
    pub async fn publish_item(&self, item: &mut Item) -> Result<PublishRef> {
        if item.state == ItemState::Published {
            if let Some(existing) = &item.publish_ref {
                return Ok(existing.clone());
            }
        }

        if let Some(recorded) = self.storage.get_publish(item.sequence_id).await? {
            if item.state != ItemState::Published {
                lifecycle::mark_published(item, recorded.clone())?;
                self.persist(item).await?;
            }
            info!(publish_ref = %recorded, "publish already recorded");
            return Ok(recorded);
        }

        if item.state != ItemState::QualityChecked {
            return Err(PressError::InvalidTransition {
                sequence_id: item.sequence_id,
                from: item.state.to_string(),
                action: "publish".into(),
            });
        }
        let Some(publisher) = self.collab.publisher else {
            return Err(PressError::config("publishing is not configured"));
        };
        let Some(article) = item.article.as_ref() else {
            return Err(PressError::validation(format!(
                "item {} has no article",
                item.sequence_id
            )));
        };

        let status = self.config.publish.status;
        let publish_ref = publisher.publish(article, status, item.sequence_id).await?;
        self.storage
            .record_publish(item.sequence_id, &publish_ref, status)
            .await?;
        lifecycle::mark_published(item, publish_ref.clone())?;
        self.persist(item).await?;

        info!(publish_ref = %publish_ref, "item published");
        Ok(publish_ref)
    }

    // -----------------------------------------------------------------------
    // Item driving
    // -----------------------------------------------------------------------

    async fn load_pending(&self) -> Result<Vec<Item>> {
        let rows = self.storage.list_pending_items().await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match self.slots.verify(&row.slot_dir) {
                Ok(bad) if !bad.is_empty() => {
                    warn!(sequence_id = row.sequence_id, files = ?bad, "slot files differ from manifest");
                }
                Err(e) => warn!(sequence_id = row.sequence_id, error = %e, "slot manifest unreadable"),
                Ok(_) => {}
            }
            let item = self.slots.load(&row.slot_dir)?;
            if item.state != row.state {
                warn!(
                    sequence_id = row.sequence_id,
                    slot = %item.state,
                    registry = %row.state,
                    "slot and registry disagree, continuing from the slot"
                );
            }
            items.push(item);
        }
        Ok(items)
    }

    async fn advance_all(
        &self,
        items: Vec<Item>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<ItemOutcome>> {
        let total = items.len();
        let finished = AtomicUsize::new(0);
        let finished = &finished;

        stream::iter(items)
            .map(|item| async move {
                let (item, outcome) = self.advance(item).await?;
                let current = finished.fetch_add(1, Ordering::Relaxed) + 1;
                progress.item_finished(&item, &outcome, current, total);
                Ok::<_, PressError>(outcome)
            })
            .buffer_unordered(self.config.pipeline.concurrency.max(1))
            .try_collect()
            .await
    }

    /// Drive an item as far as it can go this run. Only run-fatal errors
    /// are returned as `Err`.
    #[instrument(skip_all, fields(sequence_id = item.sequence_id, slug = %item.slug))]
    async fn advance(&self, mut item: Item) -> Result<(Item, ItemOutcome)> {
        match self.step_until_stop(&mut item).await {
            Ok(outcome) => Ok((item, outcome)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(stage = %item.state, error = %e, "item failed");
                Ok((item, ItemOutcome::Failed(e.to_string())))
            }
        }
    }

    async fn step_until_stop(&self, item: &mut Item) -> Result<ItemOutcome> {
        loop {
            match item.state {
                ItemState::Discovered => {
                    lifecycle::start_collection(item)?;
                    self.persist(item).await?;
                }
                ItemState::Collecting => {
                    if let Some(outcome) = self.draft(item).await? {
                        return Ok(outcome);
                    }
                }
                ItemState::Drafted => {
                    let report = self.gate.evaluate(item)?;
                    self.persist(item).await?;
                    if !report.passed {
                        info!(reasons = ?report.reasons, "rejected by quality gate");
                    }
                }
                ItemState::QualityChecked => {
                    if !self.publishing_enabled() {
                        return Ok(ItemOutcome::AwaitingPublish);
                    }
                    return match self.publish_item(item).await {
                        Ok(publish_ref) => Ok(ItemOutcome::Published(publish_ref)),
                        Err(e @ PressError::InvalidTransition { .. }) => Err(e),
                        Err(e) if e.is_fatal() => Err(e),
                        Err(e) => {
                            warn!(stage = "publish", error = %e, "publish failed, will retry next run");
                            Ok(ItemOutcome::Deferred(e.to_string()))
                        }
                    };
                }
                ItemState::Published => {
                    let publish_ref = self.publish_item(item).await?;
                    return Ok(ItemOutcome::Published(publish_ref));
                }
                ItemState::Rejected => {
                    let reason = item
                        .rejection
                        .as_ref()
                        .map(|r| r.reason.clone())
                        .unwrap_or_default();
                    return Ok(ItemOutcome::Rejected(reason));
                }
            }
        }
    }

    /// Collect a solution (if not already stored) and generate the article.
    /// Returns `Some` when the item stops here.
    async fn draft(&self, item: &mut Item) -> Result<Option<ItemOutcome>> {
        if item.solution.is_none() {
            match self.collab.collector.collect(&item.candidate).await {
                Ok(solution) => {
                    debug!(references = solution.references.len(), "solution collected");
                    item.solution = Some(solution);
                    item.updated_at = Utc::now();
                    self.slots.save(item)?;
                }
                Err(e) => return self.stage_failure(item, "collection", e).await,
            }
        }

        let solution: Solution = match &item.solution {
            Some(s) => s.clone(),
            None => return Ok(None),
        };
        let article = match self
            .collab
            .generator
            .generate_article(&item.candidate, &solution, &self.config.generation.language)
            .await
        {
            Ok(article) => article,
            Err(e) => return self.stage_failure(item, "generation", e).await,
        };

        let title_key = fingerprint(&article.title);
        if !title_key.is_empty() && !self.storage.claim_title(&title_key, item.sequence_id).await? {
            lifecycle::reject(item, format!("duplicate article title '{}'", article.title))?;
            self.persist(item).await?;
            return Ok(Some(ItemOutcome::Rejected(
                "duplicate article title".into(),
            )));
        }

        lifecycle::complete_draft(item, article)?;
        self.persist(item).await?;
        Ok(None)
    }

    /// Map a collection or generation error onto the item.
    async fn stage_failure(
        &self,
        item: &mut Item,
        stage: &str,
        err: PressError,
    ) -> Result<Option<ItemOutcome>> {
        match err {
            PressError::MissingSolution { .. } | PressError::GenerationFailed(_) => {
                let reason = format!("{stage}: {err}");
                info!(stage, %reason, "rejecting item");
                lifecycle::reject(item, reason.clone())?;
                self.persist(item).await?;
                Ok(Some(ItemOutcome::Rejected(reason)))
            }
            e if e.is_fatal() => Err(e),
            e => {
                warn!(stage, error = %e, "deferring item to the next run");
                Ok(Some(ItemOutcome::Deferred(format!("{stage}: {e}"))))
            }
        }
    }

    fn publishing_enabled(&self) -> bool {
        self.config.publish.enabled && self.collab.publisher.is_some()
    }

    /// Slot first, then the registry row.
    async fn persist(&self, item: &Item) -> Result<()> {
        self.slots.save(item)?;
        self.storage
            .update_item_state(
                item.sequence_id,
                item.state,
                item.publish_ref.as_ref().map(|r| r.id.as_str()),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use errorpress_shared::{Article, ArticleMetadata, PublishStatus};
    use std::path::PathBuf;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Mocks
    // -----------------------------------------------------------------------

    struct StaticSource {
        records: Vec<RawRecord>,
    }

    #[async_trait]
    impl SignalSource for StaticSource {
        fn source(&self) -> Source {
            Source::Trends
        }

        async fn fetch_candidates(&self, _params: &QueryParams) -> Result<Vec<RawRecord>> {
            Ok(self.records.clone())
        }
    }

    fn trend(term: &str, volume: f64) -> RawRecord {
        let mut fields = serde_json::Map::new();
        fields.insert("search_volume".into(), serde_json::json!(volume));
        RawRecord {
            source: Source::Trends,
            text: term.into(),
            url: None,
            fields,
        }
    }

    fn sources(terms: &[(&str, f64)]) -> Vec<Box<dyn SignalSource>> {
        vec![Box::new(StaticSource {
            records: terms.iter().map(|(t, v)| trend(t, *v)).collect(),
        })]
    }

    #[derive(Default)]
    struct MockCollector {
        calls: AtomicUsize,
        /// Fail this many calls with a network error first.
        transient_failures: usize,
        missing: bool,
    }

    #[async_trait]
    impl SolutionCollector for MockCollector {
        async fn collect(&self, candidate: &Candidate) -> Result<Solution> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.transient_failures {
                return Err(PressError::Network("connection reset".into()));
            }
            if self.missing {
                return Err(PressError::MissingSolution {
                    error_text: candidate.raw_text.clone(),
                });
            }
            Ok(Solution {
                text: format!("Steps for {}", candidate.raw_text),
                references: vec![],
            })
        }
    }

    struct MockGenerator {
        words: usize,
        fixed_title: Option<String>,
        calls: AtomicUsize,
    }

    impl MockGenerator {
        fn new(words: usize) -> Self {
            Self {
                words,
                fixed_title: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ArticleGenerator for MockGenerator {
        async fn generate_article(
            &self,
            candidate: &Candidate,
            _solution: &Solution,
            language: &str,
        ) -> Result<Article> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let keyword = &candidate.raw_text;
            let mut body = String::from("## Cause\n\n## Fix\n\n## Prevention\n\n");
            for _ in 0..self.words / 50 {
                body.push_str(keyword);
                body.push(' ');
                body.push_str(&"word ".repeat(44));
            }
            Ok(Article {
                title: self
                    .fixed_title
                    .clone()
                    .unwrap_or_else(|| format!("How to fix {keyword}")),
                body,
                metadata: ArticleMetadata {
                    excerpt: format!("Resolve {keyword} quickly."),
                    slug: "fix-error".into(),
                    tags: vec!["a".into(), "b".into(), "c".into()],
                    language: language.into(),
                    extra: Default::default(),
                },
            })
        }
    }

    #[derive(Default)]
    struct MockPublisher {
        calls: Mutex<Vec<u64>>,
    }

    impl MockPublisher {
        fn call_count(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl Publisher for MockPublisher {
        async fn publish(
            &self,
            _article: &Article,
            status: PublishStatus,
            idempotency_key: u64,
        ) -> Result<PublishRef> {
            assert_eq!(status, PublishStatus::Draft);
            self.calls
                .lock()
                .map_err(|_| PressError::Publish("poisoned".into()))?
                .push(idempotency_key);
            Ok(PublishRef {
                id: format!("post-{idempotency_key}"),
                url: None,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Fixture
    // -----------------------------------------------------------------------

    struct Fixture {
        dir: PathBuf,
        storage: Storage,
        config: AppConfig,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("ep_pipe_{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(&dir).expect("mkdir");
            let storage = Storage::open(&dir.join("errorpress.db")).await.expect("open");

            let mut config = AppConfig::default();
            config.quality.min_word_count = 100;
            config.quality.max_word_count = None;
            config.publish.enabled = true;
            config.pipeline.concurrency = 3;
            Self {
                dir,
                storage,
                config,
            }
        }

        fn slots(&self) -> SlotStore {
            SlotStore::new(self.dir.join("articles"))
        }

        fn pipeline<'a>(&'a self, collab: Collaborators<'a>) -> Pipeline<'a> {
            Pipeline::new(&self.config, &self.storage, self.slots(), collab)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    const TERMS: &[(&str, f64)] = &[
        ("ENOSPC no space left on device", 2000.0),
        ("EADDRINUSE address already in use", 9000.0),
        ("enospc: No space left on device", 2000.0),
        ("low volume error message", 10.0),
    ];

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn full_run_publishes_each_item_once() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let publisher = MockPublisher::default();
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: Some(&publisher),
        });

        let summary = pipeline.run(&sources(TERMS), &SilentProgress).await.expect("run");
        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.sequenced, 2);
        assert_eq!(summary.published, 2);
        assert_eq!(publisher.call_count(), 2);

        // highest confidence is sequenced first
        let items = fx.storage.list_items().await.expect("list");
        assert_eq!(items[0].sequence_id, 1);
        assert_eq!(items[0].slug, "eaddrinuse-address-already-in-use");
        assert!(items.iter().all(|r| r.state == ItemState::Published));
        assert_eq!(items[1].publish_ref.as_deref(), Some("post-2"));

        let slot = fx.slots().load(&items[1].slot_dir).expect("load");
        assert!(slot.quality.is_some());
        assert!(fx.slots().path(&items[1].slot_dir).join("article.md").exists());

        // second run finds only duplicates
        let again = pipeline.run(&sources(TERMS), &SilentProgress).await.expect("rerun");
        assert_eq!(again.sequenced, 0);
        assert_eq!(again.resumed, 0);
        assert_eq!(publisher.call_count(), 2);
        assert_eq!(fx.storage.recent_runs(5).await.expect("runs").len(), 2);
    }

    #[tokio::test]
    async fn no_admissible_candidates_is_a_clean_run() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: None,
        });

        let summary = pipeline
            .run(&sources(&[("quiet error nobody searches", 1.0)]), &SilentProgress)
            .await
            .expect("run");
        assert_eq!(summary.sequenced, 0);
        assert_eq!(summary.excluded, 1);
        assert!(fx.storage.list_items().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn inject_starts_collecting_and_waits_for_publish() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: None,
        });

        let (item, outcome) = pipeline
            .inject("Kernel panic - not syncing: VFS", &SilentProgress)
            .await
            .expect("inject");

        assert_eq!(item.sequence_id, 1);
        assert_eq!(item.candidate.source, Source::Manual);
        assert_eq!(item.candidate.confidence_score, 1.0);
        assert_eq!(outcome, ItemOutcome::AwaitingPublish);
        assert_eq!(item.state, ItemState::QualityChecked);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inject_rejects_blank_text() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: None,
        });
        let err = pipeline.inject("   ", &SilentProgress).await.unwrap_err();
        assert!(matches!(err, PressError::Validation { .. }));
        assert_eq!(fx.storage.max_sequence().await.expect("marker"), 0);
    }

    #[tokio::test]
    async fn short_article_is_rejected() {
        let mut fx = Fixture::new().await;
        fx.config.quality.min_word_count = 1000;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let publisher = MockPublisher::default();
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: Some(&publisher),
        });

        let (item, outcome) = pipeline
            .inject("ENOSPC no space left on device", &SilentProgress)
            .await
            .expect("inject");

        assert_eq!(item.state, ItemState::Rejected);
        let quality = item.quality.as_ref().expect("quality");
        assert!(!quality.passed);
        assert!(quality.reasons.iter().any(|r| r.contains("below minimum 1000")));
        assert!(matches!(outcome, ItemOutcome::Rejected(_)));
        assert_eq!(publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_solution_rejects() {
        let fx = Fixture::new().await;
        let collector = MockCollector {
            missing: true,
            ..MockCollector::default()
        };
        let generator = MockGenerator::new(400);
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: None,
        });

        let (item, _) = pipeline
            .inject("ERR_TOO_MANY_REDIRECTS loop", &SilentProgress)
            .await
            .expect("inject");
        assert_eq!(item.state, ItemState::Rejected);
        assert_eq!(
            item.rejection.as_ref().map(|r| r.stage),
            Some(ItemState::Collecting)
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failure_defers_and_resumes() {
        let fx = Fixture::new().await;
        let collector = MockCollector {
            transient_failures: 1,
            ..MockCollector::default()
        };
        let generator = MockGenerator::new(400);
        let publisher = MockPublisher::default();
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: Some(&publisher),
        });

        let (item, outcome) = pipeline
            .inject("ETIMEDOUT connect timed out", &SilentProgress)
            .await
            .expect("inject");
        assert!(matches!(outcome, ItemOutcome::Deferred(_)));
        assert_eq!(item.state, ItemState::Collecting);

        let summary = pipeline.run(&[], &SilentProgress).await.expect("run");
        assert_eq!(summary.resumed, 1);
        assert_eq!(summary.published, 1);
        let row = fx.storage.get_item(item.sequence_id).await.expect("get").expect("row");
        assert_eq!(row.state, ItemState::Published);
    }

    #[tokio::test]
    async fn duplicate_article_title_is_rejected() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator {
            fixed_title: Some("Fix Your Disk".into()),
            ..MockGenerator::new(400)
        };
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: None,
        });

        let (first, _) = pipeline
            .inject("ENOSPC no space left on device", &SilentProgress)
            .await
            .expect("first");
        let (second, outcome) = pipeline
            .inject("EDQUOT disk quota exceeded", &SilentProgress)
            .await
            .expect("second");

        assert_ne!(first.state, ItemState::Rejected);
        assert_eq!(second.state, ItemState::Rejected);
        assert_eq!(outcome, ItemOutcome::Rejected("duplicate article title".into()));
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let fx = Fixture::new().await;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let publisher = MockPublisher::default();
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: Some(&publisher),
        });

        let (mut item, outcome) = pipeline
            .inject("EPERM operation not permitted", &SilentProgress)
            .await
            .expect("inject");
        let ItemOutcome::Published(first) = outcome else {
            panic!("expected published, got {outcome:?}");
        };

        let second = pipeline.publish_item(&mut item).await.expect("again");
        assert_eq!(first, second);

        // state write lost after the acknowledgement was logged
        let mut stale = fx.slots().load(&item.slot_name()).expect("load");
        stale.state = ItemState::QualityChecked;
        stale.publish_ref = None;
        let third = pipeline.publish_item(&mut stale).await.expect("recover");
        assert_eq!(third, first);
        assert_eq!(stale.state, ItemState::Published);

        assert_eq!(publisher.call_count(), 1);
    }

    #[tokio::test]
    async fn publishing_a_rejected_item_is_invalid() {
        let mut fx = Fixture::new().await;
        fx.config.quality.min_word_count = 5000;
        let collector = MockCollector::default();
        let generator = MockGenerator::new(400);
        let publisher = MockPublisher::default();
        let pipeline = fx.pipeline(Collaborators {
            collector: &collector,
            generator: &generator,
            publisher: Some(&publisher),
        });

        let (mut item, _) = pipeline
            .inject("EPIPE broken pipe", &SilentProgress)
            .await
            .expect("inject");
        let err = pipeline.publish_item(&mut item).await.unwrap_err();
        assert!(matches!(err, PressError::InvalidTransition { .. }));
        assert_eq!(publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn discover_writes_nothing() {
        let fx = Fixture::new().await;
        let plan = discover(&fx.config, &sources(TERMS), Some(&fx.storage))
            .await
            .expect("discover");
        assert_eq!(plan.admitted.len(), 2);
        assert!(plan.admitted[0].confidence_score >= plan.admitted[1].confidence_score);
        assert_eq!(fx.storage.max_sequence().await.expect("marker"), 0);
        assert!(fx.storage.fingerprints().await.expect("fps").is_empty());
    }
}
