//! Per-detection insert, rule matching and notification.
//!
//! Each detection moves through `inserted -> matched(n) -> dispatched`.
//! Matches are recorded before their notification is emitted. Events
//! that keep failing are parked in an outbox and retried once more when
//! the job finishes. Deferred evaluations are retried then too, skipping
//! regions whose match was already recorded.

use super::{NotificationEvent, NotificationSink, RetryPolicy};
use crate::error::Result;
use crate::geometry::Polygon;
use crate::store::{
    DetectionId, DetectionStore, MatchRecord, NewDetection, RegionId, ReportId, RuleRegion,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Retry budgets for the three fallible steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchPolicy {
    /// Detection insert and match recording.
    pub insert: RetryPolicy,
    /// Spatial intersection query.
    pub query: RetryPolicy,
    /// Notification emission.
    pub delivery: RetryPolicy,
}

/// Counters accumulated over one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Detections persisted.
    pub persisted: usize,
    /// Detections dropped because every insert attempt failed.
    pub insert_failures: usize,
    /// Region matches recorded.
    pub matches: usize,
    /// Detections whose rule evaluation could not run.
    pub matches_deferred: usize,
    /// Notifications delivered (including from the outbox).
    pub notifications_emitted: usize,
}

/// What happened to one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Insert failed; nothing persisted.
    Dropped,
    /// Persisted and evaluated against `matched` regions.
    Dispatched {
        /// New detection id.
        id: DetectionId,
        /// Regions that matched.
        matched: usize,
    },
    /// Persisted, but rule evaluation was deferred.
    Deferred {
        /// New detection id.
        id: DetectionId,
    },
}

/// Final state once the job's detections are all handled.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Accumulated counters.
    pub stats: DispatchStats,
    /// Events that could not be delivered even after the outbox flush.
    pub undelivered: Vec<NotificationEvent>,
    /// Detections whose rule evaluation never succeeded.
    pub deferred: Vec<DetectionId>,
}

struct PendingEvaluation {
    id: DetectionId,
    class_label: String,
    confidence: f32,
    footprint: Polygon,
    /// Regions whose match is already on record; a retry skips them.
    recorded: HashSet<RegionId>,
}

/// Dispatcher for one report.
pub struct Dispatcher {
    store: Arc<dyn DetectionStore>,
    sink: Arc<dyn NotificationSink>,
    report_id: ReportId,
    region_ids: Vec<RegionId>,
    regions: HashMap<RegionId, RuleRegion>,
    policy: DispatchPolicy,
    stats: DispatchStats,
    outbox: Vec<NotificationEvent>,
    deferred: Vec<PendingEvaluation>,
}

impl Dispatcher {
    /// Prepare dispatch for `report_id` against the candidate regions.
    ///
    /// Unknown region ids are logged and skipped.
    pub fn new(
        store: Arc<dyn DetectionStore>,
        sink: Arc<dyn NotificationSink>,
        report_id: ReportId,
        candidate_regions: &[RegionId],
        policy: DispatchPolicy,
    ) -> Result<Self> {
        let regions: HashMap<RegionId, RuleRegion> = policy
            .query
            .run("rule region lookup", || store.rule_regions(candidate_regions))?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut region_ids = Vec::with_capacity(regions.len());
        for id in candidate_regions {
            if regions.contains_key(id) {
                if !region_ids.contains(id) {
                    region_ids.push(*id);
                }
            } else {
                warn!(report = %report_id, region = %id, "unknown rule region, skipping");
            }
        }

        Ok(Self {
            store,
            sink,
            report_id,
            region_ids,
            regions,
            policy,
            stats: DispatchStats::default(),
            outbox: Vec::new(),
            deferred: Vec::new(),
        })
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Insert one detection and evaluate it against the regions.
    pub fn handle(&mut self, detection: NewDetection) -> DetectionOutcome {
        let pending = PendingEvaluation {
            id: DetectionId(0),
            class_label: detection.class_label.clone(),
            confidence: detection.confidence,
            footprint: detection.footprint.clone(),
            recorded: HashSet::new(),
        };

        let id = match self
            .policy
            .insert
            .run("detection insert", || self.store.insert(detection.clone()))
        {
            Ok(id) => id,
            Err(e) => {
                error!(report = %self.report_id, "dropping detection after insert failures: {e}");
                self.stats.insert_failures += 1;
                return DetectionOutcome::Dropped;
            }
        };
        self.stats.persisted += 1;

        let mut pending = PendingEvaluation { id, ..pending };
        match self.evaluate(&mut pending) {
            Ok(matched) => DetectionOutcome::Dispatched { id, matched },
            Err(e) => {
                warn!(detection = %id, "deferring rule evaluation: {e}");
                self.stats.matches_deferred += 1;
                self.deferred.push(pending);
                DetectionOutcome::Deferred { id }
            }
        }
    }

    /// Returns the number of regions matched so far, including matches
    /// recorded by an earlier partial attempt.
    fn evaluate(&mut self, pending: &mut PendingEvaluation) -> Result<usize> {
        if self.region_ids.is_empty() {
            return Ok(0);
        }

        let hits = self.policy.query.run("intersection query", || {
            self.store.intersects(&self.region_ids, &pending.footprint)
        })?;

        for region_id in hits {
            if pending.recorded.contains(&region_id) {
                continue;
            }
            let accepted = self
                .regions
                .get(&region_id)
                .is_some_and(|r| r.conditions.accepts(&pending.class_label, pending.confidence));
            if !accepted {
                continue;
            }

            let record = MatchRecord {
                detection_id: pending.id,
                region_id,
                report_id: self.report_id,
            };
            self.policy
                .insert
                .run("match record", || self.store.record_match(record))?;
            pending.recorded.insert(region_id);
            self.stats.matches += 1;

            let event = NotificationEvent {
                detection_id: pending.id,
                report_id: self.report_id,
                rule_region_id: region_id,
                class_label: pending.class_label.clone(),
            };
            self.deliver(event);
        }

        let matched = pending.recorded.len();
        debug!(detection = %pending.id, matched, "rule evaluation complete");
        Ok(matched)
    }

    fn deliver(&mut self, event: NotificationEvent) {
        match self
            .policy
            .delivery
            .run("notification", || self.sink.emit(&event))
        {
            Ok(()) => self.stats.notifications_emitted += 1,
            Err(e) => {
                warn!(
                    detection = %event.detection_id,
                    region = %event.rule_region_id,
                    "parking notification in outbox: {e}"
                );
                self.outbox.push(event);
            }
        }
    }

    /// Retry deferred evaluations and the outbox once, then report what is
    /// still outstanding.
    pub fn finish(mut self) -> DispatchReport {
        let deferred = std::mem::take(&mut self.deferred);
        let mut still_deferred = Vec::new();
        for mut pending in deferred {
            match self.evaluate(&mut pending) {
                Ok(_) => self.stats.matches_deferred = self.stats.matches_deferred.saturating_sub(1),
                Err(e) => {
                    error!(detection = %pending.id, "rule evaluation abandoned: {e}");
                    still_deferred.push(pending.id);
                }
            }
        }

        let outbox = std::mem::take(&mut self.outbox);
        let mut undelivered = Vec::new();
        for event in outbox {
            match self
                .policy
                .delivery
                .run("outbox notification", || self.sink.emit(&event))
            {
                Ok(()) => self.stats.notifications_emitted += 1,
                Err(e) => {
                    error!(
                        detection = %event.detection_id,
                        region = %event.rule_region_id,
                        "notification undelivered: {e}"
                    );
                    undelivered.push(event);
                }
            }
        }

        DispatchReport {
            stats: self.stats,
            undelivered,
            deferred: still_deferred,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dispatch::ChannelSink;
    use crate::error::Error;
    use crate::geometry::Area;
    use crate::inference::BoxGeometry;
    use crate::store::{Detection, MemoryStore, Report, ReportStatus, RuleConditions};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Consume one scripted failure, if any are left.
    fn take_failure(remaining: &AtomicU32) -> bool {
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn new_detection(report_id: ReportId, footprint: Polygon, class: &str) -> NewDetection {
        NewDetection {
            report_id,
            class_label: class.to_string(),
            confidence: 0.9,
            pixel_geometry: BoxGeometry::Axis {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
            footprint,
        }
    }

    fn policy() -> DispatchPolicy {
        DispatchPolicy {
            insert: RetryPolicy::immediate(2),
            query: RetryPolicy::immediate(2),
            delivery: RetryPolicy::immediate(2),
        }
    }

    struct FailingSink {
        remaining_failures: AtomicU32,
        inner: ChannelSink,
    }

    impl NotificationSink for FailingSink {
        fn emit(&self, event: &NotificationEvent) -> Result<()> {
            if take_failure(&self.remaining_failures) {
                return Err(Error::Delivery {
                    reason: "transport down".to_string(),
                });
            }
            self.inner.emit(event)
        }
    }

    /// Memory store with scripted insert, query and match-record failures.
    struct FlakyStore {
        inner: MemoryStore,
        insert_failures: AtomicU32,
        query_failures: AtomicU32,
        queries: AtomicU32,
        match_failures: AtomicU32,
        match_failure_region: Option<RegionId>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                insert_failures: AtomicU32::new(0),
                query_failures: AtomicU32::new(0),
                queries: AtomicU32::new(0),
                match_failures: AtomicU32::new(0),
                match_failure_region: None,
            }
        }
    }

    impl DetectionStore for FlakyStore {
        fn create_report(&self, name: &str, image_ref: &str) -> Result<ReportId> {
            self.inner.create_report(name, image_ref)
        }

        fn report(&self, id: ReportId) -> Result<Report> {
            self.inner.report(id)
        }

        fn set_report_footprint(&self, id: ReportId, footprint: Polygon) -> Result<()> {
            self.inner.set_report_footprint(id, footprint)
        }

        fn set_report_area_of_interest(&self, id: ReportId, area: Area) -> Result<()> {
            self.inner.set_report_area_of_interest(id, area)
        }

        fn set_report_status(&self, id: ReportId, status: ReportStatus) -> Result<()> {
            self.inner.set_report_status(id, status)
        }

        fn insert(&self, detection: NewDetection) -> Result<DetectionId> {
            if take_failure(&self.insert_failures) {
                return Err(Error::Store {
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.insert(detection)
        }

        fn intersects(&self, region_ids: &[RegionId], footprint: &Polygon) -> Result<Vec<RegionId>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.query_failures) {
                return Err(Error::StoreQuery {
                    reason: "spatial index unavailable".to_string(),
                });
            }
            self.inner.intersects(region_ids, footprint)
        }

        fn rule_regions(&self, ids: &[RegionId]) -> Result<Vec<RuleRegion>> {
            self.inner.rule_regions(ids)
        }

        fn record_match(&self, record: MatchRecord) -> Result<()> {
            if self.match_failure_region == Some(record.region_id)
                && take_failure(&self.match_failures)
            {
                return Err(Error::Store {
                    reason: "lock timeout".to_string(),
                });
            }
            self.inner.record_match(record)
        }

        fn detections_for_report(&self, id: ReportId) -> Result<Vec<Detection>> {
            self.inner.detections_for_report(id)
        }

        fn matches_for_report(&self, id: ReportId) -> Result<Vec<MatchRecord>> {
            self.inner.matches_for_report(id)
        }
    }

    fn add_square(store: &MemoryStore) -> RegionId {
        store
            .add_rule_region(None, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), RuleConditions::default())
            .unwrap()
    }

    #[test]
    fn test_full_overlap_matches_and_disjoint_does_not() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let region = store
            .add_rule_region(None, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), RuleConditions::default())
            .unwrap();
        let (sink, mut rx) = ChannelSink::new();

        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();

        let inside = dispatcher.handle(new_detection(report, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), "ship"));
        let outside = dispatcher.handle(new_detection(report, Polygon::rectangle(20.0, 20.0, 30.0, 30.0), "ship"));

        assert!(matches!(inside, DetectionOutcome::Dispatched { matched: 1, .. }));
        assert!(matches!(outside, DetectionOutcome::Dispatched { matched: 0, .. }));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.rule_region_id, region);
        assert!(rx.try_recv().is_err());
        assert_eq!(store.matches_for_report(report).unwrap().len(), 1);

        let summary = dispatcher.finish();
        assert_eq!(summary.stats.persisted, 2);
        assert_eq!(summary.stats.notifications_emitted, 1);
        assert!(summary.undelivered.is_empty());
    }

    #[test]
    fn test_conditions_filter_after_spatial_match() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let region = store
            .add_rule_region(
                Some("harbour".to_string()),
                Polygon::rectangle(0.0, 0.0, 10.0, 10.0),
                RuleConditions {
                    min_confidence: None,
                    classes: vec!["ship".to_string()],
                },
            )
            .unwrap();
        let (sink, mut rx) = ChannelSink::new();
        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();

        dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "plane"));
        assert!(rx.try_recv().is_err());
        dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "ship"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unknown_regions_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let (sink, _rx) = ChannelSink::new();
        let mut dispatcher =
            Dispatcher::new(store, Arc::new(sink), report, &[RegionId(77)], policy()).unwrap();
        let outcome = dispatcher.handle(new_detection(report, Polygon::rectangle(0.0, 0.0, 1.0, 1.0), "ship"));
        assert!(matches!(outcome, DetectionOutcome::Dispatched { matched: 0, .. }));
    }

    #[test]
    fn test_transient_delivery_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let region = store
            .add_rule_region(None, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), RuleConditions::default())
            .unwrap();
        let (inner, mut rx) = ChannelSink::new();
        let sink = FailingSink {
            remaining_failures: AtomicU32::new(1),
            inner,
        };
        let mut dispatcher =
            Dispatcher::new(store, Arc::new(sink), report, &[region], policy()).unwrap();
        dispatcher.handle(new_detection(report, Polygon::rectangle(0.0, 0.0, 1.0, 1.0), "ship"));
        assert!(rx.try_recv().is_ok());
        assert_eq!(dispatcher.finish().stats.notifications_emitted, 1);
    }

    #[test]
    fn test_outbox_flush_recovers_events() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let region = store
            .add_rule_region(None, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), RuleConditions::default())
            .unwrap();
        let (inner, mut rx) = ChannelSink::new();
        // both in-line attempts fail, the outbox flush succeeds
        let sink = FailingSink {
            remaining_failures: AtomicU32::new(2),
            inner,
        };
        let mut dispatcher =
            Dispatcher::new(store, Arc::new(sink), report, &[region], policy()).unwrap();
        dispatcher.handle(new_detection(report, Polygon::rectangle(0.0, 0.0, 1.0, 1.0), "ship"));
        assert!(rx.try_recv().is_err());

        let summary = dispatcher.finish();
        assert!(summary.undelivered.is_empty());
        assert_eq!(summary.stats.notifications_emitted, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_permanent_delivery_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let report = store.create_report("scene", "scene.tif").unwrap();
        let region = store
            .add_rule_region(None, Polygon::rectangle(0.0, 0.0, 10.0, 10.0), RuleConditions::default())
            .unwrap();
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();
        dispatcher.handle(new_detection(report, Polygon::rectangle(0.0, 0.0, 1.0, 1.0), "ship"));

        let summary = dispatcher.finish();
        assert_eq!(summary.undelivered.len(), 1);
        assert_eq!(summary.undelivered[0].rule_region_id, region);
        // the match is still on record
        assert_eq!(store.matches_for_report(report).unwrap().len(), 1);
    }

    #[test]
    fn test_retry_after_partial_match_does_not_duplicate_records() {
        let mut flaky = FlakyStore::new();
        let report = flaky.inner.create_report("scene", "scene.tif").unwrap();
        let first = add_square(&flaky.inner);
        let second = add_square(&flaky.inner);
        // both in-line attempts for the second region fail
        flaky.match_failure_region = Some(second);
        flaky.match_failures = AtomicU32::new(2);
        let store = Arc::new(flaky);
        let (sink, mut rx) = ChannelSink::new();

        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[first, second], policy())
                .unwrap();
        let outcome =
            dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "ship"));
        assert!(matches!(outcome, DetectionOutcome::Deferred { .. }));

        let summary = dispatcher.finish();
        assert!(summary.deferred.is_empty());
        assert_eq!(summary.stats.matches, 2);
        assert_eq!(summary.stats.matches_deferred, 0);
        assert_eq!(summary.stats.notifications_emitted, 2);

        let mut recorded: Vec<RegionId> = store
            .matches_for_report(report)
            .unwrap()
            .into_iter()
            .map(|m| m.region_id)
            .collect();
        recorded.sort();
        assert_eq!(recorded, vec![first, second]);

        let mut notified = vec![
            rx.try_recv().unwrap().rule_region_id,
            rx.try_recv().unwrap().rule_region_id,
        ];
        notified.sort();
        assert_eq!(notified, vec![first, second]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_query_is_deferred_and_recovered_on_finish() {
        let flaky = FlakyStore::new();
        let report = flaky.inner.create_report("scene", "scene.tif").unwrap();
        let region = add_square(&flaky.inner);
        flaky.query_failures.store(2, Ordering::SeqCst);
        let store = Arc::new(flaky);
        let (sink, mut rx) = ChannelSink::new();

        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();
        let outcome =
            dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "ship"));
        let DetectionOutcome::Deferred { id } = outcome else {
            panic!("expected deferral, got {outcome:?}");
        };
        assert_eq!(dispatcher.stats().matches_deferred, 1);
        assert!(rx.try_recv().is_err());

        let summary = dispatcher.finish();
        assert!(summary.deferred.is_empty());
        assert_eq!(summary.stats.matches_deferred, 0);
        assert_eq!(summary.stats.matches, 1);
        assert_eq!(rx.try_recv().unwrap().detection_id, id);
        assert_eq!(store.matches_for_report(report).unwrap().len(), 1);
    }

    #[test]
    fn test_query_that_never_recovers_stays_deferred() {
        let flaky = FlakyStore::new();
        let report = flaky.inner.create_report("scene", "scene.tif").unwrap();
        let region = add_square(&flaky.inner);
        flaky.query_failures.store(u32::MAX, Ordering::SeqCst);
        let store = Arc::new(flaky);
        let (sink, _rx) = ChannelSink::new();

        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();
        let outcome =
            dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "ship"));
        let DetectionOutcome::Deferred { id } = outcome else {
            panic!("expected deferral, got {outcome:?}");
        };

        let summary = dispatcher.finish();
        assert_eq!(summary.deferred, vec![id]);
        assert_eq!(summary.stats.matches_deferred, 1);
        assert_eq!(summary.stats.persisted, 1);
        // the detection itself is kept
        assert_eq!(store.detections_for_report(report).unwrap().len(), 1);
        assert!(store.matches_for_report(report).unwrap().is_empty());
    }

    #[test]
    fn test_insert_failure_drops_detection_without_evaluation() {
        let flaky = FlakyStore::new();
        let report = flaky.inner.create_report("scene", "scene.tif").unwrap();
        let region = add_square(&flaky.inner);
        flaky.insert_failures.store(u32::MAX, Ordering::SeqCst);
        let store = Arc::new(flaky);
        let (sink, mut rx) = ChannelSink::new();

        let mut dispatcher =
            Dispatcher::new(store.clone(), Arc::new(sink), report, &[region], policy()).unwrap();
        let outcome =
            dispatcher.handle(new_detection(report, Polygon::rectangle(1.0, 1.0, 2.0, 2.0), "ship"));
        assert_eq!(outcome, DetectionOutcome::Dropped);
        assert_eq!(store.queries.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());

        let summary = dispatcher.finish();
        assert_eq!(summary.stats.insert_failures, 1);
        assert_eq!(summary.stats.persisted, 0);
        assert!(summary.deferred.is_empty());
        assert!(store.detections_for_report(report).unwrap().is_empty());
    }
}
