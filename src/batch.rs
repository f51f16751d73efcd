//! Batch scheduler: convert every pending queue item on a bounded worker pool.
//!
//! A run snapshots the pending ids into a FIFO and starts `workers` threads on
//! a dedicated [rayon](https://docs.rs/rayon) pool. Each worker pops an id,
//! claims the item (pending → converting, atomically under the queue lock),
//! converts it, and writes the result back in one locked update. A failed item
//! becomes `error` and the worker moves on, so one bad file never stops the
//! others. A panic inside the converter is caught and recorded the same way.
//!
//! At most `workers` items are ever converting at once from a single run,
//! which bounds the number of decoded surfaces alive at the same time.
//! Overlapping runs cannot process an item twice because only one of them
//! can win the claim.
//!
//! Completion order is not enqueue order. Progress is reported per item over
//! an optional channel, identified by [`ItemId`].

use crate::imaging::{ConvertError, Converted, Converter, RasterBackend, SourceImage};
use crate::queue::{Claim, ItemId, ItemStatus, Queue};
use crate::settings::OutputFormat;
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 3;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Per-item progress, sent as items move through the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        id: ItemId,
        name: String,
    },
    Finished {
        id: ItemId,
        name: String,
        format: OutputFormat,
        width: u32,
        height: u32,
        size: u64,
        /// Quality percent chosen by a target-size search.
        derived_quality: Option<u8>,
    },
    Failed {
        id: ItemId,
        name: String,
        error: String,
    },
    /// Settings changed while converting. The result was dropped and the
    /// item went back into this run's queue.
    Requeued {
        id: ItemId,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub failed: usize,
    pub requeued: usize,
}

#[derive(Default)]
struct Counters {
    done: AtomicUsize,
    failed: AtomicUsize,
    requeued: AtomicUsize,
}

impl Counters {
    fn summary(&self) -> BatchSummary {
        BatchSummary {
            done: self.done.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-size worker pool over a [`Queue`].
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    workers: usize,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl BatchScheduler {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Convert every item pending at call time. Blocks until the run drains.
    pub fn run<B: RasterBackend>(
        &self,
        queue: &Queue,
        converter: &Converter<B>,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary, BatchError> {
        if self.workers == 0 {
            return Err(BatchError::NoWorkers);
        }
        let pending: VecDeque<ItemId> = queue.pending_ids().into();
        if pending.is_empty() {
            debug!("nothing pending, batch skipped");
            return Ok(BatchSummary::default());
        }

        let threads = self.workers.min(pending.len());
        info!(items = pending.len(), workers = threads, "starting batch");

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("convert-{i}"))
            .build()?;
        let work = Mutex::new(pending);
        let counters = Counters::default();

        pool.scope(|scope| {
            for _ in 0..threads {
                let events = events.clone();
                let (work, counters) = (&work, &counters);
                scope.spawn(move |_| worker_loop(queue, converter, work, counters, events.as_ref()));
            }
        });

        let summary = counters.summary();
        info!(
            done = summary.done,
            failed = summary.failed,
            requeued = summary.requeued,
            "batch finished"
        );
        Ok(summary)
    }
}

fn worker_loop<B: RasterBackend>(
    queue: &Queue,
    converter: &Converter<B>,
    work: &Mutex<VecDeque<ItemId>>,
    counters: &Counters,
    events: Option<&Sender<BatchEvent>>,
) {
    let emit = |event: BatchEvent| {
        if let Some(tx) = events {
            tx.send(event).ok();
        }
    };

    loop {
        let next = work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(id) = next else { break };

        // Another run got there first, or the item was removed
        let Some(claim) = queue.claim(id) else {
            continue;
        };
        let name = claim.name.clone();
        emit(BatchEvent::Started {
            id,
            name: name.clone(),
        });

        let (outcome, event) =
            catch_unwind(AssertUnwindSafe(|| convert_claim(converter, &claim)))
                .unwrap_or_else(|payload| panicked(&claim, payload.as_ref()));
        match queue.finish(claim, outcome) {
            Some(ItemStatus::Done) => {
                counters.done.fetch_add(1, Ordering::Relaxed);
                emit(event);
            }
            Some(ItemStatus::Error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                emit(event);
            }
            Some(ItemStatus::Pending) => {
                counters.requeued.fetch_add(1, Ordering::Relaxed);
                work.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push_back(id);
                emit(BatchEvent::Requeued { id, name });
            }
            Some(ItemStatus::Converting) | None => {
                debug!(%id, "item removed during conversion");
            }
        }
    }
}

/// Run the converter on a claimed item and describe the outcome as an event.
fn convert_claim<B: RasterBackend>(
    converter: &Converter<B>,
    claim: &Claim,
) -> (Result<Converted, String>, BatchEvent) {
    let source = SourceImage {
        name: &claim.name,
        mime: claim.mime.as_deref(),
        bytes: &claim.bytes,
    };
    match converter.convert(&source, &claim.settings) {
        Ok(converted) => {
            let event = BatchEvent::Finished {
                id: claim.id,
                name: claim.name.clone(),
                format: converted.format,
                width: converted.width,
                height: converted.height,
                size: converted.size(),
                derived_quality: converted
                    .derived_quality
                    .map(|q| (q * 100.0).round().clamp(1.0, 100.0) as u8),
            };
            (Ok(converted), event)
        }
        Err(err) => {
            log_failure(&claim.name, &err);
            let error = err.to_string();
            let event = BatchEvent::Failed {
                id: claim.id,
                name: claim.name.clone(),
                error: error.clone(),
            };
            (Err(error), event)
        }
    }
}

/// Turn a panic inside the converter into an ordinary item failure.
fn panicked(
    claim: &Claim,
    payload: &(dyn Any + Send),
) -> (Result<Converted, String>, BatchEvent) {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    warn!(name = %claim.name, detail, "converter panicked");
    let error = ConvertError::EncodeFailed(format!("internal error: {detail}")).to_string();
    let event = BatchEvent::Failed {
        id: claim.id,
        name: claim.name.clone(),
        error: error.clone(),
    };
    (Err(error), event)
}

fn log_failure(name: &str, err: &ConvertError) {
    match err {
        ConvertError::HeicDecoderUnavailable | ConvertError::FormatNotSupported(_) => {
            warn!(name, error = %err, "environment cannot convert this item")
        }
        _ => warn!(name, error = %err, "conversion failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{BackendError, Dimensions, Encoded};
    use crate::settings::{ConversionSettings, ResizeFit, ResizeMode, SettingsPatch};
    use crate::test_helpers::*;
    use image::RgbaImage;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Mock that tracks how many decodes run at once.
    #[derive(Default)]
    struct ProbeBackend {
        inner: MockBackend,
        active: AtomicUsize,
        peak: AtomicUsize,
        decodes: AtomicUsize,
    }

    impl RasterBackend for ProbeBackend {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.inner.identify(bytes)
        }

        fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.decodes.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(15));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.decode(bytes)
        }

        fn encode(
            &self,
            surface: &RgbaImage,
            format: OutputFormat,
            quality: Option<f32>,
        ) -> Result<Encoded, BackendError> {
            self.inner.encode(surface, format, quality)
        }
    }

    /// Mock that edits the queue's settings during its first decode.
    struct InterferingBackend<'a> {
        inner: MockBackend,
        queue: &'a Queue,
        fired: AtomicBool,
    }

    impl RasterBackend for InterferingBackend<'_> {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.inner.identify(bytes)
        }

        fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.queue.update_settings(&SettingsPatch {
                    quality: Some(33),
                    ..Default::default()
                });
            }
            self.inner.decode(bytes)
        }

        fn encode(
            &self,
            surface: &RgbaImage,
            format: OutputFormat,
            quality: Option<f32>,
        ) -> Result<Encoded, BackendError> {
            self.inner.encode(surface, format, quality)
        }
    }

    /// Mock whose first decode panics.
    #[derive(Default)]
    struct PanickingBackend {
        inner: MockBackend,
        fired: AtomicBool,
    }

    impl RasterBackend for PanickingBackend {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.inner.identify(bytes)
        }

        fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                panic!("decoder blew up");
            }
            self.inner.decode(bytes)
        }

        fn encode(
            &self,
            surface: &RgbaImage,
            format: OutputFormat,
            quality: Option<f32>,
        ) -> Result<Encoded, BackendError> {
            self.inner.encode(surface, format, quality)
        }
    }

    fn jpg_queue() -> Queue {
        Queue::new(ConversionSettings {
            output_format: OutputFormat::Jpg,
            ..ConversionSettings::initial()
        })
    }

    #[test]
    fn converts_all_pending_items() {
        let queue = jpg_queue();
        let ids = add_mock_images(&queue, &[(10, 10), (20, 10), (5, 5), (8, 4), (3, 9)]);
        let converter = Converter::new(MockBackend::new());
        let (tx, rx) = mpsc::channel();

        let summary = BatchScheduler::new(2)
            .run(&queue, &converter, Some(tx))
            .unwrap();

        assert_eq!(summary, BatchSummary { done: 5, failed: 0, requeued: 0 });
        for id in ids {
            let item = queue.get(id).unwrap();
            assert_eq!(item.status(), ItemStatus::Done);
            assert!(item.output().unwrap().size() > 0);
        }
        let events: Vec<BatchEvent> = rx.iter().collect();
        let started = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Started { .. }))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Finished { .. }))
            .count();
        assert_eq!((started, finished), (5, 5));
    }

    #[test]
    fn never_exceeds_worker_count() {
        let queue = jpg_queue();
        add_mock_images(&queue, &[(4, 4); 9]);
        let converter = Converter::new(ProbeBackend::default());

        let peak_converting = AtomicUsize::new(0);
        let running = AtomicBool::new(true);
        std::thread::scope(|s| {
            s.spawn(|| {
                while running.load(Ordering::SeqCst) {
                    let converting = queue.progress().converting;
                    peak_converting.fetch_max(converting, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(1));
                }
            });
            let summary = BatchScheduler::new(3).run(&queue, &converter, None).unwrap();
            running.store(false, Ordering::SeqCst);
            assert_eq!(summary.done, 9);
        });

        assert!(converter.backend().peak.load(Ordering::SeqCst) <= 3);
        assert!(peak_converting.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let queue = jpg_queue();
        let good = add_mock_images(&queue, &[(10, 10)]);
        let bad = add_corrupt_image(&queue, "broken.jpg");
        let more = add_mock_images(&queue, &[(12, 12)]);
        let converter = Converter::new(MockBackend::new());

        let summary = BatchScheduler::new(1).run(&queue, &converter, None).unwrap();

        assert_eq!(summary, BatchSummary { done: 2, failed: 1, requeued: 0 });
        assert_eq!(queue.get(good[0]).unwrap().status(), ItemStatus::Done);
        assert_eq!(queue.get(more[0]).unwrap().status(), ItemStatus::Done);
        let failed = queue.get(bad).unwrap();
        assert_eq!(failed.status(), ItemStatus::Error);
        assert!(failed.error().unwrap().starts_with("Failed to load image"));
    }

    #[test]
    fn oversized_canvas_fails_only_its_item() {
        let queue = jpg_queue();
        let ids = add_mock_images(&queue, &[(10, 10), (12, 12)]);
        queue.edit_item_settings(ids[0], |s| {
            s.resize_mode = ResizeMode::Fixed;
            s.resize_fit = ResizeFit::Fill;
            s.resize_width = u32::MAX;
            s.resize_height = u32::MAX;
        });
        let converter = Converter::new(MockBackend::new());

        let summary = BatchScheduler::new(1).run(&queue, &converter, None).unwrap();

        assert_eq!(summary, BatchSummary { done: 1, failed: 1, requeued: 0 });
        let oversized = queue.get(ids[0]).unwrap();
        assert_eq!(oversized.status(), ItemStatus::Error);
        assert!(oversized.error().unwrap().contains("megapixel limit"));
        assert_eq!(queue.get(ids[1]).unwrap().status(), ItemStatus::Done);
    }

    #[test]
    fn converter_panic_becomes_item_error() {
        let queue = jpg_queue();
        let ids = add_mock_images(&queue, &[(10, 10), (12, 12)]);
        let converter = Converter::new(PanickingBackend::default());
        let (tx, rx) = mpsc::channel();

        let summary = BatchScheduler::new(1)
            .run(&queue, &converter, Some(tx))
            .unwrap();

        assert_eq!(summary, BatchSummary { done: 1, failed: 1, requeued: 0 });
        let first = queue.get(ids[0]).unwrap();
        assert_eq!(first.status(), ItemStatus::Error);
        assert!(first.error().unwrap().contains("decoder blew up"));
        assert_eq!(queue.get(ids[1]).unwrap().status(), ItemStatus::Done);
        assert_eq!(queue.progress().converting, 0);
        assert!(
            rx.iter()
                .any(|e| matches!(e, BatchEvent::Failed { id, .. } if id == ids[0]))
        );
    }

    #[test]
    fn rerun_skips_finished_items() {
        let queue = jpg_queue();
        add_mock_images(&queue, &[(10, 10), (10, 10)]);
        let converter = Converter::new(ProbeBackend::default());
        let scheduler = BatchScheduler::default();

        scheduler.run(&queue, &converter, None).unwrap();
        let second = scheduler.run(&queue, &converter, None).unwrap();

        assert_eq!(second, BatchSummary::default());
        assert_eq!(converter.backend().decodes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn overlapping_runs_do_not_double_process() {
        let queue = jpg_queue();
        add_mock_images(&queue, &[(6, 6); 6]);
        let converter = Converter::new(ProbeBackend::default());
        let scheduler = BatchScheduler::new(2);

        let (a, b) = std::thread::scope(|s| {
            let first = s.spawn(|| scheduler.run(&queue, &converter, None).unwrap());
            let second = s.spawn(|| scheduler.run(&queue, &converter, None).unwrap());
            (first.join().unwrap(), second.join().unwrap())
        });

        assert_eq!(a.done + b.done, 6);
        assert_eq!(converter.backend().decodes.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn stale_result_is_requeued_and_reconverted() {
        let queue = jpg_queue();
        let ids = add_mock_images(&queue, &[(10, 10)]);
        let converter = Converter::new(InterferingBackend {
            inner: MockBackend::new(),
            queue: &queue,
            fired: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::channel();

        let summary = BatchScheduler::new(1)
            .run(&queue, &converter, Some(tx))
            .unwrap();

        assert_eq!(summary, BatchSummary { done: 1, failed: 0, requeued: 1 });
        let item = queue.get(ids[0]).unwrap();
        assert_eq!(item.status(), ItemStatus::Done);
        assert_eq!(item.settings.quality, 33);
        assert!(
            rx.iter()
                .any(|e| matches!(e, BatchEvent::Requeued { id, .. } if id == ids[0]))
        );
        // The kept output was encoded with the edited quality
        let encoded: Vec<_> = converter.backend().inner.encode_qualities();
        assert_eq!(encoded.last(), Some(&Some(0.33)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let queue = jpg_queue();
        let converter = Converter::new(MockBackend::new());
        assert!(matches!(
            BatchScheduler::new(0).run(&queue, &converter, None),
            Err(BatchError::NoWorkers)
        ));
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let queue = jpg_queue();
        let converter = Converter::new(MockBackend::new());
        let summary = BatchScheduler::default().run(&queue, &converter, None).unwrap();
        assert_eq!(summary, BatchSummary::default());
    }
}
