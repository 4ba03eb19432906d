// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory FIFO processing queue with bounded concurrent workers.
//
// One background loop dequeues items in arrival order and hands each to a
// worker task holding one semaphore permit, so at most `max_concurrent`
// conversions run at once.  The queue is the only component that calls the
// conversion backend and the only one that deletes source files.
//
// Nothing is persisted: items still queued when the loop stops are dropped.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use labelwerk_core::backend::ConversionBackend;
use labelwerk_core::config::PipelineConfig;
use labelwerk_core::error::{LabelwerkError, Result};
use labelwerk_core::types::{LabelUnit, ProcessingItem, QueueStats};
use labelwerk_label::segment::{preprocess, resolve_output_name, split};

use crate::events::{self, PipelineEvent};
use crate::gate::FileProbe;
use crate::inflight::InFlightSet;
use crate::parked::ParkedSet;
use crate::retry::{RetryDecision, RetryPolicy, decide_lock_retry};

/// Extension of files produced by the conversion backend.
pub const OUTPUT_EXTENSION: &str = "pdf";

/// Highest numeric suffix tried when the output name is taken.
const MAX_OUTPUT_SUFFIX: u32 = 9_999;

/// How long `stop` waits for in-progress conversions before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

/// Queue construction parameters.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub retry: RetryPolicy,
    /// Worker slots; values below 1 are treated as 1.
    pub max_concurrent: usize,
    pub idle_wait: Duration,
    pub error_pause: Duration,
    /// Alternate output directory; `None` writes beside the source.
    pub output_dir: Option<PathBuf>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl QueueSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            max_concurrent: config.max_concurrent,
            idle_wait: config.idle_wait(),
            error_pause: config.error_pause(),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// Result of one processing attempt for an item.
#[derive(Debug)]
enum Attempt {
    /// Source disappeared before processing; dropped without an event.
    Vanished,
    Locked,
    Converted(PathBuf),
    Failed(LabelwerkError),
}

/// State shared between the queue handle, the loop, and worker tasks.
struct QueueShared {
    settings: QueueSettings,
    slots: usize,
    items: Mutex<VecDeque<ProcessingItem>>,
    wakeup: Notify,
    semaphore: Arc<Semaphore>,
    active_workers: AtomicUsize,
    running: AtomicBool,
    backend: Arc<dyn ConversionBackend>,
    probe: Arc<dyn FileProbe>,
    in_flight: InFlightSet,
    parked: ParkedSet,
    /// Output paths claimed by conversions still running.
    reserved_outputs: Mutex<HashSet<PathBuf>>,
    events: broadcast::Sender<PipelineEvent>,
    cancel: CancellationToken,
}

/// FIFO work queue feeding a fixed number of concurrent worker slots.
///
/// Cheap to share behind an `Arc`; `start` and `stop` take `&self`.  A
/// stopped queue cannot be restarted.
pub struct ProcessingQueue {
    shared: Arc<QueueShared>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingQueue {
    /// Create a queue. Nothing runs until [`start`](Self::start).
    ///
    /// `in_flight` must be the same set the detector claims paths in; the
    /// queue releases a path whenever its item reaches a terminal state.
    pub fn new(
        settings: QueueSettings,
        backend: Arc<dyn ConversionBackend>,
        probe: Arc<dyn FileProbe>,
        in_flight: InFlightSet,
    ) -> Self {
        Self::with_events(settings, backend, probe, in_flight, events::channel())
    }

    /// Like [`new`](Self::new) but publishing on an existing event channel.
    pub fn with_events(
        settings: QueueSettings,
        backend: Arc<dyn ConversionBackend>,
        probe: Arc<dyn FileProbe>,
        in_flight: InFlightSet,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        let slots = settings.max_concurrent.max(1);
        Self {
            shared: Arc::new(QueueShared {
                settings,
                slots,
                items: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                semaphore: Arc::new(Semaphore::new(slots)),
                active_workers: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                backend,
                probe,
                in_flight,
                parked: ParkedSet::new(),
                reserved_outputs: Mutex::new(HashSet::new()),
                events,
                cancel: CancellationToken::new(),
            }),
            task_handle: Mutex::new(None),
        }
    }

    /// Append an item at the tail and wake the loop.
    #[instrument(skip_all, fields(item_id = %item.id, path = %item.file_path.display()))]
    pub fn enqueue(&self, item: ProcessingItem) {
        self.shared.push(item);
        debug!("item enqueued");
    }

    /// Spawn the background loop. Calling it again while running is a no-op.
    pub fn start(&self) {
        if self.shared.cancel.is_cancelled() {
            warn!("processing queue was stopped and cannot be restarted");
            return;
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("processing queue already running");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            QueueShared::run_loop(shared).await;
        });
        *lock(&self.task_handle) = Some(handle);
        info!(slots = self.shared.slots, "processing queue started");
    }

    /// Signal the loop to exit and wait for it.
    ///
    /// Conversions already running are allowed to finish; queued items and
    /// pending retries are abandoned.
    pub async fn stop(&self) {
        self.shared.cancel.cancel();

        let handle = lock(&self.task_handle).take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "processing loop task failed"),
                Err(_) => warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "processing loop did not stop in time"
                ),
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        let dropped = self.shared.queue().len();
        info!(dropped, "processing queue stopped");
    }

    /// Snapshot of queue length and worker usage.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_length: self.shared.queue().len(),
            is_processing: self.shared.running.load(Ordering::SeqCst),
            max_concurrent_slots: self.shared.slots,
            active_workers: self.shared.active_workers.load(Ordering::SeqCst),
        }
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Sender half of the event channel, for components publishing alongside
    /// the queue.
    pub fn event_sender(&self) -> broadcast::Sender<PipelineEvent> {
        self.shared.events.clone()
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.shared.in_flight
    }

    /// Sources that failed and stay parked until modified.
    pub fn parked(&self) -> &ParkedSet {
        &self.shared.parked
    }
}

impl QueueShared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<ProcessingItem>> {
        lock(&self.items)
    }

    fn push(&self, item: ProcessingItem) {
        self.queue().push_back(item);
        self.wakeup.notify_one();
    }

    fn pop(&self) -> Option<ProcessingItem> {
        self.queue().pop_front()
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Dequeue loop.  A slot is acquired before an item is taken, so items
    /// leave the queue strictly in order and only when a worker is free.
    async fn run_loop(shared: Arc<Self>) {
        debug!("processing loop running");

        loop {
            let permit: OwnedSemaphorePermit = tokio::select! {
                _ = shared.cancel.cancelled() => break,
                permit = Arc::clone(&shared.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "worker slot acquisition failed");
                        tokio::time::sleep(shared.settings.error_pause).await;
                        continue;
                    }
                },
            };

            let Some(item) = shared.pop() else {
                drop(permit);
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    _ = tokio::time::timeout(shared.settings.idle_wait, shared.wakeup.notified()) => {}
                }
                continue;
            };

            shared.active_workers.fetch_add(1, Ordering::SeqCst);
            let worker = Arc::clone(&shared);
            tokio::spawn(async move {
                worker.process(item).await;
                worker.active_workers.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            });
        }

        // Wait for running conversions: they hold permits until done.
        let slots = u32::try_from(shared.slots).unwrap_or(u32::MAX);
        match shared.semaphore.acquire_many(slots).await {
            Ok(_all) => debug!("all workers idle"),
            Err(e) => warn!(error = %e, "could not wait for workers"),
        }
        debug!("processing loop exited");
    }

    /// Run one item to its next state and record the outcome.
    #[instrument(skip_all, fields(item_id = %item.id, path = %item.file_path.display(), retry = item.retry_count))]
    async fn process(self: &Arc<Self>, mut item: ProcessingItem) {
        match self.attempt(&item).await {
            Attempt::Vanished => {
                debug!("source file vanished, dropping item");
                self.in_flight.release(&item.file_path);
            }
            Attempt::Locked => {
                item.retry_count += 1;
                match decide_lock_retry(item.retry_count, &self.settings.retry) {
                    RetryDecision::RetryAfter(delay) => self.schedule_retry(item, delay),
                    RetryDecision::Exhausted => {
                        let err = LabelwerkError::LockTimeout(item.file_path.clone());
                        self.fail(item, err);
                    }
                }
            }
            Attempt::Converted(output_path) => self.succeed(item, output_path),
            Attempt::Failed(err) => self.fail(item, err),
        }
    }

    async fn attempt(&self, item: &ProcessingItem) -> Attempt {
        if !self.probe.exists(&item.file_path) {
            return Attempt::Vanished;
        }
        if self.probe.is_locked(&item.file_path) {
            return Attempt::Locked;
        }
        match self.convert(item).await {
            Ok(output_path) => Attempt::Converted(output_path),
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Render, encode, verify, then delete the source.
    async fn convert(&self, item: &ProcessingItem) -> Result<PathBuf> {
        let units = split(&preprocess(&item.content));
        if units.is_empty() {
            return Err(LabelwerkError::NoLabelUnits);
        }

        let output_path = self.reserve_output_path(item).await?;
        let written = self.render_to(item, &units, &output_path).await;
        lock(&self.reserved_outputs).remove(&output_path);
        written?;

        if let Err(e) = tokio::fs::remove_file(&item.file_path).await {
            // Output exists, so this is still a success.
            warn!(
                path = %item.file_path.display(),
                error = %e,
                "converted source could not be deleted"
            );
        }

        Ok(output_path)
    }

    /// Render the units and encode them to `output_path`, which must not
    /// exist beforehand.
    async fn render_to(
        &self,
        item: &ProcessingItem,
        units: &[LabelUnit],
        output_path: &Path,
    ) -> Result<()> {
        let dims = item.dimensions;

        debug!(
            units = units.len(),
            width_mm = dims.width_mm(),
            height_mm = dims.height_mm(),
            dpi = dims.dpi(),
            backend = self.backend.name(),
            "rendering label units"
        );
        let buffers = self
            .backend
            .render(units, dims.width_mm(), dims.height_mm(), dims.dpi())
            .await?;
        if buffers.len() != units.len() {
            return Err(LabelwerkError::RenderCountMismatch {
                expected: units.len(),
                actual: buffers.len(),
            });
        }

        self.backend.encode(buffers, output_path).await?;

        if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
            return Err(LabelwerkError::OutputMissing(output_path.to_path_buf()));
        }
        Ok(())
    }

    /// Claim the first free output name: `name.pdf`, then `name-1.pdf`,
    /// `name-2.pdf` and so on.  A name is free when no file has it and no
    /// running conversion has claimed it.  The caller releases the claim.
    async fn reserve_output_path(&self, item: &ProcessingItem) -> Result<PathBuf> {
        let dir = match &self.settings.output_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                dir.clone()
            }
            None => item
                .file_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let name = resolve_output_name(None, &item.content, &item.file_stem());

        let mut reserved = lock(&self.reserved_outputs);
        for suffix in 0..=MAX_OUTPUT_SUFFIX {
            let candidate = if suffix == 0 {
                dir.join(format!("{name}.{OUTPUT_EXTENSION}"))
            } else {
                dir.join(format!("{name}-{suffix}.{OUTPUT_EXTENSION}"))
            };
            if reserved.contains(&candidate) || candidate.exists() {
                continue;
            }
            if suffix > 0 {
                warn!(
                    path = %item.file_path.display(),
                    output = %candidate.display(),
                    "output name taken, writing under a numbered name"
                );
            }
            reserved.insert(candidate.clone());
            return Ok(candidate);
        }
        Err(LabelwerkError::Encode(format!(
            "no free output name for {name}.{OUTPUT_EXTENSION} in {}",
            dir.display()
        )))
    }

    fn schedule_retry(self: &Arc<Self>, item: ProcessingItem, delay: Duration) {
        info!(
            path = %item.file_path.display(),
            retry = item.retry_count,
            max = self.settings.retry.max_retries,
            "file locked, will retry"
        );
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {
                    debug!(path = %item.file_path.display(), "shutdown, dropping pending retry");
                }
                _ = tokio::time::sleep(delay) => shared.push(item),
            }
        });
    }

    fn succeed(&self, item: ProcessingItem, output_path: PathBuf) {
        info!(
            path = %item.file_path.display(),
            output = %output_path.display(),
            "label file converted"
        );
        let path = item.file_path.clone();
        self.parked.forget(&path);
        self.publish(PipelineEvent::ProcessingSucceeded {
            item: Arc::new(item),
            output_path,
        });
        self.complete(path, true);
    }

    fn fail(&self, mut item: ProcessingItem, err: LabelwerkError) {
        let message = err.to_string();
        match err {
            LabelwerkError::NoLabelUnits => {
                info!(path = %item.file_path.display(), "no label units found, leaving file in place");
            }
            _ => {
                error!(path = %item.file_path.display(), error = %message, "label file failed");
            }
        }
        item.error_message = Some(message.clone());
        let path = item.file_path.clone();
        // Parked while still in flight, so a scan can never see it unclaimed
        // and unparked.
        self.parked.park(&path);
        self.publish(PipelineEvent::ProcessingFailed {
            item: Arc::new(item),
            message,
        });
        self.complete(path, false);
    }

    fn complete(&self, path: PathBuf, success: bool) {
        self.in_flight.release(&path);
        self.publish(PipelineEvent::ProcessingCompleted { path, success });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use labelwerk_core::types::{DimensionSource, LabelDimensions};

    /// Backend that writes one line per rendered unit.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub fail_render: bool,
        pub drop_one: bool,
        /// Removed during `encode`, before the output is written.
        pub delete_during_encode: Option<PathBuf>,
        pub rendered: AtomicU32,
    }

    #[async_trait]
    impl ConversionBackend for FakeBackend {
        async fn render(
            &self,
            units: &[LabelUnit],
            width_mm: f64,
            height_mm: f64,
            dpi: u32,
        ) -> Result<Vec<Vec<u8>>> {
            if self.fail_render {
                return Err(LabelwerkError::Render("renderer offline".into()));
            }
            self.rendered.fetch_add(units.len() as u32, Ordering::SeqCst);
            let mut out: Vec<Vec<u8>> = units
                .iter()
                .map(|u| format!("{width_mm:.1}x{height_mm:.1}@{dpi}:{}", u.len()).into_bytes())
                .collect();
            if self.drop_one {
                out.pop();
            }
            Ok(out)
        }

        async fn encode(&self, buffers: Vec<Vec<u8>>, output_path: &Path) -> Result<()> {
            if let Some(path) = &self.delete_during_encode {
                std::fs::remove_file(path)?;
            }
            std::fs::write(output_path, buffers.join(&b'\n'))?;
            Ok(())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Real existence checks; the first `locked_probes` lock checks report
    /// locked.
    pub(crate) struct ScriptedProbe {
        pub locked_probes: u32,
        pub lock_checks: AtomicU32,
    }

    impl ScriptedProbe {
        pub fn locked_for(locked_probes: u32) -> Self {
            Self {
                locked_probes,
                lock_checks: AtomicU32::new(0),
            }
        }
    }

    impl FileProbe for ScriptedProbe {
        fn exists(&self, path: &Path) -> bool {
            path.is_file()
        }

        fn is_locked(&self, _path: &Path) -> bool {
            let n = self.lock_checks.fetch_add(1, Ordering::SeqCst);
            n < self.locked_probes
        }
    }

    fn settings(max_retries: u32) -> QueueSettings {
        QueueSettings {
            retry: RetryPolicy {
                max_retries,
                retry_delay: Duration::from_secs(2),
            },
            max_concurrent: 1,
            idle_wait: Duration::from_millis(50),
            error_pause: Duration::from_millis(100),
            output_dir: None,
        }
    }

    fn item_for(path: &Path, content: &str) -> ProcessingItem {
        let dims = LabelDimensions::from_mm(50.0, 25.0, 203, DimensionSource::ExplicitParameter);
        ProcessingItem::new(path, content.to_string(), dims)
    }

    fn write_label(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write label");
        path
    }

    /// Wait for the completion event for `path`, returning every event seen.
    async fn until_completed(
        rx: &mut broadcast::Receiver<PipelineEvent>,
        path: &Path,
    ) -> Vec<PipelineEvent> {
        let mut seen = Vec::new();
        loop {
            let event = rx.recv().await.expect("event channel open");
            let done = matches!(&event, PipelineEvent::ProcessingCompleted { path: p, .. } if p == path);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Collect events until every path in `paths` has completed.
    async fn until_all_completed(
        rx: &mut broadcast::Receiver<PipelineEvent>,
        paths: &[&Path],
    ) -> Vec<PipelineEvent> {
        let mut seen = Vec::new();
        let mut pending: Vec<&Path> = paths.to_vec();
        while !pending.is_empty() {
            let event = rx.recv().await.expect("event channel open");
            if let PipelineEvent::ProcessingCompleted { path, .. } = &event {
                pending.retain(|p| p != path);
            }
            seen.push(event);
        }
        seen
    }

    const LABEL: &str = "^XA^PW400^LL200^FO50,50^FDHello^FS^XZ";

    #[tokio::test(start_paused = true)]
    async fn converts_and_deletes_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_label(dir.path(), "hello.zpl", LABEL);
        let in_flight = InFlightSet::new();
        assert!(in_flight.try_acquire(&path));

        let backend = Arc::new(FakeBackend::default());
        let queue = ProcessingQueue::new(
            settings(3),
            backend.clone(),
            Arc::new(ScriptedProbe::locked_for(0)),
            in_flight.clone(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        let output = dir.path().join("hello.pdf");
        assert!(matches!(
            &events[0],
            PipelineEvent::ProcessingSucceeded { output_path, .. } if *output_path == output
        ));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::ProcessingCompleted { success: true, .. })
        ));
        assert!(output.exists());
        assert!(!path.exists(), "source deleted after success");
        assert!(!in_flight.contains(&path));
        assert_eq!(backend.rendered.load(Ordering::SeqCst), 1);

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_locked_probes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_label(dir.path(), "busy.zpl", LABEL);
        let probe = Arc::new(ScriptedProbe::locked_for(2));
        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            probe.clone(),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        match &events[0] {
            PipelineEvent::ProcessingSucceeded { item, .. } => assert_eq!(item.retry_count, 2),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(probe.lock_checks.load(Ordering::SeqCst), 3);

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_budget_and_keeps_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_label(dir.path(), "stuck.zpl", LABEL);
        let probe = Arc::new(ScriptedProbe::locked_for(u32::MAX));
        let in_flight = InFlightSet::new();
        assert!(in_flight.try_acquire(&path));
        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            probe.clone(),
            in_flight.clone(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        match &events[0] {
            PipelineEvent::ProcessingFailed { item, message } => {
                assert_eq!(item.retry_count, 4);
                assert!(message.contains("locked"), "message: {message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::ProcessingCompleted { success: false, .. })
        ));
        assert_eq!(probe.lock_checks.load(Ordering::SeqCst), 4);
        assert!(path.exists(), "source kept after lock failure");
        assert!(!in_flight.contains(&path));

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn content_without_labels_is_reported_and_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = "just some notes, no markers";
        let path = write_label(dir.path(), "notes.txt", content);
        let backend = Arc::new(FakeBackend::default());
        let queue = ProcessingQueue::new(
            settings(3),
            backend.clone(),
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, content));

        let events = until_completed(&mut rx, &path).await;
        match &events[0] {
            PipelineEvent::ProcessingFailed { item, message } => {
                assert_eq!(message, "no label units found");
                assert_eq!(item.error_message.as_deref(), Some("no label units found"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(path.exists());
        assert_eq!(backend.rendered.load(Ordering::SeqCst), 0);

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_never_deletes_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_label(dir.path(), "broken.zpl", LABEL);
        let backend = Arc::new(FakeBackend {
            fail_render: true,
            ..Default::default()
        });
        let queue = ProcessingQueue::new(
            settings(3),
            backend,
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        assert!(matches!(&events[0], PipelineEvent::ProcessingFailed { .. }));
        assert!(path.exists());
        assert!(!dir.path().join("broken.pdf").exists());

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn short_render_result_is_a_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = "^XA^FDone^FS^XZ^XA^FDtwo^FS^XZ";
        let path = write_label(dir.path(), "pair.zpl", content);
        let backend = Arc::new(FakeBackend {
            drop_one: true,
            ..Default::default()
        });
        let queue = ProcessingQueue::new(
            settings(3),
            backend,
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, content));

        let events = until_completed(&mut rx, &path).await;
        match &events[0] {
            PipelineEvent::ProcessingFailed { message, .. } => {
                assert!(message.contains("1 rendered labels for 2"), "message: {message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(path.exists());

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn output_goes_to_configured_dir_under_embedded_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out_dir = dir.path().join("out");
        let content = "^XA^FX FileName: Invoice<7>^FS^FDx^FS^XZ";
        let path = write_label(dir.path(), "job.prn", content);
        let mut s = settings(3);
        s.output_dir = Some(out_dir.clone());
        let queue = ProcessingQueue::new(
            s,
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, content));

        until_completed(&mut rx, &path).await;
        assert!(out_dir.join("Invoice7.pdf").exists());

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_file_is_dropped_silently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gone = dir.path().join("gone.zpl");
        let present = write_label(dir.path(), "present.zpl", LABEL);
        let in_flight = InFlightSet::new();
        assert!(in_flight.try_acquire(&gone));

        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            in_flight.clone(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&gone, LABEL));
        queue.enqueue(item_for(&present, LABEL));

        // Only the present file produces events.
        let events = until_completed(&mut rx, &present).await;
        assert!(events.iter().all(|e| e.path() == present.as_path()));
        assert!(!in_flight.contains(&gone));

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reflect_pending_items() {
        let queue = ProcessingQueue::new(
            QueueSettings {
                max_concurrent: 2,
                ..settings(3)
            },
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        queue.enqueue(item_for(Path::new("/nowhere/a.zpl"), LABEL));
        queue.enqueue(item_for(Path::new("/nowhere/b.zpl"), LABEL));

        let stats = queue.stats();
        assert_eq!(stats.queue_length, 2);
        assert!(!stats.is_processing);
        assert_eq!(stats.max_concurrent_slots, 2);
        assert_eq!(stats.active_workers, 0);

        queue.start();
        assert!(queue.stats().is_processing);
        queue.stop().await;
        assert!(!queue.stats().is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_item_retries_behind_later_items() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = write_label(dir.path(), "a.zpl", LABEL);
        let second = write_label(dir.path(), "b.zpl", LABEL);
        // Only the very first lock check, for `a`, reports locked.
        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(1)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.enqueue(item_for(&first, LABEL));
        queue.enqueue(item_for(&second, LABEL));
        queue.start();

        let events = until_all_completed(&mut rx, &[&first, &second]).await;
        let succeeded: Vec<(PathBuf, u32)> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ProcessingSucceeded { item, .. } => {
                    Some((item.file_path.clone(), item.retry_count))
                }
                _ => None,
            })
            .collect();
        assert_eq!(succeeded, vec![(second.clone(), 0), (first.clone(), 1)]);

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn undeletable_source_still_counts_as_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_label(dir.path(), "hello.zpl", LABEL);
        let in_flight = InFlightSet::new();
        assert!(in_flight.try_acquire(&path));
        // The source is gone by the time the queue tries to delete it.
        let backend = Arc::new(FakeBackend {
            delete_during_encode: Some(path.clone()),
            ..Default::default()
        });
        let queue = ProcessingQueue::new(
            settings(3),
            backend,
            Arc::new(ScriptedProbe::locked_for(0)),
            in_flight.clone(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        assert!(matches!(&events[0], PipelineEvent::ProcessingSucceeded { .. }));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::ProcessingCompleted { success: true, .. })
        ));
        assert!(dir.path().join("hello.pdf").exists());
        assert!(!in_flight.contains(&path));

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_source_is_parked_before_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = "just some notes, no markers";
        let path = write_label(dir.path(), "notes.txt", content);
        let in_flight = InFlightSet::new();
        assert!(in_flight.try_acquire(&path));
        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            in_flight.clone(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, content));

        loop {
            match rx.recv().await.expect("event channel open") {
                PipelineEvent::ProcessingFailed { .. } => {
                    // Published before the release.
                    assert!(queue.parked().contains(&path));
                }
                PipelineEvent::ProcessingCompleted { success, .. } => {
                    assert!(!success);
                    break;
                }
                _ => {}
            }
        }
        assert!(!in_flight.contains(&path));
        assert!(queue.parked().is_parked(&path));

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn existing_output_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join("hello.pdf");
        std::fs::write(&stale, "stale output").expect("write stale output");
        let path = write_label(dir.path(), "hello.zpl", LABEL);
        let queue = ProcessingQueue::new(
            settings(3),
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.start();
        queue.enqueue(item_for(&path, LABEL));

        let events = until_completed(&mut rx, &path).await;
        let numbered = dir.path().join("hello-1.pdf");
        assert!(matches!(
            &events[0],
            PipelineEvent::ProcessingSucceeded { output_path, .. } if *output_path == numbered
        ));
        assert!(numbered.exists());
        assert_eq!(
            std::fs::read_to_string(&stale).expect("read stale output"),
            "stale output"
        );

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_items_with_one_name_get_distinct_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = "^XA^FX FileName: Shared^FS^FDx^FS^XZ";
        let first = write_label(dir.path(), "one.zpl", content);
        let second = write_label(dir.path(), "two.zpl", content);
        let queue = ProcessingQueue::new(
            QueueSettings {
                max_concurrent: 2,
                ..settings(3)
            },
            Arc::new(FakeBackend::default()),
            Arc::new(ScriptedProbe::locked_for(0)),
            InFlightSet::new(),
        );
        let mut rx = queue.subscribe();
        queue.enqueue(item_for(&first, content));
        queue.enqueue(item_for(&second, content));
        queue.start();

        let events = until_all_completed(&mut rx, &[&first, &second]).await;
        let mut outputs: Vec<PathBuf> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ProcessingSucceeded { output_path, .. } => Some(output_path.clone()),
                _ => None,
            })
            .collect();
        outputs.sort();
        assert_eq!(
            outputs,
            vec![dir.path().join("Shared-1.pdf"), dir.path().join("Shared.pdf")]
        );
        assert!(outputs.iter().all(|p| p.exists()));

        queue.stop().await;
    }
}
