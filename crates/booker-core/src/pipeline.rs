//! Multi-stage processing pipeline.
//!
//! An ordered list of stages joined by unbounded channels, terminated by an
//! optional collector. Each stage runs a scheduling loop that admits one
//! worker per free pool slot, so producers are throttled by admission
//! rather than by channel capacity. Failures never escape a stage: they are
//! counted and routed to a shared fail handler together with the input that
//! caused them.
//!
//! Closing is ordered: frontend first, then each stage (cancel, drain
//! pool), then the collector once the backend channel empties.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::book::{Book, BookResult, SearchTerms};
use crate::error::AppError;
use crate::pool::WorkerPool;
use crate::util::clear_term_line;

/// The item shapes that flow between stages. The tag is explicit so the
/// fail handler can dispatch without downcasting.
#[derive(Debug, Clone)]
pub enum Payload {
    Book(Book),
    Terms(SearchTerms),
    Results(Vec<BookResult>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Book(_) => "book",
            Payload::Terms(_) => "search terms",
            Payload::Results(_) => "results",
        }
    }
}

/// A stage worker: transforms one payload, or reports why it could not.
pub type WorkerFn =
    Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Option<Payload>, AppError>> + Send + Sync>;

/// The terminal sink draining the last stage.
pub type CollectorFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives every `(input, error)` pair a worker failed on.
pub type FailHandler = Arc<dyn Fn(Payload, AppError) -> BoxFuture<'static, ()> + Send + Sync>;

struct StageDescription {
    name: String,
    worker: WorkerFn,
}

struct Stage {
    name: String,
    pool: WorkerPool,
    workers: TaskTracker,
    quit: CancellationToken,
    // Monotonic progress counters; `taken == done` with all channel
    // hand-offs balanced means the stage is idle.
    taken: AtomicU64,
    done: AtomicU64,
    forwarded: AtomicU64,
}

impl Stage {
    fn new(name: String, pool_size: i64) -> Self {
        Self {
            name,
            pool: WorkerPool::new(pool_size),
            workers: TaskTracker::new(),
            quit: CancellationToken::new(),
            taken: AtomicU64::new(0),
            done: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }
}

#[derive(Default)]
struct CollectorState {
    taken: AtomicU64,
    done: AtomicU64,
}

pub struct Pipeline {
    frontend_tx: Option<UnboundedSender<Payload>>,
    frontend_rx: Option<UnboundedReceiver<Payload>>,
    descriptions: Vec<StageDescription>,
    collector_fn: Option<CollectorFn>,
    total_thread_count: i64,
    stages: Vec<Arc<Stage>>,
    collector: Option<Arc<CollectorState>>,
    collector_handle: Option<JoinHandle<()>>,
    submitted: Arc<AtomicU64>,
    fail_count: Arc<AtomicI64>,
    status_quit: CancellationToken,
}

impl Pipeline {
    pub fn new(total_thread_count: i64) -> Self {
        let (frontend_tx, frontend_rx) = unbounded_channel();
        Self {
            frontend_tx: Some(frontend_tx),
            frontend_rx: Some(frontend_rx),
            descriptions: Vec::new(),
            collector_fn: None,
            total_thread_count,
            stages: Vec::new(),
            collector: None,
            collector_handle: None,
            submitted: Arc::new(AtomicU64::new(0)),
            fail_count: Arc::new(AtomicI64::new(0)),
            status_quit: CancellationToken::new(),
        }
    }

    pub fn append_stage(&mut self, name: impl Into<String>, worker: WorkerFn) {
        self.descriptions.push(StageDescription {
            name: name.into(),
            worker,
        });
    }

    pub fn collector_stage(&mut self, collector: CollectorFn) {
        self.collector_fn = Some(collector);
    }

    pub fn total_thread_count(&self) -> i64 {
        self.total_thread_count
    }

    pub fn failure_count(&self) -> i64 {
        self.fail_count.load(Ordering::SeqCst)
    }

    /// Enqueues a payload at the pipeline frontend.
    pub fn send(&self, payload: Payload) {
        match &self.frontend_tx {
            Some(tx) => {
                if tx.send(payload).is_ok() {
                    self.submitted.fetch_add(1, Ordering::SeqCst);
                }
            }
            None => tracing::warn!("pipeline frontend is closed, dropping payload"),
        }
    }

    /// Spawns the stage schedulers, the collector, and the status display.
    pub fn run(&mut self, fail_handler: FailHandler) {
        if self.descriptions.is_empty() {
            tracing::warn!("pipeline not running because no stages were specified");
            return;
        }
        let Some(frontend_rx) = self.frontend_rx.take() else {
            tracing::warn!("pipeline is already running");
            return;
        };

        let fail_count = self.fail_count.clone();
        let fail: FailHandler = Arc::new(move |payload, err| {
            fail_count.fetch_add(1, Ordering::SeqCst);
            fail_handler(payload, err)
        });

        let stage_count = self.descriptions.len();
        let per_stage_thread_count = if stage_count == 1 {
            self.total_thread_count
        } else {
            self.total_thread_count / stage_count as i64
        };

        // Chain the channels: frontend feeds stage 0, each stage feeds the
        // next, the last stage feeds the backend.
        let mut stage_inputs = Vec::with_capacity(stage_count + 1);
        stage_inputs.push(frontend_rx);
        let mut stage_outputs = Vec::with_capacity(stage_count);
        for _ in 0..stage_count {
            let (tx, rx) = unbounded_channel();
            stage_outputs.push(tx);
            stage_inputs.push(rx);
        }
        let backend_rx = stage_inputs.pop().expect("backend receiver exists");

        for ((description, input), output) in self
            .descriptions
            .iter()
            .zip(stage_inputs)
            .zip(stage_outputs)
        {
            let stage = Arc::new(Stage::new(description.name.clone(), per_stage_thread_count));
            stage.workers.spawn(run_stage(
                stage.clone(),
                input,
                output,
                description.worker.clone(),
                fail.clone(),
            ));
            self.stages.push(stage);
        }

        match self.collector_fn.clone() {
            Some(collector_fn) => {
                let state = Arc::new(CollectorState::default());
                self.collector = Some(state.clone());
                self.collector_handle =
                    Some(tokio::spawn(run_collector(state, backend_rx, collector_fn)));
            }
            None => drop(backend_rx),
        }

        self.spawn_status_display();
    }

    fn spawn_status_display(&self) {
        let stages = self.stages.clone();
        let collector = self.collector.clone();
        let fail_count = self.fail_count.clone();
        let quit = self.status_quit.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                tokio::select! {
                    () = quit.cancelled() => {
                        print!("{}", clear_term_line());
                        let _ = std::io::stdout().flush();
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let mut statuses: Vec<String> = stages
                    .iter()
                    .map(|stage| format!("{} {}", stage.name, stage.pool.in_flight()))
                    .collect();
                if let Some(collector) = &collector {
                    statuses.push(format!("collected {}", collector.done.load(Ordering::SeqCst)));
                }
                statuses.push(format!("failed {}", fail_count.load(Ordering::SeqCst)));

                print!("{}processing: {}", clear_term_line(), statuses.join(" -> "));
                let _ = std::io::stdout().flush();
            }
        });
    }

    /// True when every submitted payload has been fully accounted for:
    /// nothing queued, nothing in flight, collector caught up.
    pub fn is_idle(&self) -> bool {
        let mut upstream_forwarded = self.submitted.load(Ordering::SeqCst);

        for stage in &self.stages {
            let taken = stage.taken.load(Ordering::SeqCst);
            if taken != upstream_forwarded || stage.done.load(Ordering::SeqCst) != taken {
                return false;
            }
            upstream_forwarded = stage.forwarded.load(Ordering::SeqCst);
        }

        match &self.collector {
            Some(collector) => {
                let taken = collector.taken.load(Ordering::SeqCst);
                taken == upstream_forwarded && collector.done.load(Ordering::SeqCst) == taken
            }
            None => true,
        }
    }

    /// Blocks until all in-flight work has drained.
    pub async fn wait(&self) {
        while !self.is_idle() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Ordered shutdown: frontend, stages (cancel + drain), collector.
    /// Queued items in the channels of already-cancelled stages are
    /// discarded, not drained.
    pub async fn close(&mut self) {
        self.frontend_tx.take();

        for stage in &self.stages {
            stage.quit.cancel();
            stage.workers.close();
            stage.workers.wait().await;
        }

        if let Some(handle) = self.collector_handle.take() {
            let _ = handle.await;
        }

        self.status_quit.cancel();
    }
}

async fn run_stage(
    stage: Arc<Stage>,
    mut input: UnboundedReceiver<Payload>,
    output: UnboundedSender<Payload>,
    worker: WorkerFn,
    fail: FailHandler,
) {
    loop {
        let item = tokio::select! {
            () = stage.quit.cancelled() => return,
            item = input.recv() => match item {
                Some(item) => item,
                None => return,
            },
        };

        stage.taken.fetch_add(1, Ordering::SeqCst);
        let slot = stage.pool.start().await;

        let worker = worker.clone();
        let fail = fail.clone();
        let output = output.clone();
        let stage_ref = stage.clone();
        stage.workers.spawn(async move {
            let _slot = slot;
            match worker(item.clone()).await {
                Ok(Some(result)) => {
                    stage_ref.forwarded.fetch_add(1, Ordering::SeqCst);
                    let _ = output.send(result);
                }
                Ok(None) => {
                    fail(item, AppError::Generic("worker produced no result".into())).await;
                }
                Err(err) => fail(item, err).await,
            }
            stage_ref.done.fetch_add(1, Ordering::SeqCst);
        });
    }
}

async fn run_collector(
    state: Arc<CollectorState>,
    mut input: UnboundedReceiver<Payload>,
    collector: CollectorFn,
) {
    while let Some(item) = input.recv().await {
        state.taken.fetch_add(1, Ordering::SeqCst);
        collector(item).await;
        state.done.fetch_add(1, Ordering::SeqCst);
    }
}
