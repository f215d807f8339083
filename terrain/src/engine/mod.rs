//! Coalescing engine for coordinate height queries.
//!
//! Many independent callers submit point lists at arbitrary times. The first
//! submission after idleness opens a short coalescing window; everything
//! submitted before it closes goes out as **one** transport call, and the
//! response is split back to each caller in submission order. While a call is
//! outstanding new submissions queue up and are sent as soon as it returns.
//!
//! ```ignore
//! use terrain::{BatchConfig, Coordinate, EngineHandle, SrtmTransport};
//!
//! let engine = EngineHandle::spawn(SrtmTransport::new("/data/srtm"), BatchConfig::default());
//!
//! let a = engine.submit(vec![Coordinate::new(35.36, 138.73)]);
//! let b = engine.submit(vec![Coordinate::new(27.99, 86.93), Coordinate::new(46.85, 9.53)]);
//!
//! // Both requests share one transport call.
//! let (a, b) = tokio::join!(a.heights(), b.heights());
//! ```
//!
//! Dropping a [`HeightRequest`] (or calling [`HeightRequest::cancel`]) tells
//! the engine the caller is gone: a queued submission is removed, an
//! in-flight one still occupies its slice of the response but is never
//! delivered.
//!
//! The state machine lives in [`scheduler`] and is driven here by a single
//! tokio task, so all bookkeeping happens on one logical thread.

pub mod ledger;
pub mod queue;
pub mod scheduler;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};
use crate::transport::Transport;

pub use scheduler::{BatchScheduler, BatchState, Effect, Event};

/// Default coalescing window.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(500);

/// Opaque identity of a submitting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a consumer receives for its part of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// One height per submitted point, in submission order.
    Heights(Vec<f64>),
    /// The dispatch failed.
    Failed,
}

/// A result addressed to one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub consumer: ConsumerId,
    pub outcome: Outcome,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Delay between the first submission after idleness and its dispatch.
    pub window: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_BATCH_WINDOW,
        }
    }
}

impl BatchConfig {
    /// Configuration read from the environment.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `TERRAIN_BATCH_WINDOW_MS` | Coalescing window in milliseconds | 500 |
    pub fn from_env() -> Self {
        let window = std::env::var("TERRAIN_BATCH_WINDOW_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_WINDOW);
        Self { window }
    }

    /// Set the coalescing window.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Running totals kept by the engine.
#[derive(Debug, Default)]
pub struct EngineCounters {
    dispatches: AtomicU64,
    points_dispatched: AtomicU64,
    requests_delivered: AtomicU64,
    requests_failed: AtomicU64,
    results_discarded: AtomicU64,
}

impl EngineCounters {
    fn record_dispatch(&self, points: u64) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        self.points_dispatched.fetch_add(points, Ordering::Relaxed);
    }

    fn record_delivered(&self) {
        self.requests_delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_discarded(&self, n: u64) {
        self.results_discarded.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            points_dispatched: self.points_dispatched.load(Ordering::Relaxed),
            requests_delivered: self.requests_delivered.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transport calls issued.
    pub dispatches: u64,
    /// Points sent across all transport calls.
    pub points_dispatched: u64,
    /// Requests answered with heights.
    pub requests_delivered: u64,
    /// Requests answered with a failure.
    pub requests_failed: u64,
    /// In-flight results dropped because their consumer was destroyed.
    pub results_discarded: u64,
}

impl EngineStats {
    /// Average number of points per transport call, 0.0 before any dispatch.
    pub fn points_per_dispatch(&self) -> f64 {
        if self.dispatches == 0 {
            0.0
        } else {
            self.points_dispatched as f64 / self.dispatches as f64
        }
    }
}

type ResultSender = oneshot::Sender<Result<Vec<f64>>>;

enum Command {
    Submit {
        consumer: ConsumerId,
        points: Vec<Coordinate>,
        reply: ResultSender,
    },
    Destroyed(ConsumerId),
}

/// Cloneable entry point to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_consumer: Arc<AtomicU64>,
    counters: Arc<EngineCounters>,
}

impl EngineHandle {
    /// Start an engine on the current tokio runtime.
    ///
    /// The engine task ends once every handle has been dropped; requests
    /// still waiting at that point resolve to [`TerrainError::EngineClosed`].
    pub fn spawn<T: Transport>(transport: T, config: BatchConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(EngineCounters::default());

        tracing::debug!(window_ms = config.window.as_millis() as u64, "Starting terrain batch engine");

        let driver = Driver {
            scheduler: BatchScheduler::with_counters(config.window, Arc::clone(&counters)),
            transport: Arc::new(transport),
            sinks: HashMap::new(),
            timer: None,
            commands: command_rx,
            events,
            event_rx,
        };
        tokio::spawn(driver.run());

        Self {
            commands,
            next_consumer: Arc::new(AtomicU64::new(1)),
            counters,
        }
    }

    /// Ask for the heights at `points`.
    ///
    /// The returned request must be awaited with [`HeightRequest::heights`];
    /// dropping it withdraws the submission.
    pub fn submit(&self, points: impl Into<Vec<Coordinate>>) -> HeightRequest {
        let consumer = ConsumerId(self.next_consumer.fetch_add(1, Ordering::Relaxed));
        let (reply, result) = oneshot::channel();

        // A closed engine drops `reply`, which the request reports as EngineClosed.
        let _ = self.commands.send(Command::Submit {
            consumer,
            points: points.into(),
            reply,
        });

        HeightRequest {
            consumer,
            result: Some(result),
            commands: self.commands.downgrade(),
        }
    }

    /// Submit `points` and wait for their heights.
    pub async fn heights(&self, points: impl Into<Vec<Coordinate>>) -> Result<Vec<f64>> {
        self.submit(points).heights().await
    }

    /// Engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }
}

/// A caller's pending submission.
///
/// Dropping it before the result arrives is the destruction notice: the
/// engine will never deliver to it.
pub struct HeightRequest {
    consumer: ConsumerId,
    result: Option<oneshot::Receiver<Result<Vec<f64>>>>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl HeightRequest {
    /// Wait for the heights, one per submitted point.
    ///
    /// # Errors
    ///
    /// - [`TerrainError::QueryFailed`] if the dispatch carrying this request failed
    /// - [`TerrainError::EngineClosed`] if the engine stopped before answering
    pub async fn heights(mut self) -> Result<Vec<f64>> {
        let received = match self.result.as_mut() {
            Some(rx) => rx.await,
            None => return Err(TerrainError::EngineClosed),
        };
        self.result = None;
        received.unwrap_or(Err(TerrainError::EngineClosed))
    }

    /// Withdraw the request.
    pub fn cancel(self) {}
}

impl Drop for HeightRequest {
    fn drop(&mut self) {
        if self.result.is_none() {
            return;
        }
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Destroyed(self.consumer));
        }
    }
}

/// Carries out the scheduler's effects on the tokio runtime.
struct Driver<T> {
    scheduler: BatchScheduler,
    transport: Arc<T>,
    sinks: HashMap<ConsumerId, ResultSender>,
    timer: Option<JoinHandle<()>>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Event>,
    event_rx: mpsc::UnboundedReceiver<Event>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                Some(event) = self.event_rx.recv() => event,
                command = self.commands.recv() => match command {
                    Some(Command::Submit { consumer, points, reply }) => {
                        self.sinks.insert(consumer, reply);
                        Event::Submit { consumer, points }
                    }
                    Some(Command::Destroyed(consumer)) => {
                        self.sinks.remove(&consumer);
                        Event::ConsumerDestroyed(consumer)
                    }
                    None => break,
                },
            };

            for effect in self.scheduler.handle(event) {
                self.apply(effect);
            }
        }

        self.cancel_timer();
        tracing::debug!("Terrain batch engine stopped");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ArmTimer { epoch, delay } => {
                self.cancel_timer();
                let events = self.events.clone();
                self.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::TimerFired { epoch });
                }));
            }
            Effect::CancelTimer => self.cancel_timer(),
            Effect::Dispatch(points) => {
                let transport = Arc::clone(&self.transport);
                let events = self.events.clone();
                tokio::spawn(async move {
                    // Run the call in its own task so a panicking transport
                    // still produces a completion.
                    let call =
                        tokio::spawn(async move { transport.coordinate_heights(&points).await });
                    let result = call.await.unwrap_or_else(|e| {
                        Err(TerrainError::Transport {
                            reason: format!("transport task failed: {}", e),
                        })
                    });
                    let _ = events.send(Event::TransportCompleted(result));
                });
            }
            Effect::Deliver(Delivery { consumer, outcome }) => {
                let Some(sink) = self.sinks.remove(&consumer) else {
                    tracing::trace!(%consumer, "No sink for delivery");
                    return;
                };
                let result = match outcome {
                    Outcome::Heights(heights) => Ok(heights),
                    Outcome::Failed => Err(TerrainError::QueryFailed),
                };
                if sink.send(result).is_err() {
                    tracing::trace!(%consumer, "Consumer dropped before delivery");
                }
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
