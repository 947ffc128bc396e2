//! Concurrent per-frame monitoring pipeline.
//!
//! [`PatientMonitor`] fans each observation out to every agent on the
//! blocking pool, joins the results in fixed agent order, fuses the batch
//! through the orchestrator, and dispatches the resulting alerts to the
//! registered sinks. A timer drives agent ticks and track retirement
//! independently of frame arrival, so absence-defined conditions still
//! fire when the stream goes quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agents::{standard_agents, MonitorAgent};
use crate::delivery::AlertSink;
use crate::domain::{Alert, Event, Observation};
use crate::orchestrator::Orchestrator;
use crate::{MonitorConfig, MonitorError, Result};

/// Everything one frame produced: the raw event batch and the fused alerts.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Frame the output derives from
    pub frame_id: u64,
    /// Events emitted by the agents this frame, in agent order
    pub events: Vec<Event>,
    /// Fused alerts, highest level first
    pub alerts: Vec<Alert>,
}

/// Stream-time clock: the last observation timestamp plus wall time elapsed
/// since it was seen. Lets timer-driven ticks carry timestamps on the same
/// axis as the frames.
struct StreamClock {
    last_ts: f64,
    updated: Instant,
}

impl StreamClock {
    fn new() -> Self {
        Self {
            last_ts: 0.0,
            updated: Instant::now(),
        }
    }

    fn observe(&mut self, timestamp: f64) {
        if timestamp >= self.last_ts {
            self.last_ts = timestamp;
            self.updated = Instant::now();
        }
    }

    fn now(&self) -> f64 {
        self.last_ts + self.updated.elapsed().as_secs_f64()
    }
}

/// Handle for stopping a running monitor from another task.
#[derive(Clone)]
pub struct MonitorHandle {
    running: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// Request the run loop to stop after its current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the run loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Top-level coordinator: agents, orchestrator, and alert sinks.
pub struct PatientMonitor {
    agents: Vec<Arc<Mutex<Box<dyn MonitorAgent>>>>,
    orchestrator: Orchestrator,
    sinks: Vec<Arc<dyn AlertSink>>,
    running: Arc<AtomicBool>,
    clock: StreamClock,
    retirement_tick_secs: f64,
}

impl PatientMonitor {
    /// Build a monitor with the standard agent set. Fails on the first
    /// invalid configuration section.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let agents = standard_agents(&config)?
            .into_iter()
            .map(|agent| Arc::new(Mutex::new(agent)))
            .collect();
        let orchestrator = Orchestrator::new(config.orchestrator.clone())?;

        Ok(Self {
            agents,
            orchestrator,
            sinks: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            clock: StreamClock::new(),
            retirement_tick_secs: config.retirement_tick_secs,
        })
    }

    /// Register an alert sink.
    pub fn add_sink(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    /// Handle for stopping [`run`](Self::run) from another task.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Process one observation: fan out to all agents concurrently, join in
    /// agent order, fuse, and dispatch the alerts.
    pub async fn process_frame(&mut self, obs: &Observation) -> Result<FrameOutput> {
        self.clock.observe(obs.timestamp);

        let mut tasks = JoinSet::new();
        for (index, agent) in self.agents.iter().enumerate() {
            let agent = Arc::clone(agent);
            let obs = obs.clone();
            tasks.spawn_blocking(move || (index, agent.lock().process(&obs)));
        }

        let mut per_agent: Vec<Option<Vec<Event>>> = vec![None; self.agents.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, events) = joined
                .map_err(|e| MonitorError::Pipeline(format!("agent task failed: {e}")))?;
            per_agent[index] = Some(events);
        }

        // Deterministic within-frame order: fixed agent order, then each
        // agent's own emission order.
        let events: Vec<Event> = per_agent.into_iter().flatten().flatten().collect();

        let alerts = self.orchestrator.process_batch(obs.timestamp, events.clone());
        self.dispatch(&alerts).await;

        Ok(FrameOutput {
            frame_id: obs.frame_id,
            events,
            alerts,
        })
    }

    /// One timer-driven pass: agent ticks, then track retirement. Tick
    /// events go through the same fusion path as frame events.
    pub async fn run_tick(&mut self) -> Vec<Alert> {
        let now = self.clock.now();

        let mut events = Vec::new();
        for agent in &self.agents {
            let mut agent = agent.lock();
            events.extend(agent.tick(now));
            agent.retire_stale(now);
        }

        if events.is_empty() {
            return Vec::new();
        }
        debug!(count = events.len(), "tick events");
        let alerts = self.orchestrator.process_batch(now, events);
        self.dispatch(&alerts).await;
        alerts
    }

    /// Consume observations until the channel closes or
    /// [`MonitorHandle::stop`] is called, interleaving retirement ticks.
    pub async fn run(&mut self, mut frames: mpsc::Receiver<Observation>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(agents = self.agents.len(), "monitor loop started");

        let mut ticker = tokio::time::interval(Duration::from_secs_f64(self.retirement_tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut result = Ok(());
        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                maybe = frames.recv() => match maybe {
                    Some(obs) => {
                        if let Err(error) = self.process_frame(&obs).await {
                            result = Err(error);
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
            }
        }

        // The flag must clear on every exit path, errors included.
        self.running.store(false, Ordering::SeqCst);
        info!("monitor loop stopped");
        result
    }

    /// Drop all agent and orchestrator state.
    pub fn reset(&mut self) {
        for agent in &self.agents {
            agent.lock().reset();
        }
        self.orchestrator.reset();
    }

    async fn dispatch(&self, alerts: &[Alert]) {
        for alert in alerts {
            for sink in &self.sinks {
                if let Err(error) = sink.handle(alert).await {
                    warn!(
                        sink = sink.name(),
                        alert_id = %alert.alert_id,
                        %error,
                        "alert delivery failed"
                    );
                }
            }
        }
    }
}
