//! Simulation orchestration: one task per client plus the shutdown cascade.

use crate::classifier::Classifier;
use crate::client::ClientState;
use crate::config::SimulatorConfig;
use crate::error::{Result, SimulatorError};
use crate::fleet::FleetControl;
use crate::message::{Message, MessageType};
use crate::report::{ClientOutcome, ClientReport, SimulationReport};
use crate::stats::{collect_latencies, compute_latency_stats, empty_histogram, SendStats};
use crate::transport::{Connection, Transport};
use crate::ClientId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs every configured client until all of them stop or `cancel` fires.
pub async fn run_simulation<T>(
    config: SimulatorConfig,
    transport: Arc<T>,
    cancel: CancellationToken,
) -> Result<SimulationReport>
where
    T: Transport + 'static,
{
    config.validate()?;
    let designated = config
        .designated()
        .ok_or_else(|| SimulatorError::InvalidConfig("no clients configured".to_string()))?;

    let classifier = Arc::new(Classifier::new(config.bands.clone())?);
    let fleet = Arc::new(FleetControl::new(&config.clients, designated));
    let stats = Arc::new(SendStats::new());
    let config = Arc::new(config);

    info!(
        "Starting simulation: {} clients against {}, designated client {}",
        config.clients.len(),
        config.addr(),
        designated
    );

    let (latency_tx, latency_rx) = mpsc::unbounded_channel();
    let latency_handle = tokio::spawn(collect_latencies(latency_rx));

    let start = Instant::now();
    let mut tasks = JoinSet::new();
    for &client in &config.clients {
        let ctx = ClientContext {
            config: Arc::clone(&config),
            classifier: Arc::clone(&classifier),
            fleet: Arc::clone(&fleet),
            transport: Arc::clone(&transport),
            stats: Arc::clone(&stats),
            latency_tx: latency_tx.clone(),
            cancel: cancel.clone(),
        };
        tasks.spawn(run_client(client, ctx));
    }
    drop(latency_tx);

    let mut clients = Vec::with_capacity(config.clients.len());
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(report) => clients.push(report),
            Err(e) => error!("Client task failed: {}", e),
        }
    }
    clients.sort_by_key(|c| c.client);

    let duration = start.elapsed();
    let histogram = latency_handle
        .await
        .unwrap_or_else(|_| empty_histogram());

    let messages_by_type = MessageType::all()
        .iter()
        .map(|kind| (kind.as_str().to_string(), stats.sent_of(*kind)))
        .collect::<BTreeMap<_, _>>();

    info!("Simulation finished after {:.1}s", duration.as_secs_f64());

    Ok(SimulationReport {
        target: config.addr(),
        designated_client: designated,
        duration,
        clients,
        messages_sent: stats.messages_sent.load(Ordering::Relaxed),
        bytes_sent: stats.bytes_sent.load(Ordering::Relaxed),
        send_errors: stats.send_errors.load(Ordering::Relaxed),
        suppressed_sends: stats.suppressed.load(Ordering::Relaxed),
        messages_by_type,
        send_latency: compute_latency_stats(&histogram),
    })
}

/// Everything a client task shares with the rest of the simulation.
pub(crate) struct ClientContext<T> {
    pub config: Arc<SimulatorConfig>,
    pub classifier: Arc<Classifier>,
    pub fleet: Arc<FleetControl>,
    pub transport: Arc<T>,
    pub stats: Arc<SendStats>,
    pub latency_tx: mpsc::UnboundedSender<Duration>,
    pub cancel: CancellationToken,
}

/// Per-client random source; a fixed seed gives every client its own
/// reproducible stream.
pub fn client_rng(seed: Option<u64>, client: ClientId) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(client))),
        None => StdRng::from_entropy(),
    }
}

/// Result of handing one message to the connection.
enum Delivery {
    Sent,
    Suppressed,
    Failed,
    Cancelled,
}

/// Runs one client from connect to its terminal state.
pub(crate) async fn run_client<T: Transport>(client: ClientId, ctx: ClientContext<T>) -> ClientReport {
    let mut task = ClientTask {
        state: ClientState::new(client, ctx.config.stability_window),
        rng: client_rng(ctx.config.seed, client),
        report: ClientReport {
            client,
            outcome: ClientOutcome::Disconnected,
            ticks: 0,
            messages_sent: 0,
            last_logged_band: None,
            triggered_cascade: false,
        },
        ctx,
    };

    let connected = tokio::select! {
        _ = task.ctx.cancel.cancelled() => None,
        res = task.ctx.transport.connect(client) => Some(res),
    };

    let mut conn = match connected {
        None => return task.finish(ClientOutcome::Cancelled),
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            warn!(client, "Connection failed: {}", e);
            return task.finish(ClientOutcome::ConnectFailed);
        }
    };
    info!(client, "Connected");

    let outcome = task.drive(&mut conn).await;
    conn.close().await;
    info!(client, "Connection closed ({})", outcome);

    task.finish(outcome)
}

struct ClientTask<T> {
    state: ClientState,
    rng: StdRng,
    report: ClientReport,
    ctx: ClientContext<T>,
}

impl<T: Transport> ClientTask<T> {
    fn id(&self) -> ClientId {
        self.state.id()
    }

    async fn drive(&mut self, conn: &mut T::Connection) -> ClientOutcome {
        let client = self.id();
        let mut started_at: Option<Instant> = None;

        loop {
            if self.ctx.cancel.is_cancelled() {
                return ClientOutcome::Cancelled;
            }
            if !self.ctx.fleet.is_active(client) {
                debug!(client, "Deactivated");
                self.state.disconnect();
                return ClientOutcome::Disconnected;
            }
            if self.ctx.fleet.is_blocked(client) {
                return self.hold_until_inactive().await;
            }

            if let Some(started) = self.state.start() {
                match self.send(conn, &started).await {
                    Delivery::Sent => {}
                    Delivery::Suppressed => return self.hold_until_inactive().await,
                    Delivery::Failed => return ClientOutcome::SendFailed,
                    Delivery::Cancelled => return ClientOutcome::Cancelled,
                }
                info!(client, "Module started");
                started_at = Some(Instant::now());
                if !self.pause(self.ctx.config.timing.settle_delay()).await {
                    return ClientOutcome::Cancelled;
                }
                continue;
            }

            let warming_up = started_at
                .map_or(false, |at| at.elapsed() < self.ctx.config.timing.critical_warmup());
            let sample = if warming_up {
                self.ctx.classifier.classify_without_critical(&mut self.rng)
            } else {
                self.ctx.classifier.classify(&mut self.rng)
            };
            self.report.ticks += 1;
            let tick = self.state.observe(&sample);

            for msg in &tick.messages {
                match self.send(conn, msg).await {
                    Delivery::Sent => {}
                    Delivery::Suppressed => return self.hold_until_inactive().await,
                    Delivery::Failed => return ClientOutcome::SendFailed,
                    Delivery::Cancelled => return ClientOutcome::Cancelled,
                }
            }

            if tick.critical {
                self.handle_critical().await;
                return ClientOutcome::CriticalExit;
            }

            let interval = self.next_interval();
            if !self.pause(interval).await {
                return ClientOutcome::Cancelled;
            }
        }
    }

    /// Sends one message unless the client is blocked, before or during the
    /// send. A failed or timed out send deactivates the client; there is no
    /// retry.
    async fn send(&mut self, conn: &mut T::Connection, msg: &Message) -> Delivery {
        let client = self.id();

        if self.ctx.fleet.is_blocked(client) {
            self.ctx.stats.record_suppressed();
            debug!(client, "Suppressed {} message", msg.kind);
            return Delivery::Suppressed;
        }

        let bytes = match msg.to_wire() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(client, "Failed to encode message: {}", e);
                self.fail(client);
                return Delivery::Failed;
            }
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => return Delivery::Cancelled,
            _ = self.ctx.fleet.wait_until_blocked(client) => {
                self.ctx.stats.record_suppressed();
                debug!(client, "Suppressed {} message in flight", msg.kind);
                return Delivery::Suppressed;
            }
            res = conn.send(&bytes) => res,
        };

        match result {
            Ok(()) => {
                let _ = self.ctx.latency_tx.send(start.elapsed());
                self.ctx.stats.record_sent(msg.kind, bytes.len() as u64);
                self.report.messages_sent += 1;
                debug!(client, kind = %msg.kind, "{}", msg.message);
                Delivery::Sent
            }
            Err(e) => {
                warn!(client, "Error sending {} message: {}", msg.kind, e);
                self.fail(client);
                Delivery::Failed
            }
        }
    }

    /// A blocked client sends nothing more but keeps its connection until the
    /// fleet deactivates it.
    async fn hold_until_inactive(&mut self) -> ClientOutcome {
        let client = self.id();
        debug!(client, "Blocked, waiting for deactivation");

        tokio::select! {
            _ = self.ctx.cancel.cancelled() => return ClientOutcome::Cancelled,
            _ = self.ctx.fleet.wait_until_inactive(client) => {}
        }

        self.state.disconnect();
        ClientOutcome::Disconnected
    }

    fn fail(&mut self, client: ClientId) {
        self.ctx.stats.record_error();
        self.ctx.fleet.deactivate(client);
        self.state.disconnect();
    }

    async fn handle_critical(&mut self) {
        let client = self.id();

        if self.ctx.fleet.is_designated(client) {
            self.report.triggered_cascade = true;
            self.ctx
                .fleet
                .cascade(self.ctx.config.timing.grace_period(), &self.ctx.cancel)
                .await;
        } else {
            warn!(client, "Client went CRITICAL, stopping it");
            self.ctx.fleet.deactivate(client);
        }
    }

    fn next_interval(&mut self) -> Duration {
        let timing = &self.ctx.config.timing;
        let min = timing.min_interval().as_secs_f64();
        let max = timing.max_interval().as_secs_f64();
        Duration::from_secs_f64(self.rng.gen_range(min..=max))
    }

    /// Sleeps unless cancelled first; returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn finish(mut self, outcome: ClientOutcome) -> ClientReport {
        if outcome != ClientOutcome::CriticalExit {
            self.state.disconnect();
        }
        // A disconnected client was deactivated by the fleet.
        if outcome != ClientOutcome::Disconnected {
            self.ctx.fleet.deactivate(self.id());
        }
        self.report.outcome = outcome;
        self.report.last_logged_band = self.state.last_logged_band();
        self.report
    }
}
