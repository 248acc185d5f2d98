//! Event broadcasting
//!
//! Worker loops publish typed events; connected network clients receive
//! them as JSON. All registry mutation happens on a single pump task that
//! drains a command channel, so worker threads never touch client state
//! directly. Delivery is best-effort, at-most-once per client per publish;
//! a client whose send fails is dropped from the registry after the pass.
//!
//! Ordering: the command channel preserves per-sender FIFO, so each loop's
//! publishes reach every client in the order they were issued. No ordering
//! is promised across loops.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{BiometricSample, CognitiveState, InterventionRecord};

/// Wire message pushed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StateChange {
        from: String,
        to: String,
        reason: String,
    },
    BiometricUpdate(BiometricUpdate),
    Intervention(InterventionEvent),
}

/// Rounded biometric snapshot in the wire shape the overlay expects
#[derive(Debug, Clone, Serialize)]
pub struct BiometricUpdate {
    #[serde(rename = "heartRate")]
    pub heart_rate: i64,
    pub recovery: i64,
    /// one decimal place
    pub strain: f64,
    /// two decimal places
    #[serde(rename = "sleepPerformance")]
    pub sleep_performance: f64,
    /// present only on the late-joiner snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl BiometricUpdate {
    pub fn from_sample(sample: &BiometricSample) -> Self {
        Self {
            heart_rate: sample.heart_rate.round() as i64,
            recovery: sample.recovery.round() as i64,
            strain: round_to(sample.strain, 1),
            sleep_performance: round_to(sample.sleep_performance, 2),
            state: None,
        }
    }

    pub fn with_state(mut self, state: CognitiveState) -> Self {
        self.state = Some(state.as_str().to_string());
        self
    }
}

/// Intervention as pushed to clients
#[derive(Debug, Clone, Serialize)]
pub struct InterventionEvent {
    pub message: String,
    pub tone: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biometric: Option<BiometricUpdate>,
}

impl InterventionEvent {
    pub fn from_record(record: &InterventionRecord) -> Self {
        Self {
            message: record.message.clone(),
            tone: record.tone.clone(),
            state: record.state.as_str().to_string(),
            biometric: record
                .biometric
                .as_ref()
                .map(BiometricUpdate::from_sample),
        }
    }
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// One connected client: its registry key and the channel the network
/// event loop drains into the socket.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: Uuid,
    pub sender: UnboundedSender<String>,
}

/// Commands accepted by the pump task
#[derive(Debug)]
pub enum BusCommand {
    Publish(Event),
    Register(ClientHandle),
    Unregister(Uuid),
}

/// Cheap clonable handle for producers; safe to use from blocking worker
/// threads.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: UnboundedSender<BusCommand>,
}

impl EventBus {
    /// Create the bus plus the receiver half the pump task drains
    pub fn channel() -> (Self, UnboundedReceiver<BusCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: Event) -> Result<(), EngineError> {
        self.tx
            .send(BusCommand::Publish(event))
            .map_err(|_| EngineError::BusClosed)
    }

    pub fn register(&self, client: ClientHandle) -> Result<(), EngineError> {
        self.tx
            .send(BusCommand::Register(client))
            .map_err(|_| EngineError::BusClosed)
    }

    pub fn unregister(&self, id: Uuid) -> Result<(), EngineError> {
        self.tx
            .send(BusCommand::Unregister(id))
            .map_err(|_| EngineError::BusClosed)
    }
}

/// Client registry; owned exclusively by the pump task
#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: Vec<ClientHandle>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn handle(&mut self, command: BusCommand) {
        match command {
            BusCommand::Publish(event) => self.publish(&event),
            BusCommand::Register(client) => {
                self.clients.push(client);
                info!("client connected ({} total)", self.clients.len());
            }
            BusCommand::Unregister(id) => {
                self.clients.retain(|client| client.id != id);
                info!("client disconnected ({} total)", self.clients.len());
            }
        }
    }

    /// Deliver to every client independently; drop unreachable clients
    /// after the pass completes.
    pub fn publish(&mut self, event: &Event) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode event: {e}");
                return;
            }
        };

        let mut dead = Vec::new();
        for client in &self.clients {
            if client.sender.send(payload.clone()).is_err() {
                dead.push(client.id);
            }
        }
        if !dead.is_empty() {
            self.clients.retain(|client| !dead.contains(&client.id));
            debug!(
                "dropped {} unreachable clients ({} remain)",
                dead.len(),
                self.clients.len()
            );
        }
    }
}

/// Spawn the pump: the sole actor that touches the client registry.
pub fn spawn_pump(mut rx: UnboundedReceiver<BusCommand>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut broadcaster = Broadcaster::new();
        while let Some(command) = rx.recv().await {
            broadcaster.handle(command);
        }
    })
}
