use super::messages::{BusEnvelope, EnvelopeKind, MAX_FRAME_BYTES};
use crate::error::BusError;
use crate::vehicle::Vehicle;
use crate::{info, warn};
use prost::Message;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Cursor, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

type PendingQueries = Arc<Mutex<HashMap<u64, oneshot::Sender<String>>>>;
type SharedVehicle = Arc<Mutex<Option<Arc<Vehicle>>>>;

/// One mission process's connection to the [`super::BusRelay`].
///
/// The client owns the runner's name on the bus: incoming envelopes that
/// name a different target (or that it sent itself) are dropped before
/// dispatch. Forced transitions queue up for the state machine; field
/// requests are answered from the attached vehicle's snapshot.
pub struct BusClient {
    name: String,
    outgoing: mpsc::UnboundedSender<BusEnvelope>,
    forced_rx: Option<mpsc::UnboundedReceiver<String>>,
    pending: PendingQueries,
    vehicle: SharedVehicle,
    next_correlation: AtomicU64,
}

impl BusClient {
    pub async fn connect(addr: &str, name: impl Into<String>) -> Result<Self, BusError> {
        let name = name.into();
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (forced_tx, forced_rx) = mpsc::unbounded_channel();
        let pending: PendingQueries = Arc::new(Mutex::new(HashMap::new()));
        let vehicle: SharedVehicle = Arc::new(Mutex::new(None));
        info!("Bus client {name:?} connected to {addr}");
        tokio::spawn(write_frames(write_half, outgoing_rx));
        tokio::spawn(read_frames(
            read_half,
            name.clone(),
            outgoing_tx.clone(),
            forced_tx,
            Arc::clone(&pending),
            Arc::clone(&vehicle),
        ));
        Ok(Self {
            name,
            outgoing: outgoing_tx,
            forced_rx: Some(forced_rx),
            pending,
            vehicle,
            next_correlation: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the vehicle whose snapshot answers incoming field requests.
    pub fn attach_vehicle(&self, vehicle: Arc<Vehicle>) {
        *self.vehicle.lock().unwrap() = Some(vehicle);
    }

    /// Takes the forced-transition queue, for
    /// [`crate::runner::StateMachineBuilder::with_forced_transitions`].
    /// Yields `None` after the first call.
    pub fn forced_transitions(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.forced_rx.take()
    }

    /// Forces `target`'s state machine into `state` at its next state
    /// boundary. An empty target reaches every other runner.
    pub fn force_transition(&self, target: &str, state: &str) -> Result<(), BusError> {
        self.send(BusEnvelope::transition(&self.name, target, state))
    }

    /// Asks `target` for one field of its vehicle snapshot. Known fields:
    /// `position`, `velocity`, `heading`, `battery`, `armed`, `gps`;
    /// anything else answers JSON null.
    pub async fn query_field(&self, target: &str, field: &str) -> Result<Value, BusError> {
        let id = self.next_correlation.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        self.send(BusEnvelope::field_request(&self.name, target, field, id))?;
        let payload = match timeout(QUERY_TIMEOUT, rx).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => {
                self.pending.lock().unwrap().remove(&id);
                return Err(BusError::RelayClosed);
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                return Err(BusError::QueryTimeout { target: target.to_string() });
            }
        };
        Ok(serde_json::from_str(&payload)?)
    }

    fn send(&self, envelope: BusEnvelope) -> Result<(), BusError> {
        self.outgoing.send(envelope).map_err(|_| BusError::RelayClosed)
    }
}

#[allow(clippy::cast_possible_truncation)]
async fn write_frames(
    mut socket: OwnedWriteHalf,
    mut outgoing_rx: mpsc::UnboundedReceiver<BusEnvelope>,
) {
    while let Some(envelope) = outgoing_rx.recv().await {
        let buffer = envelope.encode_to_vec();
        if socket.write_u32(buffer.len() as u32).await.is_err()
            || socket.write_all(&buffer).await.is_err()
        {
            return;
        }
    }
}

async fn read_frames(
    mut socket: OwnedReadHalf,
    name: String,
    outgoing: mpsc::UnboundedSender<BusEnvelope>,
    forced_tx: mpsc::UnboundedSender<String>,
    pending: PendingQueries,
    vehicle: SharedVehicle,
) {
    loop {
        let envelope = match read_frame(&mut socket).await {
            Ok(envelope) => envelope,
            Err(BusError::Io(e))
                if e.kind() == ErrorKind::UnexpectedEof
                    || e.kind() == ErrorKind::ConnectionReset
                    || e.kind() == ErrorKind::ConnectionAborted =>
            {
                return;
            }
            Err(e) => {
                warn!("Bus client {name:?} lost the relay: {e}");
                return;
            }
        };
        dispatch(envelope, &name, &outgoing, &forced_tx, &pending, &vehicle);
    }
}

async fn read_frame(socket: &mut OwnedReadHalf) -> Result<BusEnvelope, BusError> {
    let length = socket.read_u32().await?;
    if length > MAX_FRAME_BYTES {
        return Err(BusError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {length} bytes exceeds limit"),
        )));
    }
    let mut buffer = vec![0u8; length as usize];
    socket.read_exact(&mut buffer).await?;
    Ok(BusEnvelope::decode(&mut Cursor::new(&buffer))?)
}

fn dispatch(
    envelope: BusEnvelope,
    name: &str,
    outgoing: &mpsc::UnboundedSender<BusEnvelope>,
    forced_tx: &mpsc::UnboundedSender<String>,
    pending: &PendingQueries,
    vehicle: &SharedVehicle,
) {
    if envelope.sender == name {
        return;
    }
    if !envelope.target.is_empty() && envelope.target != name {
        return;
    }
    match envelope.envelope_kind() {
        Some(EnvelopeKind::Transition) => {
            info!("Transition to {:?} forced by {:?}", envelope.payload, envelope.sender);
            let _ = forced_tx.send(envelope.payload);
        }
        Some(EnvelopeKind::FieldRequest) => {
            let Some(attached) = vehicle.lock().unwrap().clone() else {
                warn!("Field request from {:?} but no vehicle attached", envelope.sender);
                return;
            };
            let responder = outgoing.clone();
            let responder_name = name.to_string();
            tokio::spawn(async move {
                let value = read_field(&attached, &envelope.payload).await;
                let _ = responder.send(BusEnvelope::field_callback(
                    &responder_name,
                    &envelope.sender,
                    value.to_string(),
                    envelope.correlation_id,
                ));
            });
        }
        Some(EnvelopeKind::FieldCallback) => {
            if let Some(tx) = pending.lock().unwrap().remove(&envelope.correlation_id) {
                let _ = tx.send(envelope.payload);
            }
        }
        None => warn!("Unknown bus envelope kind {}", envelope.kind),
    }
}

async fn read_field(vehicle: &Vehicle, field: &str) -> Value {
    let state = vehicle.state().await;
    match field {
        "position" => {
            let position = state.position();
            json!({ "lat": position.lat(), "lon": position.lon(), "alt": position.alt() })
        }
        "velocity" => {
            let velocity = state.velocity();
            json!({
                "north": velocity.north(),
                "east": velocity.east(),
                "down": velocity.down(),
            })
        }
        "heading" => json!(state.heading()),
        "battery" => json!(state.battery().percent),
        "armed" => json!(state.armed()),
        "gps" => {
            let gps = state.gps();
            json!({ "fix_type": gps.fix_type, "satellites": gps.satellites_visible })
        }
        _ => Value::Null,
    }
}
