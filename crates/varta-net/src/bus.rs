//! In-process publish/subscribe dispatch.
//!
//! An [`EventBus`] is an explicitly constructed handle passed to every
//! component that publishes or consumes events. Cloning the handle shares
//! the same subscriber table.
//!
//! Three kinds of subscription exist:
//!
//! - inline handlers run synchronously inside `publish`, in registration
//!   order. A panic is caught and logged so it never reaches the publisher
//!   or sibling handlers.
//! - async handlers each get their own unbounded FIFO queue drained by a
//!   dedicated task, so the publisher never waits on them.
//! - channel subscriptions hand the raw event stream to the caller.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use varta_shared::identity::Identity;
use varta_shared::protocol::RelayMessage;
use varta_shared::types::{Link, Pulse};

/// Stable names of every event published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connected,
    Offline,
    RawSignal,
    NodeFound,
    InviteReceived,
    PulseArchived,
    RemoteBoardPulse,
    RemoteMousePulse,
    RemotePopPulse,
    AiSuggestions,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Connected => "CONNECTED",
            EventName::Offline => "OFFLINE",
            EventName::RawSignal => "RAW_SIGNAL",
            EventName::NodeFound => "NODE_FOUND",
            EventName::InviteReceived => "INVITE_RCVD",
            EventName::PulseArchived => "PULSE_ARCHIVED",
            EventName::RemoteBoardPulse => "REMOTE_BOARD_PULSE",
            EventName::RemoteMousePulse => "REMOTE_MOUSE_PULSE",
            EventName::RemotePopPulse => "REMOTE_POP_PULSE",
            EventName::AiSuggestions => "AI_SUGGESTIONS",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `REMOTE_POP_PULSE` came from.
#[derive(Debug, Clone, PartialEq)]
pub enum PopSource {
    /// A `POP_PULSE` collaboration event (inline reaction).
    Reaction,
    /// Toast notification for a newly archived chat pulse.
    Chat(Pulse),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Connected { session_id: String },
    Offline,
    RawSignal(RelayMessage),
    NodeFound(Identity),
    InviteReceived(Link),
    PulseArchived(Pulse),
    RemoteBoardPulse { room_id: String, payload: Value },
    RemoteMousePulse { room_id: String, payload: Value },
    RemotePopPulse {
        room_id: String,
        payload: Value,
        source: PopSource,
    },
    AiSuggestions(Vec<String>),
}

impl BusEvent {
    pub fn name(&self) -> EventName {
        match self {
            BusEvent::Connected { .. } => EventName::Connected,
            BusEvent::Offline => EventName::Offline,
            BusEvent::RawSignal(_) => EventName::RawSignal,
            BusEvent::NodeFound(_) => EventName::NodeFound,
            BusEvent::InviteReceived(_) => EventName::InviteReceived,
            BusEvent::PulseArchived(_) => EventName::PulseArchived,
            BusEvent::RemoteBoardPulse { .. } => EventName::RemoteBoardPulse,
            BusEvent::RemoteMousePulse { .. } => EventName::RemoteMousePulse,
            BusEvent::RemotePopPulse { .. } => EventName::RemotePopPulse,
            BusEvent::AiSuggestions(_) => EventName::AiSuggestions,
        }
    }
}

type InlineHandler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Inline(InlineHandler),
    Queue(mpsc::UnboundedSender<BusEvent>),
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventName, Vec<Subscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler, invoked inline on every publish of
    /// `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F)
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(name, Subscriber::Inline(Arc::new(handler)));
    }

    /// Register an asynchronous handler with its own work queue.
    ///
    /// Must be called from within a tokio runtime. Invocations of the same
    /// handler are sequential and in publish order.
    pub fn subscribe_async<F, Fut>(&self, name: EventName, handler: F)
    where
        F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe_channel(name);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if AssertUnwindSafe(handler(event)).catch_unwind().await.is_err() {
                    error!(event = %name, "async bus handler panicked");
                }
            }
        });
    }

    /// Receive every future event named `name` on an unbounded channel.
    pub fn subscribe_channel(&self, name: EventName) -> mpsc::UnboundedReceiver<BusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(name, Subscriber::Queue(tx));
        rx
    }

    /// Deliver `event` to every subscriber of its name.
    pub fn publish(&self, event: BusEvent) {
        let name = event.name();
        // Snapshot so handlers may publish or subscribe re-entrantly.
        let subscribers = {
            let table = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match table.get(&name) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for subscriber in subscribers {
            match subscriber {
                Subscriber::Inline(handler) => {
                    if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                        error!(event = %name, "bus handler panicked");
                    }
                }
                Subscriber::Queue(tx) => {
                    if tx.send(event.clone()).is_err() {
                        debug!(event = %name, "bus subscriber queue closed");
                    }
                }
            }
        }
    }

    /// Number of subscribers registered for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .map_or(0, Vec::len)
    }

    fn register(&self, name: EventName, subscriber: Subscriber) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(subscriber);
    }
}
