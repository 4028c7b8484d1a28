//! Human-readable rendering of bus events for the terminal front end.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use varta_net::{BusEvent, EventBus, EventName, PopSource};

/// Events shown to the user.
pub const DISPLAYED_EVENTS: [EventName; 7] = [
    EventName::Connected,
    EventName::Offline,
    EventName::NodeFound,
    EventName::InviteReceived,
    EventName::PulseArchived,
    EventName::RemotePopPulse,
    EventName::AiSuggestions,
];

/// One line describing `event`, or `None` if it is not worth showing.
pub fn describe(event: &BusEvent) -> Option<String> {
    let line = match event {
        BusEvent::Connected { session_id } => format!("* relay connected (session {session_id})"),
        BusEvent::Offline => "* relay offline, reconnecting".to_string(),
        BusEvent::NodeFound(identity) => {
            format!("* node found: {} ({})", identity.display_name, identity.id)
        }
        BusEvent::InviteReceived(link) => {
            format!("* invite: {} [{}] ({:?})", link.name, link.link_id, link.kind)
        }
        BusEvent::PulseArchived(pulse) => {
            format!("[{}] {}: {}", pulse.link_id, pulse.origin_name, pulse.body)
        }
        BusEvent::RemotePopPulse {
            room_id,
            source: PopSource::Reaction,
            payload,
        } => format!("[{room_id}] reaction {payload}"),
        BusEvent::RemotePopPulse {
            source: PopSource::Chat(_),
            ..
        } => return None,
        BusEvent::AiSuggestions(replies) => format!("* suggested replies: {}", replies.join(" | ")),
        _ => return None,
    };
    Some(line)
}

/// Print every displayed event on stdout, in publish order.
pub fn spawn_event_printer(bus: &EventBus) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<BusEvent>();
    for name in DISPLAYED_EVENTS {
        let tx = tx.clone();
        bus.subscribe(name, move |event| {
            let _ = tx.send(event.clone());
        });
    }

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = describe(&event) {
                println!("{line}");
            }
        }
    })
}
