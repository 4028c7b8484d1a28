//! Reply-suggestion port.
//!
//! When a chat pulse from another identity is archived, the archive may ask
//! a [`ReplySuggester`] for short canned replies. Whatever comes back is
//! capped and published as `AI_SUGGESTIONS`. No backend is bundled; the
//! node runs without suggestions unless one is plugged in.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use varta_net::{BusEvent, EventBus};
use varta_shared::constants::MAX_SUGGESTIONS;

pub trait ReplySuggester: Send + Sync {
    /// Propose replies to `text`. An empty list means "nothing to offer".
    fn suggest(&self, text: &str) -> BoxFuture<'static, Vec<String>>;
}

/// Ask `suggester` about `text` in the background and publish the result.
///
/// Silently skipped when called outside a tokio runtime.
pub(crate) fn spawn_suggestions(suggester: Arc<dyn ReplySuggester>, bus: EventBus, text: String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("No runtime available, skipping reply suggestions");
        return;
    };

    let pending = suggester.suggest(&text);
    handle.spawn(async move {
        let mut replies = pending.await;
        replies.retain(|r| !r.trim().is_empty());
        replies.truncate(MAX_SUGGESTIONS);
        if replies.is_empty() {
            return;
        }
        debug!(count = replies.len(), "Publishing reply suggestions");
        bus.publish(BusEvent::AiSuggestions(replies));
    });
}
