//! Event collection helpers

use genbatch::Event;
use tokio::sync::broadcast::Receiver;

/// Drain every event already sent on `events`
pub fn drain(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Count events matching `predicate`
pub fn count(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}
