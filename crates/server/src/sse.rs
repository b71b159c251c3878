use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use shared::protocol::StreamEvent;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::warn;

/// Relays generation events as `data:` lines. Dropping the response drops
/// the receiver, which stops the generation task.
pub(crate) fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).filter_map(|event| match serde_json::to_string(&event) {
        Ok(data) => Some(Ok(Event::default().data(data))),
        Err(error) => {
            warn!(kind = event.kind(), %error, "dropping unserializable stream event");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
