//! One client session: frames in, events out

use futures::stream::{BoxStream, Stream, StreamExt};
use peerport::{Adapter, AdapterConfig, Event, Inbound, PeerNetwork};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Transport-neutral view of an inbound socket message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    /// Binary frame of the given length
    Binary(usize),
    Close,
}

/// Commands carried by `frames`, up to the first `Close`.
///
/// Binary frames are answered with `UnknownCommand` on `events` and skipped.
pub fn inbound_frames<S>(frames: S, events: mpsc::UnboundedSender<Event>) -> BoxStream<'static, Inbound>
where
    S: Stream<Item = Frame> + Send + 'static,
{
    frames
        .take_while(|frame| futures::future::ready(*frame != Frame::Close))
        .filter_map(move |frame| {
            let inbound = match frame {
                Frame::Text(text) => Some(Inbound::Text(text)),
                Frame::Binary(len) => {
                    warn!("Rejecting binary frame ({} bytes)", len);
                    let _ = events.send(Event::UnknownCommand {
                        reason: format!("binary frames are not supported ({} bytes)", len),
                    });
                    None
                }
                Frame::Close => None,
            };
            futures::future::ready(inbound)
        })
        .boxed()
}

/// Drive one adapter over `frames` until the client goes away
pub async fn run_session<S>(
    network: Arc<dyn PeerNetwork>,
    config: AdapterConfig,
    frames: S,
    events: mpsc::UnboundedSender<Event>,
) where
    S: Stream<Item = Frame> + Send + 'static,
{
    let adapter = Adapter::new(network, Arc::new(events.clone())).with_config(config);
    adapter.run(inbound_frames(frames, events)).await;
    debug!("Session finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_binary_frames_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frames = stream::iter(vec![
            Frame::Text("{}".into()),
            Frame::Binary(4),
            Frame::Text("[]".into()),
        ]);

        let inbound: Vec<Inbound> = inbound_frames(frames, tx).collect().await;
        assert_eq!(
            inbound,
            vec![Inbound::Text("{}".into()), Inbound::Text("[]".into())]
        );
        assert!(matches!(rx.try_recv(), Ok(Event::UnknownCommand { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let frames = stream::iter(vec![
            Frame::Text("a".into()),
            Frame::Close,
            Frame::Text("b".into()),
        ]);

        let inbound: Vec<Inbound> = inbound_frames(frames, tx).collect().await;
        assert_eq!(inbound, vec![Inbound::Text("a".into())]);
    }
}
