// Chunked JSON-lines streaming of render updates
use crate::application::render::RenderUpdate;
use crate::domain::dashboard::Dashboard;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;

/// One line of the stream: the full view first, then incremental updates
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot(Box<Dashboard>),
    Update(RenderUpdate),
    /// The viewer fell behind and `skipped` updates were dropped
    Lagged { skipped: u64 },
}

pub fn chunked_json_stream<S>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = StreamMessage> + Send + 'static,
{
    let byte_stream = stream.map(|msg| serialize_line(&msg));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize one message as a newline-terminated JSON chunk
pub fn serialize_line(msg: &StreamMessage) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(msg)?;
    let mut chunk = BytesMut::with_capacity(json.len() + 1);
    chunk.put_slice(&json);
    chunk.put_u8(b'\n');
    Ok(chunk.freeze())
}

/// Snapshot followed by every update broadcast after `rx` was created
pub fn update_stream(
    snapshot: Dashboard,
    mut rx: broadcast::Receiver<RenderUpdate>,
) -> impl Stream<Item = StreamMessage> + Send + 'static {
    async_stream::stream! {
        yield StreamMessage::Snapshot(Box::new(snapshot));
        loop {
            match rx.recv().await {
                Ok(update) => yield StreamMessage::Update(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Update stream lagged, {} updates skipped", skipped);
                    yield StreamMessage::Lagged { skipped };
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

pub fn stream_from_receiver(
    snapshot: Dashboard,
    rx: broadcast::Receiver<RenderUpdate>,
) -> impl IntoResponse {
    match chunked_json_stream(update_stream(snapshot, rx)) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::Session;
    use crate::domain::channel::TopicRegistry;

    #[tokio::test]
    async fn test_stream_starts_with_snapshot() {
        let (tx, rx) = broadcast::channel(8);
        let snapshot = Session::new(TopicRegistry::standard()).snapshot();
        let stream = update_stream(snapshot, rx);
        tokio::pin!(stream);

        tx.send(RenderUpdate::LogCleared).unwrap();
        drop(tx);

        assert!(matches!(stream.next().await, Some(StreamMessage::Snapshot(_))));
        assert!(matches!(
            stream.next().await,
            Some(StreamMessage::Update(RenderUpdate::LogCleared))
        ));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_lines_are_newline_terminated_json() {
        let line = serialize_line(&StreamMessage::Update(RenderUpdate::ChartsCleared)).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&line[..line.len() - 1]).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["data"]["type"], "charts_cleared");
    }

    #[tokio::test]
    async fn test_lagging_viewer_is_told() {
        let (tx, rx) = broadcast::channel(1);
        let snapshot = Session::new(TopicRegistry::standard()).snapshot();
        let stream = update_stream(snapshot, rx);
        tokio::pin!(stream);

        tx.send(RenderUpdate::LogCleared).unwrap();
        tx.send(RenderUpdate::ChartsCleared).unwrap();

        stream.next().await;
        assert!(matches!(
            stream.next().await,
            Some(StreamMessage::Lagged { skipped: 1 })
        ));
    }
}
