use axum::{
    body::Body,
    http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 100;

/// Server-sent events body fed by a channel. The handler keeps the sender and
/// pushes fully framed events into it from a spawned task.
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    pub fn channel() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            tx,
            Self {
                rx: ReceiverStream::new(rx),
            },
        )
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (CONTENT_TYPE, "text/event-stream"),
                (CACHE_CONTROL, "no-cache"),
                (CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

/// `data: <payload>` followed by the blank line that ends an event
pub fn data_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

pub fn json_frame(value: &Value) -> String {
    data_frame(&value.to_string())
}
