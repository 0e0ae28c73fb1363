//! Outbound frame plumbing
//!
//! Sessions write responses through the [`FrameSink`] trait so the protocol
//! core does not depend on a concrete websocket type. The axum socket half
//! implements it for production; an mpsc sender implements it for tests and
//! for callers that want to forward frames elsewhere.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;

use crate::error::Error;

/// WebSocket close codes
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
}

/// A frame sent from the gateway to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON envelope
    Text(String),
    /// Raw file bytes during a pull
    Binary(Vec<u8>),
}

/// Destination for frames produced by a session
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame, in order
    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        self.send(message)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

#[async_trait]
impl FrameSink for mpsc::Sender<Frame> {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| Error::Transport("frame receiver dropped".to_string()))
    }
}

/// Send a WebSocket close frame
pub async fn send_close(
    sender: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: impl Into<String>,
) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into().into(),
        })))
        .await;
}

/// Send a normal close frame
pub async fn send_close_normal(
    sender: &mut SplitSink<WebSocket, Message>,
    reason: impl Into<String>,
) {
    send_close(sender, close_code::NORMAL, reason).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (mut tx, mut rx) = mpsc::channel(4);
        tx.send_frame(Frame::Text("a".to_string())).await.unwrap();
        tx.send_frame(Frame::Binary(vec![1, 2])).await.unwrap();

        assert_eq!(rx.recv().await, Some(Frame::Text("a".to_string())));
        assert_eq!(rx.recv().await, Some(Frame::Binary(vec![1, 2])));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (mut tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = tx.send_frame(Frame::Text("a".to_string())).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
