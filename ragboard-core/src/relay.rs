//! Relays an upstream completion event stream to the client as chunks.
//!
//! The relay reads Server-Sent-Events lines (`data: {json}`), forwards every
//! non-empty text delta as a `StreamChunk { done: false }` in arrival order,
//! and stops at `[DONE]`, at a populated `finish_reason`, at upstream EOF, or
//! on a read error. Whichever way it stops, exactly one
//! `StreamChunk { done: true }` follows.

use crate::provider::CompletionResponse;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

pub type ChunkSender = mpsc::UnboundedSender<StreamChunk>;
pub type ChunkReceiver = mpsc::UnboundedReceiver<StreamChunk>;

/// Unit of the outbound streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
}

impl StreamChunk {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }

    /// Renders the chunk as one SSE event.
    pub fn to_sse(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// How the upstream read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    DoneMarker,
    FinishReason,
    Eof,
    ReadError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    /// Content chunks forwarded, not counting the terminal chunk
    pub chunks: usize,
    pub termination: Termination,
}

/// Drives the relay until the upstream ends, then sends the terminal chunk.
pub async fn relay<S, E>(mut upstream: S, sender: &ChunkSender) -> RelaySummary
where
    S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
    E: Display,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunks = 0;

    let termination = 'read: loop {
        match upstream.next().await {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                    if let Some(end) = handle_line(&line[..line.len() - 1], sender, &mut chunks) {
                        break 'read end;
                    }
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "Error reading upstream stream");
                break Termination::ReadError;
            }
            None => {
                // last line may arrive without a trailing newline
                if let Some(end) = handle_line(&buffer, sender, &mut chunks) {
                    break end;
                }
                break Termination::Eof;
            }
        }
    };

    let _ = sender.send(StreamChunk::done());
    debug!(chunks, ?termination, "Relay finished");

    RelaySummary { chunks, termination }
}

/// Handles one upstream line; returns `Some` when the stream should stop.
fn handle_line(line: &[u8], sender: &ChunkSender, chunks: &mut usize) -> Option<Termination> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches('\r').strip_prefix(DATA_PREFIX)?.trim_start();

    if payload == DONE_MARKER {
        return Some(Termination::DoneMarker);
    }

    let event: CompletionResponse = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Skipping undecodable stream event");
            return None;
        }
    };

    let choice = event.choices.first()?;
    if let Some(text) = choice.delta_text().filter(|text| !text.is_empty()) {
        let _ = sender.send(StreamChunk::chunk(text));
        *chunks += 1;
    }

    choice.is_finished().then_some(Termination::FinishReason)
}

/// Writes chunks to `writer` as SSE events, flushing after each one.
///
/// Returns once the terminal chunk is written or the channel closes.
pub async fn write_sse<W>(writer: &mut W, mut receiver: ChunkReceiver) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = receiver.recv().await {
        writer.write_all(chunk.to_sse()?.as_bytes()).await?;
        writer.flush().await?;
        if chunk.done {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn delta(text: &str) -> Vec<u8> {
        format!("data: {}\n\n", serde_json::json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]}))
            .into_bytes()
    }

    fn finish() -> Vec<u8> {
        b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".to_vec()
    }

    fn drain(mut receiver: ChunkReceiver) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Ok(chunk) = receiver.try_recv() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_three_deltas_then_finish_then_error() {
        let upstream = stream::iter(vec![
            Ok(delta("你好")),
            Ok(delta("，")),
            Ok(delta("world")),
            Ok(finish()),
            Err("connection reset".to_string()),
        ]);
        let (sender, receiver) = mpsc::unbounded_channel();

        let summary = relay(upstream, &sender).await;
        drop(sender);

        assert_eq!(summary, RelaySummary { chunks: 3, termination: Termination::FinishReason });
        assert_eq!(
            drain(receiver),
            vec![
                StreamChunk::chunk("你好"),
                StreamChunk::chunk("，"),
                StreamChunk::chunk("world"),
                StreamChunk::done(),
            ]
        );
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let whole = [delta("alpha"), delta("beta")].concat();
        let (head, tail) = whole.split_at(17);
        let upstream = stream::iter(vec![
            Ok::<_, String>(head.to_vec()),
            Ok(tail.to_vec()),
            Ok(b"data: [DONE]\n".to_vec()),
            Ok(delta("never")),
        ]);
        let (sender, receiver) = mpsc::unbounded_channel();

        let summary = relay(upstream, &sender).await;
        drop(sender);

        assert_eq!(summary.termination, Termination::DoneMarker);
        assert_eq!(
            drain(receiver),
            vec![StreamChunk::chunk("alpha"), StreamChunk::chunk("beta"), StreamChunk::done()]
        );
    }

    #[tokio::test]
    async fn test_read_error_still_terminates_cleanly() {
        let upstream = stream::iter(vec![Ok(delta("partial")), Err("timeout".to_string())]);
        let (sender, receiver) = mpsc::unbounded_channel();

        let summary = relay(upstream, &sender).await;
        drop(sender);

        assert_eq!(summary, RelaySummary { chunks: 1, termination: Termination::ReadError });
        let chunks = drain(receiver);
        assert_eq!(chunks.last(), Some(&StreamChunk::done()));
        assert_eq!(chunks.iter().filter(|c| c.done).count(), 1);
    }

    #[tokio::test]
    async fn test_eof_without_trailing_newline_and_noise() {
        let upstream = stream::iter(vec![
            Ok::<_, String>(b": keep-alive\n\nevent: message\r\n".to_vec()),
            Ok(b"data: not json\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n".to_vec()),
            Ok(b"data:{\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}".to_vec()),
        ]);
        let (sender, receiver) = mpsc::unbounded_channel();

        let summary = relay(upstream, &sender).await;
        drop(sender);

        assert_eq!(summary, RelaySummary { chunks: 1, termination: Termination::Eof });
        assert_eq!(drain(receiver), vec![StreamChunk::chunk("tail"), StreamChunk::done()]);
    }

    #[tokio::test]
    async fn test_write_sse_stops_after_terminal_chunk() {
        let (sender, receiver) = mpsc::unbounded_channel();
        sender.send(StreamChunk::chunk("hi")).unwrap();
        sender.send(StreamChunk::done()).unwrap();
        sender.send(StreamChunk::chunk("ignored")).unwrap();

        let mut out = Vec::new();
        write_sse(&mut out, receiver).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "data: {\"content\":\"hi\",\"done\":false}\n\ndata: {\"content\":\"\",\"done\":true}\n\n"
        );
    }
}
