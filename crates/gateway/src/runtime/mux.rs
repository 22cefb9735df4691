//! Stream multiplexer.
//!
//! Races the parent turn's event channel against the delegation queue so
//! child tokens reach the client as they arrive. Per-source ordering is
//! preserved (each source is a FIFO channel); cross-source interleaving is
//! whatever the race produces. When the parent finishes, remaining child
//! events are drained; the child channel closes once the turn task drops
//! its senders, so the drain cannot block forever.

use serde::Serialize;
use tokio::sync::mpsc;

use lucid_domain::stream::BoxStream;

use crate::runtime::delegate::ChildEvent;
use crate::runtime::turn::TurnEvent;

/// The terminal marker closing a merged stream.
#[derive(Debug, Clone, Serialize)]
pub struct DoneMarker {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl DoneMarker {
    fn new() -> Self {
        Self { kind: "done" }
    }
}

/// One event on the merged client stream.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Turn(TurnEvent),
    Child(ChildEvent),
    Done(DoneMarker),
}

/// Merge the parent's turn events with the delegation queue.
pub fn multiplex(
    mut parent: mpsc::Receiver<TurnEvent>,
    mut children: mpsc::Receiver<ChildEvent>,
) -> BoxStream<'static, ChatEvent> {
    let stream = async_stream::stream! {
        let mut parent_open = true;
        let mut children_open = true;

        while parent_open {
            if children_open {
                tokio::select! {
                    turn = parent.recv() => match turn {
                        Some(event) => yield ChatEvent::Turn(event),
                        None => parent_open = false,
                    },
                    child = children.recv() => match child {
                        Some(event) => yield ChatEvent::Child(event),
                        None => children_open = false,
                    },
                }
            } else {
                match parent.recv().await {
                    Some(event) => yield ChatEvent::Turn(event),
                    None => parent_open = false,
                }
            }
        }

        // Parent finished; drain whatever the children still have queued.
        while children_open {
            match children.recv().await {
                Some(event) => yield ChatEvent::Child(event),
                None => children_open = false,
            }
        }

        yield ChatEvent::Done(DoneMarker::new());
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn delta(text: &str) -> TurnEvent {
        TurnEvent::AssistantDelta { text: text.into() }
    }

    fn child(content: &str) -> ChildEvent {
        ChildEvent::Content {
            agent_name: "child".into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn per_source_ordering_is_preserved() {
        let (parent_tx, parent_rx) = mpsc::channel(16);
        let (child_tx, child_rx) = mpsc::channel(16);

        for text in ["p1", "p2", "p3"] {
            parent_tx.send(delta(text)).await.unwrap();
        }
        for content in ["a", "b", "c"] {
            child_tx.send(child(content)).await.unwrap();
        }
        drop(parent_tx);
        drop(child_tx);

        let events: Vec<ChatEvent> = multiplex(parent_rx, child_rx).collect().await;

        let parent_seq: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Turn(TurnEvent::AssistantDelta { text }) => Some(text.clone()),
                _ => None,
            })
            .collect();
        let child_seq: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Child(ChildEvent::Content { content, .. }) => Some(content.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(parent_seq, ["p1", "p2", "p3"]);
        assert_eq!(child_seq, ["a", "b", "c"]);
        assert!(matches!(events.last(), Some(ChatEvent::Done(_))));
    }

    #[tokio::test]
    async fn child_events_drain_after_parent_completes() {
        let (parent_tx, parent_rx) = mpsc::channel(16);
        let (child_tx, child_rx) = mpsc::channel(16);

        // Parent produces one event and finishes immediately; child events
        // are still queued.
        parent_tx.send(delta("only")).await.unwrap();
        drop(parent_tx);
        for content in ["late-1", "late-2"] {
            child_tx.send(child(content)).await.unwrap();
        }
        drop(child_tx);

        let events: Vec<ChatEvent> = multiplex(parent_rx, child_rx).collect().await;
        let child_count = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::Child(_)))
            .count();
        assert_eq!(child_count, 2);
        assert!(matches!(events.last(), Some(ChatEvent::Done(_))));
    }

    #[tokio::test]
    async fn closed_child_channel_does_not_stall_the_parent() {
        let (parent_tx, parent_rx) = mpsc::channel(16);
        let (child_tx, child_rx) = mpsc::channel::<ChildEvent>(16);
        drop(child_tx);

        let collector = tokio::spawn(async move {
            multiplex(parent_rx, child_rx).collect::<Vec<_>>().await
        });

        parent_tx.send(delta("after-close")).await.unwrap();
        drop(parent_tx);

        let events = collector.await.unwrap();
        assert_eq!(events.len(), 2); // the delta + done marker
    }

    #[tokio::test]
    async fn empty_streams_still_emit_done() {
        let (parent_tx, parent_rx) = mpsc::channel::<TurnEvent>(1);
        let (child_tx, child_rx) = mpsc::channel::<ChildEvent>(1);
        drop(parent_tx);
        drop(child_tx);

        let events: Vec<ChatEvent> = multiplex(parent_rx, child_rx).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ChatEvent::Done(_)));
    }
}
