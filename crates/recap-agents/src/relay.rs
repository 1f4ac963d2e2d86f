use recap_common::{Error, Result};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Default capacity of the relay channel between the pipeline and a caller.
pub const RELAY_BUFFER: usize = 256;

/// One event on the caller-facing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A single character of generated text.
    Content(String),
    /// Terminal success, carrying the full generated text.
    Done(String),
    /// Terminal failure.
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content(_))
    }

    /// Wire form sent as the `data:` payload of an SSE event.
    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::Content(content) => json!({
                "type": "content",
                "content": content,
                "done": false,
            }),
            StreamEvent::Done(summary) => json!({
                "type": "done",
                "content": "",
                "summary": summary,
            }),
            StreamEvent::Error(message) => json!({
                "type": "error",
                "content": message,
            }),
        }
    }
}

/// Sending half of a caller's event stream.
///
/// Terminal events consume the sink, so a caller sees at most one of them.
/// A closed receiver is how the pipeline learns the caller went away.
#[derive(Debug)]
pub struct RelaySink {
    tx: mpsc::Sender<StreamEvent>,
}

impl RelaySink {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Relay `fragment` one character at a time.
    pub async fn emit_fragment(&self, fragment: &str) -> Result<()> {
        for ch in fragment.chars() {
            self.send(StreamEvent::Content(ch.to_string())).await?;
        }
        Ok(())
    }

    pub async fn finish(self, final_text: String) -> Result<()> {
        self.send(StreamEvent::Done(final_text)).await
    }

    pub async fn fail(self, message: String) -> Result<()> {
        self.send(StreamEvent::Error(message)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the caller has dropped its receiver.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fragment_is_split_into_characters() {
        let (sink, mut rx) = RelaySink::channel(16);
        sink.emit_fragment("Hé!").await.unwrap();
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("H".into()),
                StreamEvent::Content("é".into()),
                StreamEvent::Content("!".into()),
            ]
        );
    }

    #[tokio::test]
    async fn send_after_receiver_drop_is_cancelled() {
        let (sink, rx) = RelaySink::channel(4);
        drop(rx);
        assert!(sink.is_closed());
        assert!(matches!(
            sink.emit_fragment("x").await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn empty_fragment_sends_nothing() {
        let (sink, mut rx) = RelaySink::channel(4);
        sink.emit_fragment("").await.unwrap();
        sink.finish(String::new()).await.unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::Done(String::new())));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn wire_format_matches_protocol() {
        assert_eq!(
            StreamEvent::Content("H".into()).to_json(),
            json!({"type": "content", "content": "H", "done": false})
        );
        assert_eq!(
            StreamEvent::Done("Hello".into()).to_json(),
            json!({"type": "done", "content": "", "summary": "Hello"})
        );
        assert_eq!(
            StreamEvent::Error("boom".into()).to_json(),
            json!({"type": "error", "content": "boom"})
        );
    }

    #[test]
    fn only_content_is_non_terminal() {
        assert!(!StreamEvent::Content("a".into()).is_terminal());
        assert!(StreamEvent::Done(String::new()).is_terminal());
        assert!(StreamEvent::Error(String::new()).is_terminal());
    }
}
