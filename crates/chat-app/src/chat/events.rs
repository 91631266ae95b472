use tokio::sync::mpsc;

use crate::chat::message::RequestToken;
use crate::chat::reveal::RevealSink;
use murmur_llm::CompletionOutcome;

/// Resumption of an asynchronous step belonging to one submission cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePayload {
    /// The completion request produced its single outcome.
    Resolved(CompletionOutcome),
    /// The reveal task produced one more character.
    Revealed(char),
    /// The reveal task ran to the end of the reply.
    RevealFinished,
}

/// Emitted by background work and applied by the controller, which drops any event
/// whose token is not the session's active token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEvent {
    pub token: RequestToken,
    pub payload: CyclePayload,
}

impl CycleEvent {
    pub fn resolved(token: RequestToken, outcome: CompletionOutcome) -> Self {
        Self {
            token,
            payload: CyclePayload::Resolved(outcome),
        }
    }

    pub fn revealed(token: RequestToken, ch: char) -> Self {
        Self {
            token,
            payload: CyclePayload::Revealed(ch),
        }
    }

    pub fn reveal_finished(token: RequestToken) -> Self {
        Self {
            token,
            payload: CyclePayload::RevealFinished,
        }
    }
}

/// Receiving half of the controller's event channel.
pub struct CycleEvents {
    events: mpsc::UnboundedReceiver<CycleEvent>,
}

impl CycleEvents {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<CycleEvent>) -> Self {
        Self { events }
    }

    /// Waits for the next event; `None` once the controller and its tasks are gone.
    pub async fn recv(&mut self) -> Option<CycleEvent> {
        self.events.recv().await
    }
}

/// Forwards revealed characters to the controller tagged with their cycle token.
pub(crate) struct ChannelSink {
    token: RequestToken,
    events: mpsc::UnboundedSender<CycleEvent>,
}

impl ChannelSink {
    pub(crate) fn new(token: RequestToken, events: mpsc::UnboundedSender<CycleEvent>) -> Self {
        Self { token, events }
    }
}

impl RevealSink for ChannelSink {
    fn append(&mut self, ch: char) {
        // A closed channel means the controller is gone; its drop already cancelled us.
        let _ = self.events.send(CycleEvent::revealed(self.token, ch));
    }
}
