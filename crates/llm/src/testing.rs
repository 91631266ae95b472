//! Scripted in-memory transport for tests that must not touch the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::transport::{
    BoxFuture, CompletionTransport, TransportError, TransportResponse, TransportResult,
};
use crate::wire::ChatCompletionRequest;

/// One scripted answer, consumed in order by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(TransportResponse),
    Delayed {
        delay: Duration,
        response: TransportResponse,
    },
    /// Fails immediately with [`TransportError::Interrupted`], whether or not anyone cancelled.
    Interrupted,
    /// Never answers until the cancellation signal fires, then fails like an aborted fetch.
    Hang,
}

impl ScriptedReply {
    pub fn success(text: &str) -> Self {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        });
        Self::Respond(TransportResponse::new(200, body.to_string()))
    }

    pub fn error(status: u16, message: &str) -> Self {
        let body = json!({"error": {"message": message}});
        Self::Respond(TransportResponse::new(status, body.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .expect("scripted replies lock poisoned")
            .push_back(reply);
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .clone()
    }
}

impl CompletionTransport for ScriptedTransport {
    fn post<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .expect("scripted replies lock poisoned")
            .pop_front();

        Box::pin(async move {
            match reply {
                Some(ScriptedReply::Respond(response)) => Ok(response),
                Some(ScriptedReply::Delayed { delay, response }) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(ScriptedReply::Interrupted) => Err(TransportError::Interrupted {
                    stage: "scripted-interrupt",
                }),
                Some(ScriptedReply::Hang) => {
                    cancel.cancelled().await;
                    Err(TransportError::Interrupted {
                        stage: "scripted-hang",
                    })
                }
                None => Err(TransportError::Interrupted {
                    stage: "scripted-exhausted",
                }),
            }
        })
    }
}
