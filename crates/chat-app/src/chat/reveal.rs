use std::sync::Arc;
use std::time::Duration;

use murmur_llm::BoxFuture;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CHAR_DELAY: Duration = Duration::from_millis(22);

/// Source of the per-character delay; injectable so tests run without wall-clock time.
pub trait RevealClock: Send + Sync {
    fn tick(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl RevealClock for TokioClock {
    fn tick(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if delay.is_zero() {
                // Still hand control back so a pending stop can be observed between characters.
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        })
    }
}

/// Receives revealed characters one at a time.
pub trait RevealSink: Send {
    fn append(&mut self, ch: char);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Completed { revealed: usize },
    Interrupted { revealed: usize },
}

impl RevealOutcome {
    pub fn revealed(&self) -> usize {
        match self {
            Self::Completed { revealed } | Self::Interrupted { revealed } => *revealed,
        }
    }
}

/// Cancellable typewriter over an already complete reply.
#[derive(Clone)]
pub struct RevealAnimator {
    clock: Arc<dyn RevealClock>,
    char_delay: Duration,
}

impl RevealAnimator {
    /// Creates an animator ticking `clock` once per character.
    pub fn new(clock: Arc<dyn RevealClock>, char_delay: Duration) -> Self {
        Self { clock, char_delay }
    }

    pub fn char_delay(&self) -> Duration {
        self.char_delay
    }

    /// Reveals `text` left to right, one character per tick.
    ///
    /// Cancellation is checked around every tick, so nothing is appended once it fires;
    /// characters already handed to `sink` stay where they are.
    pub async fn reveal(
        &self,
        text: &str,
        cancel: &CancellationToken,
        sink: &mut dyn RevealSink,
    ) -> RevealOutcome {
        let mut revealed = 0;

        for ch in text.chars() {
            if cancel.is_cancelled() {
                return RevealOutcome::Interrupted { revealed };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RevealOutcome::Interrupted { revealed },
                _ = self.clock.tick(self.char_delay) => {}
            }

            if cancel.is_cancelled() {
                return RevealOutcome::Interrupted { revealed };
            }

            sink.append(ch);
            revealed += 1;
        }

        RevealOutcome::Completed { revealed }
    }

    /// Waits `delay` on the animator's clock; returns false if cancelled first.
    pub async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() || cancel.is_cancelled() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.clock.tick(delay) => !cancel.is_cancelled(),
        }
    }
}

impl Default for RevealAnimator {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock), DEFAULT_CHAR_DELAY)
    }
}
