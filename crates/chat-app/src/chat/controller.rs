use std::sync::Arc;
use std::time::Duration;

use murmur_llm::{CompletionClient, CompletionOutcome};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::events::{ChannelSink, CycleEvent, CycleEvents, CyclePayload};
use crate::chat::message::{
    Message, RequestToken, Session, SessionStatus, SessionTransition, TransitionRejection,
};
use crate::chat::reveal::{RevealAnimator, RevealOutcome};
use crate::chat::scroll_follower::{DEFAULT_FOLLOW_THRESHOLD, ScrollFollower, Viewport};
use crate::chat::surface::DisplaySurface;

/// Pause between receiving a reply and revealing its first character.
pub const DEFAULT_REVEAL_LEAD_IN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerOptions {
    pub reveal_lead_in: Duration,
    pub follow_threshold: f32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            reveal_lead_in: DEFAULT_REVEAL_LEAD_IN,
            follow_threshold: DEFAULT_FOLLOW_THRESHOLD,
        }
    }
}

/// What the submit button / enter key did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Submitted(RequestToken),
    Stopped,
    Ignored,
}

/// Bookkeeping for the in-flight cycle, kept beside the session state.
#[derive(Debug)]
struct ActiveCycle {
    token: RequestToken,
    cancel: CancellationToken,
    reply: String,
    reply_started: bool,
}

/// Sequences submission, request, reveal and stop for the single conversation.
///
/// All state changes go through `&mut self`; background tasks only talk back through
/// [`CycleEvent`]s, which are applied by [`ConversationController::handle_event`].
/// Methods that start background work must be called from within a tokio runtime.
pub struct ConversationController<S: DisplaySurface> {
    client: Arc<CompletionClient>,
    animator: RevealAnimator,
    surface: S,
    scroll: ScrollFollower,
    session: Session,
    messages: Vec<Message>,
    active: Option<ActiveCycle>,
    next_token: u64,
    reveal_lead_in: Duration,
    events_tx: mpsc::UnboundedSender<CycleEvent>,
}

impl<S: DisplaySurface> ConversationController<S> {
    /// Creates an idle controller and the receiver its background tasks report to.
    ///
    /// The caller feeds every received event back through [`Self::handle_event`].
    pub fn new(
        client: Arc<CompletionClient>,
        animator: RevealAnimator,
        surface: S,
        options: ControllerOptions,
    ) -> (Self, CycleEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            client,
            animator,
            surface,
            scroll: ScrollFollower::new(options.follow_threshold),
            session: Session::new(),
            messages: Vec::new(),
            active: None,
            next_token: 1,
            reveal_lead_in: options.reveal_lead_in,
            events_tx,
        };
        (controller, CycleEvents::new(events_rx))
    }

    /// Returns the session state machine.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Returns the transcript in submission order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scroll_follower(&self) -> &ScrollFollower {
        &self.scroll
    }

    /// Starts a cycle for `text`; a no-op returning `None` while busy or for blank input.
    pub fn submit(&mut self, text: &str) -> Option<RequestToken> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if !self.session.is_idle() {
            tracing::debug!(status = ?self.session.status(), "ignoring submit while a cycle is active");
            return None;
        }

        let token = self.mint_token();
        if let Err(rejection) = self.session.apply(SessionTransition::Submit(token)) {
            Self::log_rejection(token, rejection);
            return None;
        }

        self.messages.push(Message::user(text));
        self.surface.show_user_message(text);
        self.follow_content_growth();
        self.surface.show_pending_reply();
        self.follow_content_growth();

        let cancel = CancellationToken::new();
        self.active = Some(ActiveCycle {
            token,
            cancel: cancel.clone(),
            reply: String::new(),
            reply_started: false,
        });

        tracing::debug!(%token, text_len = text.len(), "submission accepted");
        self.spawn_request(token, text.to_string(), cancel);
        Some(token)
    }

    /// Cancels the active cycle and returns to idle without waiting for the callee.
    pub fn stop(&mut self) -> bool {
        let status = self.session.status();
        if self.session.apply(SessionTransition::Stop).is_err() {
            return false;
        }

        if let Some(active) = self.active.take() {
            active.cancel.cancel();

            // The revealed prefix stays on screen and becomes the assistant's message.
            if matches!(status, SessionStatus::Revealing(_)) && !active.reply.is_empty() {
                self.messages.push(Message::assistant(active.reply));
            }
        }

        self.surface.end_reply();
        tracing::debug!(previous = ?status, "cycle stopped");
        true
    }

    /// Submit-button / enter-key behaviour: submit while idle, stop otherwise.
    pub fn toggle(&mut self, input: &str) -> ToggleAction {
        if self.session.is_idle() {
            self.submit(input)
                .map(ToggleAction::Submitted)
                .unwrap_or(ToggleAction::Ignored)
        } else if self.stop() {
            ToggleAction::Stopped
        } else {
            ToggleAction::Ignored
        }
    }

    /// Records a viewport scroll and returns whether new content will still be followed.
    pub fn scroll_position_changed(&mut self, viewport: Viewport) -> bool {
        self.scroll.observe(viewport)
    }

    /// Applies one background resumption, dropping it unless it belongs to the active cycle.
    pub fn handle_event(&mut self, event: CycleEvent) {
        if !self.session.accepts(event.token) {
            tracing::debug!(
                token = %event.token,
                active = ?self.session.active_token(),
                "dropping stale cycle event"
            );
            return;
        }

        match event.payload {
            CyclePayload::Resolved(outcome) => self.handle_outcome(event.token, outcome),
            CyclePayload::Revealed(ch) => self.handle_revealed(event.token, ch),
            CyclePayload::RevealFinished => self.handle_reveal_finished(event.token),
        }
    }

    fn handle_outcome(&mut self, token: RequestToken, outcome: CompletionOutcome) {
        match outcome {
            CompletionOutcome::Success(text) => {
                let Some(cancel) = self.active.as_ref().map(|active| active.cancel.clone()) else {
                    tracing::warn!(%token, "reply arrived without an active cycle");
                    return;
                };

                if let Err(rejection) = self.session.apply(SessionTransition::ResponseOk(token)) {
                    Self::log_rejection(token, rejection);
                    return;
                }

                // The placeholder stays up through the lead-in; the first character replaces it.
                tracing::debug!(%token, reply_len = text.chars().count(), "revealing reply");
                self.spawn_reveal(token, text, cancel);
            }
            CompletionOutcome::Failure(reason) => {
                if let Err(rejection) = self.session.apply(SessionTransition::ResponseErr(token)) {
                    Self::log_rejection(token, rejection);
                    return;
                }

                self.active = None;
                self.surface.replace_reply(&reason);
                self.surface.end_reply();
                self.follow_content_growth();
            }
            CompletionOutcome::Cancelled => {
                if let Err(rejection) =
                    self.session.apply(SessionTransition::ResponseCancelled(token))
                {
                    Self::log_rejection(token, rejection);
                    return;
                }

                self.active = None;
                self.surface.end_reply();
            }
        }
    }

    fn handle_revealed(&mut self, token: RequestToken, ch: char) {
        if self.session.status() != SessionStatus::Revealing(token) {
            return;
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };

        if !active.reply_started {
            active.reply_started = true;
            self.surface.start_reply();
        }
        active.reply.push(ch);
        self.surface.append_reply(ch);
        self.follow_content_growth();
    }

    fn handle_reveal_finished(&mut self, token: RequestToken) {
        if let Err(rejection) = self.session.apply(SessionTransition::RevealDone(token)) {
            Self::log_rejection(token, rejection);
            return;
        }

        if let Some(active) = self.active.take() {
            if !active.reply_started {
                self.surface.start_reply();
            }
            self.messages.push(Message::assistant(active.reply));
        }
        self.surface.end_reply();
        tracing::debug!(%token, "cycle completed");
    }

    fn spawn_request(&self, token: RequestToken, text: String, cancel: CancellationToken) {
        let client = Arc::clone(&self.client);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let outcome = client.send(&text, token, &cancel).await;
            let _ = events.send(CycleEvent::resolved(token, outcome));
        });
    }

    fn spawn_reveal(&self, token: RequestToken, text: String, cancel: CancellationToken) {
        let animator = self.animator.clone();
        let lead_in = self.reveal_lead_in;
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            if !animator.pause(lead_in, &cancel).await {
                return;
            }

            let mut sink = ChannelSink::new(token, events.clone());
            let outcome = animator.reveal(&text, &cancel, &mut sink).await;
            if let RevealOutcome::Completed { .. } = outcome {
                let _ = events.send(CycleEvent::reveal_finished(token));
            }
        });
    }

    fn follow_content_growth(&mut self) {
        if self.scroll.notify_content_grew() {
            self.surface.scroll_to_bottom();
        }
    }

    fn mint_token(&mut self) -> RequestToken {
        let token = RequestToken::new(self.next_token);
        self.next_token = self.next_token.saturating_add(1);
        token
    }

    fn log_rejection(token: RequestToken, rejection: TransitionRejection) {
        tracing::warn!(%token, ?rejection, "session transition rejected");
    }
}

impl<S: DisplaySurface> Drop for ConversationController<S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(token = %active.token, "controller dropped; cancelling active cycle");
            active.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use murmur_llm::testing::{ScriptedReply, ScriptedTransport};
    use murmur_llm::{CompletionConfig, NETWORK_ERROR_TEXT};

    use super::*;
    use crate::chat::message::Role;
    use crate::chat::reveal::DEFAULT_CHAR_DELAY;
    use crate::chat::reveal::tests::CountingClock;
    use crate::chat::surface::testing::{PENDING_MARKER, TranscriptSurface};

    type TestController = ConversationController<TranscriptSurface>;

    fn controller_with(
        replies: impl IntoIterator<Item = ScriptedReply>,
    ) -> (TestController, CycleEvents, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let client = Arc::new(CompletionClient::new(
            transport.clone(),
            CompletionConfig::default(),
        ));
        let animator = RevealAnimator::new(Arc::new(CountingClock::default()), DEFAULT_CHAR_DELAY);
        let options = ControllerOptions {
            reveal_lead_in: Duration::ZERO,
            ..ControllerOptions::default()
        };
        let (controller, events) =
            ConversationController::new(client, animator, TranscriptSurface::default(), options);
        (controller, events, transport)
    }

    async fn next_event(events: &mut CycleEvents) -> CycleEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a cycle event")
            .expect("event channel closed")
    }

    /// Applies events until idle and returns every distinct status seen on the way.
    async fn drive_until_idle(
        controller: &mut TestController,
        events: &mut CycleEvents,
    ) -> Vec<SessionStatus> {
        let mut seen = vec![controller.status()];
        while !controller.session().is_idle() {
            let event = next_event(events).await;
            controller.handle_event(event);
            if seen.last() != Some(&controller.status()) {
                seen.push(controller.status());
            }
        }
        seen
    }

    /// Applies whatever arrives within a short window.
    async fn drain(controller: &mut TestController, events: &mut CycleEvents) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), events.recv()).await
        {
            controller.handle_event(event);
        }
    }

    async fn wait_for_requests(transport: &ScriptedTransport, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.requests().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("request never reached the transport");
    }

    #[tokio::test]
    async fn successful_cycle_reveals_reply_and_returns_to_idle() {
        let (mut controller, mut events, transport) =
            controller_with([ScriptedReply::success("Hi there")]);

        let token = controller.submit("Hello").expect("idle controller accepts input");
        assert_eq!(controller.status(), SessionStatus::Awaiting(token));

        let seen = drive_until_idle(&mut controller, &mut events).await;

        assert_eq!(
            seen,
            vec![
                SessionStatus::Awaiting(token),
                SessionStatus::Revealing(token),
                SessionStatus::Idle,
            ]
        );
        assert_eq!(controller.surface().reply_text(), "Hi there");
        assert_eq!(
            controller.messages(),
            &[Message::user("Hello"), Message::assistant("Hi there")]
        );
        assert_eq!(transport.requests()[0].messages[1].content, "Hello");

        let snapshots = &controller.surface().reply_snapshots;
        assert_eq!(snapshots.len(), "Hi there".len());
        assert_eq!(snapshots.first().map(String::as_str), Some("H"));
        assert!(
            snapshots
                .windows(2)
                .all(|pair| pair[1].starts_with(pair[0].as_str())
                    && pair[1].len() == pair[0].len() + 1)
        );
    }

    #[tokio::test]
    async fn placeholder_stays_until_the_first_character_is_revealed() {
        let (mut controller, mut events, _transport) =
            controller_with([ScriptedReply::success("Hi there")]);

        let token = controller.submit("Hello").expect("accepted");
        let resolved = next_event(&mut events).await;
        assert!(matches!(resolved.payload, CyclePayload::Resolved(_)));
        controller.handle_event(resolved);

        assert_eq!(controller.status(), SessionStatus::Revealing(token));
        assert_eq!(controller.surface().reply_text(), PENDING_MARKER);

        let first = next_event(&mut events).await;
        assert_eq!(first, CycleEvent::revealed(token, 'H'));
        controller.handle_event(first);
        assert_eq!(controller.surface().reply_text(), "H");

        drive_until_idle(&mut controller, &mut events).await;
        assert_eq!(controller.surface().reply_text(), "Hi there");
    }

    #[tokio::test]
    async fn duplicate_reply_does_not_restart_the_reveal() {
        let (mut controller, mut events, _transport) =
            controller_with([ScriptedReply::success("Hi there")]);

        let token = controller.submit("Hello").expect("accepted");
        let resolved = next_event(&mut events).await;
        controller.handle_event(resolved);
        let session_before = controller.session().clone();

        controller.handle_event(CycleEvent::resolved(
            token,
            CompletionOutcome::Success("again".to_string()),
        ));
        assert_eq!(controller.session(), &session_before);

        drive_until_idle(&mut controller, &mut events).await;
        drain(&mut controller, &mut events).await;

        assert_eq!(controller.surface().reply_text(), "Hi there");
        assert_eq!(
            controller.messages(),
            &[Message::user("Hello"), Message::assistant("Hi there")]
        );
    }

    #[tokio::test]
    async fn http_error_message_becomes_the_rendered_reply() {
        let (mut controller, mut events, _transport) =
            controller_with([ScriptedReply::error(429, "rate limited")]);

        let token = controller.submit("Hello").expect("accepted");
        let seen = drive_until_idle(&mut controller, &mut events).await;

        assert_eq!(
            seen,
            vec![SessionStatus::Awaiting(token), SessionStatus::Idle]
        );
        assert_eq!(controller.surface().reply_text(), "rate limited");
        assert_eq!(controller.surface().ended_replies, 1);
        assert_eq!(controller.messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn transport_failure_renders_network_error() {
        let (mut controller, mut events, _transport) =
            controller_with([ScriptedReply::Interrupted]);

        controller.submit("Hello").expect("accepted");
        drive_until_idle(&mut controller, &mut events).await;

        assert_eq!(controller.surface().reply_text(), NETWORK_ERROR_TEXT);
        assert!(controller.session().is_idle());
    }

    #[tokio::test]
    async fn blank_or_busy_submissions_change_nothing() {
        let (mut controller, _events, _transport) = controller_with([ScriptedReply::Hang]);

        assert_eq!(controller.submit("   \n\t"), None);
        assert!(controller.session().is_idle());
        assert!(controller.messages().is_empty());

        controller.submit("first").expect("accepted");
        let session_before = controller.session().clone();
        let messages_before = controller.messages().to_vec();

        assert_eq!(controller.submit("second"), None);
        assert_eq!(controller.session(), &session_before);
        assert_eq!(controller.messages(), messages_before.as_slice());
        assert_eq!(controller.surface().user_messages, vec!["first".to_string()]);

        assert!(controller.stop());
    }

    #[tokio::test]
    async fn stop_while_awaiting_ignores_the_eventual_outcome() {
        let (mut controller, mut events, transport) = controller_with([ScriptedReply::Hang]);

        let token = controller.submit("Hello").expect("accepted");
        wait_for_requests(&transport, 1).await;

        assert!(controller.stop());
        assert!(controller.session().is_idle());
        assert!(controller.session().cancel_requested());

        let event = next_event(&mut events).await;
        assert_eq!(event, CycleEvent::resolved(token, CompletionOutcome::Cancelled));
        controller.handle_event(event);

        // A success that raced the stop is dropped as well.
        controller.handle_event(CycleEvent::resolved(
            token,
            CompletionOutcome::Success("late".to_string()),
        ));

        assert!(controller.session().is_idle());
        assert_eq!(controller.surface().reply_text(), PENDING_MARKER);
        assert!(controller.surface().reply_snapshots.is_empty());
        assert_eq!(controller.messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn stop_while_revealing_freezes_a_strict_prefix() {
        let reply = "Hi there, how can I help?";
        let (mut controller, mut events, _transport) =
            controller_with([ScriptedReply::success(reply)]);

        let token = controller.submit("Hello").expect("accepted");
        while controller.surface().reply_snapshots.len() < 3 {
            let event = next_event(&mut events).await;
            controller.handle_event(event);
        }
        assert_eq!(controller.status(), SessionStatus::Revealing(token));

        assert!(controller.stop());
        let frozen = controller.surface().reply_text().to_string();
        drain(&mut controller, &mut events).await;

        assert!(controller.session().is_idle());
        assert_eq!(frozen, "Hi ");
        assert_eq!(controller.surface().reply_text(), frozen);
        assert!(reply.starts_with(&frozen) && frozen.len() < reply.len());
        assert_eq!(controller.surface().reply_snapshots.len(), 3);
        assert_eq!(
            controller.messages().last(),
            Some(&Message::assistant("Hi "))
        );
    }

    #[tokio::test]
    async fn late_events_from_a_stopped_cycle_cannot_touch_the_next_one() {
        let (mut controller, mut events, transport) =
            controller_with([ScriptedReply::Hang, ScriptedReply::success("fresh")]);

        let first = controller.submit("one").expect("accepted");
        wait_for_requests(&transport, 1).await;
        assert!(controller.stop());

        let second = controller.submit("two").expect("accepted after stop");
        assert_ne!(first, second);

        controller.handle_event(CycleEvent::resolved(
            first,
            CompletionOutcome::Success("stale".to_string()),
        ));
        controller.handle_event(CycleEvent::revealed(first, 'x'));
        assert_eq!(controller.status(), SessionStatus::Awaiting(second));

        drive_until_idle(&mut controller, &mut events).await;

        assert_eq!(controller.surface().reply_text(), "fresh");
        let roles_and_text = controller
            .messages()
            .iter()
            .map(|message| (message.role(), message.text()))
            .collect::<Vec<_>>();
        assert_eq!(
            roles_and_text,
            vec![
                (Role::User, "one"),
                (Role::User, "two"),
                (Role::Assistant, "fresh"),
            ]
        );
    }

    #[tokio::test]
    async fn toggle_submits_when_idle_and_stops_when_busy() {
        let (mut controller, _events, _transport) = controller_with([ScriptedReply::Hang]);

        assert_eq!(controller.toggle("  "), ToggleAction::Ignored);
        let action = controller.toggle("Hello");
        assert!(matches!(action, ToggleAction::Submitted(_)));
        assert_eq!(controller.toggle("ignored text"), ToggleAction::Stopped);
        assert!(controller.session().is_idle());
        assert_eq!(controller.messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn content_growth_scrolls_only_while_following() {
        let (mut controller, mut events, _transport) = controller_with([
            ScriptedReply::success("Hi there"),
            ScriptedReply::success("Hi there"),
        ]);

        controller.submit("Hello").expect("accepted");
        drive_until_idle(&mut controller, &mut events).await;
        // User message, placeholder, then one request per revealed character.
        assert_eq!(controller.surface().scroll_requests, 2 + "Hi there".len());

        assert!(!controller.scroll_position_changed(Viewport::new(0.0, 5_000.0, 600.0)));
        controller.submit("Again").expect("accepted");
        drive_until_idle(&mut controller, &mut events).await;
        assert_eq!(controller.surface().scroll_requests, 2 + "Hi there".len());
        assert!(!controller.scroll_follower().should_follow());
    }

    #[tokio::test]
    async fn dropping_the_controller_cancels_the_request() {
        let (mut controller, mut events, transport) = controller_with([ScriptedReply::Hang]);

        let token = controller.submit("Hello").expect("accepted");
        wait_for_requests(&transport, 1).await;
        drop(controller);

        let event = next_event(&mut events).await;
        assert_eq!(event, CycleEvent::resolved(token, CompletionOutcome::Cancelled));
    }
}
