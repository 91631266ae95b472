pub use murmur_llm::RequestToken;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// Immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    text: String,
}

impl Message {
    /// Creates a transcript entry for `role`.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Creates an entry for accepted user input.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Creates an entry for a completed or stopped reply.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Returns who produced this entry.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the entry text as rendered.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Lifecycle status of the single conversation session.
///
/// The active request token lives inside the non-idle variants, so a token exists
/// exactly when a cycle is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Awaiting(RequestToken),
    Revealing(RequestToken),
}

impl SessionStatus {
    /// Returns the in-flight token, if any.
    pub fn active_token(&self) -> Option<RequestToken> {
        match self {
            Self::Idle => None,
            Self::Awaiting(token) | Self::Revealing(token) => Some(*token),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// State transition input for the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Submit(RequestToken),
    ResponseOk(RequestToken),
    ResponseErr(RequestToken),
    ResponseCancelled(RequestToken),
    RevealDone(RequestToken),
    Stop,
}

/// Rejection reason for illegal session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    AlreadyActive {
        active: RequestToken,
        attempted: RequestToken,
    },
    NoActiveCycle,
    TokenMismatch {
        active: RequestToken,
        attempted: RequestToken,
    },
    WrongPhase {
        status: SessionStatus,
        transition: SessionTransition,
    },
}

pub type TransitionResult = Result<SessionStatus, TransitionRejection>;

/// Conversation session state owned by one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    cancel_requested: bool,
}

impl Session {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        self.status.is_idle()
    }

    pub fn active_token(&self) -> Option<RequestToken> {
        self.status.active_token()
    }

    /// True after `stop()` until the next submission is accepted.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Returns true when an asynchronous resumption belongs to the in-flight cycle.
    pub fn accepts(&self, token: RequestToken) -> bool {
        self.status.active_token() == Some(token)
    }

    /// Applies one transition deterministically, leaving state untouched on rejection.
    pub fn apply(&mut self, transition: SessionTransition) -> TransitionResult {
        let next = self.next_status(transition)?;
        match transition {
            SessionTransition::Submit(_) => self.cancel_requested = false,
            SessionTransition::Stop => self.cancel_requested = true,
            _ => {}
        }
        self.status = next;
        Ok(next)
    }

    fn next_status(&self, transition: SessionTransition) -> TransitionResult {
        match transition {
            SessionTransition::Submit(token) => match self.status.active_token() {
                Some(active) => Err(TransitionRejection::AlreadyActive {
                    active,
                    attempted: token,
                }),
                None => Ok(SessionStatus::Awaiting(token)),
            },
            SessionTransition::ResponseOk(token) => {
                self.expect_awaiting(token, transition)?;
                Ok(SessionStatus::Revealing(token))
            }
            SessionTransition::ResponseErr(token) | SessionTransition::ResponseCancelled(token) => {
                self.expect_awaiting(token, transition)?;
                Ok(SessionStatus::Idle)
            }
            SessionTransition::RevealDone(token) => {
                self.expect_active(token)?;
                match self.status {
                    SessionStatus::Revealing(_) => Ok(SessionStatus::Idle),
                    status => Err(TransitionRejection::WrongPhase { status, transition }),
                }
            }
            SessionTransition::Stop => match self.status {
                SessionStatus::Idle => Err(TransitionRejection::NoActiveCycle),
                SessionStatus::Awaiting(_) | SessionStatus::Revealing(_) => Ok(SessionStatus::Idle),
            },
        }
    }

    fn expect_awaiting(
        &self,
        token: RequestToken,
        transition: SessionTransition,
    ) -> Result<(), TransitionRejection> {
        self.expect_active(token)?;
        match self.status {
            SessionStatus::Awaiting(_) => Ok(()),
            status => Err(TransitionRejection::WrongPhase { status, transition }),
        }
    }

    fn expect_active(&self, token: RequestToken) -> Result<(), TransitionRejection> {
        match self.status.active_token() {
            Some(active) if active == token => Ok(()),
            Some(active) => Err(TransitionRejection::TokenMismatch {
                active,
                attempted: token,
            }),
            None => Err(TransitionRejection::NoActiveCycle),
        }
    }
}
