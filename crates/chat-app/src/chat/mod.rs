/// Submission cycle sequencing for the single conversation.
pub mod controller;
/// Token-tagged resumptions sent from background tasks to the controller.
pub mod events;
/// Domain entities and the deterministic session state machine.
pub mod message;
pub mod reveal;
pub mod scroll_follower;
/// Rendering seam implemented by shells.
pub mod surface;

pub use controller::{
    ControllerOptions, ConversationController, DEFAULT_REVEAL_LEAD_IN, ToggleAction,
};
pub use events::{CycleEvent, CycleEvents, CyclePayload};
pub use message::{
    Message, RequestToken, Role, Session, SessionStatus, SessionTransition, TransitionRejection,
    TransitionResult,
};
pub use reveal::{
    DEFAULT_CHAR_DELAY, RevealAnimator, RevealClock, RevealOutcome, RevealSink, TokioClock,
};
pub use scroll_follower::{DEFAULT_FOLLOW_THRESHOLD, ScrollFollower, Viewport};
pub use surface::DisplaySurface;
