#![deny(unsafe_code)]

/// Conversational client with a cancellable request/reveal cycle.
///
/// The controller in [`chat`] owns all conversation state; shells such as the terminal
/// front end in [`shell`] feed it input and render through [`chat::DisplaySurface`].
pub mod chat;
/// Settings loading from file and environment.
pub mod settings;
/// Line-oriented terminal front end.
pub mod shell;
