/// Display surface driven by the conversation controller.
///
/// The controller decides what changes; implementations only draw it.
pub trait DisplaySurface {
    fn show_user_message(&mut self, text: &str);
    /// Shows the "assistant is typing" placeholder for the pending reply.
    fn show_pending_reply(&mut self);
    /// Clears the placeholder before the first revealed character.
    fn start_reply(&mut self);
    fn append_reply(&mut self, ch: char);
    /// Replaces whatever the pending reply shows with terminal text (used for failures).
    fn replace_reply(&mut self, text: &str);
    fn end_reply(&mut self);
    fn scroll_to_bottom(&mut self);
}
