use std::io::Write;
use std::sync::Arc;

use murmur_llm::TransportError;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{ConversationController, DisplaySurface, RevealAnimator, TokioClock};
use crate::settings::AppSettings;

const USER_PREFIX: &str = "you: ";
const ASSISTANT_PREFIX: &str = "assistant: ";
const PENDING_TEXT: &str = "…";
const CLEAR_LINE: &str = "\r\x1b[2K";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShellError {
    #[snafu(display(
        "no API key configured on `{stage}`; set MURMUR_API_KEY or `api_key` in the settings file"
    ))]
    MissingCredential { stage: &'static str },
    #[snafu(display("failed to create completion client on `{stage}`: {source}"))]
    CreateClient {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Renders the conversation as plain lines; the reply line is rewritten in place.
pub struct TerminalSurface<W: Write> {
    out: W,
    reply_open: bool,
}

impl TerminalSurface<std::io::Stdout> {
    /// Creates a surface writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalSurface<W> {
    /// Creates a surface writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            reply_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(error) = result {
            tracing::warn!(%error, "failed to write to terminal");
        }
    }
}

impl<W: Write> DisplaySurface for TerminalSurface<W> {
    fn show_user_message(&mut self, text: &str) {
        self.write(&format!("{USER_PREFIX}{text}\n"));
    }

    fn show_pending_reply(&mut self) {
        self.reply_open = true;
        self.write(&format!("{ASSISTANT_PREFIX}{PENDING_TEXT}"));
    }

    fn start_reply(&mut self) {
        self.reply_open = true;
        self.write(&format!("{CLEAR_LINE}{ASSISTANT_PREFIX}"));
    }

    fn append_reply(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.write(ch.encode_utf8(&mut buf));
    }

    fn replace_reply(&mut self, text: &str) {
        self.reply_open = true;
        self.write(&format!("{CLEAR_LINE}{ASSISTANT_PREFIX}{text}"));
    }

    fn end_reply(&mut self) {
        if std::mem::take(&mut self.reply_open) {
            self.write("\n");
        }
    }

    // The terminal always shows its newest line.
    fn scroll_to_bottom(&mut self) {}
}

/// Runs the terminal conversation until stdin closes.
///
/// A line read while idle is submitted; any line read during a cycle stops it. After
/// end of input the active cycle, if any, is allowed to finish.
pub async fn run(settings: AppSettings) -> Result<(), ShellError> {
    let endpoint = settings
        .to_endpoint_config()
        .context(MissingCredentialSnafu {
            stage: "resolve-credential",
        })?;
    let client = murmur_llm::create_client(endpoint, settings.to_completion_config()).context(
        CreateClientSnafu {
            stage: "create-completion-client",
        },
    )?;

    let animator = RevealAnimator::new(Arc::new(TokioClock), settings.char_delay());
    let (mut controller, mut events) = ConversationController::new(
        Arc::new(client),
        animator,
        TerminalSurface::stdout(),
        settings.controller_options(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(event) = events.recv() => controller.handle_event(event),
            line = lines.next_line() => {
                let line = line.context(ReadInputSnafu { stage: "read-stdin-line" })?;
                let Some(line) = line else {
                    break;
                };
                let action = controller.toggle(&line);
                tracing::debug!(?action, "input handled");
            }
        }
    }

    while !controller.session().is_idle() {
        let Some(event) = events.recv().await else {
            break;
        };
        controller.handle_event(event);
    }

    tracing::debug!(messages = controller.messages().len(), "input closed; exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(surface: TerminalSurface<Vec<u8>>) -> String {
        String::from_utf8(surface.into_inner()).expect("utf-8 output")
    }

    #[test]
    fn revealed_reply_replaces_the_placeholder() {
        let mut surface = TerminalSurface::new(Vec::new());

        surface.show_user_message("Hello");
        surface.show_pending_reply();
        surface.start_reply();
        for ch in "Hé".chars() {
            surface.append_reply(ch);
        }
        surface.end_reply();

        assert_eq!(
            rendered(surface),
            format!("you: Hello\nassistant: …{CLEAR_LINE}assistant: Hé\n")
        );
    }

    #[test]
    fn reply_line_is_closed_once() {
        let mut surface = TerminalSurface::new(Vec::new());

        surface.show_pending_reply();
        surface.replace_reply("rate limited");
        surface.end_reply();
        surface.end_reply();

        assert_eq!(
            rendered(surface),
            format!("assistant: …{CLEAR_LINE}assistant: rate limited\n")
        );
    }

    #[tokio::test]
    async fn run_without_credential_fails_before_reading_input() {
        let error = run(AppSettings::default())
            .await
            .expect_err("credential required");

        assert!(matches!(
            error,
            ShellError::MissingCredential {
                stage: "resolve-credential"
            }
        ));
    }
}
