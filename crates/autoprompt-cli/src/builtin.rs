//! Built-in patterns for Claude Code style permission dialogs.

use autoprompt_core::error::PatternError;
use autoprompt_core::pattern::{PatternKind, PatternMatcher, PatternSpec};
use autoprompt_core::response::{Response, ResponsePayload};

/// Engine variable that switches edit prompts to "allow all edits this session".
pub const ACCEPT_EDITS_FOR_SESSION: &str = "accept_edits_for_session";

const PROMPT_TRIGGER: &str = "Do you want";

pub fn builtin_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec::new(
            "edit-file",
            ["Do you want to make this edit to {{ fileName }}?", "❯ 1. Yes"],
        )
        .with_title("Edit file")
        .with_trigger(PROMPT_TRIGGER)
        .with_kind(PatternKind::Prompt)
        .with_response(Response::computed(|ctx| {
            let choice = match ctx.engine.var(ACCEPT_EDITS_FOR_SESSION) {
                Some("true") => "2",
                _ => "1",
            };
            Ok(Some(ResponsePayload::from(choice)))
        })),
        PatternSpec::new(
            "create-file",
            ["Do you want to create {{ fileName }}?", "❯ 1. Yes"],
        )
        .with_title("Create file")
        .with_trigger(PROMPT_TRIGGER)
        .with_kind(PatternKind::Prompt)
        .with_response(Response::Literal("1".into())),
        PatternSpec::new(
            "bash-command",
            ["Bash command", "Do you want to proceed?", "❯ 1. Yes"],
        )
        .with_title("Run command")
        .with_trigger(PROMPT_TRIGGER)
        .with_kind(PatternKind::Prompt)
        .with_response(Response::Literal("1".into())),
        PatternSpec::new("turn-complete", ["✻ {{ verb }} for {{ elapsed }}"])
            .with_title("Turn complete")
            .with_trigger("✻")
            .with_kind(PatternKind::Completion),
    ]
}

pub fn register_builtins(matcher: &mut PatternMatcher) -> Result<(), PatternError> {
    for spec in builtin_patterns() {
        matcher.add_pattern(spec)?;
    }
    Ok(())
}
