//! Turns core [`Outcome`]s into Discord messages.
//!
//! Action buttons carry [`Action::id`](crate::core::outcome::Action::id) as their custom
//! id so presses come back through the component handler; link buttons open the payment
//! page directly.

use crate::core::outcome::{Button, Outcome, OutcomeKind};
use poise::{
    CreateReply,
    serenity_prelude::{
        ButtonStyle, CreateActionRow, CreateAttachment, CreateButton,
        CreateInteractionResponseFollowup, CreateMessage,
    },
};

/// Discord allows five buttons per row and five rows per message.
const BUTTONS_PER_ROW: usize = 5;
const MAX_ROWS: usize = 5;

fn button(button: &Button, kind: OutcomeKind) -> CreateButton {
    match button {
        Button::Action { label, action } => {
            let style = match (kind, action.id().as_str()) {
                (_, "fit:cancel") => ButtonStyle::Danger,
                (OutcomeKind::Prompt, "fit:confirm") | (OutcomeKind::Shop, _) => {
                    ButtonStyle::Success
                }
                _ => ButtonStyle::Primary,
            };
            CreateButton::new(action.id()).label(label).style(style)
        }
        Button::Link { label, url } => CreateButton::new_link(url).label(label),
    }
}

/// Keyboard rows for an outcome; empty when it has no buttons.
#[must_use]
pub fn components(outcome: &Outcome) -> Vec<CreateActionRow> {
    outcome
        .keyboard
        .chunks(BUTTONS_PER_ROW)
        .take(MAX_ROWS)
        .map(|row| CreateActionRow::Buttons(row.iter().map(|b| button(b, outcome.kind)).collect()))
        .collect()
}

fn attachment(outcome: &Outcome) -> Option<CreateAttachment> {
    outcome
        .media
        .as_ref()
        .map(|media| CreateAttachment::bytes(media.bytes.clone(), media.file_name.clone()))
}

/// Reply to a slash or prefix command.
#[must_use]
pub fn reply(outcome: &Outcome) -> CreateReply {
    let mut reply = CreateReply::default()
        .content(outcome.text.clone())
        .components(components(outcome));
    if let Some(file) = attachment(outcome) {
        reply = reply.attachment(file);
    }
    reply
}

/// Follow-up to a deferred button press.
#[must_use]
pub fn followup(outcome: &Outcome) -> CreateInteractionResponseFollowup {
    let mut message = CreateInteractionResponseFollowup::new()
        .content(outcome.text.clone())
        .components(components(outcome));
    if let Some(file) = attachment(outcome) {
        message = message.add_file(file);
    }
    message
}

/// Plain channel message, used when answering uploaded photos.
#[must_use]
pub fn message(outcome: &Outcome) -> CreateMessage {
    let mut message = CreateMessage::new()
        .content(outcome.text.clone())
        .components(components(outcome));
    if let Some(file) = attachment(outcome) {
        message = message.add_file(file);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::Action;

    #[test]
    fn test_keyboard_is_split_into_rows() {
        let mut outcome = Outcome::new(OutcomeKind::Shop, "Pick a package");
        for label in ["a", "b", "c", "d", "e", "f", "g"] {
            outcome = outcome.with_action(label, Action::Buy(label.to_string()));
        }
        assert_eq!(components(&outcome).len(), 2);
        assert!(components(&Outcome::new(OutcomeKind::Info, "hi")).is_empty());
    }
}
