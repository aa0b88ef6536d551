//! Inline keyboard layouts.

use pressroom_core::model::TextVariant;
use pressroom_core::sink::{Action, ActionRows};

use crate::commands::Command;

/// Keyboard under an item display showing `variant`. The toggle and edit
/// buttons act on the variant currently displayed; publish previews it.
pub fn item_keyboard(item_id: i64, variant: TextVariant) -> ActionRows {
    vec![
        vec![Action::new(
            "Markup on/off",
            Command::ToggleMarkup(item_id, variant).encode(),
        )],
        vec![
            Action::new("AI rewrite", Command::GenerateAi(item_id).encode()),
            Action::new("Edit", Command::Edit(item_id, variant).encode()),
        ],
        vec![
            Action::new("Publish", Command::Publish(item_id, variant).encode()),
            Action::new("Add to digest", Command::AddToDigest(item_id).encode()),
        ],
        vec![Action::new("Build digest", Command::BuildDigest.encode())],
    ]
}

/// Two-step publish confirmation for an item preview.
pub fn publish_confirm_keyboard(item_id: i64) -> ActionRows {
    vec![vec![
        Action::new("Publish", Command::ConfirmPublish(item_id).encode()),
        Action::new("Cancel", Command::CancelPublish(item_id).encode()),
    ]]
}

/// Keyboard under a digest display.
pub fn digest_keyboard(fingerprint: &str) -> ActionRows {
    vec![
        vec![Action::new(
            "Markup on/off",
            Command::DigestToggle(fingerprint.to_string()).encode(),
        )],
        vec![
            Action::new("Edit", Command::DigestEdit(fingerprint.to_string()).encode()),
            Action::new(
                "Publish",
                Command::DigestPublish(fingerprint.to_string()).encode(),
            ),
        ],
    ]
}

/// Two-step publish confirmation for a digest.
pub fn digest_confirm_keyboard(fingerprint: &str) -> ActionRows {
    vec![vec![
        Action::new(
            "Publish",
            Command::DigestConfirm(fingerprint.to_string()).encode(),
        ),
        Action::new(
            "Cancel",
            Command::DigestCancel(fingerprint.to_string()).encode(),
        ),
    ]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_keyboard_commands_parse_back() {
        let rows = item_keyboard(7, TextVariant::Ai);
        for action in rows.iter().flatten() {
            assert!(
                Command::parse(&action.command).is_some(),
                "unparseable command {}",
                action.command
            );
        }
    }

    #[test]
    fn test_item_keyboard_targets_displayed_variant() {
        let rows = item_keyboard(7, TextVariant::Edited);
        let toggle = &rows[0][0];
        assert_eq!(
            Command::parse(&toggle.command),
            Some(Command::ToggleMarkup(7, TextVariant::Edited))
        );
    }

    #[test]
    fn test_digest_keyboards_carry_fingerprint() {
        let rows = digest_keyboard("a1b2c3d4");
        assert_eq!(
            Command::parse(&rows[0][0].command),
            Some(Command::DigestToggle("a1b2c3d4".to_string()))
        );
        let confirm = digest_confirm_keyboard("a1b2c3d4");
        assert_eq!(
            Command::parse(&confirm[0][1].command),
            Some(Command::DigestCancel("a1b2c3d4".to_string()))
        );
    }
}
