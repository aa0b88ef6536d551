//! Callback command vocabulary.
//!
//! Every inline button carries one of these commands as its callback data.
//! The encoding is a short colon-separated form (Telegram caps callback data
//! at 64 bytes); digest commands address batches by fingerprint, item
//! commands by store id.

use pressroom_core::model::TextVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GenerateAi(i64),
    ToggleMarkup(i64, TextVariant),
    Edit(i64, TextVariant),
    Publish(i64, TextVariant),
    ConfirmPublish(i64),
    CancelPublish(i64),
    AddToDigest(i64),
    BuildDigest,
    DigestToggle(String),
    DigestEdit(String),
    DigestPublish(String),
    DigestConfirm(String),
    DigestCancel(String),
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::GenerateAi(id) => format!("ai:{id}"),
            Command::ToggleMarkup(id, variant) => format!("tog:{id}:{}", variant_tag(*variant)),
            Command::Edit(id, variant) => format!("edit:{id}:{}", variant_tag(*variant)),
            Command::Publish(id, variant) => format!("pub:{id}:{}", variant_tag(*variant)),
            Command::ConfirmPublish(id) => format!("pubyes:{id}"),
            Command::CancelPublish(id) => format!("pubno:{id}"),
            Command::AddToDigest(id) => format!("dga:{id}"),
            Command::BuildDigest => "dgrun".to_string(),
            Command::DigestToggle(fp) => format!("dgtog:{fp}"),
            Command::DigestEdit(fp) => format!("dgedit:{fp}"),
            Command::DigestPublish(fp) => format!("dgpub:{fp}"),
            Command::DigestConfirm(fp) => format!("dgyes:{fp}"),
            Command::DigestCancel(fp) => format!("dgno:{fp}"),
        }
    }

    /// Parses callback data; unknown or malformed data yields `None` and the
    /// caller drops it silently.
    pub fn parse(data: &str) -> Option<Command> {
        let mut parts = data.splitn(3, ':');
        let head = parts.next()?;
        match head {
            "dgrun" => Some(Command::BuildDigest),
            "ai" => Some(Command::GenerateAi(parse_id(parts.next()?)?)),
            "tog" => Some(Command::ToggleMarkup(
                parse_id(parts.next()?)?,
                parse_variant(parts.next()?)?,
            )),
            "edit" => Some(Command::Edit(
                parse_id(parts.next()?)?,
                parse_variant(parts.next()?)?,
            )),
            "pub" => Some(Command::Publish(
                parse_id(parts.next()?)?,
                parse_variant(parts.next()?)?,
            )),
            "pubyes" => Some(Command::ConfirmPublish(parse_id(parts.next()?)?)),
            "pubno" => Some(Command::CancelPublish(parse_id(parts.next()?)?)),
            "dga" => Some(Command::AddToDigest(parse_id(parts.next()?)?)),
            "dgtog" => Some(Command::DigestToggle(parse_fingerprint(parts.next()?)?)),
            "dgedit" => Some(Command::DigestEdit(parse_fingerprint(parts.next()?)?)),
            "dgpub" => Some(Command::DigestPublish(parse_fingerprint(parts.next()?)?)),
            "dgyes" => Some(Command::DigestConfirm(parse_fingerprint(parts.next()?)?)),
            "dgno" => Some(Command::DigestCancel(parse_fingerprint(parts.next()?)?)),
            _ => None,
        }
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

fn parse_fingerprint(raw: &str) -> Option<String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(raw.to_string())
}

fn variant_tag(variant: TextVariant) -> &'static str {
    match variant {
        TextVariant::Raw => "raw",
        TextVariant::Ai => "ai",
        TextVariant::Edited => "ed",
    }
}

fn parse_variant(raw: &str) -> Option<TextVariant> {
    match raw {
        "raw" => Some(TextVariant::Raw),
        "ai" => Some(TextVariant::Ai),
        "ed" => Some(TextVariant::Edited),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_round_trip_through_encoding() {
        let commands = [
            Command::GenerateAi(42),
            Command::ToggleMarkup(42, TextVariant::Edited),
            Command::Edit(42, TextVariant::Ai),
            Command::Publish(42, TextVariant::Raw),
            Command::ConfirmPublish(42),
            Command::CancelPublish(42),
            Command::AddToDigest(42),
            Command::BuildDigest,
            Command::DigestToggle("a1b2c3d4".to_string()),
            Command::DigestEdit("a1b2c3d4".to_string()),
            Command::DigestPublish("a1b2c3d4".to_string()),
            Command::DigestConfirm("a1b2c3d4".to_string()),
            Command::DigestCancel("a1b2c3d4".to_string()),
        ];
        for command in commands {
            assert_eq!(Command::parse(&command.encode()), Some(command));
        }
    }

    #[test]
    fn test_malformed_data_parses_to_none() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("ai"), None);
        assert_eq!(Command::parse("ai:x"), None);
        assert_eq!(Command::parse("tog:5"), None);
        assert_eq!(Command::parse("tog:5:shouty"), None);
        assert_eq!(Command::parse("dgtog:"), None);
        assert_eq!(Command::parse("dgtog:nothex!"), None);
        assert_eq!(Command::parse("selfdestruct:1"), None);
    }

    #[test]
    fn test_encoding_stays_within_callback_data_limit() {
        let longest = Command::ToggleMarkup(i64::MAX, TextVariant::Edited).encode();
        assert!(longest.len() <= 64);
    }
}
