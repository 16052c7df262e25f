//! Row identity: stable UUIDs plus the composite-key fallback.
//!
//! Every emitted row carries a random 128-bit UUID written to the hidden
//! workbook column and to the store. When a row comes back without one (old
//! report, pasted rows), the normalized composite key re-binds it to its
//! history.

use uuid::Uuid;

use crate::types::FindingType;

/// Mint a fresh row identifier. Used once per emitted row.
pub fn new_row_uuid() -> Uuid {
    Uuid::new_v4()
}

/// 8-character hex derivative for display surfaces that cannot afford the
/// full identifier (console tables, action descriptions).
pub fn short_uuid(uuid: &Uuid) -> String {
    uuid.simple().to_string()[..8].to_string()
}

/// Strip decorative glyphs (status emoji, bullet markers) from the ends of a
/// presented value before keying. Interior characters are untouched:
/// `BUILTIN\Administrators` and `##MS_PolicyEventProcessingLogin##` survive.
pub fn strip_icons(raw: &str) -> &str {
    raw.trim_matches(|c: char| !(c.is_ascii_graphic() || c.is_alphanumeric()))
        .trim()
}

/// Normalize one key segment: trim, strip decorative glyphs, lowercase.
pub fn normalize_part(raw: &str) -> String {
    strip_icons(raw).trim().to_lowercase()
}

/// Compose the canonical fallback key: `{type}|{part}|{part}|...`.
///
/// Empty parts are preserved as empty segments so the segment count for a
/// finding type is stable.
pub fn compose_key(finding_type: FindingType, parts: &[&str]) -> String {
    let mut key = String::from(finding_type.as_str());
    for part in parts {
        key.push('|');
        key.push_str(&normalize_part(part));
    }
    key
}

/// Normalize a key that arrived from outside (workbook cell, old store row)
/// for comparison against composed keys.
pub fn normalize_key(key: &str) -> String {
    key.split('|')
        .map(normalize_part)
        .collect::<Vec<_>>()
        .join("|")
}

/// Canonical `server|instance` reference used for the scanned-instance set.
pub fn instance_ref(server: &str, instance: &str) -> String {
    format!("{}|{}", normalize_part(server), normalize_part(instance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_is_eight_hex_chars() {
        let id = new_row_uuid();
        let short = short_uuid(&id);
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn compose_key_lowercases_and_joins() {
        let key = compose_key(FindingType::Config, &["SRV1", "DEFAULT", "xp_cmdshell"]);
        assert_eq!(key, "config|srv1|default|xp_cmdshell");
    }

    #[test]
    fn compose_key_preserves_empty_segments() {
        let key = compose_key(
            FindingType::Permission,
            &["srv1", "def", "server", "", "public", "CONNECT SQL", "endpoint"],
        );
        assert_eq!(key.split('|').count(), 8);
        assert_eq!(key, "permission|srv1|def|server||public|connect sql|endpoint");
    }

    #[test]
    fn icons_are_stripped_from_ends_only() {
        assert_eq!(strip_icons("✅ sa"), "sa");
        assert_eq!(strip_icons("⚠️ xp_cmdshell ❌"), "xp_cmdshell");
        assert_eq!(normalize_part("  BUILTIN\\Administrators "), "builtin\\administrators");
        assert_eq!(normalize_part("##MS_Agent##"), "##ms_agent##");
    }

    #[test]
    fn normalize_key_matches_composed() {
        let composed = compose_key(FindingType::Login, &["Srv1", "DEFAULT", "App_Reader"]);
        assert_eq!(normalize_key("LOGIN|SRV1|default|app_reader"), composed);
    }

    #[test]
    fn instance_ref_is_stable() {
        assert_eq!(instance_ref("SRV1", "Default"), "srv1|default");
    }
}
