//! Address translation between the canonical and vendor namespaces.
//!
//! Translation is literal substring replacement over raw text, so the same
//! table applies to URLs and JSON bodies alike. Rules are applied one after
//! the other in the order they were declared; a later rule sees the output
//! of the earlier ones.

use serde::{Deserialize, Serialize};

/// A single (pattern, replacement) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRule {
    /// Literal text to look for
    pub pattern: String,
    /// Text substituted for every occurrence
    pub replacement: String,
}

impl TranslationRule {
    /// Create a new rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// The rule with pattern and replacement swapped.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self::new(self.replacement.clone(), self.pattern.clone())
    }
}

/// Bidirectional translator with one ordered table per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTranslator {
    southbound: Vec<TranslationRule>,
    northbound: Vec<TranslationRule>,
}

impl AddressTranslator {
    /// Create a translator from explicit tables.
    #[must_use]
    pub fn new(southbound: Vec<TranslationRule>, northbound: Vec<TranslationRule>) -> Self {
        Self {
            southbound,
            northbound,
        }
    }

    /// Create a translator whose northbound table undoes the southbound one.
    ///
    /// The inverse rules run in reverse order.
    #[must_use]
    pub fn with_inverse(southbound: Vec<TranslationRule>) -> Self {
        let northbound = southbound.iter().rev().map(TranslationRule::inverted).collect();
        Self::new(southbound, northbound)
    }

    /// Canonical-to-vendor table.
    #[must_use]
    pub fn southbound_rules(&self) -> &[TranslationRule] {
        &self.southbound
    }

    /// Vendor-to-canonical table.
    #[must_use]
    pub fn northbound_rules(&self) -> &[TranslationRule] {
        &self.northbound
    }

    /// Translate text headed for a device.
    #[must_use]
    pub fn to_southbound(&self, text: &str) -> String {
        apply(&self.southbound, text)
    }

    /// Translate text headed for the aggregator.
    #[must_use]
    pub fn to_northbound(&self, text: &str) -> String {
        apply(&self.northbound, text)
    }

    /// Translate a raw body headed for a device.
    ///
    /// Bodies that are not UTF-8 are passed through unchanged.
    #[must_use]
    pub fn to_southbound_bytes(&self, body: &[u8]) -> Vec<u8> {
        apply_bytes(&self.southbound, body)
    }

    /// Translate a raw body headed for the aggregator.
    ///
    /// Bodies that are not UTF-8 are passed through unchanged.
    #[must_use]
    pub fn to_northbound_bytes(&self, body: &[u8]) -> Vec<u8> {
        apply_bytes(&self.northbound, body)
    }
}

fn apply_bytes(rules: &[TranslationRule], body: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(body) {
        Ok(text) => apply(rules, text).into_bytes(),
        Err(_) => body.to_vec(),
    }
}

fn apply(rules: &[TranslationRule], text: &str) -> String {
    rules
        .iter()
        .filter(|rule| !rule.pattern.is_empty())
        .fold(text.to_string(), |acc, rule| {
            acc.replace(&rule.pattern, &rule.replacement)
        })
}

/// Parse a rule table from JSON.
///
/// Accepts either a list of pairs (`[["ODIM", "redfish"]]`) or a list of
/// objects (`[{"pattern": "ODIM", "replacement": "redfish"}]`).
///
/// # Errors
///
/// Returns error if the JSON is malformed or a rule has an empty pattern.
pub fn parse_rules(json: &str) -> Result<Vec<TranslationRule>, TranslationError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRule {
        Pair(String, String),
        Rule(TranslationRule),
    }

    let raw: Vec<RawRule> =
        serde_json::from_str(json).map_err(|e| TranslationError::Parse(e.to_string()))?;

    raw.into_iter()
        .enumerate()
        .map(|(index, rule)| {
            let rule = match rule {
                RawRule::Pair(pattern, replacement) => TranslationRule::new(pattern, replacement),
                RawRule::Rule(rule) => rule,
            };
            if rule.pattern.is_empty() {
                return Err(TranslationError::EmptyPattern(index));
            }
            Ok(rule)
        })
        .collect()
}

/// Errors that can occur loading translation rules.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslationError {
    /// Rule table is not valid JSON
    #[error("invalid translation table: {0}")]
    Parse(String),
    /// A rule would match everywhere
    #[error("translation rule {0} has an empty pattern")]
    EmptyPattern(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odim() -> AddressTranslator {
        AddressTranslator::new(
            vec![TranslationRule::new("ODIM", "redfish")],
            vec![TranslationRule::new("redfish", "ODIM")],
        )
    }

    #[test]
    fn replaces_every_occurrence() {
        let translator = odim();
        let body = r#"{"@odata.id": "/ODIM/v1/Systems/1", "Links": ["/ODIM/v1/Chassis/1"]}"#;

        assert_eq!(
            translator.to_southbound(body),
            r#"{"@odata.id": "/redfish/v1/Systems/1", "Links": ["/redfish/v1/Chassis/1"]}"#
        );
    }

    #[test]
    fn non_utf8_bodies_pass_through() {
        let translator = odim();
        let body = b"redfish\xff\xfe/redfish/v1".to_vec();

        assert_eq!(translator.to_northbound_bytes(&body), body);
        assert_eq!(translator.to_southbound_bytes(&body), body);
        assert_eq!(translator.to_northbound_bytes(b"/redfish/v1"), b"/ODIM/v1");
    }

    #[test]
    fn translation_round_trips_mapped_segments() {
        let translator = odim();
        for text in ["/ODIM/v1", "/ODIM/v1/Systems/ODIM", "", "/ODIM/v1/EventService"] {
            let south = translator.to_southbound(text);
            assert_eq!(translator.to_northbound(&south), text);
        }
    }

    #[test]
    fn rules_apply_in_declared_order() {
        let forward = AddressTranslator::new(
            vec![
                TranslationRule::new("/ODIM/v1", "/redfish/v1"),
                TranslationRule::new("/redfish/v1/Systems", "/redfish/v1/ComputerSystems"),
            ],
            Vec::new(),
        );
        assert_eq!(
            forward.to_southbound("/ODIM/v1/Systems/1"),
            "/redfish/v1/ComputerSystems/1"
        );

        let reversed = AddressTranslator::new(
            vec![
                TranslationRule::new("/redfish/v1/Systems", "/redfish/v1/ComputerSystems"),
                TranslationRule::new("/ODIM/v1", "/redfish/v1"),
            ],
            Vec::new(),
        );
        assert_eq!(reversed.to_southbound("/ODIM/v1/Systems/1"), "/redfish/v1/Systems/1");
    }

    #[test]
    fn inverse_table_undoes_southbound() {
        let translator = AddressTranslator::with_inverse(vec![
            TranslationRule::new("/ODIM/v1", "/redfish/v1"),
            TranslationRule::new("Oem/Odim", "Oem/Vendor"),
        ]);
        let text = "/ODIM/v1/Managers/1/Oem/Odim";
        assert_eq!(
            translator.to_northbound(&translator.to_southbound(text)),
            text
        );
    }

    #[test]
    fn empty_pattern_is_ignored() {
        let translator = AddressTranslator::new(vec![TranslationRule::new("", "x")], Vec::new());
        assert_eq!(translator.to_southbound("abc"), "abc");
    }

    #[test]
    fn parse_rules_accepts_pairs_and_objects() {
        let rules = parse_rules(r#"[["ODIM", "redfish"], {"pattern": "a", "replacement": "b"}]"#)
            .unwrap();
        assert_eq!(
            rules,
            vec![
                TranslationRule::new("ODIM", "redfish"),
                TranslationRule::new("a", "b")
            ]
        );
    }

    #[test]
    fn parse_rules_rejects_empty_pattern() {
        let result = parse_rules(r#"[["", "redfish"]]"#);
        assert!(matches!(result, Err(TranslationError::EmptyPattern(0))));
    }
}
