use serde_json::{Map, Value};

use crate::fields::ShipmentField;
use crate::gate::mandatory_fields;
use crate::models::{Intent, ShipmentCase};

/// Fields forced into the missing list for license-type intents whenever
/// they are absent, whatever the classifier reported.
pub const FORCED_LICENSE_FIELDS: [ShipmentField; 3] = [
    ShipmentField::EndUse,
    ShipmentField::EndUserName,
    ShipmentField::CommodityDescription,
];

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn classify_intent_rules(text: &str) -> Intent {
    let lower = text.to_lowercase();

    if contains_any(
        &lower,
        &["update", "change", "refine", "correct the", "modify"],
    ) {
        return Intent::UpdateDetails;
    }

    let wants_screening = contains_any(
        &lower,
        &[
            "screen",
            "denied party",
            "restricted party",
            "entity list",
            "sdn",
            "sanction",
            "uflpa",
            "forced labor",
            "forced labour",
            "supplier",
        ],
    );
    let wants_license = contains_any(
        &lower,
        &[
            "license",
            "licence",
            "eccn",
            "export",
            "ship ",
            "shipping",
            "ear99",
            "exception",
        ],
    ) || looks_like_classification(text);

    match (wants_license, wants_screening) {
        (true, true) => Intent::FullCheck,
        (true, false) => Intent::LicenseCheck,
        (false, true) => Intent::Screening,
        (false, false) => Intent::GeneralQa,
    }
}

/// First token shaped like a control-list code: digit, category letter
/// A-E, three digits (e.g. `5A002`), or the EAR99 baseline.
pub fn find_classification_code(text: &str) -> Option<String> {
    text.split(|ch: char| !ch.is_ascii_alphanumeric())
        .map(str::to_uppercase)
        .find(|token| token == "EAR99" || is_control_code(token))
}

fn is_control_code(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 5
        && bytes[0].is_ascii_digit()
        && (b'A'..=b'E').contains(&bytes[1])
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

fn looks_like_classification(text: &str) -> bool {
    find_classification_code(text).is_some()
}

/// No-looping filter over the classifier's claimed missing fields.
///
/// Claimed names are mapped onto the schema (unknown names dropped), then
/// anything already present in the prior record or in the classifier's own
/// proposed updates is removed. The intent's mandatory fields are added
/// whenever absent, whatever the classifier claimed, and license-type
/// intents also get the forced fields. Output order: surviving claims,
/// then mandatory fields, then forced fields, no duplicates.
pub fn verify_missing_fields(
    intent: Intent,
    prior: &ShipmentCase,
    claimed: &[String],
    updates: &Map<String, Value>,
) -> Vec<ShipmentField> {
    let known = prior.merged(updates);
    let mut missing: Vec<ShipmentField> = Vec::new();

    for field in claimed.iter().filter_map(|name| ShipmentField::from_key(name)) {
        if !known.has(field) && !missing.contains(&field) {
            missing.push(field);
        }
    }

    for field in mandatory_fields(intent).iter().copied() {
        if !known.has(field) && !missing.contains(&field) {
            missing.push(field);
        }
    }

    if intent.requires_license() {
        for field in FORCED_LICENSE_FIELDS {
            if !known.has(field) && !missing.contains(&field) {
                missing.push(field);
            }
        }
    }

    missing
}

/// A bare license check with nothing left to ask for becomes a full check.
pub fn escalate_intent(intent: Intent, missing: &[ShipmentField]) -> Intent {
    if intent == Intent::LicenseCheck && missing.is_empty() {
        Intent::FullCheck
    } else {
        intent
    }
}

fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| input.contains(needle))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn claimed(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("  ship   5A002\n to  Germany "), "ship 5A002 to Germany");
    }

    #[test]
    fn classifies_compliance_requests() {
        assert_eq!(classify_intent_rules("Do I need a license for 5A002?"), Intent::LicenseCheck);
        assert_eq!(classify_intent_rules("Screen Huawei against the entity list"), Intent::Screening);
        assert_eq!(
            classify_intent_rules("Export 6A003 to China and screen the supplier"),
            Intent::FullCheck
        );
        assert_eq!(classify_intent_rules("Change the value to 900"), Intent::UpdateDetails);
        assert_eq!(classify_intent_rules("What is the EAR?"), Intent::GeneralQa);
    }

    #[test]
    fn finds_classification_tokens() {
        assert_eq!(find_classification_code("is 5a002 ok?").as_deref(), Some("5A002"));
        assert_eq!(find_classification_code("item is EAR99").as_deref(), Some("EAR99"));
        assert_eq!(find_classification_code("order 12345 shipped"), None);
    }

    #[test]
    fn present_fields_are_never_re_requested() {
        let prior = ShipmentCase::from_context(&map(json!({"destination": "Germany"})));
        let missing = verify_missing_fields(
            Intent::Screening,
            &prior,
            &claimed(&["destination", "destination_country", "eccn", "value"]),
            &map(json!({"value": 1200})),
        );
        assert_eq!(missing, vec![ShipmentField::Eccn, ShipmentField::EndUserName]);
    }

    #[test]
    fn mandatory_fields_are_checked_without_a_claim() {
        let prior = ShipmentCase::from_context(&map(json!({
            "destination": "Germany",
            "end_use": "research",
            "end_user_name": "Siemens",
            "commodity_description": "Thermal cameras"
        })));
        let missing = verify_missing_fields(Intent::LicenseCheck, &prior, &[], &Map::new());
        assert_eq!(missing, vec![ShipmentField::Eccn]);
        assert_eq!(escalate_intent(Intent::LicenseCheck, &missing), Intent::LicenseCheck);

        let screening = verify_missing_fields(Intent::Screening, &ShipmentCase::default(), &[], &Map::new());
        assert_eq!(screening, vec![ShipmentField::EndUserName]);
    }

    #[test]
    fn license_intents_force_extended_fields() {
        let prior = ShipmentCase::from_context(&map(json!({
            "eccn": "5A002",
            "destination": "Germany",
            "end_use": "research"
        })));
        let missing = verify_missing_fields(Intent::LicenseCheck, &prior, &[], &Map::new());
        assert_eq!(
            missing,
            vec![ShipmentField::EndUserName, ShipmentField::CommodityDescription]
        );

        let qa = verify_missing_fields(Intent::GeneralQa, &prior, &[], &Map::new());
        assert!(qa.is_empty());
    }

    #[test]
    fn unknown_claims_are_dropped() {
        let missing = verify_missing_fields(
            Intent::Screening,
            &ShipmentCase::default(),
            &claimed(&["favourite_colour", "endUserName", "end_user_name"]),
            &Map::new(),
        );
        assert_eq!(missing, vec![ShipmentField::EndUserName]);
    }

    #[test]
    fn complete_license_check_escalates() {
        assert_eq!(escalate_intent(Intent::LicenseCheck, &[]), Intent::FullCheck);
        assert_eq!(
            escalate_intent(Intent::LicenseCheck, &[ShipmentField::Eccn]),
            Intent::LicenseCheck
        );
        assert_eq!(escalate_intent(Intent::Screening, &[]), Intent::Screening);
    }
}
