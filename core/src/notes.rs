//! Decoding of the structured markers embedded in a booking's free-text notes
//!
//! Two markers are recognised:
//!
//! - `[ADDITIONAL_SERVICES:id:qty,id:qty,...]` - add-on selections
//! - `[COUPON_CODE:code]` - a coupon applied through the notes channel
//!
//! Decoding happens once, in [`crate::booking::normalize_booking`]; the rest
//! of the core works on the decoded fields.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ADDITIONAL_SERVICES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[ADDITIONAL_SERVICES:([^\]]*)\]").ok());

static COUPON_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[COUPON_CODE:([^\]]*)\]").ok());

/// One add-on selection: which catalog service, and how many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelection {
    /// Catalog service id
    pub service_id: i64,
    /// Requested quantity (always positive)
    pub quantity: u32,
}

/// Parse the additional-services marker
///
/// Entries with a non-numeric id or a non-positive quantity are discarded.
/// Repeated ids have their quantities summed, keeping first-seen order.
#[must_use]
pub fn parse_additional_services(notes: &str) -> Vec<ServiceSelection> {
    let Some(body) = ADDITIONAL_SERVICES
        .as_ref()
        .and_then(|re| re.captures(notes))
        .and_then(|caps| caps.get(1))
    else {
        return Vec::new();
    };

    let mut selections: Vec<ServiceSelection> = Vec::new();
    for entry in body.as_str().split(',') {
        let Some((id, qty)) = entry.trim().split_once(':') else {
            continue;
        };
        let (Ok(service_id), Ok(quantity)) = (id.trim().parse::<i64>(), qty.trim().parse::<i64>())
        else {
            continue;
        };
        let Ok(quantity) = u32::try_from(quantity) else {
            continue;
        };
        if quantity == 0 {
            continue;
        }
        match selections.iter_mut().find(|s| s.service_id == service_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => selections.push(ServiceSelection {
                service_id,
                quantity,
            }),
        }
    }
    selections
}

/// Parse the coupon-code marker; blank codes count as absent
#[must_use]
pub fn parse_coupon_code(notes: &str) -> Option<String> {
    COUPON_CODE
        .as_ref()?
        .captures(notes)?
        .get(1)
        .map(|code| code.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Remove any coupon-code marker, leaving the rest of the notes intact
#[must_use]
pub fn strip_coupon_marker(notes: &str) -> String {
    match COUPON_CODE.as_ref() {
        Some(re) => re.replace_all(notes, "").trim().to_string(),
        None => notes.to_string(),
    }
}

/// Encode selections back into the additional-services marker
#[must_use]
pub fn encode_additional_services(selections: &[ServiceSelection]) -> String {
    let body = selections
        .iter()
        .map(|s| format!("{}:{}", s.service_id, s.quantity))
        .collect::<Vec<_>>()
        .join(",");
    format!("[ADDITIONAL_SERVICES:{body}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_service_pairs() {
        let notes = "Window seat please [ADDITIONAL_SERVICES:5:2,9:1]";
        assert_eq!(
            parse_additional_services(notes),
            vec![
                ServiceSelection { service_id: 5, quantity: 2 },
                ServiceSelection { service_id: 9, quantity: 1 },
            ]
        );
    }

    #[test]
    fn drops_malformed_entries() {
        let notes = "[ADDITIONAL_SERVICES:abc:2,7:0,8:-1,9,10:x,11:3]";
        assert_eq!(
            parse_additional_services(notes),
            vec![ServiceSelection { service_id: 11, quantity: 3 }]
        );
    }

    #[test]
    fn sums_repeated_ids() {
        let notes = "[ADDITIONAL_SERVICES:5:2,5:3]";
        assert_eq!(
            parse_additional_services(notes),
            vec![ServiceSelection { service_id: 5, quantity: 5 }]
        );
    }

    #[test]
    fn missing_marker_yields_nothing() {
        assert!(parse_additional_services("no markers here").is_empty());
        assert_eq!(parse_coupon_code("no markers here"), None);
    }

    #[test]
    fn parses_coupon_code() {
        assert_eq!(
            parse_coupon_code("[ADDITIONAL_SERVICES:1:1] [COUPON_CODE: SUMMER10 ]"),
            Some("SUMMER10".to_string())
        );
        assert_eq!(parse_coupon_code("[COUPON_CODE:]"), None);
    }

    #[test]
    fn stripping_keeps_the_rest_of_the_notes() {
        let notes = "Late arrival [COUPON_CODE:OLD] [ADDITIONAL_SERVICES:5:1]";
        let stripped = strip_coupon_marker(notes);
        assert_eq!(stripped, "Late arrival  [ADDITIONAL_SERVICES:5:1]");
        assert_eq!(parse_coupon_code(&stripped), None);
        assert_eq!(parse_additional_services(&stripped).len(), 1);
    }

    proptest! {
        #[test]
        fn encoded_selections_parse_back(
            pairs in proptest::collection::btree_map(1i64..10_000, 1u32..50, 0..8)
        ) {
            let selections: Vec<ServiceSelection> = pairs
                .into_iter()
                .map(|(service_id, quantity)| ServiceSelection { service_id, quantity })
                .collect();
            let notes = format!("note {}", encode_additional_services(&selections));
            prop_assert_eq!(parse_additional_services(&notes), selections);
        }

        #[test]
        fn parsing_never_yields_zero_quantities(notes in ".*") {
            for selection in parse_additional_services(&notes) {
                prop_assert!(selection.quantity > 0);
            }
        }
    }
}
