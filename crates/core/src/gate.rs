//! Mandatory-field gate: picks which of the three response paths a turn
//! takes.
//!
//! | blocked by missing / update request | critical risk | intent     | path    |
//! |-------------------------------------|---------------|------------|---------|
//! | yes                                 | no            | any        | Blocked |
//! | any                                 | yes           | any        | Verdict |
//! | no                                  | no            | not QA     | Verdict |
//! | no                                  | no            | general_qa | Qa      |

use serde::{Deserialize, Serialize};

use crate::fields::ShipmentField;
use crate::models::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePath {
    /// Missing mandatory data; `refine` marks an explicit update request.
    Blocked { refine: bool },
    Verdict,
    Qa,
}

pub fn mandatory_fields(intent: Intent) -> &'static [ShipmentField] {
    match intent {
        Intent::LicenseCheck | Intent::FullCheck => {
            &[ShipmentField::Eccn, ShipmentField::Destination]
        }
        Intent::Screening => &[ShipmentField::EndUserName],
        Intent::GeneralQa | Intent::UpdateDetails => &[],
    }
}

pub fn blocked_by_missing(intent: Intent, missing: &[ShipmentField]) -> bool {
    mandatory_fields(intent)
        .iter()
        .any(|field| missing.contains(field))
}

/// `critical` is true when any screening produced a blocking match; it
/// overrides the gate.
pub fn decide(intent: Intent, missing: &[ShipmentField], critical: bool) -> ResponsePath {
    let blocked = blocked_by_missing(intent, missing);
    let refine = intent == Intent::UpdateDetails;

    if (blocked || refine) && !critical {
        ResponsePath::Blocked { refine }
    } else if (intent != Intent::GeneralQa && !blocked) || critical {
        ResponsePath::Verdict
    } else {
        ResponsePath::Qa
    }
}
