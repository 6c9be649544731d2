//! License determination: classification + destination + value + end-user
//! type in, status with findings and an audit trace out.
//!
//! Evaluation is purely computational. The trace records every step in the
//! order it ran and is returned verbatim.

use std::sync::Arc;

use crate::error::EngineError;
use crate::fields::sanitize_value;
use crate::models::{
    EndUserType, Finding, FindingKind, LicenseDetails, LicenseResult, LicenseStatus,
};
use crate::reference::{
    ClassificationEntry, CountryGroup, ExceptionCode, ReferenceTables, LVS_CAP_A1, LVS_CAP_B,
    LVS_DEFAULT_LIMIT,
};

const ENGINE: &str = "license";
const BASELINE_CODE: &str = "EAR99";
/// Values up to this multiple of the cap get a near-miss tip.
const LVS_NEAR_MISS_FACTOR: f64 = 1.2;

#[derive(Clone)]
pub struct LicenseEngine {
    tables: Arc<dyn ReferenceTables>,
}

struct Evaluation<'a> {
    destination: &'a str,
    value: f64,
    end_user_type: EndUserType,
    groups: &'a [CountryGroup],
    lvs_cap: f64,
}

impl Evaluation<'_> {
    fn in_group(&self, group: CountryGroup) -> bool {
        self.groups.contains(&group)
    }

    fn in_any(&self, groups: &[CountryGroup]) -> bool {
        groups.iter().any(|g| self.in_group(*g))
    }
}

enum Outcome {
    Eligible(Finding),
    Tip(Finding),
    Ineligible,
}

impl LicenseEngine {
    pub fn new(tables: Arc<dyn ReferenceTables>) -> Self {
        Self { tables }
    }

    pub fn evaluate(
        &self,
        eccn: &str,
        destination: &str,
        value: f64,
        end_user_type: EndUserType,
    ) -> Result<LicenseResult, EngineError> {
        let mut trace = Vec::new();
        let destination = destination.trim();
        let value = sanitize_value(value);
        let mut code = eccn.trim().to_uppercase();

        trace.push(format!("Analyzing ECCN: {code} for Destination: {destination}"));

        if code.is_empty() {
            code = BASELINE_CODE.to_string();
            trace.push("No ECCN provided. Treating as EAR99.".to_string());
        }

        let entry = self
            .tables
            .classification(&code)
            .map_err(EngineError::reference(ENGINE))?;
        if entry.is_none() {
            trace.push(format!(
                "ECCN {code} not found in database. Evaluating as potential catch-all."
            ));
        }

        let groups = self
            .tables
            .country_groups(destination)
            .map_err(EngineError::reference(ENGINE))?;
        trace.push(format!(
            "Country Groups for {destination}: [{}]",
            join_codes(groups.iter().map(|g| g.as_code()))
        ));

        let mut details = LicenseDetails {
            eccn: code.clone(),
            country_groups: groups.iter().map(|g| g.as_code().to_string()).collect(),
            ..LicenseDetails::default()
        };

        // Embargo wins over everything, including an unrecognized code.
        if groups.contains(&CountryGroup::E1) {
            trace.push("CRITICAL: Destination is embargoed (E:1).".to_string());
            return Ok(LicenseResult {
                status: LicenseStatus::Restricted,
                findings: vec![embargo_finding(destination)],
                trace,
                details,
            });
        }

        let Some(entry) = entry else {
            details.note = Some("ECCN not recognized.".to_string());
            return Ok(LicenseResult {
                status: LicenseStatus::Warning,
                findings: Vec::new(),
                trace,
                details,
            });
        };
        details.description = Some(entry.description.clone());
        details.controls = entry.controls.clone();

        trace.push(format!(
            "Available Exceptions for {code}: [{}]",
            join_codes(entry.exceptions.iter().map(|c| c.as_code()))
        ));

        let lvs_cap = lvs_cap(&entry, &groups);
        if entry.exceptions.contains(&ExceptionCode::Lvs) {
            details.lvs_limit = Some(lvs_cap);
        }

        let eval = Evaluation {
            destination,
            value,
            end_user_type,
            groups: &groups,
            lvs_cap,
        };

        let mut findings = Vec::new();
        for exception in entry.exceptions.iter().copied() {
            if exception == ExceptionCode::Nlr {
                continue;
            }
            match evaluate_exception(exception, &eval, &mut trace) {
                Outcome::Eligible(finding) | Outcome::Tip(finding) => findings.push(finding),
                Outcome::Ineligible => {}
            }
        }

        let granted = findings.iter().any(Finding::grants_export);
        if !granted && entry.exceptions.contains(&ExceptionCode::Nlr) {
            trace.push(format!("NLR: Eligible ({code})"));
            findings.push(nlr_finding(&code));
        }

        let status = if findings.iter().any(Finding::grants_export) {
            LicenseStatus::Clear
        } else {
            trace.push("No exceptions found. License likely required.".to_string());
            findings.push(license_required_finding(&code, destination));
            LicenseStatus::Warning
        };

        Ok(LicenseResult {
            status,
            findings,
            trace,
            details,
        })
    }
}

/// The classification's own limit (or the default), tightened by the
/// destination's group cap. A:1 takes precedence over B.
fn lvs_cap(entry: &ClassificationEntry, groups: &[CountryGroup]) -> f64 {
    let base = if entry.lvs_limit > 0.0 {
        entry.lvs_limit
    } else {
        LVS_DEFAULT_LIMIT
    };

    if groups.contains(&CountryGroup::A1) {
        base.min(LVS_CAP_A1)
    } else if groups.contains(&CountryGroup::B) {
        base.min(LVS_CAP_B)
    } else {
        base
    }
}

fn evaluate_exception(code: ExceptionCode, eval: &Evaluation<'_>, trace: &mut Vec<String>) -> Outcome {
    let destination = eval.destination;
    let high_sensitivity = [CountryGroup::D1, CountryGroup::E1];

    let eligible = |trace: &mut Vec<String>, reason: &str, justification: String, next_step: &str| {
        trace.push(format!("{code}: Eligible ({reason})"));
        Outcome::Eligible(exception_finding(code, justification, next_step))
    };
    let ineligible = |trace: &mut Vec<String>, reason: &str| {
        trace.push(format!("{code}: Not eligible ({reason})"));
        Outcome::Ineligible
    };

    match code {
        ExceptionCode::Lvs => {
            let cap = eval.lvs_cap;
            let value = eval.value;
            // The near-miss band yields a TIP for every destination; the
            // D:1/E:1 exclusion only withholds the exception itself.
            if value <= 0.0 {
                ineligible(trace, "no declared value")
            } else if value > cap && value <= cap * LVS_NEAR_MISS_FACTOR {
                trace.push(format!("LVS: Close Call (Value ${value} vs ${cap})"));
                Outcome::Tip(Finding {
                    kind: FindingKind::Tip,
                    code: "TIP".to_string(),
                    title: "Borderline LVS Value".to_string(),
                    justification: format!(
                        "Value ${value} is just above the ${cap} LVS limit for {destination}."
                    ),
                    caveats: vec!["Splitting a single order to fit the limit is not permitted.".to_string()],
                    next_step: "Verify valuation accuracy.".to_string(),
                    citation: Some(ExceptionCode::Lvs.citation().to_string()),
                })
            } else if eval.in_any(&high_sensitivity) {
                ineligible(trace, "destination in Country Group D:1/E:1")
            } else if value <= cap {
                eligible(
                    trace,
                    &format!("Value ${value} <= ${cap}"),
                    format!("Value ${value} is within the ${cap} limit for {destination}."),
                    "Record LVS on export documents.",
                )
            } else {
                ineligible(trace, &format!("Value ${value} exceeds ${cap}"))
            }
        }
        ExceptionCode::Gbs => {
            if eval.in_group(CountryGroup::B) {
                eligible(
                    trace,
                    "Group B Destination",
                    format!("{destination} is a Group B country."),
                    "Verify civil end-use.",
                )
            } else {
                ineligible(trace, "destination not in Country Group B")
            }
        }
        ExceptionCode::Civ => {
            if eval.in_group(CountryGroup::D1) && eval.end_user_type != EndUserType::Government {
                eligible(
                    trace,
                    "Civil End Use",
                    "Export to civil end-user in D:1 country.".to_string(),
                    "Obtain end-user statement.",
                )
            } else {
                ineligible(trace, "requires non-government end user in Country Group D:1")
            }
        }
        ExceptionCode::Tsr => {
            if eval.in_group(CountryGroup::B) {
                eligible(
                    trace,
                    "Group B Destination",
                    format!("{destination} is eligible as a Group B destination."),
                    "Obtain written assurance from consignee.",
                )
            } else {
                ineligible(trace, "destination not in Country Group B")
            }
        }
        ExceptionCode::App => {
            if eval.in_any(&[CountryGroup::A1, CountryGroup::B]) {
                eligible(
                    trace,
                    "Computer Adjusted Peak Performance",
                    "Performance is within APP limits for this destination.".to_string(),
                    "Verify CTP/APP calculation.",
                )
            } else {
                ineligible(trace, "destination not in Country Group A:1 or B")
            }
        }
        ExceptionCode::Tmp => {
            if eval.in_any(&high_sensitivity) {
                ineligible(trace, "destination in Country Group D:1/E:1")
            } else {
                trace.push("TMP: Potentially Eligible (User Intent Required)".to_string());
                let mut finding = exception_finding(
                    code,
                    "Eligible if item returns within 1 year.".to_string(),
                    "Ensure item is returned or destroyed.",
                );
                finding.caveats.push("Item must return within 1 year.".to_string());
                Outcome::Eligible(finding)
            }
        }
        ExceptionCode::Rpl => {
            trace.push("RPL: Potentially Eligible (Replacement Parts)".to_string());
            let mut finding = exception_finding(
                code,
                "Eligible for 1-for-1 replacement parts.".to_string(),
                "Match part to original export license.",
            );
            finding.caveats.push("Only for one-for-one replacement of previously exported items.".to_string());
            Outcome::Eligible(finding)
        }
        ExceptionCode::Gov => {
            if eval.end_user_type == EndUserType::Government || eval.in_group(CountryGroup::A1) {
                eligible(
                    trace,
                    "Government end user or cooperating government",
                    "Export to government entity or cooperating government.".to_string(),
                    "Verify agency eligibility.",
                )
            } else {
                ineligible(trace, "end user not Government and destination not in A:1")
            }
        }
        ExceptionCode::Enc => {
            if eval.in_any(&[CountryGroup::A1, CountryGroup::B])
                || eval.end_user_type == EndUserType::Commercial
            {
                eligible(
                    trace,
                    "Encryption",
                    "License Exception ENC available.".to_string(),
                    "File self-classification report.",
                )
            } else {
                ineligible(trace, "requires A:1/B destination or commercial end user")
            }
        }
        ExceptionCode::Sta => {
            if eval.in_group(CountryGroup::A1) {
                eligible(
                    trace,
                    "Strategic Trade Auth",
                    format!("{destination} is a key partner (A:1)."),
                    "Notify consignee of STA use.",
                )
            } else {
                ineligible(trace, "destination not in Country Group A:1")
            }
        }
        ExceptionCode::Nlr => Outcome::Ineligible,
    }
}

fn exception_finding(code: ExceptionCode, justification: String, next_step: &str) -> Finding {
    Finding {
        kind: FindingKind::Exception,
        code: code.as_code().to_string(),
        title: format!("{} ({})", code.title(), code.citation()),
        justification,
        caveats: Vec::new(),
        next_step: next_step.to_string(),
        citation: Some(code.citation().to_string()),
    }
}

fn nlr_finding(eccn: &str) -> Finding {
    Finding {
        kind: FindingKind::Nlr,
        code: ExceptionCode::Nlr.as_code().to_string(),
        title: ExceptionCode::Nlr.title().to_string(),
        justification: format!("Item is {eccn} and destination is not embargoed."),
        caveats: vec!["End-use and end-user prohibitions under Part 744 still apply.".to_string()],
        next_step: "NLR designator on export docs.".to_string(),
        citation: Some(ExceptionCode::Nlr.citation().to_string()),
    }
}

fn embargo_finding(destination: &str) -> Finding {
    Finding {
        kind: FindingKind::LicenseRequired,
        code: "EMBARGO".to_string(),
        title: "Embargoed Destination".to_string(),
        justification: format!("Exports to {destination} are generally prohibited."),
        caveats: Vec::new(),
        next_step: "Do NOT ship. Consult legal counsel.".to_string(),
        citation: Some("§746".to_string()),
    }
}

fn license_required_finding(eccn: &str, destination: &str) -> Finding {
    Finding {
        kind: FindingKind::LicenseRequired,
        code: "LIC_REQ".to_string(),
        title: "License Required".to_string(),
        justification: format!(
            "No applicable exceptions found for {eccn} to {destination}."
        ),
        caveats: Vec::new(),
        next_step: "Apply for BIS Export License.".to_string(),
        citation: Some("§738.4".to_string()),
    }
}

fn join_codes<'a>(codes: impl Iterator<Item = &'a str>) -> String {
    codes.collect::<Vec<_>>().join(", ")
}
