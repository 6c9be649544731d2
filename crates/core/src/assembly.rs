//! Turns a gated decision plus engine output into the ordered message
//! blocks the presentation layer renders.

use serde_json::{json, Value};

use crate::dispatch::{ToolResults, DPS_MISSING_REASON, UFLPA_MISSING_REASON};
use crate::fields::ShipmentField;
use crate::gate::{self, ResponsePath};
use crate::models::{
    AgentMessage, ForcedLaborTier, Intent, LicenseResult, LicenseStatus, MessageKind, Mood,
    RiskLevel, ScreeningEngine, ScreeningOutcome, ScreeningResult, ShipmentCase,
};

pub const QA_FALLBACK: &str = "I cannot answer that.";
pub const BLOCKED_SUMMARY: &str =
    "**I can run the full export compliance assessment. A few key details are missing.**";
pub const REFINE_SUMMARY: &str = "**Sure, let's update the assessment details.**";
pub const VERDICT_SUMMARY: &str = "**Full assessment complete.** Here is the compliance breakdown.";

const DEFAULT_OPTIONAL_FIELDS: [ShipmentField; 4] = [
    ShipmentField::Value,
    ShipmentField::EndUse,
    ShipmentField::EndUserName,
    ShipmentField::CommodityDescription,
];

const URL_CCL: &str =
    "https://www.ecfr.gov/current/title-15/subtitle-B/chapter-VII/subchapter-C/part-774/supplement-no.-1";
const URL_COUNTRY_GROUPS: &str =
    "https://www.ecfr.gov/current/title-15/subtitle-B/chapter-VII/subchapter-C/part-740/supplement-no.-1";
const URL_ENC: &str =
    "https://www.ecfr.gov/current/title-15/subtitle-B/chapter-VII/subchapter-C/part-740/section-740.17";
const URL_LICENSE_REQUIREMENTS: &str =
    "https://www.ecfr.gov/current/title-15/subtitle-B/chapter-VII/subchapter-C/part-738";
const URL_EXCEPTIONS: &str =
    "https://www.ecfr.gov/current/title-15/subtitle-B/chapter-VII/subchapter-C/part-740";
const URL_SCREENING_LIST: &str = "https://www.trade.gov/consolidated-screening-list";
const URL_UFLPA: &str = "https://www.dhs.gov/uflpa-entity-list";

/// Everything assembly needs to know about one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnFacts<'a> {
    pub intent: Intent,
    pub shipment: &'a ShipmentCase,
    pub missing: &'a [ShipmentField],
    pub tools: &'a ToolResults,
}

impl TurnFacts<'_> {
    pub fn path(&self) -> ResponsePath {
        gate::decide(self.intent, self.missing, self.tools.has_blocking_screening())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub path: ResponsePath,
    pub messages: Vec<AgentMessage>,
    pub mood: Mood,
}

/// Overall verdict shown on the verdict card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: &'static str,
    pub risk_level: RiskLevel,
}

impl Verdict {
    pub fn from_tools(tools: &ToolResults) -> Self {
        let license_status = tools.license.as_ref().map(|l| l.status);
        let uflpa_warning = tools
            .uflpa
            .as_ref()
            .is_some_and(|u| u.outcome == ScreeningOutcome::Warning);
        let party_review = tools.dps.as_ref().is_some_and(ScreeningResult::needs_review);

        let (status, risk_level) = if tools.has_blocking_screening() {
            ("BLOCKED", RiskLevel::Critical)
        } else if license_status == Some(LicenseStatus::Restricted) {
            ("RESTRICTED", RiskLevel::High)
        } else if uflpa_warning || party_review {
            ("WARNING", RiskLevel::High)
        } else if license_status == Some(LicenseStatus::Warning) {
            ("LICENSE_REQUIRED", RiskLevel::Medium)
        } else {
            ("CLEAN", RiskLevel::Low)
        };

        Self { status, risk_level }
    }

    pub fn mood(&self) -> Mood {
        match self.risk_level {
            RiskLevel::Critical => Mood::Danger,
            RiskLevel::Low => Mood::Success,
            _ => Mood::Warning,
        }
    }
}

/// Builds the block sequence for `facts.path()`. `qa_answer` is only read
/// on the Q&A path; `None` there yields the fixed fallback.
pub fn assemble(facts: &TurnFacts<'_>, qa_answer: Option<String>) -> Assembly {
    let path = facts.path();
    let mut messages = Vec::new();

    if let Some(chips) = confirmation_chips(facts.shipment) {
        messages.push(chips);
    }

    let mood = match path {
        ResponsePath::Blocked { refine } => {
            let summary = if refine { REFINE_SUMMARY } else { BLOCKED_SUMMARY };
            messages.push(AgentMessage::text(summary));
            messages.push(requirements_pack(facts, refine));
            Mood::Warning
        }
        ResponsePath::Verdict => {
            let verdict = Verdict::from_tools(facts.tools);
            messages.extend(verdict_blocks(facts, verdict));
            verdict.mood()
        }
        ResponsePath::Qa => {
            let answer = qa_answer
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| QA_FALLBACK.to_string());
            messages.push(AgentMessage::text(answer));
            Mood::Idle
        }
    };

    Assembly {
        path,
        messages,
        mood,
    }
}

fn confirmation_chips(shipment: &ShipmentCase) -> Option<AgentMessage> {
    let mut chips = Vec::new();
    let mut chip = |field: ShipmentField, label: String| {
        chips.push(json!({ "field": field.as_key(), "label": label, "status": "valid" }));
    };

    if shipment.has(ShipmentField::Eccn) {
        chip(ShipmentField::Eccn, format!("ECCN {}", shipment.eccn));
    }
    if shipment.has(ShipmentField::Destination) {
        chip(ShipmentField::Destination, format!("Dest: {}", shipment.destination));
    }
    if shipment.has(ShipmentField::Value) {
        chip(ShipmentField::Value, format!("Val: ${}", shipment.value));
    }
    if shipment.has(ShipmentField::EndUserName) {
        chip(ShipmentField::EndUserName, format!("End User: {}", shipment.end_user_name()));
    }
    if shipment.has(ShipmentField::SupplierName) {
        chip(ShipmentField::SupplierName, format!("Supplier: {}", shipment.supplier_name()));
    }
    if shipment.has(ShipmentField::CommodityDescription) {
        chip(
            ShipmentField::CommodityDescription,
            format!("Commodity: {}", shipment.commodity_description()),
        );
    }
    if shipment.has(ShipmentField::OriginCountry) {
        chip(ShipmentField::OriginCountry, format!("Origin: {}", shipment.origin_country()));
    }

    (!chips.is_empty())
        .then(|| AgentMessage::block(MessageKind::ConfirmationChips, json!({ "chips": chips })))
}

fn requirements_pack(facts: &TurnFacts<'_>, refine: bool) -> AgentMessage {
    let mandatory = gate::mandatory_fields(facts.intent);

    let mut fields = if facts.missing.is_empty() {
        DEFAULT_OPTIONAL_FIELDS.to_vec()
    } else {
        facts.missing.to_vec()
    };
    if refine && !fields.contains(&ShipmentField::Value) && !facts.shipment.has(ShipmentField::Value) {
        fields.insert(0, ShipmentField::Value);
    }

    let items = fields
        .iter()
        .map(|field| {
            json!({
                "field": field.as_key(),
                "label": field.label(),
                "required": mandatory.contains(field),
            })
        })
        .collect::<Vec<_>>();

    let title = if refine {
        "Refine Assessment Details"
    } else {
        "Additional Details Required"
    };

    AgentMessage::block(
        MessageKind::RequirementsPack,
        json!({
            "title": title,
            "missing_items": items,
            "mandatory": mandatory.iter().map(|f| f.as_key()).collect::<Vec<_>>(),
            "optional": refine,
        }),
    )
}

fn verdict_blocks(facts: &TurnFacts<'_>, verdict: Verdict) -> Vec<AgentMessage> {
    let shipment = facts.shipment;
    let tools = facts.tools;
    let mut blocks = vec![AgentMessage::text(VERDICT_SUMMARY)];

    blocks.push(AgentMessage::block(
        MessageKind::VerdictCard,
        json!({
            "status": verdict.status,
            "risk_level": verdict.risk_level,
            "summary": verdict_summary(shipment),
        }),
    ));

    if let Some(license) = tools.license.as_ref().filter(|l| !l.findings.is_empty()) {
        blocks.push(AgentMessage::block(
            MessageKind::ExceptionGrid,
            json!({ "exceptions": license.findings }),
        ));
    }

    blocks.push(risk_box(shipment, tools));

    if let Some(tip) = optimization_tip(facts.intent, facts.missing, verdict) {
        blocks.push(tip);
    }

    blocks.push(AgentMessage::block(
        MessageKind::LogicTrace,
        logic_trace(shipment, tools),
    ));
    blocks.push(AgentMessage::block(
        MessageKind::NextSteps,
        json!({ "actions": next_steps(tools) }),
    ));

    blocks
}

fn verdict_summary(shipment: &ShipmentCase) -> String {
    if shipment.has(ShipmentField::Destination) {
        format!("Shipment to {}", shipment.destination)
    } else if shipment.has(ShipmentField::EndUserName) {
        format!("Screening of {}", shipment.end_user_name())
    } else {
        "Shipment assessment".to_string()
    }
}

fn risk_box(shipment: &ShipmentCase, tools: &ToolResults) -> AgentMessage {
    let dps = tools.dps.clone().unwrap_or_else(|| {
        let reason = if shipment.has(ShipmentField::EndUserName) {
            "Screening unavailable for this request."
        } else {
            DPS_MISSING_REASON
        };
        ScreeningResult::unknown(ScreeningEngine::Dps, reason)
    });
    let uflpa = tools.uflpa.clone().unwrap_or_else(|| {
        let reason = if shipment.has_supply_chain_data() {
            "Traceability unavailable for this request."
        } else {
            UFLPA_MISSING_REASON
        };
        ScreeningResult::unknown(ScreeningEngine::Uflpa, reason)
    });

    let embargoed = tools
        .license
        .as_ref()
        .is_some_and(|l| l.details.country_groups.iter().any(|g| g == "E:1"));

    AgentMessage::block(
        MessageKind::RiskBox,
        json!({
            "dps": dps,
            "uflpa": uflpa,
            "sanctions": {
                "status": if embargoed { "EMBARGOED" } else { "CLEAR" },
                "country": shipment.destination,
            },
        }),
    )
}

fn optimization_tip(intent: Intent, missing: &[ShipmentField], verdict: Verdict) -> Option<AgentMessage> {
    if verdict.risk_level == RiskLevel::Critical {
        return None;
    }

    let mandatory = gate::mandatory_fields(intent);
    let optional = missing
        .iter()
        .filter(|field| !mandatory.contains(field) && !matches!(field, ShipmentField::Eccn | ShipmentField::Destination))
        .copied()
        .collect::<Vec<_>>();

    let tips = optional
        .iter()
        .filter_map(|field| match field {
            ShipmentField::Value => Some("Add Value to check LVS exception eligibility."),
            ShipmentField::EndUserName => Some("Add End User for restricted party screening."),
            ShipmentField::EndUse => Some("Add End Use to verify military/WHEE restrictions."),
            ShipmentField::CommodityDescription => {
                Some("Add Commodity description for forced-labor traceability.")
            }
            _ => None,
        })
        .collect::<Vec<_>>();

    if tips.is_empty() {
        return None;
    }

    Some(AgentMessage::block(
        MessageKind::OptimizationTip,
        json!({
            "missing_fields": optional.iter().map(|f| f.as_key()).collect::<Vec<_>>(),
            "tips": tips,
        }),
    ))
}

fn logic_trace(shipment: &ShipmentCase, tools: &ToolResults) -> Value {
    let mut steps = Vec::new();

    if shipment.has(ShipmentField::Eccn) {
        let citation = match shipment.eccn.chars().next() {
            Some(category) if category.is_ascii_digit() => format!("Category {category}"),
            _ => "Not on the CCL".to_string(),
        };
        steps.push(step(
            "1. Identification",
            format!("ECCN Identified as {}", shipment.eccn),
            &citation,
            URL_CCL,
        ));
    }

    if shipment.has(ShipmentField::Destination) {
        let groups = tools
            .license
            .as_ref()
            .map(|l| l.details.country_groups.join(", "))
            .filter(|groups| !groups.is_empty());
        let citation = match &groups {
            Some(groups) => format!("Country Group {groups}"),
            None => "Country Groups".to_string(),
        };
        steps.push(step(
            "2. Destination Control",
            format!("Destination: {}", shipment.destination),
            &citation,
            URL_COUNTRY_GROUPS,
        ));
    }

    if let Some(license) = &tools.license {
        steps.extend(license_steps(license));
    }

    if let Some(dps) = &tools.dps {
        let name = if shipment.has(ShipmentField::EndUserName) {
            shipment.end_user_name()
        } else {
            "Unknown"
        };
        steps.push(step(
            "5. Restricted Party Screening",
            format!("Screened '{name}': {}", outcome_text(dps)),
            "Consolidated Screening List",
            URL_SCREENING_LIST,
        ));
    }

    if let Some(uflpa) = &tools.uflpa {
        let detail = match uflpa.tier {
            Some(tier) if uflpa.outcome != ScreeningOutcome::Unknown => {
                format!("Forced-labor tier: {}", tier.as_code())
            }
            _ => format!("Forced-labor tier: {}", outcome_text(uflpa)),
        };
        steps.push(step(
            "6. Forced Labor Traceability",
            detail,
            "UFLPA Entity List",
            URL_UFLPA,
        ));
    }

    let engine_trace = tools
        .license
        .as_ref()
        .map(|l| l.trace.clone())
        .unwrap_or_default();

    json!({
        "title": "Compliance Logic Trace",
        "steps": steps,
        "engine_trace": engine_trace,
    })
}

fn license_steps(license: &LicenseResult) -> Vec<Value> {
    let status = match license.status {
        LicenseStatus::Clear => "CLEAR",
        LicenseStatus::Warning => "WARNING",
        LicenseStatus::Restricted => "RESTRICTED",
    };
    let (citation, url) = if license.has_code("ENC") {
        ("§740.17", URL_ENC)
    } else {
        ("§738.4", URL_LICENSE_REQUIREMENTS)
    };

    let mut steps = vec![step(
        "3. License Determination",
        format!("Status: {status}"),
        citation,
        url,
    )];

    if !license.findings.is_empty() {
        steps.push(step(
            "4. Exception Review",
            format!("Eligible for: [{}]", license.codes().join(", ")),
            "§740.x",
            URL_EXCEPTIONS,
        ));
    }

    steps
}

fn outcome_text(result: &ScreeningResult) -> &'static str {
    match result.outcome {
        ScreeningOutcome::Clear => "CLEAR",
        ScreeningOutcome::Match => "MATCH",
        ScreeningOutcome::Blocked => "BLOCKED",
        ScreeningOutcome::Warning => "WARNING",
        ScreeningOutcome::Unknown => "Skipped (Missing Data)",
    }
}

fn step(step: &str, detail: String, citation: &str, url: &str) -> Value {
    json!({ "step": step, "detail": detail, "citation": citation, "url": url })
}

fn next_steps(tools: &ToolResults) -> Vec<Value> {
    let mut actions = Vec::new();

    if tools.license.is_some() {
        actions.push(action("pdf", "Download PDF"));
        actions.push(action("email", "Email Summary"));
    }

    let blocked = tools
        .dps
        .iter()
        .chain(tools.uflpa.iter())
        .any(|s| s.outcome == ScreeningOutcome::Blocked);
    if blocked {
        actions.push(action("escalate", "Escalate to compliance officer"));
    }

    let elevated = tools
        .uflpa
        .as_ref()
        .and_then(|u| u.tier)
        .is_some_and(|tier| tier >= ForcedLaborTier::HighRisk);
    if elevated {
        actions.push(action("supply_chain_map", "Request supply-chain map"));
    }

    actions
}

fn action(kind: &str, label: &str) -> Value {
    json!({ "type": kind, "label": label })
}
