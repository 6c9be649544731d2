//! Forced-labor (UFLPA) supply-chain risk scoring.
//!
//! Three independent signals each contribute at most once:
//!
//! | signal    | weight                                 |
//! |-----------|----------------------------------------|
//! | entity    | 10                                     |
//! | region    | 5                                      |
//! | commodity | 2 when origin is a flagged country, else 1 |
//!
//! A score at or above the entity weight, or region and commodity together,
//! means seizure is likely.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{ForcedLaborTier, RiskLevel, ScreeningEngine, ScreeningOutcome, ScreeningResult};
use crate::reference::ReferenceTables;

const ENGINE: &str = "forced_labor";
const ENTITY_WEIGHT: u32 = 10;
const REGION_WEIGHT: u32 = 5;
const COMMODITY_WEIGHT: u32 = 1;
const COMMODITY_FLAGGED_ORIGIN_WEIGHT: u32 = 2;
const ELEVATED_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyChainInput {
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub commodity: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Signals {
    entity: bool,
    region: bool,
    commodity: bool,
}

#[derive(Clone)]
pub struct ForcedLaborScreener {
    tables: Arc<dyn ReferenceTables>,
}

impl ForcedLaborScreener {
    pub fn new(tables: Arc<dyn ReferenceTables>) -> Self {
        Self { tables }
    }

    pub fn assess(&self, input: &SupplyChainInput) -> Result<ScreeningResult, EngineError> {
        let lists = self
            .tables
            .forced_labor_lists()
            .map_err(EngineError::reference(ENGINE))?;

        let supplier = input.supplier.trim().to_uppercase();
        let commodity = input.commodity.trim().to_uppercase();
        let origin = input.origin.trim().to_uppercase();
        let region = input.region.trim().to_uppercase();

        let mut reasons = Vec::new();
        let mut signals = Signals::default();
        let mut score = 0;

        if !supplier.is_empty() {
            if let Some(entity) = lists
                .entities
                .iter()
                .find(|entity| supplier.contains(entity.name.as_str()))
            {
                score += ENTITY_WEIGHT;
                signals.entity = true;
                reasons.push(format!(
                    "ENTITY MATCH: '{}' is on the UFLPA Entity List ({}).",
                    entity.name, entity.category
                ));
            }
        }

        if lists
            .flagged_regions
            .iter()
            .any(|flagged| origin.contains(flagged.as_str()) || region.contains(flagged.as_str()))
        {
            score += REGION_WEIGHT;
            signals.region = true;
            reasons.push(
                "REGION MATCH: Supply chain touches Xinjiang (XUAR). Rebuttable presumption applies."
                    .to_string(),
            );
        }

        if let Some(item) = lists
            .high_risk_commodities
            .iter()
            .find(|item| commodity.contains(item.as_str()))
        {
            signals.commodity = true;
            let flagged_origin = lists
                .flagged_countries
                .iter()
                .any(|country| origin.contains(country.as_str()));
            if flagged_origin {
                score += COMMODITY_FLAGGED_ORIGIN_WEIGHT;
                reasons.push(format!(
                    "COMMODITY RISK: '{item}' from China is a UFLPA priority enforcement sector."
                ));
            } else {
                score += COMMODITY_WEIGHT;
                reasons.push(format!(
                    "COMMODITY WARNING: '{item}' is a high-risk commodity sector."
                ));
            }
        }

        let tier = tier_for(score, signals);
        if tier == ForcedLaborTier::Clear {
            reasons.push("UFLPA screen: no risk factors detected.".to_string());
        }

        Ok(ScreeningResult {
            engine: ScreeningEngine::Uflpa,
            outcome: outcome_for(tier),
            risk_level: risk_for(tier),
            matches: Vec::new(),
            reasoning: reasons,
            tier: Some(tier),
            recommended_action: Some(action_for(tier).to_string()),
        })
    }
}

fn tier_for(score: u32, signals: Signals) -> ForcedLaborTier {
    if score >= ENTITY_WEIGHT || (signals.region && signals.commodity) {
        ForcedLaborTier::SeizureLikely
    } else if score >= ELEVATED_THRESHOLD {
        ForcedLaborTier::HighRisk
    } else if score == COMMODITY_WEIGHT {
        ForcedLaborTier::Caution
    } else {
        ForcedLaborTier::Clear
    }
}

fn outcome_for(tier: ForcedLaborTier) -> ScreeningOutcome {
    match tier {
        ForcedLaborTier::Clear => ScreeningOutcome::Clear,
        ForcedLaborTier::Caution | ForcedLaborTier::HighRisk => ScreeningOutcome::Warning,
        ForcedLaborTier::SeizureLikely => ScreeningOutcome::Blocked,
    }
}

fn risk_for(tier: ForcedLaborTier) -> RiskLevel {
    match tier {
        ForcedLaborTier::Clear => RiskLevel::Low,
        ForcedLaborTier::Caution => RiskLevel::Medium,
        ForcedLaborTier::HighRisk => RiskLevel::High,
        ForcedLaborTier::SeizureLikely => RiskLevel::Critical,
    }
}

fn action_for(tier: ForcedLaborTier) -> &'static str {
    match tier {
        ForcedLaborTier::SeizureLikely => {
            "IMPORT PROHIBITED. Rebuttable presumption applies. Clear and convincing evidence required."
        }
        ForcedLaborTier::HighRisk => {
            "Enhanced Due Diligence REQUIRED. Map supply chain to raw material level."
        }
        ForcedLaborTier::Caution => "Standard Due Diligence. Verify Country of Origin.",
        ForcedLaborTier::Clear => "Proceed with standard import procedures.",
    }
}
