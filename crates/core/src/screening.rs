//! Denied-party screening against a closed watchlist.

use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{RiskLevel, ScreeningEngine, ScreeningMatch, ScreeningOutcome, ScreeningResult};
use crate::reference::{DeniedParty, PartySeverity, ReferenceTables};

const ENGINE: &str = "denied_party";
const GENERIC_KEYWORDS: [&str; 2] = ["TECHNOLOGY", "SYSTEMS"];
const PREFIX_LEN: usize = 3;

#[derive(Clone)]
pub struct PartyScreener {
    tables: Arc<dyn ReferenceTables>,
}

impl PartyScreener {
    pub fn new(tables: Arc<dyn ReferenceTables>) -> Self {
        Self { tables }
    }

    /// An empty name is "nothing to screen" and comes back CLEAR with no
    /// matches. Otherwise the first watchlist entry that is a substring of
    /// the name (or vice versa) decides the outcome.
    pub fn screen(&self, name: &str) -> Result<ScreeningResult, EngineError> {
        let term = name.trim().to_uppercase();
        if term.is_empty() {
            return Ok(clear(Vec::new()));
        }

        let parties = self
            .tables
            .denied_parties()
            .map_err(EngineError::reference(ENGINE))?;

        if let Some(party) = parties
            .iter()
            .find(|p| term.contains(p.name.as_str()) || p.name.contains(term.as_str()))
        {
            return Ok(direct_hit(party));
        }

        if let Some(party) = similar_party(&term, &parties) {
            return Ok(ScreeningResult {
                engine: ScreeningEngine::Dps,
                outcome: ScreeningOutcome::Match,
                risk_level: RiskLevel::Medium,
                matches: vec![ScreeningMatch {
                    name: format!("SIMILAR TO {}", party.name),
                    list: "Unverified List".to_string(),
                    reason: "Red Flag: Unable to verify bona fides".to_string(),
                    reference: "Supp. No. 6 to Part 744".to_string(),
                }],
                reasoning: vec![format!(
                    "'{}' resembles listed party '{}'. Manual review required.",
                    name.trim(),
                    party.name
                )],
                tier: None,
                recommended_action: Some("Verify end-user identity before proceeding.".to_string()),
            });
        }

        Ok(clear(vec![format!("No watchlist match for '{}'.", name.trim())]))
    }
}

fn direct_hit(party: &DeniedParty) -> ScreeningResult {
    let (outcome, risk_level, action) = match party.severity {
        PartySeverity::Blocked => (
            ScreeningOutcome::Blocked,
            RiskLevel::Critical,
            "Do not proceed. Transaction prohibited without authorization.",
        ),
        PartySeverity::PotentialMatch => (
            ScreeningOutcome::Match,
            RiskLevel::High,
            "Hold shipment pending compliance review.",
        ),
    };

    ScreeningResult {
        engine: ScreeningEngine::Dps,
        outcome,
        risk_level,
        matches: vec![ScreeningMatch {
            name: party.name.clone(),
            list: party.list.clone(),
            reason: party.reason.clone(),
            reference: party.reference.clone(),
        }],
        reasoning: vec![format!("Matched '{}' on {}.", party.name, party.list)],
        tier: None,
        recommended_action: Some(action.to_string()),
    }
}

/// Generic corporate names ("... Technology", "... Systems") whose first
/// word shares a leading prefix with a listed party's first word.
fn similar_party<'a>(term: &str, parties: &'a [DeniedParty]) -> Option<&'a DeniedParty> {
    if !GENERIC_KEYWORDS.iter().any(|keyword| term.contains(keyword)) {
        return None;
    }

    let prefix = leading_prefix(term)?;
    parties
        .iter()
        .find(|party| leading_prefix(&party.name).is_some_and(|p| p == prefix))
}

fn leading_prefix(text: &str) -> Option<String> {
    let word = text.split_whitespace().next()?;
    let prefix = word.chars().take(PREFIX_LEN).collect::<String>();
    (prefix.chars().count() == PREFIX_LEN).then_some(prefix)
}

fn clear(reasoning: Vec<String>) -> ScreeningResult {
    ScreeningResult {
        engine: ScreeningEngine::Dps,
        outcome: ScreeningOutcome::Clear,
        risk_level: RiskLevel::Low,
        matches: Vec::new(),
        reasoning,
        tier: None,
        recommended_action: None,
    }
}
