use std::sync::Arc;

use serde::Serialize;

use crate::error::EngineError;
use crate::fields::ShipmentField;
use crate::forced_labor::{ForcedLaborScreener, SupplyChainInput};
use crate::license::LicenseEngine;
use crate::models::{Intent, LicenseResult, ScreeningEngine, ScreeningResult, ShipmentCase};
use crate::reference::{ReferenceTables, StaticReferenceTables};
use crate::screening::PartyScreener;

pub const DPS_MISSING_REASON: &str = "End-user missing. Screening not run.";
pub const UFLPA_MISSING_REASON: &str = "Supplier/Commodity missing. Traceability not run.";

/// Outcome of one turn's tool dispatch. A `None` engine slot means the
/// engine was not applicable or failed; failures are listed in `errors`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolResults {
    pub license: Option<LicenseResult>,
    pub dps: Option<ScreeningResult>,
    pub uflpa: Option<ScreeningResult>,
    #[serde(skip)]
    pub errors: Vec<String>,
}

impl ToolResults {
    pub fn screenings(&self) -> Vec<ScreeningResult> {
        self.dps.iter().chain(self.uflpa.iter()).cloned().collect()
    }

    pub fn screening(&self, engine: ScreeningEngine) -> Option<&ScreeningResult> {
        match engine {
            ScreeningEngine::Dps => self.dps.as_ref(),
            ScreeningEngine::Uflpa => self.uflpa.as_ref(),
        }
    }

    pub fn has_blocking_screening(&self) -> bool {
        self.dps.iter().chain(self.uflpa.iter()).any(ScreeningResult::is_blocking)
    }
}

/// The three rule engines over one set of reference tables.
#[derive(Clone)]
pub struct ComplianceEngines {
    license: LicenseEngine,
    parties: PartyScreener,
    forced_labor: ForcedLaborScreener,
}

impl Default for ComplianceEngines {
    fn default() -> Self {
        Self::new(StaticReferenceTables::shared())
    }
}

impl ComplianceEngines {
    pub fn new(tables: Arc<dyn ReferenceTables>) -> Self {
        Self {
            license: LicenseEngine::new(tables.clone()),
            parties: PartyScreener::new(tables.clone()),
            forced_labor: ForcedLaborScreener::new(tables),
        }
    }

    pub fn license(&self) -> &LicenseEngine {
        &self.license
    }

    pub fn parties(&self) -> &PartyScreener {
        &self.parties
    }

    pub fn forced_labor(&self) -> &ForcedLaborScreener {
        &self.forced_labor
    }

    /// Runs whichever engines the intent and the available data call for.
    /// Each engine is isolated: an error nulls that slot only.
    pub fn run_tools(&self, intent: Intent, shipment: &ShipmentCase) -> ToolResults {
        let mut results = ToolResults::default();
        if intent == Intent::GeneralQa {
            return results;
        }

        if intent.requires_license()
            && shipment.has(ShipmentField::Eccn)
            && shipment.has(ShipmentField::Destination)
        {
            results.license = record(
                &mut results.errors,
                self.license.evaluate(
                    &shipment.eccn,
                    &shipment.destination,
                    shipment.value,
                    shipment.end_user_type,
                ),
            );
        }

        let has_party = shipment.has(ShipmentField::EndUserName);
        if intent.requires_screening() || has_party {
            results.dps = if has_party {
                record(&mut results.errors, self.parties.screen(shipment.end_user_name()))
            } else {
                Some(ScreeningResult::unknown(ScreeningEngine::Dps, DPS_MISSING_REASON))
            };
        }

        let has_supply_chain = shipment.has_supply_chain_data();
        if intent.requires_screening() || has_supply_chain {
            results.uflpa = if has_supply_chain {
                let input = SupplyChainInput {
                    supplier: shipment.supplier_name().to_string(),
                    commodity: shipment.commodity_description().to_string(),
                    origin: shipment.origin_country().to_string(),
                    region: String::new(),
                };
                record(&mut results.errors, self.forced_labor.assess(&input))
            } else {
                Some(ScreeningResult::unknown(ScreeningEngine::Uflpa, UFLPA_MISSING_REASON))
            };
        }

        results
    }
}

fn record<T>(errors: &mut Vec<String>, outcome: Result<T, EngineError>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err.to_string());
            None
        }
    }
}
