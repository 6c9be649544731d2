pub mod assembly;
pub mod dispatch;
pub mod error;
pub mod fields;
pub mod forced_labor;
pub mod gate;
pub mod intent;
pub mod license;
pub mod models;
pub mod reference;
pub mod screening;

pub use assembly::{assemble, Assembly, TurnFacts, Verdict, QA_FALLBACK};
pub use dispatch::{ComplianceEngines, ToolResults};
pub use error::{EngineError, ReferenceError};
pub use fields::{parse_money, ShipmentField};
pub use forced_labor::{ForcedLaborScreener, SupplyChainInput};
pub use gate::{decide, mandatory_fields, ResponsePath};
pub use intent::{
    classify_intent_rules, escalate_intent, find_classification_code, normalize_text,
    verify_missing_fields,
};
pub use license::LicenseEngine;
pub use models::*;
pub use reference::{
    ClassificationEntry, CountryGroup, DeniedParty, ExceptionCode, ForcedLaborLists,
    ReferenceTables, StaticReferenceTables,
};
pub use screening::PartyScreener;
