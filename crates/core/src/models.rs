use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::ShipmentField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    LicenseCheck,
    Screening,
    FullCheck,
    #[default]
    GeneralQa,
    UpdateDetails,
}

impl Intent {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "license_check" => Some(Self::LicenseCheck),
            "screening" => Some(Self::Screening),
            "full_check" => Some(Self::FullCheck),
            "general_qa" => Some(Self::GeneralQa),
            "update_details" => Some(Self::UpdateDetails),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::LicenseCheck => "license_check",
            Self::Screening => "screening",
            Self::FullCheck => "full_check",
            Self::GeneralQa => "general_qa",
            Self::UpdateDetails => "update_details",
        }
    }

    pub fn requires_license(self) -> bool {
        matches!(self, Self::LicenseCheck | Self::FullCheck)
    }

    pub fn requires_screening(self) -> bool {
        matches!(self, Self::Screening | Self::FullCheck)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndUserType {
    #[default]
    Commercial,
    Government,
    Individual,
    Military,
}

impl EndUserType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "commercial" | "business" | "company" | "private sector" => Some(Self::Commercial),
            "government" | "gov" | "public sector" | "agency" => Some(Self::Government),
            "individual" | "person" | "consumer" => Some(Self::Individual),
            "military" | "defense" | "defence" | "armed forces" => Some(Self::Military),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commercial => "Commercial",
            Self::Government => "Government",
            Self::Individual => "Individual",
            Self::Military => "Military",
        }
    }
}

/// Canonical shipment record. Text fields use the empty string or `None`
/// for "not provided"; updates only ever fill or overwrite, never clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipmentCase {
    /// Classification code (ECCN), trimmed and upper-cased.
    pub eccn: String,
    pub destination: String,
    pub value: f64,
    pub quantity: u32,
    pub end_user_type: EndUserType,
    pub end_user_name: Option<String>,
    pub supplier_name: Option<String>,
    pub commodity_description: Option<String>,
    pub origin_country: Option<String>,
    pub end_use: Option<String>,
    pub is_reexport: bool,
    pub unit: String,
}

impl Default for ShipmentCase {
    fn default() -> Self {
        Self {
            eccn: String::new(),
            destination: String::new(),
            value: 0.0,
            quantity: 1,
            end_user_type: EndUserType::Commercial,
            end_user_name: None,
            supplier_name: None,
            commodity_description: None,
            origin_country: None,
            end_use: None,
            is_reexport: false,
            unit: "units".to_string(),
        }
    }
}

impl ShipmentCase {
    /// Builds a shipment from a caller-supplied context map using the same
    /// synonym-aware key matching as classifier updates.
    pub fn from_context(context: &Map<String, Value>) -> Self {
        Self::default().merged(context)
    }

    pub fn to_context(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn has(&self, field: ShipmentField) -> bool {
        match field {
            ShipmentField::Eccn => !self.eccn.is_empty(),
            ShipmentField::Destination => !self.destination.is_empty(),
            ShipmentField::Value => self.value > 0.0,
            ShipmentField::Quantity => self.quantity > 0,
            ShipmentField::EndUserType | ShipmentField::IsReexport => true,
            ShipmentField::EndUserName => present(&self.end_user_name),
            ShipmentField::SupplierName => present(&self.supplier_name),
            ShipmentField::CommodityDescription => present(&self.commodity_description),
            ShipmentField::OriginCountry => present(&self.origin_country),
            ShipmentField::EndUse => present(&self.end_use),
            ShipmentField::Unit => !self.unit.is_empty(),
        }
    }

    pub fn end_user_name(&self) -> &str {
        self.end_user_name.as_deref().unwrap_or_default()
    }

    pub fn supplier_name(&self) -> &str {
        self.supplier_name.as_deref().unwrap_or_default()
    }

    pub fn commodity_description(&self) -> &str {
        self.commodity_description.as_deref().unwrap_or_default()
    }

    pub fn origin_country(&self) -> &str {
        self.origin_country.as_deref().unwrap_or_default()
    }

    pub fn has_supply_chain_data(&self) -> bool {
        self.has(ShipmentField::SupplierName)
            || self.has(ShipmentField::CommodityDescription)
            || self.has(ShipmentField::OriginCountry)
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    Clear,
    Warning,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    Exception,
    LicenseRequired,
    Tip,
    Nlr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub code: String,
    pub title: String,
    pub justification: String,
    #[serde(default)]
    pub caveats: Vec<String>,
    pub next_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl Finding {
    pub fn grants_export(&self) -> bool {
        matches!(self.kind, FindingKind::Exception | FindingKind::Nlr)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseDetails {
    pub eccn: String,
    pub description: Option<String>,
    pub controls: Vec<String>,
    pub country_groups: Vec<String>,
    pub lvs_limit: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseResult {
    pub status: LicenseStatus,
    pub findings: Vec<Finding>,
    pub trace: Vec<String>,
    pub details: LicenseDetails,
}

impl LicenseResult {
    pub fn codes(&self) -> Vec<&str> {
        self.findings.iter().map(|f| f.code.as_str()).collect()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningEngine {
    Dps,
    Uflpa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningOutcome {
    Clear,
    Match,
    Blocked,
    Warning,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForcedLaborTier {
    Clear,
    #[serde(rename = "WARNING")]
    Caution,
    HighRisk,
    SeizureLikely,
}

impl ForcedLaborTier {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Caution => "WARNING",
            Self::HighRisk => "HIGH_RISK",
            Self::SeizureLikely => "SEIZURE_LIKELY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningMatch {
    pub name: String,
    pub list: String,
    pub reason: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub engine: ScreeningEngine,
    pub outcome: ScreeningOutcome,
    pub risk_level: RiskLevel,
    pub matches: Vec<ScreeningMatch>,
    pub reasoning: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ForcedLaborTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

impl ScreeningResult {
    /// Placeholder for a screen that could not run for lack of input.
    pub fn unknown(engine: ScreeningEngine, reason: &str) -> Self {
        Self {
            engine,
            outcome: ScreeningOutcome::Unknown,
            risk_level: RiskLevel::Unknown,
            matches: Vec::new(),
            reasoning: vec![reason.to_string()],
            tier: None,
            recommended_action: None,
        }
    }

    /// Only a confirmed hit blocks; a needs-review match is a warning.
    pub fn is_blocking(&self) -> bool {
        self.outcome == ScreeningOutcome::Blocked
    }

    pub fn needs_review(&self) -> bool {
        self.outcome == ScreeningOutcome::Match
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Fixed-shape output of the external intent classifier. Nothing in here
/// is trusted until it has been through verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentInference {
    pub intent: Intent,
    #[serde(default, alias = "shipment_updates")]
    pub field_updates: Map<String, Value>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
}

impl IntentInference {
    pub fn general_qa() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    #[default]
    Assistant,
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ConfirmationChips,
    RequirementsPack,
    VerdictCard,
    ExceptionGrid,
    RiskBox,
    OptimizationTip,
    LogicTrace,
    NextSteps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub data: Option<Value>,
}

impl AgentMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            kind: MessageKind::Text,
            content: Some(content.into()),
            data: None,
        }
    }

    pub fn block(kind: MessageKind, data: Value) -> Self {
        Self {
            role: MessageRole::Assistant,
            kind,
            content: None,
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Idle,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub shipment: ShipmentCase,
    pub messages: Vec<AgentMessage>,
    pub mood: Mood,
    pub intent: Intent,
    pub missing_fields: Vec<ShipmentField>,
    pub needs_clarification: bool,
    pub license_result: Option<LicenseResult>,
    pub screenings: Vec<ScreeningResult>,
}

impl AgentResponse {
    pub fn message(&self, kind: MessageKind) -> Option<&AgentMessage> {
        self.messages.iter().find(|m| m.kind == kind)
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        self.messages.iter().map(|m| m.kind).collect()
    }

    pub fn screening(&self, engine: ScreeningEngine) -> Option<&ScreeningResult> {
        self.screenings.iter().find(|s| s.engine == engine)
    }

    /// First text block, used as the assistant turn in conversation history.
    pub fn summary_text(&self) -> String {
        self.messages
            .iter()
            .find_map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

/// One analyst turn as handed to the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub session_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub intent: Intent,
    pub mood: Mood,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentSession {
    pub session_id: String,
    pub shipment: ShipmentCase,
    pub history: Vec<ChatMessage>,
    pub turns: Vec<TurnRecord>,
    pub expires_at: DateTime<Utc>,
}

impl ShipmentSession {
    pub fn new(session_id: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            shipment: ShipmentCase::default(),
            history: Vec::new(),
            turns: Vec::new(),
            expires_at,
        }
    }
}
