//! Reference tables consumed by the rule engines.
//!
//! Engines only see the [`ReferenceTables`] trait, so the bundled static
//! tables can be swapped for a live registry without touching engine logic.
//! Lookups are fallible for that reason; the static source never fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ReferenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountryGroup {
    #[serde(rename = "A:1")]
    A1,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "D:1")]
    D1,
    #[serde(rename = "E:1")]
    E1,
}

impl CountryGroup {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::A1 => "A:1",
            Self::B => "B",
            Self::D1 => "D:1",
            Self::E1 => "E:1",
        }
    }
}

impl fmt::Display for CountryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCode {
    Lvs,
    Gbs,
    Civ,
    Tsr,
    App,
    Tmp,
    Rpl,
    Gov,
    Enc,
    Sta,
    Nlr,
}

impl ExceptionCode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LVS" => Some(Self::Lvs),
            "GBS" => Some(Self::Gbs),
            "CIV" => Some(Self::Civ),
            "TSR" => Some(Self::Tsr),
            "APP" => Some(Self::App),
            "TMP" => Some(Self::Tmp),
            "RPL" => Some(Self::Rpl),
            "GOV" => Some(Self::Gov),
            "ENC" => Some(Self::Enc),
            "STA" => Some(Self::Sta),
            "NLR" => Some(Self::Nlr),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Lvs => "LVS",
            Self::Gbs => "GBS",
            Self::Civ => "CIV",
            Self::Tsr => "TSR",
            Self::App => "APP",
            Self::Tmp => "TMP",
            Self::Rpl => "RPL",
            Self::Gov => "GOV",
            Self::Enc => "ENC",
            Self::Sta => "STA",
            Self::Nlr => "NLR",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Lvs => "Limited Value Shipment",
            Self::Gbs => "Group B Shipment",
            Self::Civ => "Civil End-Users",
            Self::Tsr => "Technology/Software Restricted",
            Self::App => "Computer Adjusted Peak Performance",
            Self::Tmp => "Temporary Export",
            Self::Rpl => "Servicing and Replacement",
            Self::Gov => "Government End-Users",
            Self::Enc => "Encryption Commodities",
            Self::Sta => "Strategic Trade Authorization",
            Self::Nlr => "No License Required",
        }
    }

    pub fn citation(self) -> &'static str {
        match self {
            Self::Lvs => "§740.3",
            Self::Gbs => "§740.4",
            Self::Civ => "§740.5",
            Self::Tsr => "§740.6",
            Self::App => "§740.7",
            Self::Tmp => "§740.9",
            Self::Rpl => "§740.10",
            Self::Gov => "§740.11",
            Self::Enc => "§740.17",
            Self::Sta => "§740.20",
            Self::Nlr => "§758.1",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub code: String,
    pub controls: Vec<String>,
    /// Available exceptions in registry-declared evaluation order.
    pub exceptions: Vec<ExceptionCode>,
    /// 0 means "no limit of its own"; the engine then applies the default.
    pub lvs_limit: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartySeverity {
    Blocked,
    PotentialMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeniedParty {
    pub name: String,
    pub severity: PartySeverity,
    pub list: String,
    pub reason: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedEntity {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedLaborLists {
    pub entities: Vec<ListedEntity>,
    pub high_risk_commodities: Vec<String>,
    pub flagged_regions: Vec<String>,
    pub flagged_countries: Vec<String>,
}

/// Limited-value caps applied on top of a classification's own limit.
pub const LVS_CAP_A1: f64 = 5000.0;
pub const LVS_CAP_B: f64 = 3000.0;
pub const LVS_DEFAULT_LIMIT: f64 = 1500.0;

pub trait ReferenceTables: Send + Sync {
    /// Groups for a destination; unknown destinations belong to no group.
    fn country_groups(&self, destination: &str) -> Result<Vec<CountryGroup>, ReferenceError>;
    fn classification(&self, code: &str) -> Result<Option<ClassificationEntry>, ReferenceError>;
    fn denied_parties(&self) -> Result<Vec<DeniedParty>, ReferenceError>;
    fn forced_labor_lists(&self) -> Result<ForcedLaborLists, ReferenceError>;
    fn destinations(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct StaticReferenceTables {
    countries: HashMap<String, (String, Vec<CountryGroup>)>,
    aliases: HashMap<&'static str, &'static str>,
    registry: HashMap<String, ClassificationEntry>,
    denied_parties: Vec<DeniedParty>,
    forced_labor: ForcedLaborLists,
}

static SHARED: Lazy<Arc<StaticReferenceTables>> =
    Lazy::new(|| Arc::new(StaticReferenceTables::load()));

impl StaticReferenceTables {
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    pub fn load() -> Self {
        let mut countries: HashMap<String, (String, Vec<CountryGroup>)> = HashMap::new();
        for (group, names) in COUNTRY_GROUPS {
            for name in *names {
                countries
                    .entry(name.to_lowercase())
                    .or_insert_with(|| (name.to_string(), Vec::new()))
                    .1
                    .push(*group);
            }
        }

        let registry = REGISTRY
            .iter()
            .map(|(code, controls, exceptions, lvs_limit, description)| {
                let entry = ClassificationEntry {
                    code: code.to_string(),
                    controls: controls.iter().map(|c| c.to_string()).collect(),
                    exceptions: exceptions
                        .iter()
                        .filter_map(|c| ExceptionCode::parse(c))
                        .collect(),
                    lvs_limit: *lvs_limit,
                    description: description.to_string(),
                };
                (code.to_string(), entry)
            })
            .collect();

        Self {
            countries,
            aliases: COUNTRY_ALIASES.iter().copied().collect(),
            registry,
            denied_parties: denied_party_list(),
            forced_labor: forced_labor_lists(),
        }
    }

    fn canonical_key(&self, destination: &str) -> String {
        let key = destination.trim().to_lowercase();
        match self.aliases.get(key.as_str()) {
            Some(canonical) => canonical.to_lowercase(),
            None => key,
        }
    }
}

impl ReferenceTables for StaticReferenceTables {
    fn country_groups(&self, destination: &str) -> Result<Vec<CountryGroup>, ReferenceError> {
        Ok(self
            .countries
            .get(&self.canonical_key(destination))
            .map(|(_, groups)| groups.clone())
            .unwrap_or_default())
    }

    fn classification(&self, code: &str) -> Result<Option<ClassificationEntry>, ReferenceError> {
        Ok(self.registry.get(code.trim().to_uppercase().as_str()).cloned())
    }

    fn denied_parties(&self) -> Result<Vec<DeniedParty>, ReferenceError> {
        Ok(self.denied_parties.clone())
    }

    fn forced_labor_lists(&self) -> Result<ForcedLaborLists, ReferenceError> {
        Ok(self.forced_labor.clone())
    }

    fn destinations(&self) -> Vec<String> {
        let mut names = self
            .countries
            .values()
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

// Simplified from EAR Supplement No. 1 to Part 740. Group A:1 members are
// also members of Group B.
const COUNTRY_GROUPS: &[(CountryGroup, &[&str])] = &[
    (
        CountryGroup::A1,
        &[
            "Australia", "Austria", "Belgium", "Canada", "Denmark", "Finland", "France",
            "Germany", "Greece", "Ireland", "Italy", "Japan", "Luxembourg", "Netherlands",
            "New Zealand", "Norway", "Portugal", "Spain", "Sweden", "Switzerland",
            "United Kingdom",
        ],
    ),
    (
        CountryGroup::B,
        &[
            "Australia", "Austria", "Belgium", "Canada", "Denmark", "Finland", "France",
            "Germany", "Greece", "Ireland", "Italy", "Japan", "Luxembourg", "Netherlands",
            "New Zealand", "Norway", "Portugal", "Spain", "Sweden", "Switzerland",
            "United Kingdom", "Argentina", "Brazil", "Chile", "Colombia", "Hong Kong", "India",
            "Israel", "Malaysia", "Mexico", "Philippines", "Singapore", "South Africa",
            "South Korea", "Taiwan", "Thailand", "Turkey", "United Arab Emirates", "Vietnam",
        ],
    ),
    (CountryGroup::D1, &["China", "Russia", "Belarus", "Venezuela"]),
    (CountryGroup::E1, &["Cuba", "Iran", "North Korea", "Syria"]),
];

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "United Kingdom"),
    ("great britain", "United Kingdom"),
    ("britain", "United Kingdom"),
    ("uae", "United Arab Emirates"),
    ("korea", "South Korea"),
    ("republic of korea", "South Korea"),
    ("dprk", "North Korea"),
    ("prc", "China"),
    ("people's republic of china", "China"),
    ("russian federation", "Russia"),
    ("türkiye", "Turkey"),
    ("turkiye", "Turkey"),
];

type RegistryRow = (&'static str, &'static [&'static str], &'static [&'static str], f64, &'static str);

const REGISTRY: &[RegistryRow] = &[
    // Category 0 - Nuclear
    ("0A001", &["NP", "AT"], &[], 0.0, "Nuclear reactors and specially designed components."),
    ("0B001", &["NP", "AT"], &[], 0.0, "Plant for separation of uranium isotopes."),
    // Category 1 - Materials
    ("1A002", &["NS", "NP", "AT"], &["LVS", "GBS"], 5000.0, "Composite structures or laminates with organic/metal matrices."),
    ("1A004", &["NS", "AT", "RS"], &["LVS", "STA", "TMP"], 1500.0, "Protective equipment and detection equipment."),
    ("1A995", &["AT"], &["LVS"], 5000.0, "Protective equipment not specially designed for military use."),
    ("1C350", &["CB", "AT"], &["LVS"], 500.0, "Chemicals that may be used as precursors for toxic agents."),
    ("1C351", &["CB", "AT"], &[], 0.0, "Human and animal pathogens and toxins."),
    // Category 2 - Materials Processing
    ("2A001", &["NS", "AT"], &["LVS", "STA"], 5000.0, "Anti-friction bearings and bearing systems."),
    ("2B001", &["NS", "NP", "AT"], &["LVS", "STA"], 3000.0, "Machine tools for cutting metals, ceramics, composites."),
    ("2B006", &["NS", "AT"], &["LVS", "STA"], 5000.0, "Dimensional inspection systems."),
    ("2B350", &["CB", "AT"], &["LVS"], 2500.0, "Chemical manufacturing facilities and equipment."),
    // Category 3 - Electronics
    ("3A001", &["NS", "MT", "AT"], &["LVS", "GBS", "STA", "TMP", "GOV", "RPL", "TSR"], 3000.0, "Electronic components (semiconductors, ICs, MCMs)."),
    ("3A002", &["NS", "AT"], &["LVS", "GBS", "STA", "TMP", "RPL", "TSR"], 5000.0, "General purpose electronic equipment."),
    ("3A991", &["AT"], &["LVS", "TMP", "RPL"], 5000.0, "Electronic devices and components not controlled by 3A001."),
    ("3A992", &["AT"], &["LVS", "TMP", "RPL"], 5000.0, "General purpose electronic equipment n.e.s."),
    ("3A999", &["AT"], &["LVS"], 5000.0, "Specific processing equipment n.e.s."),
    ("3B001", &["NS", "AT"], &["LVS", "STA", "TMP", "GOV", "RPL"], 5000.0, "Equipment for manufacturing semiconductors."),
    // Category 4 - Computers
    ("4A003", &["NS", "AT"], &["LVS", "APP", "STA", "TMP", "GOV", "RPL", "CIV"], 5000.0, "Digital computers and related equipment."),
    ("4A994", &["AT"], &["LVS", "TMP", "RPL"], 5000.0, "Computers not controlled by 4A003."),
    ("4D001", &["NS", "AT"], &["TSR", "STA", "TMP", "GOV"], 0.0, "Software for development/production of 4A equipment."),
    ("4D994", &["AT"], &["TSR", "TMP"], 0.0, "Software not controlled by 4D001."),
    ("4E001", &["NS", "AT"], &["TSR", "TMP", "GOV"], 0.0, "Technology for development of 4A/4D items."),
    // Category 5 - Telecommunications & Information Security
    ("5A001", &["NS", "AT"], &["LVS", "STA", "TMP", "GOV", "RPL", "TSR"], 1000.0, "Telecommunications equipment."),
    ("5A002", &["NS", "AT", "EI"], &["ENC", "STA", "TMP", "GOV", "TSR", "RPL", "CIV", "APP"], 0.0, "Information security systems (encryption)."),
    ("5A991", &["AT"], &["LVS", "TMP", "RPL", "TSR"], 5000.0, "Telecommunication equipment not controlled by 5A001."),
    ("5A992", &["AT"], &["LVS", "ENC", "TMP", "RPL", "TSR"], 5000.0, "Mass market encryption items."),
    ("5D002", &["NS", "AT", "EI"], &["ENC", "TSR", "TMP", "GOV", "CIV"], 0.0, "Encryption software."),
    ("5D992", &["AT"], &["LVS", "TSR", "ENC"], 5000.0, "Mass market encryption software."),
    // Category 6 - Sensors & Lasers
    ("6A001", &["NS", "MT", "AT"], &["LVS", "STA"], 1500.0, "Acoustic systems, equipment and components."),
    ("6A002", &["NS", "MT", "AT"], &["LVS", "STA"], 2000.0, "Optical sensors and equipment."),
    ("6A003", &["NS", "MT", "AT"], &["LVS", "STA", "TMP"], 1500.0, "Cameras and components."),
    ("6A005", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Lasers, components and optical equipment."),
    ("6A006", &["NS", "MT", "AT"], &["LVS", "STA"], 3000.0, "Magnetometers, gradiometers, underwater detection."),
    // Category 7 - Navigation & Avionics
    ("7A001", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Accelerometers and components."),
    ("7A002", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Gyros and components."),
    ("7A003", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Inertial navigation/guidance systems."),
    ("7A103", &["MT", "AT"], &["LVS"], 5000.0, "Missile technology navigation equipment."),
    // Category 8 - Marine
    ("8A001", &["NS", "AT"], &["LVS", "STA", "TMP"], 5000.0, "Submersible vessels and surface vessels."),
    ("8A002", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Marine propulsion systems and components."),
    // Category 9 - Aerospace & Propulsion
    ("9A004", &["NS", "MT", "AT"], &["LVS", "STA", "TMP"], 5000.0, "Space launch vehicles and spacecraft."),
    ("9A991", &["AT"], &["LVS", "TMP"], 5000.0, "Aircraft and gas turbine engines not in 9A001."),
    ("9B001", &["NS", "MT", "AT"], &["LVS", "STA"], 5000.0, "Manufacturing equipment for gas turbines."),
    // Not on the Commerce Control List
    ("EAR99", &[], &["NLR"], 0.0, "Items subject to EAR but not on CCL."),
];

fn denied_party_list() -> Vec<DeniedParty> {
    let rows: &[(&str, PartySeverity, &str, &str, &str)] = &[
        ("HUAWEI", PartySeverity::Blocked, "BIS Entity List", "Entity List - Presumption of Denial", "Supp. No. 4 to Part 744"),
        ("ZTE", PartySeverity::PotentialMatch, "BIS Entity List", "Requires License Review", "Supp. No. 4 to Part 744"),
        ("VENEZUELA DEFENSE", PartySeverity::Blocked, "OFAC SDN", "Sanctioned Entity", "EO 13884"),
        ("IRAN SHIPPING", PartySeverity::Blocked, "OFAC SDN", "Specially Designated National", "EO 13599"),
        ("KASPERSKY", PartySeverity::Blocked, "BIS Entity List", "ICTS Prohibition", "Final Rule 2024"),
        ("DJI", PartySeverity::PotentialMatch, "Chinese Military-Industrial Complex Companies List", "Investment Ban / Export Restrictions", "EO 14032"),
    ];

    rows.iter()
        .map(|(name, severity, list, reason, reference)| DeniedParty {
            name: name.to_string(),
            severity: *severity,
            list: list.to_string(),
            reason: reason.to_string(),
            reference: reference.to_string(),
        })
        .collect()
}

fn forced_labor_lists() -> ForcedLaborLists {
    let entities: &[(&str, &str)] = &[
        ("XINJIANG COTTON", "Priority Enforcement"),
        ("HOSHINE SILICON", "Silica-based products"),
        ("XPCC", "Cotton and Cotton Products"),
        ("LUOZHOU", "Polysilicon"),
    ];

    ForcedLaborLists {
        entities: entities
            .iter()
            .map(|(name, category)| ListedEntity {
                name: name.to_string(),
                category: category.to_string(),
            })
            .collect(),
        high_risk_commodities: [
            "COTTON", "TOMATO", "POLYSILICON", "SILICA", "SOLAR", "APPAREL", "TEXTILE", "PVC",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        flagged_regions: vec!["XINJIANG".to_string(), "XUAR".to_string()],
        flagged_countries: vec!["CHINA".to_string()],
    }
}
