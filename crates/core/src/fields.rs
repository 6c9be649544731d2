use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{EndUserType, ShipmentCase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentField {
    Eccn,
    Destination,
    Value,
    Quantity,
    EndUserType,
    EndUserName,
    SupplierName,
    CommodityDescription,
    OriginCountry,
    EndUse,
    IsReexport,
    Unit,
}

impl ShipmentField {
    /// Maps loosely-phrased keys ("endUserName", "supplier", "valueUSD",
    /// "product") onto the fixed schema. Order matters: the more specific
    /// combinations are tested first.
    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw
            .trim()
            .to_lowercase()
            .replace(['_', '-', ' '], "");

        if key.is_empty() {
            return None;
        }

        let field = if key.contains("user") && key.contains("type") {
            Self::EndUserType
        } else if key.contains("user") {
            Self::EndUserName
        } else if key.contains("supplier") || key.contains("vendor") {
            Self::SupplierName
        } else if key.contains("value") || key.contains("price") || key.contains("amount") {
            Self::Value
        } else if key.contains("commodity") || key.contains("prod") {
            Self::CommodityDescription
        } else if key.contains("origin") {
            Self::OriginCountry
        } else if key.contains("use") && key.contains("end") {
            Self::EndUse
        } else if key.contains("reexport") {
            Self::IsReexport
        } else if key.contains("unit") {
            Self::Unit
        } else if key.contains("eccn") || key.contains("classification") {
            Self::Eccn
        } else if key.contains("dest") || key.contains("country") {
            Self::Destination
        } else if key.contains("quantity") || key == "qty" {
            Self::Quantity
        } else {
            return None;
        };

        Some(field)
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Eccn => "eccn",
            Self::Destination => "destination",
            Self::Value => "value",
            Self::Quantity => "quantity",
            Self::EndUserType => "end_user_type",
            Self::EndUserName => "end_user_name",
            Self::SupplierName => "supplier_name",
            Self::CommodityDescription => "commodity_description",
            Self::OriginCountry => "origin_country",
            Self::EndUse => "end_use",
            Self::IsReexport => "is_reexport",
            Self::Unit => "unit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Eccn => "ECCN (classification code)",
            Self::Destination => "Destination country",
            Self::Value => "Declared value (USD)",
            Self::Quantity => "Quantity",
            Self::EndUserType => "End-user type",
            Self::EndUserName => "End-user name",
            Self::SupplierName => "Supplier name",
            Self::CommodityDescription => "Commodity description",
            Self::OriginCountry => "Country of origin",
            Self::EndUse => "End use",
            Self::IsReexport => "Re-export",
            Self::Unit => "Unit of measure",
        }
    }
}

/// Strips currency symbols, thousands separators and whitespace. Anything
/// unparsable, negative or non-finite becomes 0.
pub fn parse_money(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .chars()
            .filter(|ch| !matches!(ch, '$' | ',' | '€' | '£') && !ch.is_whitespace())
            .collect::<String>()
            .trim_start_matches("USD")
            .trim_start_matches("usd")
            .parse::<f64>()
            .ok(),
        _ => None,
    };

    sanitize_value(parsed.unwrap_or(0.0))
}

pub fn sanitize_value(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        _ => None,
    }
}

impl ShipmentCase {
    /// Field-by-field merge of proposed updates. Unknown keys, nulls and
    /// blank strings are ignored so a set field is never cleared.
    pub fn merged(&self, updates: &Map<String, Value>) -> Self {
        let mut next = self.clone();

        for (key, value) in updates {
            let Some(field) = ShipmentField::from_key(key) else {
                continue;
            };
            next.apply(field, value);
        }

        next
    }

    fn apply(&mut self, field: ShipmentField, value: &Value) {
        if value.is_null() {
            return;
        }

        match field {
            ShipmentField::Value => {
                self.value = parse_money(value);
            }
            ShipmentField::Quantity => {
                let quantity = match value {
                    Value::Number(number) => number.as_u64(),
                    Value::String(text) => text.trim().replace(',', "").parse::<u64>().ok(),
                    _ => None,
                };
                if let Some(quantity) = quantity.filter(|q| *q > 0) {
                    self.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                }
            }
            ShipmentField::IsReexport => {
                if let Some(flag) = as_flag(value) {
                    self.is_reexport = flag;
                }
            }
            ShipmentField::EndUserType => {
                if let Some(kind) = as_text(value).and_then(|text| EndUserType::parse(&text)) {
                    self.end_user_type = kind;
                }
            }
            ShipmentField::Eccn => {
                if let Some(text) = as_text(value) {
                    self.eccn = text.to_uppercase();
                }
            }
            ShipmentField::Destination => {
                if let Some(text) = as_text(value) {
                    self.destination = text;
                }
            }
            ShipmentField::Unit => {
                if let Some(text) = as_text(value) {
                    self.unit = text;
                }
            }
            ShipmentField::EndUserName => set_text(&mut self.end_user_name, value),
            ShipmentField::SupplierName => set_text(&mut self.supplier_name, value),
            ShipmentField::CommodityDescription => {
                set_text(&mut self.commodity_description, value)
            }
            ShipmentField::OriginCountry => set_text(&mut self.origin_country, value),
            ShipmentField::EndUse => set_text(&mut self.end_use, value),
        }
    }
}

fn set_text(slot: &mut Option<String>, value: &Value) {
    if let Some(text) = as_text(value) {
        *slot = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn maps_synonym_keys_onto_schema() {
        assert_eq!(ShipmentField::from_key("endUserName"), Some(ShipmentField::EndUserName));
        assert_eq!(ShipmentField::from_key("end_user_type"), Some(ShipmentField::EndUserType));
        assert_eq!(ShipmentField::from_key("supplier"), Some(ShipmentField::SupplierName));
        assert_eq!(ShipmentField::from_key("product"), Some(ShipmentField::CommodityDescription));
        assert_eq!(ShipmentField::from_key("origin_country"), Some(ShipmentField::OriginCountry));
        assert_eq!(ShipmentField::from_key("endUse"), Some(ShipmentField::EndUse));
        assert_eq!(ShipmentField::from_key("valueUSD"), Some(ShipmentField::Value));
        assert_eq!(ShipmentField::from_key("destination_country"), Some(ShipmentField::Destination));
        assert_eq!(ShipmentField::from_key("is_reexport"), Some(ShipmentField::IsReexport));
        assert_eq!(ShipmentField::from_key("colour"), None);
    }

    #[test]
    fn monetary_keys_win_over_unit_and_product() {
        assert_eq!(ShipmentField::from_key("unit_value"), Some(ShipmentField::Value));
        assert_eq!(ShipmentField::from_key("unitPrice"), Some(ShipmentField::Value));
        assert_eq!(ShipmentField::from_key("product_value"), Some(ShipmentField::Value));
        assert_eq!(ShipmentField::from_key("total_amount"), Some(ShipmentField::Value));
        assert_eq!(ShipmentField::from_key("unit"), Some(ShipmentField::Unit));
        assert_eq!(ShipmentField::from_key("product_name"), Some(ShipmentField::CommodityDescription));
    }

    #[test]
    fn money_strips_symbols_and_defaults_to_zero() {
        assert_eq!(parse_money(&json!("$12,500")), 12_500.0);
        assert_eq!(parse_money(&json!(2500)), 2500.0);
        assert_eq!(parse_money(&json!("about a grand")), 0.0);
        assert_eq!(parse_money(&json!(-40)), 0.0);
        assert_eq!(parse_money(&json!(null)), 0.0);
    }

    #[test]
    fn merge_never_clears_existing_fields() {
        let prior = ShipmentCase::from_context(&map(json!({
            "eccn": " 5a002 ",
            "destination": "Germany",
            "endUserName": "Siemens AG"
        })));
        assert_eq!(prior.eccn, "5A002");

        let next = prior.merged(&map(json!({
            "destination": "",
            "eccn": null,
            "value": "$1,200",
            "supplier": "Acme Optics"
        })));

        assert_eq!(next.eccn, "5A002");
        assert_eq!(next.destination, "Germany");
        assert_eq!(next.value, 1200.0);
        assert_eq!(next.end_user_name.as_deref(), Some("Siemens AG"));
        assert_eq!(next.supplier_name.as_deref(), Some("Acme Optics"));
    }

    #[test]
    fn context_round_trips_through_normalization() {
        let mut shipment = ShipmentCase::default();
        shipment.eccn = "6A003".to_string();
        shipment.destination = "China".to_string();
        shipment.value = 2500.0;
        shipment.end_user_type = EndUserType::Government;
        shipment.origin_country = Some("China".to_string());
        shipment.is_reexport = true;

        let rebuilt = ShipmentCase::from_context(&shipment.to_context());
        assert_eq!(rebuilt, shipment);
    }
}
