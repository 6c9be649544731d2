use shield_core::{ChatMessage, ShipmentCase};

pub fn router_prompt(history: &[ChatMessage], context: &ShipmentCase) -> String {
    let history_text = history
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n");
    let current = serde_json::Value::Object(context.to_context()).to_string();

    format!(
        r#"Act as an Export Compliance Agent Router.
Analyze the conversation history and current shipment context.

Current Shipment Context: {current}

Conversation History:
{history_text}

Your Goal:
1. Determine the INTENT:
   - 'license_check': User wants to check export license requirements, or is providing shipment data (e.g. "Value is 5000").
   - 'screening': User wants to screen a party (DPS) or supplier (UFLPA).
   - 'full_check': User provided enough data for a full shipment evaluation.
   - 'general_qa': User is asking a general regulatory question.
   - 'update_details': User explicitly REQUESTS to add/edit details. Do NOT use this if the user is just providing values.

2. Extract ENTITIES to update the context:
   - eccn (e.g. 5A002, 3A090), destination, value, end_user_type, end_user_name, supplier_name, commodity_description, origin_country.
   - end_use (purpose), is_reexport (boolean), unit (e.g. kg, lbs, units).
   Extract 'supplier_name' if mentioned ("Supplier is X", "Vendor Y", "Made by Z").
   Extract 'origin_country' if mentioned ("From China", "Origin: CN").

3. Identify MISSING CRITICAL FIELDS based on intent:
   - Check 'Current Shipment Context' first. If a value exists there it is NOT missing.
   - license_check or full_check: eccn, destination, value, end_use, end_user_name, commodity_description.
   - screening: end_user_name or supplier_name.
   - Always list ALL missing fields found.

4. Output JSON ONLY:
{{
  "intent": "...",
  "shipment_updates": {{ "field": "value" }},
  "missing_fields": ["eccn", "destination"],
  "needs_clarification": false
}}"#
    )
}

pub fn qa_prompt(question: &str) -> String {
    format!(
        "Act as an export compliance expert. Answer this strictly in 2 short sentences. No fluff. Question: {}",
        question.trim()
    )
}
