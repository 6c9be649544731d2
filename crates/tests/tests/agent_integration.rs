use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use shield_agents::ComplianceAgent;
use shield_core::{
    ChatInput, ChatMessage, ClassificationEntry, ComplianceEngines, CountryGroup, DeniedParty,
    FindingKind, ForcedLaborLists, ForcedLaborTier, Intent, IntentInference, LicenseStatus,
    MessageKind, Mood, ReferenceError, ReferenceTables, ScreeningEngine, ScreeningOutcome,
    ShipmentCase, ShipmentField, StaticReferenceTables, SupplyChainInput, TurnRequest,
    QA_FALLBACK,
};
use shield_llm::{
    IntentClassifier, KeywordIntentClassifier, LanguageBackend, LlmError, NoLanguageModel,
    TextGenerator,
};
use shield_observability::AppMetrics;
use shield_storage::{MemoryStore, SessionRepository};

struct ScriptedClassifier(IntentInference);

impl IntentClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _history: &[ChatMessage],
        _context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        Ok(self.0.clone())
    }
}

/// Hands out one inference per call, in order.
struct SequenceClassifier(Mutex<VecDeque<IntentInference>>);

impl SequenceClassifier {
    fn new(turns: Vec<IntentInference>) -> Self {
        Self(Mutex::new(turns.into()))
    }
}

impl IntentClassifier for SequenceClassifier {
    async fn classify(
        &self,
        _history: &[ChatMessage],
        _context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(IntentInference::general_qa))
    }
}

struct FailingClassifier;

impl IntentClassifier for FailingClassifier {
    async fn classify(
        &self,
        _history: &[ChatMessage],
        _context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        Err(LlmError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("EAR99 covers most commercial items. They rarely need a license.".to_string())
    }
}

struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Parse("output text missing".to_string()))
    }
}

struct BrokenWatchlist(StaticReferenceTables);

impl ReferenceTables for BrokenWatchlist {
    fn country_groups(&self, destination: &str) -> Result<Vec<CountryGroup>, ReferenceError> {
        self.0.country_groups(destination)
    }

    fn classification(&self, code: &str) -> Result<Option<ClassificationEntry>, ReferenceError> {
        self.0.classification(code)
    }

    fn denied_parties(&self) -> Result<Vec<DeniedParty>, ReferenceError> {
        Err(ReferenceError::Unavailable("screening list feed down".to_string()))
    }

    fn forced_labor_lists(&self) -> Result<ForcedLaborLists, ReferenceError> {
        self.0.forced_labor_lists()
    }

    fn destinations(&self) -> Vec<String> {
        self.0.destinations()
    }
}

fn context(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn inference(intent: Intent, updates: Value, missing: &[&str]) -> IntentInference {
    IntentInference {
        intent,
        field_updates: context(updates),
        missing_fields: missing.iter().map(|field| field.to_string()).collect(),
        needs_clarification: !missing.is_empty(),
    }
}

fn agent_with<C: IntentClassifier>(
    classifier: C,
) -> (ComplianceAgent<MemoryStore, C>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let agent = ComplianceAgent::new(ComplianceEngines::default(), store.clone(), AppMetrics::shared())
        .with_classifier(Arc::new(classifier));
    (agent, store)
}

fn turn(text: &str, context_value: Value) -> TurnRequest {
    TurnRequest {
        messages: vec![ChatMessage::user(text)],
        context: context(context_value),
    }
}

fn scenario_a_context() -> Value {
    json!({
        "eccn": "6A003",
        "destination": "China",
        "value": 2500,
        "end_user_name": "Huawei Technologies",
        "supplier_name": "Xinjiang Cotton Co",
        "commodity_description": "Raw Cotton"
    })
}

#[tokio::test]
async fn scenario_a_full_check_surfaces_every_red_flag() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(Intent::FullCheck, json!({}), &[])));

    let response = agent
        .process_turn(turn("Run the full check on this shipment", scenario_a_context()))
        .await;

    assert_eq!(response.intent, Intent::FullCheck);
    assert_eq!(response.mood, Mood::Danger);
    assert!(!response.needs_clarification);
    assert_eq!(response.missing_fields, vec![ShipmentField::EndUse]);

    let license = response.license_result.as_ref().expect("license engine ran");
    assert_eq!(license.status, LicenseStatus::Warning);
    assert!(license.has_code("LIC_REQ"));

    let dps = response.screening(ScreeningEngine::Dps).expect("party screen ran");
    assert_eq!(dps.outcome, ScreeningOutcome::Blocked);

    let uflpa = response.screening(ScreeningEngine::Uflpa).expect("forced-labor screen ran");
    assert_eq!(uflpa.tier, Some(ForcedLaborTier::SeizureLikely));

    let card = response.message(MessageKind::VerdictCard).unwrap();
    assert_eq!(card.data.as_ref().unwrap()["status"], "BLOCKED");
    assert!(response.message(MessageKind::RequirementsPack).is_none());
}

#[tokio::test]
async fn scenario_b_ear99_to_united_kingdom_is_clear() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(
        Intent::LicenseCheck,
        json!({"eccn": "EAR99", "destination": "United Kingdom", "value": 1000}),
        &[],
    )));

    let response = agent
        .process_turn(turn("EAR99 pumps to the UK, $1000", json!({})))
        .await;

    let license = response.license_result.as_ref().expect("license engine ran");
    assert_eq!(license.status, LicenseStatus::Clear);
    assert!(license.findings.iter().any(|f| f.kind == FindingKind::Nlr));
    assert_eq!(response.mood, Mood::Success);
    assert_eq!(response.shipment.destination, "United Kingdom");
    assert!(response.message(MessageKind::OptimizationTip).is_some());

    let uflpa = agent
        .engines()
        .forced_labor()
        .assess(&SupplyChainInput::default())
        .unwrap();
    assert_eq!(uflpa.outcome, ScreeningOutcome::Clear);
    assert!(uflpa
        .reasoning
        .iter()
        .any(|line| line.contains("no risk factors detected")));
}

#[tokio::test]
async fn scenario_c_destination_only_is_blocked_with_requirements_pack() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(
        Intent::LicenseCheck,
        json!({"destination": "Germany"}),
        &["eccn", "value"],
    )));

    let response = agent
        .process_turn(turn("Can I ship to Germany?", json!({})))
        .await;

    assert!(response.needs_clarification);
    assert_eq!(response.mood, Mood::Warning);
    assert!(response.license_result.is_none());

    let pack = response
        .message(MessageKind::RequirementsPack)
        .and_then(|m| m.data.as_ref())
        .expect("requirements pack present");
    assert_eq!(pack["mandatory"], json!(["eccn", "destination"]));

    let items = pack["missing_items"].as_array().unwrap();
    let required = items
        .iter()
        .filter(|item| item["required"] == true)
        .map(|item| item["field"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(required, vec!["eccn"]);

    let optional = items
        .iter()
        .filter(|item| item["required"] == false)
        .map(|item| item["field"].as_str().unwrap())
        .collect::<Vec<_>>();
    for field in ["value", "end_use", "end_user_name", "commodity_description"] {
        assert!(optional.contains(&field), "{field} should be listed as optional");
    }
}

#[tokio::test]
async fn missing_classification_blocks_even_when_classifier_claims_nothing() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(
        Intent::LicenseCheck,
        json!({"destination": "Germany"}),
        &[],
    )));

    let response = agent
        .process_turn(turn("Can I ship to Germany?", json!({})))
        .await;

    assert_eq!(response.intent, Intent::LicenseCheck);
    assert_eq!(response.mood, Mood::Warning);
    assert!(response.needs_clarification);
    assert!(response.license_result.is_none());
    assert!(response.message(MessageKind::VerdictCard).is_none());
    assert_eq!(response.missing_fields[0], ShipmentField::Eccn);

    let pack = response
        .message(MessageKind::RequirementsPack)
        .and_then(|m| m.data.as_ref())
        .expect("requirements pack present");
    assert_eq!(pack["missing_items"][0]["field"], "eccn");
    assert_eq!(pack["missing_items"][0]["required"], true);
}

#[tokio::test]
async fn complete_optional_details_do_not_escalate_without_a_code() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(Intent::LicenseCheck, json!({}), &[])));

    let response = agent
        .process_turn(turn(
            "Check this shipment",
            json!({
                "destination": "Germany",
                "end_use": "Research",
                "end_user_name": "Siemens",
                "commodity_description": "Thermal cameras"
            }),
        ))
        .await;

    assert_eq!(response.intent, Intent::LicenseCheck);
    assert_eq!(response.missing_fields, vec![ShipmentField::Eccn]);
    assert!(response.message(MessageKind::RequirementsPack).is_some());
    assert!(response.license_result.is_none());
}

#[tokio::test]
async fn lookalike_party_does_not_override_the_gate() {
    let (agent, _) = agent_with(ScriptedClassifier(inference(Intent::LicenseCheck, json!({}), &["eccn"])));

    let response = agent
        .process_turn(turn(
            "Ship to Huaxin Systems in Germany",
            json!({"destination": "Germany", "end_user_name": "Huaxin Systems"}),
        ))
        .await;

    let dps = response.screening(ScreeningEngine::Dps).expect("party screen ran");
    assert_eq!(dps.outcome, ScreeningOutcome::Match);
    assert_eq!(response.mood, Mood::Warning);
    assert!(response.message(MessageKind::RequirementsPack).is_some());
    assert!(response.message(MessageKind::VerdictCard).is_none());
}

#[tokio::test]
async fn fields_already_known_are_never_requested_again() {
    // The classifier insists on eccn and destination even though the
    // context already carries both.
    let (agent, _) = agent_with(ScriptedClassifier(IntentInference {
        needs_clarification: false,
        ..inference(Intent::LicenseCheck, json!({"value": 900}), &["eccn", "destination"])
    }));

    let response = agent
        .process_turn(turn(
            "Value is 900",
            json!({"eccn": "5A002", "destination": "Germany"}),
        ))
        .await;

    assert!(!response.missing_fields.contains(&ShipmentField::Eccn));
    assert!(!response.missing_fields.contains(&ShipmentField::Destination));
    assert!(response.missing_fields.contains(&ShipmentField::EndUse));
    assert!(response.message(MessageKind::RequirementsPack).is_none());
    assert!(response.message(MessageKind::VerdictCard).is_some());
    assert_eq!(response.shipment.value, 900.0);
}

#[tokio::test]
async fn classifier_failure_degrades_to_general_answer() {
    let (agent, _) = agent_with(FailingClassifier);

    let response = agent
        .process_turn(turn("Can I export 5A002 to France?", json!({})))
        .await;

    assert_eq!(response.intent, Intent::GeneralQa);
    assert_eq!(response.mood, Mood::Idle);
    assert_eq!(response.kinds(), vec![MessageKind::Text]);
    assert_eq!(response.summary_text(), QA_FALLBACK);
    assert_eq!(agent.metrics().snapshot().classifier_fallback_total, 1);
}

#[tokio::test]
async fn missing_classifier_answers_with_generator() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ComplianceAgent::new(
        ComplianceEngines::default(),
        Arc::new(MemoryStore::new()),
        AppMetrics::shared(),
    )
    .with_generator(generator.clone());

    let response = agent
        .process_turn(turn("What is EAR99?", json!({})))
        .await;

    assert_eq!(response.intent, Intent::GeneralQa);
    assert_eq!(
        response.summary_text(),
        "EAR99 covers most commercial items. They rarely need a license."
    );
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].ends_with("Question: What is EAR99?"));
}

#[tokio::test]
async fn generator_failure_uses_fixed_fallback() {
    let agent = ComplianceAgent::new(
        ComplianceEngines::default(),
        Arc::new(MemoryStore::new()),
        AppMetrics::shared(),
    )
    .with_classifier(Arc::new(NoLanguageModel))
    .with_generator(Arc::new(FailingGenerator));

    let response = agent
        .process_turn(turn("What does deemed export mean?", json!({})))
        .await;

    assert_eq!(response.summary_text(), QA_FALLBACK);
    let snapshot = agent.metrics().snapshot();
    assert_eq!(snapshot.generator_fallback_total, 1);
    assert_eq!(snapshot.classifier_fallback_total, 1);
}

#[tokio::test]
async fn failing_engine_is_isolated_from_the_others() {
    let engines = ComplianceEngines::new(Arc::new(BrokenWatchlist(StaticReferenceTables::load())));
    let agent = ComplianceAgent::new(engines, Arc::new(MemoryStore::new()), AppMetrics::shared())
        .with_classifier(Arc::new(ScriptedClassifier(inference(
            Intent::FullCheck,
            json!({}),
            &[],
        ))));

    let response = agent
        .process_turn(turn(
            "Full check please",
            json!({
                "eccn": "EAR99",
                "destination": "Germany",
                "end_user_name": "Siemens",
                "commodity_description": "Industrial pumps",
                "end_use": "Water treatment"
            }),
        ))
        .await;

    assert!(response.license_result.is_some());
    assert!(response.screening(ScreeningEngine::Dps).is_none());
    assert!(response.screening(ScreeningEngine::Uflpa).is_some());
    assert!(response.message(MessageKind::VerdictCard).is_some());
    assert_eq!(agent.metrics().snapshot().engine_failure_total, 1);
}

#[tokio::test]
async fn session_accumulates_details_across_turns() {
    let (agent, store) = agent_with(SequenceClassifier::new(vec![
        inference(Intent::LicenseCheck, json!({"destination": "Germany"}), &["eccn"]),
        inference(Intent::LicenseCheck, json!({"eccn": "5A002"}), &["destination"]),
    ]));

    let first = agent
        .handle_chat(ChatInput {
            session_id: None,
            text: "Shipping to Germany".to_string(),
            context: None,
        })
        .await
        .unwrap();
    assert!(first.response.message(MessageKind::RequirementsPack).is_some());
    assert!(!first.session_id.is_empty());

    let second = agent
        .handle_chat(ChatInput {
            session_id: Some(first.session_id.clone()),
            text: "It is 5A002".to_string(),
            context: None,
        })
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.response.shipment.destination, "Germany");
    assert_eq!(second.response.shipment.eccn, "5A002");
    assert!(second.response.message(MessageKind::VerdictCard).is_some());

    let session = store.load_session(&first.session_id).await.unwrap().unwrap();
    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.history.len(), 4);
    assert_eq!(session.history[0].role, "user");
    assert_eq!(session.history[1].role, "assistant");
}

#[tokio::test]
async fn concurrent_sessions_do_not_share_state() {
    let (agent, store) =
        agent_with(ScriptedClassifier(inference(Intent::LicenseCheck, json!({}), &[])));

    let (alpha, beta) = tokio::join!(
        agent.handle_chat(ChatInput {
            session_id: Some("alpha".to_string()),
            text: "check this".to_string(),
            context: Some(context(json!({"eccn": "5A002", "destination": "Germany"}))),
        }),
        agent.handle_chat(ChatInput {
            session_id: Some("beta".to_string()),
            text: "check this".to_string(),
            context: Some(context(json!({"eccn": "EAR99", "destination": "Japan"}))),
        }),
    );
    alpha.unwrap();
    beta.unwrap();

    let alpha = store.load_session("alpha").await.unwrap().unwrap();
    let beta = store.load_session("beta").await.unwrap().unwrap();
    assert_eq!(alpha.shipment.destination, "Germany");
    assert_eq!(beta.shipment.destination, "Japan");
    assert_eq!(alpha.turns.len(), 1);
    assert_eq!(beta.turns.len(), 1);
}

#[tokio::test]
async fn turns_on_one_session_are_serialized() {
    let (agent, store) =
        agent_with(ScriptedClassifier(inference(Intent::GeneralQa, json!({}), &[])));

    let chat = |text: &str| ChatInput {
        session_id: Some("shared".to_string()),
        text: text.to_string(),
        context: None,
    };
    let (first, second) = tokio::join!(agent.handle_chat(chat("one")), agent.handle_chat(chat("two")));
    first.unwrap();
    second.unwrap();

    let session = store.load_session("shared").await.unwrap().unwrap();
    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.history.len(), 4);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn keyword_backend_runs_offline_license_check() {
    let backend = LanguageBackend::Keyword(KeywordIntentClassifier::new(
        StaticReferenceTables::shared(),
    ));
    assert_eq!(backend.name(), "keyword");
    let (agent, _) = agent_with(backend);

    let reply = agent
        .handle_chat(ChatInput {
            session_id: None,
            text: "Can I export 6A003 cameras to China for $2,500?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    let response = reply.response;
    assert_eq!(response.intent, Intent::LicenseCheck);
    assert_eq!(response.shipment.eccn, "6A003");
    assert_eq!(response.shipment.destination, "China");
    assert_eq!(response.shipment.value, 2500.0);
    assert_eq!(
        response.license_result.as_ref().map(|l| l.status),
        Some(LicenseStatus::Warning)
    );
    assert_eq!(response.mood, Mood::Warning);
}

#[tokio::test]
async fn metrics_track_paths_per_turn() {
    let (agent, _) = agent_with(SequenceClassifier::new(vec![
        inference(Intent::FullCheck, json!({}), &[]),
        inference(Intent::LicenseCheck, json!({"destination": "Germany"}), &["eccn"]),
    ]));

    agent
        .process_turn(turn("full check", scenario_a_context()))
        .await;
    agent
        .process_turn(turn("ship to Germany", json!({})))
        .await;

    let snapshot = agent.metrics().snapshot();
    assert_eq!(snapshot.turns_total, 2);
    assert_eq!(snapshot.verdicts_total, 1);
    assert_eq!(snapshot.blocked_turns_total, 1);
    assert_eq!(agent.purge_expired_sessions().await.unwrap(), 0);
}
