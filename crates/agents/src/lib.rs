use std::env;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use shield_core::{
    assemble, escalate_intent, normalize_text, verify_missing_fields, AgentResponse, ChatInput,
    ChatMessage, ComplianceEngines, IntentInference, ResponsePath, ShipmentCase, ShipmentSession,
    TurnFacts, TurnRecord, TurnRequest,
};
use shield_llm::prompts::qa_prompt;
use shield_llm::{IntentClassifier, NoLanguageModel, TextGenerator};
use shield_observability::AppMetrics;
use shield_storage::SessionRepository;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Messages handed to the classifier, most recent last.
    pub history_window: usize,
    pub session_ttl_hours: i64,
    pub max_turns: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_window: 4,
            session_ttl_hours: 24,
            max_turns: 40,
        }
    }
}

impl AgentSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl_hours: parse_clamped(
                env::var("SHIELD_SESSION_TTL_HOURS").ok().as_deref(),
                defaults.session_ttl_hours,
                1,
                720,
            ),
            max_turns: parse_clamped(
                env::var("SHIELD_MAX_TURNS").ok().as_deref(),
                defaults.max_turns,
                4,
                400,
            ),
            ..defaults
        }
    }
}

fn parse_clamped<T>(raw: Option<&str>, default: T, min: T, max: T) -> T
where
    T: std::str::FromStr + Ord,
{
    raw.and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReply {
    pub session_id: String,
    #[serde(flatten)]
    pub response: AgentResponse,
}

pub struct ComplianceAgent<S, C = NoLanguageModel, G = NoLanguageModel>
where
    S: SessionRepository,
{
    engines: ComplianceEngines,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    classifier: Option<Arc<C>>,
    generator: Option<Arc<G>>,
    settings: AgentSettings,
}

impl<S, C, G> Clone for ComplianceAgent<S, C, G>
where
    S: SessionRepository,
{
    fn clone(&self) -> Self {
        Self {
            engines: self.engines.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            classifier: self.classifier.clone(),
            generator: self.generator.clone(),
            settings: self.settings,
        }
    }
}

impl<S> ComplianceAgent<S>
where
    S: SessionRepository,
{
    /// An agent with no language model: every turn is general_qa and
    /// answers with the fixed fallback.
    pub fn new(engines: ComplianceEngines, store: Arc<S>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            engines,
            store,
            metrics,
            classifier: None,
            generator: None,
            settings: AgentSettings::default(),
        }
    }
}

impl<S, C, G> ComplianceAgent<S, C, G>
where
    S: SessionRepository,
    C: IntentClassifier,
    G: TextGenerator,
{
    /// For callers that choose collaborators at runtime; `None` slots
    /// behave as if the collaborator were absent.
    pub fn from_parts(
        engines: ComplianceEngines,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
        classifier: Option<Arc<C>>,
        generator: Option<Arc<G>>,
    ) -> Self {
        Self {
            engines,
            store,
            metrics,
            classifier,
            generator,
            settings: AgentSettings::default(),
        }
    }

    pub fn with_classifier<C2: IntentClassifier>(self, classifier: Arc<C2>) -> ComplianceAgent<S, C2, G> {
        ComplianceAgent {
            engines: self.engines,
            store: self.store,
            metrics: self.metrics,
            classifier: Some(classifier),
            generator: self.generator,
            settings: self.settings,
        }
    }

    pub fn with_generator<G2: TextGenerator>(self, generator: Arc<G2>) -> ComplianceAgent<S, C, G2> {
        ComplianceAgent {
            engines: self.engines,
            store: self.store,
            metrics: self.metrics,
            classifier: self.classifier,
            generator: Some(generator),
            settings: self.settings,
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engines(&self) -> &ComplianceEngines {
        &self.engines
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    /// One stateless turn: the caller supplies the full history and the
    /// current shipment context. Never fails; collaborator and engine
    /// errors degrade per the fallback rules.
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    pub async fn process_turn(&self, request: TurnRequest) -> AgentResponse {
        let started = Instant::now();
        self.metrics.inc_turn();

        let prior = ShipmentCase::from_context(&request.context);
        let window_start = request
            .messages
            .len()
            .saturating_sub(self.settings.history_window);
        let window = &request.messages[window_start..];

        let inference = self.infer(window, &prior).await;
        let missing = verify_missing_fields(
            inference.intent,
            &prior,
            &inference.missing_fields,
            &inference.field_updates,
        );
        let intent = escalate_intent(inference.intent, &missing);
        let shipment = prior.merged(&inference.field_updates);
        debug!(
            claimed_intent = ?inference.intent,
            intent = ?intent,
            claimed_missing = inference.missing_fields.len(),
            verified_missing = missing.len(),
            "classifier output verified"
        );

        let tools = self.engines.run_tools(intent, &shipment);
        for err in &tools.errors {
            warn!(error = %err, "rule engine failed; result omitted");
        }
        self.metrics.add_engine_failures(tools.errors.len());

        let facts = TurnFacts {
            intent,
            shipment: &shipment,
            missing: &missing,
            tools: &tools,
        };
        let qa_answer = match facts.path() {
            ResponsePath::Qa => self.answer(last_user_text(&request.messages)).await,
            _ => None,
        };
        let assembly = assemble(&facts, qa_answer);

        match assembly.path {
            ResponsePath::Blocked { .. } => self.metrics.inc_blocked_turn(),
            ResponsePath::Verdict => self.metrics.inc_verdict(),
            ResponsePath::Qa => {}
        }
        self.metrics.observe_latency(started.elapsed());

        info!(
            intent = ?intent,
            path = ?assembly.path,
            mood = ?assembly.mood,
            missing = missing.len(),
            license = tools.license.is_some(),
            "turn processed"
        );

        AgentResponse {
            needs_clarification: inference.needs_clarification
                || matches!(assembly.path, ResponsePath::Blocked { .. }),
            license_result: tools.license.clone(),
            screenings: tools.screenings(),
            shipment,
            messages: assembly.messages,
            mood: assembly.mood,
            intent,
            missing_fields: missing,
        }
    }

    /// Session-backed turn: loads (or creates) the session, folds in any
    /// form context, runs the turn and persists the result. Turns on the
    /// same session id are serialized.
    #[instrument(skip(self, input))]
    pub async fn handle_chat(&self, input: ChatInput) -> Result<SessionReply> {
        let session_id = input
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let _guard = self.store.lock_session(&session_id).await;
        let now = Utc::now();
        let ttl = Duration::hours(self.settings.session_ttl_hours);

        let mut session = self
            .store
            .load_session(&session_id)
            .await
            .with_context(|| format!("failed loading session {session_id}"))?
            .filter(|session| session.expires_at > now)
            .unwrap_or_else(|| ShipmentSession::new(&session_id, now + ttl));

        if let Some(context) = input.context.as_ref() {
            session.shipment = session.shipment.merged(context);
        }

        let text = normalize_text(&input.text);
        session.history.push(ChatMessage::user(text.clone()));

        let response = self
            .process_turn(TurnRequest {
                messages: session.history.clone(),
                context: session.shipment.to_context(),
            })
            .await;

        session.shipment = response.shipment.clone();
        session
            .history
            .push(ChatMessage::assistant(response.summary_text()));
        session.turns.push(TurnRecord {
            at: now,
            user_text: text,
            intent: response.intent,
            mood: response.mood,
        });

        let max_turns = self.settings.max_turns;
        if session.turns.len() > max_turns {
            let keep_from = session.turns.len() - max_turns;
            session.turns = session.turns.split_off(keep_from);
        }
        if session.history.len() > max_turns * 2 {
            let keep_from = session.history.len() - max_turns * 2;
            session.history = session.history.split_off(keep_from);
        }
        session.expires_at = now + ttl;

        self.store
            .upsert_session(&session)
            .await
            .with_context(|| format!("failed storing session {session_id}"))?;

        Ok(SessionReply {
            session_id,
            response,
        })
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }

    async fn infer(&self, window: &[ChatMessage], prior: &ShipmentCase) -> IntentInference {
        let Some(classifier) = self.classifier.as_ref() else {
            return IntentInference::general_qa();
        };

        match classifier.classify(window, prior).await {
            Ok(inference) => inference,
            Err(err) => {
                self.metrics.inc_classifier_fallback();
                warn!(error = %err, "intent classifier failed; falling back to general_qa");
                IntentInference::general_qa()
            }
        }
    }

    async fn answer(&self, question: &str) -> Option<String> {
        let generator = self.generator.as_ref()?;

        match generator.generate(&qa_prompt(question)).await {
            Ok(text) => Some(text),
            Err(err) => {
                self.metrics.inc_generator_fallback();
                warn!(error = %err, "text generator failed; using fallback answer");
                None
            }
        }
    }
}

fn last_user_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content.as_str())
        .unwrap_or_default()
}
