use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shield_agents::{AgentSettings, ComplianceAgent};
use shield_core::{
    ChatInput, ComplianceEngines, CountryGroup, EndUserType, MessageKind, ReferenceTables,
    StaticReferenceTables, SupplyChainInput,
};
use shield_llm::{HttpLanguageModel, KeywordIntentClassifier, LanguageBackend, LlmRuntimeConfig};
use shield_observability::{init_tracing, AppMetrics};
use shield_storage::MemoryStore;
use tracing::info;

type Agent = ComplianceAgent<MemoryStore, LanguageBackend, LanguageBackend>;

#[derive(Debug, Parser)]
#[command(name = "shield")]
#[command(about = "Export compliance copilot")]
struct Cli {
    /// Classify intents with local keyword rules when no language model
    /// is configured.
    #[arg(long, global = true, env = "SHIELD_OFFLINE_RULES")]
    offline_rules: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    License {
        #[arg(long, default_value = "")]
        eccn: String,
        #[arg(long)]
        destination: String,
        #[arg(long, default_value_t = 0.0)]
        value: f64,
        #[arg(long, default_value = "commercial")]
        end_user_type: String,
    },
    ScreenParty {
        name: String,
    },
    ScreenSupply {
        #[arg(long, default_value = "")]
        supplier: String,
        #[arg(long, default_value = "")]
        commodity: String,
        #[arg(long, default_value = "")]
        origin: String,
        #[arg(long, default_value = "")]
        region: String,
    },
    Countries,
}

#[derive(Debug, Serialize)]
struct CountryRow {
    name: String,
    groups: Vec<CountryGroup>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("shield_cli");
    let cli = Cli::parse();

    let tables = StaticReferenceTables::shared();
    let engines = ComplianceEngines::new(tables.clone());

    match cli.command {
        Command::Chat => {
            let agent = build_agent(engines, tables, cli.offline_rules)?;
            run_chat(&agent).await?;
            eprintln!("{}", serde_json::to_string_pretty(&agent.metrics().snapshot())?);
        }
        Command::License {
            eccn,
            destination,
            value,
            end_user_type,
        } => {
            let end_user_type =
                EndUserType::parse(&end_user_type).context("invalid --end-user-type value")?;
            let result = engines
                .license()
                .evaluate(&eccn, &destination, value, end_user_type)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::ScreenParty { name } => {
            let result = engines.parties().screen(&name)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::ScreenSupply {
            supplier,
            commodity,
            origin,
            region,
        } => {
            let result = engines.forced_labor().assess(&SupplyChainInput {
                supplier,
                commodity,
                origin,
                region,
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Countries => {
            let mut rows = Vec::new();
            for name in tables.destinations() {
                let groups = tables.country_groups(&name)?;
                rows.push(CountryRow { name, groups });
            }
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

async fn run_chat(agent: &Agent) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("Shield compliance chat. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let reply = agent
            .handle_chat(ChatInput {
                session_id: session_id.clone(),
                text: message.to_string(),
                context: None,
            })
            .await?;
        session_id = Some(reply.session_id.clone());

        println!();
        for block in &reply.response.messages {
            match (block.kind, block.content.as_deref(), block.data.as_ref()) {
                (MessageKind::Text, Some(text), _) => println!("{text}"),
                (kind, _, Some(data)) => {
                    println!("[{}]", serde_json::to_string(&kind)?.trim_matches('"'));
                    println!("{}", serde_json::to_string_pretty(data)?);
                }
                _ => {}
            }
        }
        println!();
    }

    Ok(())
}

fn build_agent(
    engines: ComplianceEngines,
    tables: Arc<StaticReferenceTables>,
    offline_rules: bool,
) -> Result<Agent> {
    let metrics = AppMetrics::shared();
    let store = Arc::new(MemoryStore::new());

    let (classifier, generator) = match LlmRuntimeConfig::from_env() {
        Some(runtime) => {
            let backend = Arc::new(LanguageBackend::Http(
                HttpLanguageModel::new(runtime).context("failed building language model client")?,
            ));
            (Some(backend.clone()), Some(backend))
        }
        None if offline_rules => (
            Some(Arc::new(LanguageBackend::Keyword(KeywordIntentClassifier::new(
                tables,
            )))),
            None,
        ),
        None => (None, None),
    };

    info!(
        classifier = classifier.as_ref().map(|backend| backend.name()),
        generator = generator.as_ref().map(|backend| backend.name()),
        "agent collaborators selected"
    );

    Ok(
        ComplianceAgent::from_parts(engines, store, metrics, classifier, generator)
            .with_settings(AgentSettings::from_env()),
    )
}
