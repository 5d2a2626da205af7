//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - serve: Run the HTTP/WebSocket server
//! - chat: Interactive terminal chat through the goal pipeline
//! - status: Provider availability and pipeline defaults

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use sdk::{ClientEvent, Goal, PipelineStage, ServerEvent};

use crate::config::Config;
use crate::llm::{self, scripted::ScriptedProvider, LLMProvider};
use crate::pipeline::Orchestrator;
use crate::server::{self, AppState};
use crate::store::ConversationStore;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build an orchestrator with a fresh store using the configured defaults
pub fn build_orchestrator(config: &Config, provider: Arc<dyn LLMProvider>) -> Orchestrator {
    let store = ConversationStore::new(config.pipeline.default_settings());
    Orchestrator::new(provider, store, config.pipeline.clone())
}

/// Run the server until Ctrl-C
pub async fn handle_serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let provider = llm::provider_from_config(&config.llm);
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        available = provider.is_available(),
        "Oracle provider selected"
    );

    let state = AppState::new(build_orchestrator(config, provider));
    server::serve(state, &host, port, &config.server.allowed_origins)
        .await
        .context("Server failed")?;

    Ok(())
}

/// Show provider availability and pipeline defaults
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let provider = llm::provider_from_config(&config.llm);
    let available = provider.is_available();
    let settings = config.pipeline.default_settings();

    match format {
        OutputFormat::Text => {
            println!("OnGoal status");
            println!("  Provider:  {} ({})", provider.name(), provider.model());
            println!(
                "  Available: {}",
                if available { "yes" } else { "no" }
            );
            if !available && provider.name() == "anthropic" {
                println!(
                    "  Hint:      set {} to enable replies",
                    config.llm.anthropic.api_key_env
                );
            }
            println!("Pipeline defaults:");
            for stage in PipelineStage::ALL {
                println!(
                    "  {:<9} {}",
                    stage.to_string(),
                    if settings.is_enabled(stage) { "on" } else { "off" }
                );
            }
            println!(
                "Server:      http://{}:{}",
                config.server.host, config.server.port
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "provider": provider.name(),
                "model": provider.model(),
                "available": available,
                "pipeline": settings,
                "server": {
                    "host": config.server.host,
                    "port": config.server.port,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// One line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Quit,
    Goals,
    Toggle { stage: PipelineStage, enabled: bool },
    Invalid(String),
    Message(String),
}

/// Interpret a chat line; lines starting with `/` are commands
pub fn parse_chat_line(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    if !trimmed.starts_with('/') {
        return ChatInput::Message(trimmed.to_string());
    }

    let mut parts = trimmed.split_whitespace();
    match parts.next() {
        Some("/quit") | Some("/exit") => ChatInput::Quit,
        Some("/goals") => ChatInput::Goals,
        Some("/toggle") => {
            let stage = match parts.next().map(str::parse::<PipelineStage>) {
                Some(Ok(stage)) => stage,
                Some(Err(e)) => return ChatInput::Invalid(e.to_string()),
                None => return ChatInput::Invalid("usage: /toggle <stage> <on|off>".to_string()),
            };
            let enabled = match parts.next() {
                Some("on") => true,
                Some("off") => false,
                _ => return ChatInput::Invalid("usage: /toggle <stage> <on|off>".to_string()),
            };
            ChatInput::Toggle { stage, enabled }
        }
        Some(other) => ChatInput::Invalid(format!("unknown command '{}'", other)),
        None => ChatInput::Empty,
    }
}

fn describe_goal(goal: &Goal) -> String {
    let mut line = format!("{} ({}): {}", goal.id, goal.goal_type, goal.text);
    if let Some(status) = goal.status {
        line.push_str(&format!(" [{:?}]", status).to_lowercase());
    }
    if goal.locked {
        line.push_str(" [locked]");
    }
    if goal.completed {
        line.push_str(" [completed]");
    }
    line
}

/// Text rendering of a server event; chunks carry no trailing newline
pub fn render_event(event: &ServerEvent) -> String {
    match event {
        ServerEvent::GoalsInferred { goals, .. } => goals
            .iter()
            .map(|g| format!("  + inferred {}\n", describe_goal(g)))
            .collect(),
        ServerEvent::GoalsUpdated { goals, .. } => {
            let mut out = format!("  Goals ({}):\n", goals.len());
            for goal in goals {
                out.push_str(&format!("    {}\n", describe_goal(goal)));
            }
            out
        }
        ServerEvent::LlmResponseChunk { text, .. } => text.clone(),
        ServerEvent::LlmResponseComplete { .. } => "\n".to_string(),
        ServerEvent::GoalsEvaluated { evaluations, .. } => evaluations
            .iter()
            .map(|e| {
                format!(
                    "  = {} {}: {}\n",
                    e.goal_id,
                    e.category.as_str(),
                    e.explanation
                )
            })
            .collect(),
        ServerEvent::PipelineToggled { stage, enabled } => format!(
            "  Stage '{}' {}\n",
            stage,
            if *enabled { "enabled" } else { "disabled" }
        ),
        ServerEvent::ConversationState { conversation } => format!(
            "  Conversation '{}': {} messages, {} goals\n",
            conversation.id,
            conversation.messages.len(),
            conversation.goals.len()
        ),
        ServerEvent::Error { message } => format!("\n  ! {}\n", message),
    }
}

/// Dispatch one client event and print the resulting server events as they arrive
async fn relay(
    orchestrator: &Orchestrator,
    conversation_id: &str,
    event: ClientEvent,
    format: OutputFormat,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(64);

    let work = async move {
        orchestrator
            .handle_client_event(conversation_id, event, &tx)
            .await;
    };

    let print = async {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match format {
                OutputFormat::Text => write!(stdout, "{}", render_event(&event))?,
                OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&event)?)?,
            }
            stdout.flush()?;
        }
        Ok::<(), anyhow::Error>(())
    };

    let ((), printed) = tokio::join!(work, print);
    printed
}

/// Interactive terminal chat
pub async fn handle_chat(
    config: &Config,
    conversation_id: &str,
    offline: bool,
    format: OutputFormat,
) -> Result<()> {
    let provider: Arc<dyn LLMProvider> = if offline {
        Arc::new(ScriptedProvider::echo())
    } else {
        llm::provider_from_config(&config.llm)
    };

    if !provider.is_available() {
        tracing::warn!(
            provider = provider.name(),
            "Provider unavailable; replies will be error messages (try --offline)"
        );
    }

    let orchestrator = build_orchestrator(config, provider);
    orchestrator.store().get_or_create(conversation_id).await;

    if format == OutputFormat::Text {
        println!("OnGoal chat ({}). Commands: /goals, /toggle <stage> <on|off>, /quit", conversation_id);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if format == OutputFormat::Text {
            print!("> ");
            std::io::stdout().flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_chat_line(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::Invalid(msg) => eprintln!("{}", msg),
            ChatInput::Goals => {
                let goals = orchestrator
                    .store()
                    .snapshot(conversation_id)
                    .await
                    .map(|c| c.goals)
                    .unwrap_or_default();
                match format {
                    OutputFormat::Text if goals.is_empty() => println!("  No goals yet."),
                    OutputFormat::Text => {
                        for goal in &goals {
                            println!("  {}", describe_goal(goal));
                        }
                    }
                    OutputFormat::Json => println!("{}", serde_json::to_string(&goals)?),
                }
            }
            ChatInput::Toggle { stage, enabled } => {
                relay(
                    &orchestrator,
                    conversation_id,
                    ClientEvent::TogglePipeline { stage, enabled },
                    format,
                )
                .await?;
            }
            ChatInput::Message(message) => {
                relay(
                    &orchestrator,
                    conversation_id,
                    ClientEvent::UserMessage { message },
                    format,
                )
                .await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::{EvaluationCategory, EvaluationRecord};

    #[test]
    fn test_parse_chat_line() {
        assert_eq!(parse_chat_line("   "), ChatInput::Empty);
        assert_eq!(parse_chat_line("/quit"), ChatInput::Quit);
        assert_eq!(parse_chat_line("/goals"), ChatInput::Goals);
        assert_eq!(
            parse_chat_line("/toggle merge off"),
            ChatInput::Toggle {
                stage: PipelineStage::Merge,
                enabled: false
            }
        );
        assert_eq!(
            parse_chat_line("  Write me a poem "),
            ChatInput::Message("Write me a poem".to_string())
        );
    }

    #[test]
    fn test_parse_chat_line_errors() {
        assert!(matches!(parse_chat_line("/toggle"), ChatInput::Invalid(_)));
        assert!(matches!(parse_chat_line("/toggle summarize on"), ChatInput::Invalid(_)));
        assert!(matches!(parse_chat_line("/toggle infer maybe"), ChatInput::Invalid(_)));
        assert!(matches!(parse_chat_line("/dance"), ChatInput::Invalid(_)));
    }

    #[test]
    fn test_render_events() {
        let chunk = ServerEvent::LlmResponseChunk {
            text: "Hel".to_string(),
            message_id: "msg_1".to_string(),
        };
        assert_eq!(render_event(&chunk), "Hel");

        let mut goal = Goal::new("G0", "What's 2+2?", "question", "msg_0");
        goal.locked = true;
        let updated = ServerEvent::GoalsUpdated {
            goals: vec![goal],
            message_id: "msg_0".to_string(),
        };
        assert_eq!(
            render_event(&updated),
            "  Goals (1):\n    G0 (question): What's 2+2? [locked]\n"
        );

        let evaluated = ServerEvent::GoalsEvaluated {
            evaluations: vec![EvaluationRecord {
                goal_id: "G0".to_string(),
                category: EvaluationCategory::Confirm,
                explanation: "Answered.".to_string(),
                examples: vec![],
                timestamp: chrono::Utc::now(),
            }],
            message_id: "msg_1".to_string(),
        };
        assert_eq!(render_event(&evaluated), "  = G0 confirm: Answered.\n");
    }

    #[tokio::test]
    async fn test_build_orchestrator_uses_configured_defaults() {
        let mut config = Config::default();
        config.pipeline.evaluate = false;

        let orch = build_orchestrator(&config, Arc::new(ScriptedProvider::echo()));
        orch.store().get_or_create("c").await;
        let conv = orch.store().snapshot("c").await.unwrap();
        assert!(!conv.pipeline_settings.evaluate);
        assert!(conv.pipeline_settings.infer);
    }
}
