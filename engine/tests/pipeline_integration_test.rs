//! End-to-end pipeline tests across several turns
//!
//! A scripted oracle answers inference, merge and evaluation prompts in the
//! order the orchestrator asks them.

use ongoal_engine::config::PipelineConfig;
use ongoal_engine::llm::scripted::ScriptedProvider;
use ongoal_engine::pipeline::Orchestrator;
use ongoal_engine::store::ConversationStore;
use sdk::{ClientEvent, GoalStatus, GoalType, PipelineSettings, PipelineStage, Role, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

fn orchestrator(provider: &Arc<ScriptedProvider>) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(provider) as Arc<dyn ongoal_engine::llm::LLMProvider>,
        ConversationStore::new(PipelineSettings::default()),
        PipelineConfig::default(),
    )
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn judgement(category: &str) -> String {
    format!(
        r#"{{"category":"{}","explanation":"Checked.","examples":[]}}"#,
        category
    )
}

#[tokio::test]
async fn test_story_conversation_across_three_turns() {
    let provider = Arc::new(ScriptedProvider::new());
    let orch = orchestrator(&provider);
    let (tx, mut rx) = mpsc::channel(256);

    // Turn 1: two goals, nothing to merge with yet
    provider.push_reply(
        r#"{"clauses":[
            {"clause":"Write a short story about a cat","type":"request","summary":"story"},
            {"clause":"Make it funny","type":"suggestion","summary":"humor"}
        ]}"#,
    );
    provider.push_stream(["Whiskers ", "fell off the sofa."]);
    provider.push_reply(judgement("confirm"));
    provider.push_reply(judgement("ignore"));

    let first = orch
        .run_turn("story", "Write a short story about a cat. Make it funny.", &tx)
        .await;
    assert_eq!(first.goal_count, 2);
    assert_eq!(first.evaluated, 2);
    drain(&mut rx);

    let conv = orch.store().snapshot("story").await.unwrap();
    let ids: Vec<&str> = conv.goals.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["G0", "G1"]);
    assert_eq!(conv.goals[0].status, Some(GoalStatus::Confirmed));
    assert_eq!(conv.goals[1].status, Some(GoalStatus::Ignored));

    // Turn 2: a contradicting request replaces the short-story goal
    provider.push_reply(
        r#"{"clauses":[{"clause":"Make it long and detailed","type":"request","summary":"length"}]}"#,
    );
    provider.push_reply(
        r#"Here is the merge:
        {"operations":[
            {"updated_goal":"Write a long, detailed story about a cat","operation":"replace","goal_numbers":["1","1"]},
            {"updated_goal":"Make it funny","operation":"keep","goal_numbers":["2"]}
        ]}"#,
    );
    provider.push_stream(["Chapter one."]);
    provider.push_reply(judgement("contradict"));
    provider.push_reply(judgement("confirm"));

    let second = orch
        .run_turn("story", "Actually, make it long and detailed.", &tx)
        .await;
    assert_eq!(second.user_message_id, "msg_2");
    let events = drain(&mut rx);

    let inferred = events.iter().find_map(|e| match e {
        ServerEvent::GoalsInferred { goals, .. } => Some(goals.clone()),
        _ => None,
    });
    let inferred = inferred.expect("goals_inferred event");
    assert_eq!(inferred.len(), 1);
    assert_eq!(inferred[0].id, "G2");

    let conv = orch.store().snapshot("story").await.unwrap();
    let goals: Vec<(&str, &str, &GoalType, &str)> = conv
        .goals
        .iter()
        .map(|g| (g.id.as_str(), g.text.as_str(), &g.goal_type, g.source_message_id.as_str()))
        .collect();
    assert_eq!(
        goals,
        vec![
            ("G0_replace", "Write a long, detailed story about a cat", &GoalType::Request, "msg_2"),
            ("G1_keep", "Make it funny", &GoalType::Suggestion, "msg_0"),
        ]
    );
    assert_eq!(conv.goals[0].status, Some(GoalStatus::Contradicted));

    // Turn 3: the humor goal is locked and must not reach the merge oracle
    {
        let handle = orch.store().get("story").await.unwrap();
        handle.lock().await.set_locked("G1_keep", true).unwrap();
    }

    provider.push_reply(
        r#"{"clauses":[{"clause":"What is the cat's name?","type":"question","summary":"name"}]}"#,
    );
    provider.push_reply(
        r#"{"operations":[
            {"updated_goal":"Write a long, detailed story about a cat","operation":"keep","goal_numbers":[1]},
            {"updated_goal":"What is the cat's name?","operation":"keep","goal_numbers":[2]}
        ]}"#,
    );
    provider.push_stream(["The cat is called Whiskers."]);
    provider.push_reply(judgement("ignore"));
    provider.push_reply(judgement("confirm"));
    provider.push_reply(judgement("confirm"));

    let third = orch.run_turn("story", "What's the cat's name?", &tx).await;
    assert_eq!(third.evaluated, 3);

    let prompts = provider.prompts();
    let merge_prompt = prompts
        .iter()
        .rev()
        .find(|p| p.contains("old numbered bullet point goals"))
        .unwrap();
    assert!(!merge_prompt.contains("Make it funny"));
    assert!(merge_prompt.contains("1. Write a long, detailed story about a cat"));

    let conv = orch.store().snapshot("story").await.unwrap();
    let ids: Vec<&str> = conv.goals.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["G1_keep", "G0_keep", "G1_keep_1"]);
    assert!(conv.goals[0].locked);
    assert_eq!(conv.goals[2].goal_type, GoalType::Question);

    // Six stored messages, alternating, each user message carrying its goals
    assert_eq!(conv.messages.len(), 6);
    for (i, message) in conv.messages.iter().enumerate() {
        assert_eq!(message.id, format!("msg_{}", i));
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(message.role, expected);
    }
    assert_eq!(conv.messages[4].goals[0].id, "G2");

    // The reply history always ended with the newest user message, once
    let histories = provider.histories();
    assert_eq!(histories.len(), 3);
    assert_eq!(histories[2].len(), 5);
    assert_eq!(histories[2][4].content, "What's the cat's name?");
}

#[tokio::test]
async fn test_disabled_inference_asks_no_oracle_questions() {
    let provider = Arc::new(ScriptedProvider::new());
    let orch = orchestrator(&provider);
    let (tx, mut rx) = mpsc::channel(64);

    orch.handle_client_event(
        "quiet",
        ClientEvent::TogglePipeline {
            stage: PipelineStage::Infer,
            enabled: false,
        },
        &tx,
    )
    .await;

    provider.push_stream(["Hello!"]);
    orch.handle_client_event(
        "quiet",
        ClientEvent::UserMessage {
            message: "Can you help me plan a trip?".to_string(),
        },
        &tx,
    )
    .await;

    assert!(provider.prompts().is_empty());

    let events = drain(&mut rx);
    assert!(matches!(
        events[0],
        ServerEvent::PipelineToggled {
            stage: PipelineStage::Infer,
            enabled: false
        }
    ));
    assert!(events
        .iter()
        .all(|e| !matches!(e, ServerEvent::GoalsInferred { .. } | ServerEvent::GoalsEvaluated { .. })));
    assert!(matches!(
        events.last(),
        Some(ServerEvent::LlmResponseComplete { full_text, .. }) if full_text == "Hello!"
    ));
}

#[tokio::test]
async fn test_concurrent_turns_on_one_conversation_do_not_interleave() {
    let provider = Arc::new(ScriptedProvider::new());
    let orch = orchestrator(&provider);
    {
        let handle = orch.store().get_or_create("shared").await;
        handle.lock().await.pipeline_settings.infer = false;
    }
    provider.push_stream(["first ", "reply"]);
    provider.push_stream(["second ", "reply"]);

    let mut tasks = Vec::new();
    for text in ["one", "two"] {
        let orch = orch.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel(64);
            orch.run_turn("shared", text, &tx).await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let conv = orch.store().snapshot("shared").await.unwrap();
    let roles: Vec<Role> = conv.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_reset_clears_goals_and_messages() {
    let provider = Arc::new(ScriptedProvider::new());
    let orch = orchestrator(&provider);
    let (tx, _rx) = mpsc::channel(64);

    provider.push_reply(r#"{"clauses":[{"clause":"Tell me a joke","type":"request","summary":"joke"}]}"#);
    provider.push_stream(["Knock knock."]);
    provider.push_reply(judgement("confirm"));
    orch.run_turn("jokes", "Tell me a joke", &tx).await;

    orch.store().reset("jokes").await;

    let conv = orch.store().snapshot("jokes").await.unwrap();
    assert!(conv.messages.is_empty());
    assert!(conv.goals.is_empty());
    assert_eq!(conv.pipeline_settings, PipelineSettings::default());
}
