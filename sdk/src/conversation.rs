//! Conversation state
//!
//! A conversation owns its ordered message log, the single live goal set
//! and the stage toggles. The live goal set is replaced wholesale after a
//! merge; manual edits below are the only in-place changes besides
//! evaluation status updates.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::types::{Goal, GoalPatch, GoalType, Message, PipelineSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub pipeline_settings: PipelineSettings,
}

impl Conversation {
    /// Create an empty conversation with every stage enabled
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_settings(id, PipelineSettings::default())
    }

    /// Create an empty conversation with the given stage toggles
    pub fn with_settings(id: impl Into<String>, pipeline_settings: PipelineSettings) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            goals: Vec::new(),
            pipeline_settings,
        }
    }

    /// Id the next appended message will receive (`msg_<n>`)
    pub fn next_message_id(&self) -> String {
        format!("msg_{}", self.messages.len())
    }

    pub fn find_goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    fn find_goal_mut(&mut self, goal_id: &str) -> Result<&mut Goal, EngineError> {
        self.goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| EngineError::GoalNotFound(goal_id.to_string()))
    }

    /// Append a user-authored goal with id `G<n>_manual`
    ///
    /// `n` starts at the current goal count and is bumped past any id
    /// already in use, so deletions never cause a collision.
    pub fn add_manual_goal(
        &mut self,
        text: impl Into<String>,
        goal_type: impl Into<GoalType>,
        source_message_id: impl Into<String>,
    ) -> &Goal {
        let mut n = self.goals.len();
        let mut id = format!("G{}_manual", n);
        while self.find_goal(&id).is_some() {
            n += 1;
            id = format!("G{}_manual", n);
        }

        self.goals
            .push(Goal::new(id, text, goal_type, source_message_id));
        &self.goals[self.goals.len() - 1]
    }

    pub fn update_goal(&mut self, goal_id: &str, patch: GoalPatch) -> Result<&Goal, EngineError> {
        let goal = self.find_goal_mut(goal_id)?;
        patch.apply(goal);
        Ok(goal)
    }

    pub fn set_locked(&mut self, goal_id: &str, locked: bool) -> Result<&Goal, EngineError> {
        let goal = self.find_goal_mut(goal_id)?;
        goal.locked = locked;
        Ok(goal)
    }

    pub fn remove_goal(&mut self, goal_id: &str) -> Result<Goal, EngineError> {
        let index = self
            .goals
            .iter()
            .position(|g| g.id == goal_id)
            .ok_or_else(|| EngineError::GoalNotFound(goal_id.to_string()))?;
        Ok(self.goals.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GoalStatus;

    #[test]
    fn test_new_conversation_is_empty() {
        let conv = Conversation::new("default");
        assert_eq!(conv.id, "default");
        assert!(conv.messages.is_empty());
        assert!(conv.goals.is_empty());
        assert_eq!(conv.pipeline_settings, PipelineSettings::default());
        assert_eq!(conv.next_message_id(), "msg_0");
    }

    #[test]
    fn test_manual_goal_ids_stay_unique() {
        let mut conv = Conversation::new("c1");
        conv.add_manual_goal("Write a poem", "request", "msg_0");
        conv.add_manual_goal("Keep it short", "suggestion", "msg_0");
        assert_eq!(conv.goals[0].id, "G0_manual");
        assert_eq!(conv.goals[1].id, "G1_manual");

        conv.remove_goal("G0_manual").unwrap();
        let id = conv
            .add_manual_goal("Rhyme", "suggestion", "msg_0")
            .id
            .clone();
        assert_eq!(id, "G2_manual");
    }

    #[test]
    fn test_update_and_lock() {
        let mut conv = Conversation::new("c1");
        conv.add_manual_goal("Write a poem", "request", "msg_0");

        let goal = conv
            .update_goal(
                "G0_manual",
                GoalPatch {
                    completed: Some(true),
                    status: Some(GoalStatus::Confirmed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(goal.completed);
        assert_eq!(goal.status, Some(GoalStatus::Confirmed));

        assert!(conv.set_locked("G0_manual", true).unwrap().locked);
        assert!(!conv.set_locked("G0_manual", false).unwrap().locked);
    }

    #[test]
    fn test_missing_goal_errors() {
        let mut conv = Conversation::new("c1");
        assert!(matches!(
            conv.remove_goal("G9"),
            Err(EngineError::GoalNotFound(id)) if id == "G9"
        ));
        assert!(conv.set_locked("G9", true).is_err());
        assert!(conv.update_goal("G9", GoalPatch::default()).is_err());
    }
}
