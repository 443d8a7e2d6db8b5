//! Stage sequencer: the six-stage linear design workflow.
//!
//! One `Workflow` owns the session state: the conversation store, the
//! intake record, the stage cursor, and the drafted artifacts. One call
//! into [`Workflow::submit`] per user turn; the sequencer keeps executing
//! stage logic until a stage needs input it does not have, so generation
//! stages fall through in the same turn that unblocks them.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ChatMessage, CompletionClient};
use crate::conversation::{Conversation, Turn};
use crate::error::{Result, WorkflowError};
use crate::intake::{IntakeKey, IntakeRecord};
use crate::prompts;

/// One named step in the fixed linear workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    IntakeQuestions,
    GenerateProjectIdea,
    RefineProjectIdea,
    GenerateDrivingQuestions,
    RefineDrivingQuestions,
    FinalizeOutput,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntakeQuestions => "intake_questions",
            Stage::GenerateProjectIdea => "generate_project_idea",
            Stage::RefineProjectIdea => "refine_project_idea",
            Stage::GenerateDrivingQuestions => "generate_driving_questions",
            Stage::RefineDrivingQuestions => "refine_driving_questions",
            Stage::FinalizeOutput => "finalize_output",
        }
    }

    /// Parse a stage from its storage form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "intake_questions" => Some(Stage::IntakeQuestions),
            "generate_project_idea" => Some(Stage::GenerateProjectIdea),
            "refine_project_idea" => Some(Stage::RefineProjectIdea),
            "generate_driving_questions" => Some(Stage::GenerateDrivingQuestions),
            "refine_driving_questions" => Some(Stage::RefineDrivingQuestions),
            "finalize_output" => Some(Stage::FinalizeOutput),
            _ => None,
        }
    }

    /// Position in the fixed stage order. The cursor never moves to a
    /// lower index.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::FinalizeOutput)
    }
}

/// Write-once export artifact produced by the terminal stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub idea: String,
    pub driving_questions: String,
}

impl FinalOutput {
    /// The exportable text blob: one idea block, one driving-questions
    /// block.
    pub fn render(&self) -> String {
        format!(
            "# Project Idea\n\n{}\n\n# Driving Questions\n\n{}\n",
            self.idea.trim(),
            self.driving_questions.trim()
        )
    }
}

/// Session-scoped workflow state and the stage-advance logic.
#[derive(Debug)]
pub struct Workflow {
    conversation: Conversation,
    intake: IntakeRecord,
    stage: Stage,
    awaiting_feedback: bool,
    idea: Option<String>,
    driving_questions: Option<String>,
    final_output: Option<FinalOutput>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            intake: IntakeRecord::new(),
            stage: Stage::IntakeQuestions,
            awaiting_feedback: false,
            idea: None,
            driving_questions: None,
            final_output: None,
        }
    }

    /// Rebuild a workflow from stored session state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        conversation: Conversation,
        intake: IntakeRecord,
        stage: Stage,
        awaiting_feedback: bool,
        idea: Option<String>,
        driving_questions: Option<String>,
        final_output: Option<FinalOutput>,
    ) -> Self {
        Self {
            conversation,
            intake,
            stage,
            awaiting_feedback,
            idea,
            driving_questions,
            final_output,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn intake(&self) -> &IntakeRecord {
        &self.intake
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn awaiting_feedback(&self) -> bool {
        self.awaiting_feedback
    }

    pub fn idea(&self) -> Option<&str> {
        self.idea.as_deref()
    }

    pub fn driving_questions(&self) -> Option<&str> {
        self.driving_questions.as_deref()
    }

    pub fn final_output(&self) -> Option<&FinalOutput> {
        self.final_output.as_ref()
    }

    /// Seed an intake answer from outside the conversation (e.g. a
    /// pre-filled session). Only meaningful before drafting begins.
    #[allow(dead_code)]
    pub fn seed_answer(&mut self, key: IntakeKey, answer: &str) {
        self.intake.record(key, answer);
    }

    /// First evaluation of a fresh session: emit the welcome turn and run
    /// stage logic with no user input. With a pre-filled intake record
    /// this falls straight through to idea generation. On a session that
    /// already has conversation history this is a no-op; the next user
    /// turn drives the sequencer instead.
    pub fn kickoff(&mut self, client: &dyn CompletionClient) -> Result<()> {
        if !self.conversation.is_empty() {
            return Ok(());
        }
        self.say(prompts::WELCOME)?;
        self.advance(None, client)
    }

    /// Evaluate one incoming user turn.
    ///
    /// The turn is appended to the conversation first and is never rolled
    /// back, even when a completion call fails; the failed stage simply
    /// re-runs on the next turn with the same accumulated state.
    pub fn submit(&mut self, text: &str, client: &dyn CompletionClient) -> Result<()> {
        let text = text.trim();
        self.conversation.append(Turn::user(text))?;
        self.advance(Some(text), client)
    }

    /// Run stage logic until a stage blocks on user input or the terminal
    /// stage settles. `input` is consumed by at most one stage.
    fn advance(&mut self, mut input: Option<&str>, client: &dyn CompletionClient) -> Result<()> {
        loop {
            match self.stage {
                Stage::IntakeQuestions => {
                    if let Some(text) = input.take() {
                        if let Some(key) = self.intake.pending().map(|q| q.key) {
                            self.intake.record(key, text);
                            debug!(key = key.as_str(), "intake_answer_recorded");
                        }
                    }
                    if self.intake.is_complete() {
                        self.set_stage(Stage::GenerateProjectIdea);
                        continue;
                    }
                    match self.intake.pending() {
                        Some(question) => {
                            self.say(question.prompt)?;
                            return Ok(());
                        }
                        None => {
                            return Err(WorkflowError::PendingQuestionMissing {
                                answered: self.intake.answered_count(),
                                total: IntakeKey::ALL.len(),
                            });
                        }
                    }
                }

                Stage::GenerateProjectIdea => {
                    let idea = self.request(prompts::project_idea(&self.intake), client)?;
                    self.say(&idea)?;
                    self.idea = Some(idea);
                    self.set_stage(Stage::RefineProjectIdea);
                }

                Stage::RefineProjectIdea => {
                    if !self.awaiting_feedback {
                        self.say(prompts::IDEA_FEEDBACK_PROMPT)?;
                        self.awaiting_feedback = true;
                        return Ok(());
                    }
                    let Some(feedback) = input.take() else {
                        return Ok(());
                    };
                    let prior = self
                        .idea
                        .clone()
                        .ok_or(WorkflowError::MissingArtifact("project idea"))?;
                    let refined = self.request(prompts::refine_idea(&prior, feedback), client)?;
                    self.say(&refined)?;
                    self.idea = Some(refined);
                    self.awaiting_feedback = false;
                    self.set_stage(Stage::GenerateDrivingQuestions);
                }

                Stage::GenerateDrivingQuestions => {
                    let idea = self
                        .idea
                        .clone()
                        .ok_or(WorkflowError::MissingArtifact("project idea"))?;
                    let questions = self.request(prompts::driving_questions(&idea), client)?;
                    self.say(&questions)?;
                    self.driving_questions = Some(questions);
                    self.set_stage(Stage::RefineDrivingQuestions);
                }

                Stage::RefineDrivingQuestions => {
                    if !self.awaiting_feedback {
                        self.say(prompts::QUESTIONS_FEEDBACK_PROMPT)?;
                        self.awaiting_feedback = true;
                        return Ok(());
                    }
                    let Some(feedback) = input.take() else {
                        return Ok(());
                    };
                    let prior = self
                        .driving_questions
                        .clone()
                        .ok_or(WorkflowError::MissingArtifact("driving questions"))?;
                    let refined =
                        self.request(prompts::refine_questions(&prior, feedback), client)?;
                    self.say(&refined)?;
                    self.driving_questions = Some(refined);
                    self.awaiting_feedback = false;
                    self.set_stage(Stage::FinalizeOutput);
                }

                Stage::FinalizeOutput => {
                    if self.final_output.is_none() {
                        let idea = self
                            .idea
                            .clone()
                            .ok_or(WorkflowError::MissingArtifact("project idea"))?;
                        let driving_questions = self
                            .driving_questions
                            .clone()
                            .ok_or(WorkflowError::MissingArtifact("driving questions"))?;
                        self.final_output = Some(FinalOutput {
                            idea,
                            driving_questions,
                        });
                        self.say(prompts::CLOSING)?;
                        info!("workflow_complete");
                    }
                    // Terminal: further user turns are appended to the
                    // conversation but do not drive the sequencer.
                    return Ok(());
                }
            }
        }
    }

    fn request(&self, prompt: String, client: &dyn CompletionClient) -> Result<String> {
        let messages = [
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let text = client.complete(&messages)?;
        Ok(text)
    }

    fn say(&mut self, text: &str) -> Result<()> {
        self.conversation.append(Turn::assistant(text))
    }

    fn set_stage(&mut self, next: Stage) {
        debug_assert!(next.index() >= self.stage.index(), "stage cursor moved backward");
        info!(from = self.stage.as_str(), to = next.as_str(), "stage_advanced");
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::client::CompletionError;
    use crate::conversation::Role;

    type CompletionResult = std::result::Result<String, CompletionError>;

    /// Completion double that replays scripted responses and records the
    /// prompts it was sent.
    struct ScriptedClient {
        responses: RefCell<VecDeque<CompletionResult>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<CompletionResult>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete(&self, messages: &[ChatMessage]) -> CompletionResult {
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.borrow_mut().push(prompt);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(CompletionError::Empty))
        }
    }

    const INTAKE_ANSWERS: [&str; 10] = [
        "CA/Sample District",
        "5th/Science",
        "Water cycle",
        "NGSS",
        "Collaboration",
        "2 weeks",
        "50 min",
        "Yes",
        "Chromebooks",
        "UbD",
    ];

    fn answer_intake(workflow: &mut Workflow, client: &ScriptedClient) {
        workflow.kickoff(client).unwrap();
        for answer in INTAKE_ANSWERS {
            workflow.submit(answer, client).unwrap();
        }
    }

    fn last_assistant(workflow: &Workflow) -> String {
        workflow
            .conversation()
            .latest(Some(Role::Assistant))
            .unwrap()
            .text
            .clone()
    }

    #[test]
    fn test_kickoff_emits_welcome_and_first_question() {
        let client = ScriptedClient::new(vec![]);
        let mut workflow = Workflow::new();
        workflow.kickoff(&client).unwrap();

        let turns = workflow.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, prompts::WELCOME);
        assert!(turns[1].text.contains("state and school district"));
        assert_eq!(workflow.stage(), Stage::IntakeQuestions);
        assert!(client.prompts().is_empty());
    }

    #[test]
    fn test_kickoff_on_resumed_session_is_noop() {
        let client = ScriptedClient::new(vec![]);
        let mut workflow = Workflow::new();
        workflow.kickoff(&client).unwrap();
        let len = workflow.conversation().len();

        workflow.kickoff(&client).unwrap();
        assert_eq!(workflow.conversation().len(), len);
    }

    #[test]
    fn test_last_intake_answer_falls_through_to_idea() {
        let client = ScriptedClient::new(vec![Ok("A generated idea".into())]);
        let mut workflow = Workflow::new();
        workflow.kickoff(&client).unwrap();

        for (i, answer) in INTAKE_ANSWERS.iter().enumerate() {
            assert_eq!(workflow.stage(), Stage::IntakeQuestions);
            workflow.submit(answer, &client).unwrap();
            if i < INTAKE_ANSWERS.len() - 1 {
                // Still collecting: the reply is the next question.
                assert_eq!(workflow.stage(), Stage::IntakeQuestions);
            }
        }

        // The 10th answer generated the idea on the same turn and moved on
        // to the feedback round, with no extra empty round trip.
        assert_eq!(workflow.stage(), Stage::RefineProjectIdea);
        assert!(workflow.awaiting_feedback());
        assert_eq!(workflow.idea(), Some("A generated idea"));
        assert_eq!(last_assistant(&workflow), prompts::IDEA_FEEDBACK_PROMPT);

        // The generation prompt carried every intake answer.
        let prompts_sent = client.prompts();
        assert_eq!(prompts_sent.len(), 1);
        for answer in INTAKE_ANSWERS {
            assert!(prompts_sent[0].contains(answer));
        }
    }

    #[test]
    fn test_prefilled_intake_skips_questions() {
        let client = ScriptedClient::new(vec![Ok("Prefilled idea".into())]);
        let mut workflow = Workflow::new();
        for key in IntakeKey::ALL {
            workflow.seed_answer(key, "seeded");
        }

        workflow.kickoff(&client).unwrap();

        assert_eq!(workflow.stage(), Stage::RefineProjectIdea);
        assert_eq!(workflow.idea(), Some("Prefilled idea"));
        // Welcome, idea, feedback prompt; no intake questions emitted.
        let texts: Vec<&str> = workflow
            .conversation()
            .turns()
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec![prompts::WELCOME, "Prefilled idea", prompts::IDEA_FEEDBACK_PROMPT]
        );
    }

    #[test]
    fn test_idea_feedback_falls_through_to_driving_questions() {
        let client = ScriptedClient::new(vec![
            Ok("Draft idea".into()),
            Ok("Refined idea".into()),
            Ok("Q1\nQ2\nQ3".into()),
        ]);
        let mut workflow = Workflow::new();
        answer_intake(&mut workflow, &client);

        workflow.submit("make it shorter", &client).unwrap();

        assert_eq!(workflow.stage(), Stage::RefineDrivingQuestions);
        assert!(workflow.awaiting_feedback());
        assert_eq!(workflow.idea(), Some("Refined idea"));
        assert_eq!(workflow.driving_questions(), Some("Q1\nQ2\nQ3"));
        assert_eq!(last_assistant(&workflow), prompts::QUESTIONS_FEEDBACK_PROMPT);

        let prompts_sent = client.prompts();
        assert_eq!(prompts_sent.len(), 3);
        // Refine prompt carries the draft idea and the literal feedback.
        assert!(prompts_sent[1].contains("Draft idea"));
        assert!(prompts_sent[1].contains("make it shorter"));
        // Driving-questions prompt is built from the refined idea.
        assert!(prompts_sent[2].contains("Refined idea"));
    }

    #[test]
    fn test_full_happy_path_produces_final_output() {
        let client = ScriptedClient::new(vec![
            Ok("Draft idea".into()),
            Ok("Refined idea".into()),
            Ok("Q1\nQ2\nQ3".into()),
            Ok("Q1'\nQ2'\nQ3'".into()),
        ]);
        let mut workflow = Workflow::new();
        answer_intake(&mut workflow, &client);
        workflow.submit("make it shorter", &client).unwrap();
        workflow.submit("sharpen question two", &client).unwrap();

        assert_eq!(workflow.stage(), Stage::FinalizeOutput);
        let output = workflow.final_output().expect("final output");
        assert_eq!(output.idea, "Refined idea");
        assert_eq!(output.driving_questions, "Q1'\nQ2'\nQ3'");
        assert_eq!(last_assistant(&workflow), prompts::CLOSING);

        let rendered = output.render();
        assert!(rendered.contains("# Project Idea"));
        assert!(rendered.contains("Refined idea"));
        assert!(rendered.contains("# Driving Questions"));
        assert!(rendered.contains("Q1'"));
    }

    #[test]
    fn test_turns_after_finalize_are_ignored() {
        let client = ScriptedClient::new(vec![
            Ok("Draft idea".into()),
            Ok("Refined idea".into()),
            Ok("Q1\nQ2\nQ3".into()),
            Ok("Q1'\nQ2'\nQ3'".into()),
        ]);
        let mut workflow = Workflow::new();
        answer_intake(&mut workflow, &client);
        workflow.submit("fine", &client).unwrap();
        workflow.submit("fine", &client).unwrap();

        let output_before = workflow.final_output().cloned();
        let len_before = workflow.conversation().len();
        workflow.submit("one more thing", &client).unwrap();

        assert_eq!(workflow.stage(), Stage::FinalizeOutput);
        assert_eq!(workflow.final_output().cloned(), output_before);
        // The turn lands in the conversation but changes nothing else.
        assert_eq!(workflow.conversation().len(), len_before + 1);
        assert_eq!(client.prompts().len(), 4);
    }

    #[test]
    fn test_completion_failure_does_not_advance_stage() {
        let client = ScriptedClient::new(vec![
            Ok("Draft idea".into()),
            Ok("Refined idea".into()),
            Err(CompletionError::Api {
                status: 429,
                body: "quota".into(),
            }),
            Ok("Q1\nQ2\nQ3".into()),
        ]);
        let mut workflow = Workflow::new();
        answer_intake(&mut workflow, &client);
        let answered_before = workflow.intake().answered_count();

        // Feedback turn: refine succeeds, driving-question generation
        // fails mid-fallthrough.
        let err = workflow.submit("make it shorter", &client).unwrap_err();
        assert!(matches!(err, WorkflowError::Completion(_)));
        assert_eq!(workflow.stage(), Stage::GenerateDrivingQuestions);
        assert_eq!(workflow.idea(), Some("Refined idea"));
        assert!(workflow.driving_questions().is_none());
        assert_eq!(workflow.intake().answered_count(), answered_before);

        // Retrying re-sends the same prompt and resumes the chain.
        workflow.submit("make it shorter", &client).unwrap();
        assert_eq!(workflow.stage(), Stage::RefineDrivingQuestions);
        let prompts_sent = client.prompts();
        assert_eq!(prompts_sent[2], prompts_sent[3]);
    }

    #[test]
    fn test_empty_submit_is_rejected() {
        let client = ScriptedClient::new(vec![]);
        let mut workflow = Workflow::new();
        workflow.kickoff(&client).unwrap();
        assert!(matches!(
            workflow.submit("   ", &client),
            Err(WorkflowError::EmptyTurn)
        ));
    }

    #[test]
    fn test_stage_cursor_is_monotonic() {
        let client = ScriptedClient::new(vec![
            Ok("Draft idea".into()),
            Ok("Refined idea".into()),
            Ok("Q1\nQ2\nQ3".into()),
            Ok("Q1'\nQ2'\nQ3'".into()),
        ]);
        let mut workflow = Workflow::new();
        let mut highest = workflow.stage().index();

        workflow.kickoff(&client).unwrap();
        for answer in INTAKE_ANSWERS {
            workflow.submit(answer, &client).unwrap();
            assert!(workflow.stage().index() >= highest);
            highest = workflow.stage().index();
        }
        for feedback in ["shorter", "sharper"] {
            workflow.submit(feedback, &client).unwrap();
            assert!(workflow.stage().index() >= highest);
            highest = workflow.stage().index();
        }
        assert_eq!(workflow.stage(), Stage::FinalizeOutput);
    }

    #[test]
    fn test_stage_storage_roundtrip() {
        for stage in [
            Stage::IntakeQuestions,
            Stage::GenerateProjectIdea,
            Stage::RefineProjectIdea,
            Stage::GenerateDrivingQuestions,
            Stage::RefineDrivingQuestions,
            Stage::FinalizeOutput,
        ] {
            assert_eq!(Stage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::from_str("unknown"), None);
    }
}
