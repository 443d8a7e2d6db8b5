//! Fixed messages and per-stage prompt assembly.
//!
//! Every prompt the sequencer sends to the completion endpoint is built
//! here, so the whole prompt surface is visible in one place.

use crate::intake::{INTAKE_QUESTIONS, IntakeRecord};

/// Persona message sent with every completion call.
pub const SYSTEM_PROMPT: &str = "You are an experienced project-based learning coach. \
You help teachers design PBL units that fit their classroom, standards, and schedule. \
Write in clear, practical language a working teacher can act on.";

/// Opening assistant turn for a fresh session.
pub const WELCOME: &str = "Welcome! Let's design a project-based learning unit together. \
I'll start with a few questions about your classroom.";

/// Feedback request after a project idea has been proposed.
pub const IDEA_FEEDBACK_PROMPT: &str = "Provide feedback on the project idea.";

/// Feedback request after driving questions have been proposed.
pub const QUESTIONS_FEEDBACK_PROMPT: &str = "Provide feedback on the driving questions.";

/// Fixed closing turn appended when the final plan is assembled.
pub const CLOSING: &str = "Your project plan is complete. \
Export it any time with `pbl-coach export` to get the full write-up as a file.";

/// Context block of all intake answers, in fixed key order.
fn context_block(intake: &IntakeRecord) -> String {
    let mut block = String::new();
    for question in &INTAKE_QUESTIONS {
        let answer = intake.answer(question.key).unwrap_or("(not provided)");
        block.push_str(question.key.as_str());
        block.push_str(": ");
        block.push_str(answer);
        block.push('\n');
    }
    block
}

/// Prompt for the initial project idea, built from the full intake record.
pub fn project_idea(intake: &IntakeRecord) -> String {
    format!(
        "Here is the classroom context collected from the teacher:\n\n{}\n\
         Propose one project-based learning project idea for this classroom. \
         Describe the project, the final student product, and how it connects \
         to the listed standards and skills.",
        context_block(intake)
    )
}

/// Prompt to revise the project idea against the teacher's feedback.
pub fn refine_idea(idea: &str, feedback: &str) -> String {
    format!(
        "Here is the current project idea:\n\n{idea}\n\n\
         The teacher gave this feedback:\n\n{feedback}\n\n\
         Revise the project idea to address the feedback. \
         Return the full revised idea, not a diff."
    )
}

/// Prompt for exactly three driving questions for the accepted idea.
pub fn driving_questions(idea: &str) -> String {
    format!(
        "Here is the project idea the teacher has settled on:\n\n{idea}\n\n\
         Write exactly three driving questions for this project. \
         Driving questions should be open-ended, student-facing, and anchor \
         the inquiry for the whole unit."
    )
}

/// Prompt to revise the driving questions against the teacher's feedback.
pub fn refine_questions(questions: &str, feedback: &str) -> String {
    format!(
        "Here are the current driving questions:\n\n{questions}\n\n\
         The teacher gave this feedback:\n\n{feedback}\n\n\
         Revise the driving questions to address the feedback. \
         Keep exactly three questions and return all of them."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeKey;

    fn filled_record() -> IntakeRecord {
        let mut record = IntakeRecord::new();
        for key in IntakeKey::ALL {
            record.record(key, &format!("answer for {}", key.as_str()));
        }
        record
    }

    #[test]
    fn test_context_block_uses_fixed_key_order() {
        let prompt = project_idea(&filled_record());
        let positions: Vec<usize> = IntakeKey::ALL
            .iter()
            .map(|k| prompt.find(k.as_str()).expect("key missing from prompt"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_project_idea_includes_every_answer() {
        let prompt = project_idea(&filled_record());
        for key in IntakeKey::ALL {
            assert!(prompt.contains(&format!("answer for {}", key.as_str())));
        }
    }

    #[test]
    fn test_refine_idea_contains_idea_and_literal_feedback() {
        let prompt = refine_idea("A water-cycle exhibition project", "make it shorter");
        assert!(prompt.contains("A water-cycle exhibition project"));
        assert!(prompt.contains("make it shorter"));
    }

    #[test]
    fn test_driving_questions_asks_for_three() {
        let prompt = driving_questions("some idea");
        assert!(prompt.contains("some idea"));
        assert!(prompt.contains("exactly three"));
    }

    #[test]
    fn test_refine_questions_contains_both_inputs() {
        let prompt = refine_questions("Q1\nQ2\nQ3", "more student voice");
        assert!(prompt.contains("Q1\nQ2\nQ3"));
        assert!(prompt.contains("more student voice"));
    }
}
