//! Intake questionnaire: the fixed question list and collected answers.
//!
//! The question list is a single const table shared by the sequencer and
//! the prompt builders. Keys are fixed at design time; answers are absent
//! until recorded, then immutable.

/// One of the fixed classroom-context questions, in asking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeKey {
    StateDistrict,
    GradeSubject,
    Topic,
    Standards,
    Skills,
    Duration,
    ClassPeriods,
    GroupWork,
    Technology,
    PedagogicalModel,
}

impl IntakeKey {
    /// All keys, in asking order.
    pub const ALL: [IntakeKey; 10] = [
        IntakeKey::StateDistrict,
        IntakeKey::GradeSubject,
        IntakeKey::Topic,
        IntakeKey::Standards,
        IntakeKey::Skills,
        IntakeKey::Duration,
        IntakeKey::ClassPeriods,
        IntakeKey::GroupWork,
        IntakeKey::Technology,
        IntakeKey::PedagogicalModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeKey::StateDistrict => "state_district",
            IntakeKey::GradeSubject => "grade_subject",
            IntakeKey::Topic => "topic",
            IntakeKey::Standards => "standards",
            IntakeKey::Skills => "skills",
            IntakeKey::Duration => "duration",
            IntakeKey::ClassPeriods => "class_periods",
            IntakeKey::GroupWork => "group_work",
            IntakeKey::Technology => "technology",
            IntakeKey::PedagogicalModel => "pedagogical_model",
        }
    }

    /// Parse a key from its storage form.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Position of this key in the asking order.
    fn index(&self) -> usize {
        *self as usize
    }
}

/// A question the assistant asks during intake.
pub struct IntakeQuestion {
    pub key: IntakeKey,
    pub prompt: &'static str,
}

/// The fixed question table, in asking order.
pub static INTAKE_QUESTIONS: [IntakeQuestion; 10] = [
    IntakeQuestion {
        key: IntakeKey::StateDistrict,
        prompt: "What state and school district do you teach in?",
    },
    IntakeQuestion {
        key: IntakeKey::GradeSubject,
        prompt: "What grade level and subject do you teach?",
    },
    IntakeQuestion {
        key: IntakeKey::Topic,
        prompt: "What topic or unit should this project focus on?",
    },
    IntakeQuestion {
        key: IntakeKey::Standards,
        prompt: "Which standards should the project address (NGSS, Common Core, state standards)?",
    },
    IntakeQuestion {
        key: IntakeKey::Skills,
        prompt: "What skills do you want students to practice (collaboration, research, communication, ...)?",
    },
    IntakeQuestion {
        key: IntakeKey::Duration,
        prompt: "How long should the project run (one week, two weeks, a quarter)?",
    },
    IntakeQuestion {
        key: IntakeKey::ClassPeriods,
        prompt: "How long is each class period?",
    },
    IntakeQuestion {
        key: IntakeKey::GroupWork,
        prompt: "Will students work in groups?",
    },
    IntakeQuestion {
        key: IntakeKey::Technology,
        prompt: "What technology do your students have access to?",
    },
    IntakeQuestion {
        key: IntakeKey::PedagogicalModel,
        prompt: "Do you follow a particular pedagogical model (UbD, 5E, gold standard PBL)?",
    },
];

/// Collected answers, one slot per key.
#[derive(Debug, Clone, Default)]
pub struct IntakeRecord {
    answers: [Option<String>; IntakeKey::ALL.len()],
}

impl IntakeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first question in asking order with no recorded answer.
    pub fn pending(&self) -> Option<&'static IntakeQuestion> {
        INTAKE_QUESTIONS
            .iter()
            .find(|q| self.answers[q.key.index()].is_none())
    }

    /// Record an answer. Answers are immutable once recorded; the
    /// sequencer only records against the pending key.
    pub fn record(&mut self, key: IntakeKey, answer: &str) {
        debug_assert!(
            self.answers[key.index()].is_none(),
            "intake answer recorded twice for {}",
            key.as_str()
        );
        self.answers[key.index()] = Some(answer.trim().to_string());
    }

    pub fn answer(&self, key: IntakeKey) -> Option<&str> {
        self.answers[key.index()].as_deref()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered_count() == IntakeKey::ALL.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_table_matches_key_order() {
        let table_keys: Vec<IntakeKey> = INTAKE_QUESTIONS.iter().map(|q| q.key).collect();
        assert_eq!(table_keys, IntakeKey::ALL.to_vec());
    }

    #[test]
    fn test_pending_walks_questions_in_order() {
        let mut record = IntakeRecord::new();
        assert_eq!(record.pending().unwrap().key, IntakeKey::StateDistrict);

        record.record(IntakeKey::StateDistrict, "CA/Sample District");
        assert_eq!(record.pending().unwrap().key, IntakeKey::GradeSubject);

        record.record(IntakeKey::GradeSubject, "5th/Science");
        assert_eq!(record.pending().unwrap().key, IntakeKey::Topic);
    }

    #[test]
    fn test_record_trims_answer() {
        let mut record = IntakeRecord::new();
        record.record(IntakeKey::Topic, "  Water cycle \n");
        assert_eq!(record.answer(IntakeKey::Topic), Some("Water cycle"));
    }

    #[test]
    fn test_complete_after_all_answers() {
        let mut record = IntakeRecord::new();
        for (i, key) in IntakeKey::ALL.into_iter().enumerate() {
            assert!(!record.is_complete());
            assert_eq!(record.answered_count(), i);
            record.record(key, "answer");
        }
        assert!(record.is_complete());
        assert!(record.pending().is_none());
    }

    #[test]
    fn test_key_storage_roundtrip() {
        for key in IntakeKey::ALL {
            assert_eq!(IntakeKey::from_str(key.as_str()), Some(key));
        }
        assert_eq!(IntakeKey::from_str("nonsense"), None);
    }
}
