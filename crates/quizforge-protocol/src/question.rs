//! Question records as the room consumes them.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Whether a question is a binary O/X choice or a four-way A–D choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Two answer zones, keyed `O` and `X`.
    #[default]
    Ox,
    /// Four answer zones, keyed `A` through `D`.
    Abcd,
}

/// A single quiz question. Immutable once loaded into a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Derived from the answer key by [`Question::normalized`].
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    pub prompt: String,
    /// Option labels for A–D questions; empty for O/X.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Correct answer key: `O`/`X` or `A`–`D`.
    pub answer: String,
    pub countdown_secs: u32,
    pub points: u32,
}

impl Question {
    /// Builds an O/X question.
    pub fn ox(prompt: &str, answer: char, countdown_secs: u32, points: u32) -> Self {
        Self {
            kind: QuestionKind::Ox,
            prompt: prompt.to_string(),
            options: Vec::new(),
            answer: answer.to_string(),
            countdown_secs,
            points,
        }
    }

    /// Builds an A–D question.
    pub fn abcd(
        prompt: &str,
        options: [&str; 4],
        answer: char,
        countdown_secs: u32,
        points: u32,
    ) -> Self {
        Self {
            kind: QuestionKind::Abcd,
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer: answer.to_string(),
            countdown_secs,
            points,
        }
    }

    /// Validates the record and returns it in canonical form.
    ///
    /// The answer key is trimmed and upper-cased and decides the kind:
    /// `O`/`X` make an O/X question (options dropped), `A`–`D` make an
    /// A–D question, which needs non-empty labels for at least A and B and
    /// is padded to four labels.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidQuestion`] for an empty prompt, a zero
    /// countdown or point value, an unknown answer key, or missing
    /// A/B labels.
    pub fn normalized(mut self) -> Result<Self, ProtocolError> {
        self.prompt = self.prompt.trim().to_string();
        if self.prompt.is_empty() {
            return Err(ProtocolError::InvalidQuestion("empty prompt".into()));
        }
        if self.countdown_secs == 0 {
            return Err(ProtocolError::InvalidQuestion(format!(
                "zero countdown for {:?}",
                self.prompt
            )));
        }
        if self.points == 0 {
            return Err(ProtocolError::InvalidQuestion(format!(
                "zero points for {:?}",
                self.prompt
            )));
        }

        self.answer = self.answer.trim().to_uppercase();
        match self.answer.as_str() {
            "O" | "X" => {
                self.kind = QuestionKind::Ox;
                self.options.clear();
            }
            "A" | "B" | "C" | "D" => {
                let has = |i: usize| {
                    self.options.get(i).is_some_and(|o| !o.trim().is_empty())
                };
                if !(has(0) && has(1)) {
                    return Err(ProtocolError::InvalidQuestion(format!(
                        "options A and B required for {:?}",
                        self.prompt
                    )));
                }
                self.kind = QuestionKind::Abcd;
                self.options.truncate(4);
                self.options.resize(4, String::new());
                for option in &mut self.options {
                    *option = option.trim().to_string();
                }
            }
            other => {
                return Err(ProtocolError::InvalidQuestion(format!(
                    "unknown answer key {other:?}"
                )));
            }
        }
        Ok(self)
    }

    /// Returns a copy whose countdown is replaced by the room's default
    /// timer, when one is set.
    pub fn with_timer(&self, default_timer: Option<u32>) -> Self {
        let mut q = self.clone();
        if let Some(secs) = default_timer {
            q.countdown_secs = secs;
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_accepts_lowercase_ox_answer() {
        let mut q = Question::ox("1+1=2?", 'o', 10, 50);
        q.options = vec!["stray".into()];
        let q = q.normalized().unwrap();
        assert_eq!(q.answer, "O");
        assert_eq!(q.kind, QuestionKind::Ox);
        assert!(q.options.is_empty());
    }

    #[test]
    fn test_normalized_pads_abcd_options() {
        let mut q = Question::abcd("Pick", ["a", "b", "", ""], 'b', 20, 100);
        q.options.truncate(2);
        let q = q.normalized().unwrap();
        assert_eq!(q.kind, QuestionKind::Abcd);
        assert_eq!(q.options, vec!["a", "b", "", ""]);
    }

    #[test]
    fn test_normalized_rejects_abcd_without_option_b() {
        let q = Question::abcd("Pick", ["a", " ", "c", "d"], 'A', 20, 100);
        assert!(matches!(
            q.normalized(),
            Err(ProtocolError::InvalidQuestion(_))
        ));
    }

    #[test]
    fn test_normalized_rejects_unknown_answer_and_zero_values() {
        assert!(Question::ox("Q?", 'Z', 10, 50).normalized().is_err());
        assert!(Question::ox("Q?", 'O', 0, 50).normalized().is_err());
        assert!(Question::ox("Q?", 'O', 10, 0).normalized().is_err());
        assert!(Question::ox("   ", 'O', 10, 50).normalized().is_err());
    }

    #[test]
    fn test_with_timer_overrides_countdown() {
        let q = Question::ox("Q?", 'O', 10, 50);
        assert_eq!(q.with_timer(Some(30)).countdown_secs, 30);
        assert_eq!(q.with_timer(None).countdown_secs, 10);
    }

    #[test]
    fn test_question_json_shape() {
        let json = serde_json::to_value(Question::ox("Q?", 'X', 10, 50)).unwrap();
        assert_eq!(json["type"], "ox");
        assert_eq!(json["countdownSecs"], 10);
        assert!(json.get("options").is_none());
    }
}
