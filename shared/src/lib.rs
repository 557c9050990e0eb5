use serde::{Deserialize, Serialize};

/// Hard cap on the number of players admitted to a single session.
pub const MAX_PLAYERS: usize = 30;
/// Countdown used for questions that do not specify their own time limit.
pub const DEFAULT_QUESTION_SECS: u64 = 10;
/// How long a finished session stays readable before the registry drops it.
pub const SESSION_GRACE_SECS: u64 = 300;
/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

/// One question of a quiz as authored in the catalog.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Question {
    pub prompt: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option: usize,
    pub points: u32,
    /// Per-question countdown in seconds. Falls back to
    /// [`DEFAULT_QUESTION_SECS`] when unset.
    pub time_limit_secs: Option<u64>,
}

impl Question {
    pub fn time_limit(&self) -> u64 {
        self.time_limit_secs.unwrap_or(DEFAULT_QUESTION_SECS)
    }
}

/// A full quiz as loaded from the authoring store. Immutable for the
/// lifetime of any session running it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuizDefinition {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

impl QuizDefinition {
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    /// Compact metadata sent to clients on join; never includes the
    /// questions themselves (those arrive one at a time).
    pub fn meta(&self) -> QuizMeta {
        QuizMeta {
            title: self.title.clone(),
            description: self.description.clone(),
            question_count: self.questions.len(),
            total_points: self.total_points(),
        }
    }
}

/// What a joining client learns about the quiz up front.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuizMeta {
    pub title: String,
    pub description: String,
    pub question_count: usize,
    pub total_points: u32,
}

/// Leaderboard row broadcast after every scoring event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
}

/// Final leaderboard row with an explicit 1-based position.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub position: usize,
    pub name: String,
    pub score: u32,
}

/// Roster snapshot row for the player-list view.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    JoinSession {
        code: String,
        name: String,
    },
    HostSession {
        code: String,
    },
    GetPlayerList {
        code: String,
    },
    SubmitAnswer {
        answer: usize,
        time_remaining: f32,
    },
    AdminStart {
        code: String,
    },
    AdminAdvance {
        code: String,
    },
    AdminEnd {
        code: String,
    },
    LeaveSession,
    Heartbeat {
        timestamp: u64,
    },

    // Server -> client
    JoinedSession {
        quiz: QuizMeta,
        player_id: String,
    },
    SessionHosted {
        code: String,
        quiz: QuizMeta,
    },
    SessionError {
        message: String,
    },
    PlayerJoined {
        name: String,
        total_players: usize,
    },
    LeaderboardUpdate {
        entries: Vec<LeaderboardEntry>,
    },
    PlayerList {
        players: Vec<PlayerSummary>,
    },
    AnswerResult {
        is_correct: bool,
        points: u32,
        correct_option: usize,
    },
    QuestionStart {
        index: usize,
        total: usize,
        prompt: String,
        options: [String; OPTION_COUNT],
        points: u32,
        time_limit_secs: u64,
    },
    QuestionEnd {
        index: usize,
        correct_option: usize,
    },
    SessionEnded {
        final_leaderboard: Vec<RankedEntry>,
        total_questions: usize,
    },
}

/// Remaining-time multiplier for a submission. Negative values clamp to
/// zero; values above the nominal limit are deliberately not clamped, so a
/// generous client-reported remainder inflates the bonus.
pub fn time_bonus_factor(time_remaining: f32) -> f32 {
    (time_remaining / 10.0).max(0.0)
}

/// Scores one submission against a question. Correct answers earn at least
/// half the question's base value, plus a bonus scaled by remaining time;
/// incorrect answers earn nothing.
pub fn score_answer(question: &Question, submitted: usize, time_remaining: f32) -> (bool, u32) {
    let is_correct = submitted == question.correct_option;
    let points = if is_correct {
        let factor = 0.5 + time_bonus_factor(time_remaining) as f64;
        (question.points as f64 * factor).floor() as u32
    } else {
        0
    };
    (is_correct, points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn question(points: u32) -> Question {
        Question {
            prompt: "Capital of Norway?".to_string(),
            options: [
                "Oslo".to_string(),
                "Bergen".to_string(),
                "Trondheim".to_string(),
                "Stavanger".to_string(),
            ],
            correct_option: 0,
            points,
            time_limit_secs: None,
        }
    }

    #[test]
    fn test_time_bonus_factor() {
        assert_approx_eq!(time_bonus_factor(10.0), 1.0, 0.0001);
        assert_approx_eq!(time_bonus_factor(5.0), 0.5, 0.0001);
        assert_approx_eq!(time_bonus_factor(0.0), 0.0, 0.0001);
        // Negative remainders clamp to zero
        assert_approx_eq!(time_bonus_factor(-3.0), 0.0, 0.0001);
        // Values above the nominal limit are not clamped
        assert_approx_eq!(time_bonus_factor(20.0), 2.0, 0.0001);
    }

    #[test]
    fn test_score_full_time_remaining() {
        let (correct, points) = score_answer(&question(100), 0, 10.0);
        assert!(correct);
        assert_eq!(points, 150);
    }

    #[test]
    fn test_score_no_time_remaining() {
        let (correct, points) = score_answer(&question(100), 0, 0.0);
        assert!(correct);
        assert_eq!(points, 50);
    }

    #[test]
    fn test_score_incorrect_earns_nothing() {
        let (correct, points) = score_answer(&question(100), 2, 10.0);
        assert!(!correct);
        assert_eq!(points, 0);

        let (correct, points) = score_answer(&question(100), 3, 0.0);
        assert!(!correct);
        assert_eq!(points, 0);
    }

    #[test]
    fn test_score_floors_fractional_points() {
        // 75 * (0.5 + 0.33) = 62.25 -> 62
        let (correct, points) = score_answer(&question(75), 0, 3.3);
        assert!(correct);
        assert_eq!(points, 62);
    }

    #[test]
    fn test_score_negative_time_clamps_to_floor() {
        let (correct, points) = score_answer(&question(100), 0, -5.0);
        assert!(correct);
        assert_eq!(points, 50);
    }

    #[test]
    fn test_question_time_limit_default() {
        let mut q = question(10);
        assert_eq!(q.time_limit(), DEFAULT_QUESTION_SECS);
        q.time_limit_secs = Some(5);
        assert_eq!(q.time_limit(), 5);
    }

    #[test]
    fn test_quiz_total_points() {
        let quiz = QuizDefinition {
            title: "Geography".to_string(),
            description: String::new(),
            questions: vec![question(100), question(50), question(25)],
        };
        assert_eq!(quiz.total_points(), 175);

        let meta = quiz.meta();
        assert_eq!(meta.question_count, 3);
        assert_eq!(meta.total_points, 175);
        assert_eq!(meta.title, "Geography");
    }

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::JoinSession {
            code: "ABCD1".to_string(),
            name: "Alice".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::JoinSession { code, name } => {
                assert_eq!(code, "ABCD1");
                assert_eq!(name, "Alice");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_question_start() {
        let packet = Packet::QuestionStart {
            index: 2,
            total: 5,
            prompt: "Capital of Norway?".to_string(),
            options: [
                "Oslo".to_string(),
                "Bergen".to_string(),
                "Trondheim".to_string(),
                "Stavanger".to_string(),
            ],
            points: 100,
            time_limit_secs: 10,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::QuestionStart {
                index,
                total,
                prompt,
                options,
                points,
                time_limit_secs,
            } => {
                assert_eq!(index, 2);
                assert_eq!(total, 5);
                assert_eq!(prompt, "Capital of Norway?");
                assert_eq!(options[0], "Oslo");
                assert_eq!(points, 100);
                assert_eq!(time_limit_secs, 10);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_session_ended() {
        let packet = Packet::SessionEnded {
            final_leaderboard: vec![
                RankedEntry {
                    position: 1,
                    name: "Alice".to_string(),
                    score: 130,
                },
                RankedEntry {
                    position: 2,
                    name: "Bob".to_string(),
                    score: 0,
                },
            ],
            total_questions: 2,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::SessionEnded {
                final_leaderboard,
                total_questions,
            } => {
                assert_eq!(total_questions, 2);
                assert_eq!(final_leaderboard.len(), 2);
                assert_eq!(final_leaderboard[0].position, 1);
                assert_eq!(final_leaderboard[0].name, "Alice");
                assert_eq!(final_leaderboard[1].score, 0);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
