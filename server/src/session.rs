//! Live session state: roster, question pointer, and lifecycle flags.
//!
//! A [`Session`] is one run of a quiz. All mutation happens on the single
//! event-processing task, so the struct needs no internal locking; invariants
//! (roster cap, one answer per question, one pending deadline) are enforced
//! by keeping the fields private and funnelling every change through a method.

use crate::scheduler::{DeadlineHandle, QuestionPhase};
use log::info;
use shared::{score_answer, Question, QuizDefinition, MAX_PLAYERS};
use std::net::SocketAddr;
use thiserror::Error;

/// Rejections and drops the orchestrator can produce. Only `NotFound` and
/// `SessionFull` are ever surfaced to a client; the other two name silent
/// drops so handlers can log them uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Session is full (max 30 players)")]
    SessionFull,
    #[error("Not authorized to control this session")]
    Unauthorized,
    #[error("Submission arrived too late or was already recorded")]
    StaleSubmission,
}

/// One scored submission, kept per player per question index.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub option: usize,
    pub is_correct: bool,
    pub points: u32,
    pub time_remaining: f32,
}

/// A participant in a session. The connection address doubles as the
/// player's identity and unicast target; a reconnect gets a new address and
/// is a new player.
#[derive(Debug)]
pub struct Player {
    pub name: String,
    pub addr: SocketAddr,
    pub score: u32,
    /// Sparse answer log indexed by question; `None` means unanswered.
    pub answers: Vec<Option<AnswerRecord>>,
}

impl Player {
    fn new(name: String, addr: SocketAddr, question_count: usize) -> Self {
        Self {
            name,
            addr,
            score: 0,
            answers: vec![None; question_count],
        }
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }
}

/// Result of a join attempt that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A fresh roster entry was created.
    Added,
    /// The display name was already present; the roster is left untouched.
    AlreadyPresent,
}

/// One live quiz run, keyed by its short code in the registry.
#[derive(Debug)]
pub struct Session {
    pub code: String,
    quiz: QuizDefinition,
    admin: Option<SocketAddr>,
    players: Vec<Player>,
    current_question: Option<usize>,
    is_active: bool,
    phase: QuestionPhase,
    deadline: Option<DeadlineHandle>,
}

impl Session {
    pub fn new(code: String, quiz: QuizDefinition, admin: Option<SocketAddr>) -> Self {
        Self {
            code,
            quiz,
            admin,
            players: Vec::new(),
            current_question: None,
            is_active: false,
            phase: QuestionPhase::Idle,
            deadline: None,
        }
    }

    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    pub fn admin(&self) -> Option<SocketAddr> {
        self.admin
    }

    /// True when `addr` is allowed to control this session.
    pub fn is_admin(&self, addr: SocketAddr) -> bool {
        self.admin == Some(addr)
    }

    /// Claims control of an admin-less session. Set-once: succeeds when no
    /// admin is recorded (or the caller already is the admin), and never
    /// reassigns an existing one.
    pub fn claim_admin(&mut self, addr: SocketAddr) -> bool {
        match self.admin {
            None => {
                self.admin = Some(addr);
                info!("Session {} hosted by {}", self.code, addr);
                true
            }
            Some(existing) => existing == addr,
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn phase(&self) -> QuestionPhase {
        self.phase
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_question
    }

    /// The question currently pointed at, if the session has started and the
    /// pointer is still in range.
    pub fn current_question(&self) -> Option<(usize, &Question)> {
        let index = self.current_question?;
        self.quiz.questions.get(index).map(|q| (index, q))
    }

    /// Admits a player. The capacity gate applies before name de-duplication,
    /// so a duplicate name is also turned away from a full roster. A name
    /// already on the roster is a silent no-op: no second entry, and the
    /// existing entry's history is left as-is.
    pub fn join(&mut self, name: String, addr: SocketAddr) -> Result<JoinOutcome, SessionError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(SessionError::SessionFull);
        }

        if self.players.iter().any(|p| p.name == name) {
            return Ok(JoinOutcome::AlreadyPresent);
        }

        info!("Player {} joined session {} from {}", name, self.code, addr);
        self.players
            .push(Player::new(name, addr, self.quiz.questions.len()));
        Ok(JoinOutcome::Added)
    }

    /// Removes the player bound to `addr`, if any. The freed name may be
    /// re-used by a later join, which is then a fresh player.
    pub fn remove_player(&mut self, addr: SocketAddr) -> Option<Player> {
        let index = self.players.iter().position(|p| p.addr == addr)?;
        let player = self.players.remove(index);
        info!("Player {} left session {}", player.name, self.code);
        Some(player)
    }

    /// Starts the run: first question, session marked active. The caller is
    /// responsible for the admin and `!is_active` gates.
    pub fn begin(&mut self) {
        self.is_active = true;
        self.current_question = Some(0);
        info!(
            "Session {} started with {} players, {} questions",
            self.code,
            self.players.len(),
            self.quiz.questions.len()
        );
    }

    /// Moves the question pointer forward, cancelling any pending deadline
    /// first. Returns the new index while questions remain, `None` once the
    /// quiz is exhausted (the caller should then finalize).
    pub fn advance(&mut self) -> Option<usize> {
        self.deadline.take();
        let next = self.current_question.map_or(0, |i| i + 1);
        self.current_question = Some(next);
        if next < self.quiz.questions.len() {
            Some(next)
        } else {
            None
        }
    }

    /// Marks the current question open for submissions.
    pub fn open_question(&mut self) {
        self.phase = QuestionPhase::Open;
    }

    /// Marks the current question closed after its deadline fired. The fired
    /// deadline's handle is dropped here.
    pub fn close_question(&mut self) {
        self.phase = QuestionPhase::Closed;
        self.deadline.take();
    }

    /// Installs the pending deadline, cancelling any prior one. Keeping this
    /// in one setter is what guarantees two deadlines never coexist.
    pub fn set_deadline(&mut self, handle: DeadlineHandle) {
        if let Some(previous) = self.deadline.replace(handle) {
            previous.cancel();
        }
    }

    /// Ends the run: inactive, no pending deadline, phase back to idle.
    pub fn finalize(&mut self) {
        self.is_active = false;
        self.phase = QuestionPhase::Idle;
        self.deadline.take();
        info!("Session {} ended", self.code);
    }

    pub fn has_pending_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    /// Scores and records a submission for the current question. Returns
    /// `None` (a silent drop) when the session is inactive, no question is
    /// current, the sender is not on the roster, or this question was
    /// already answered by the sender. First submission wins.
    pub fn record_answer(
        &mut self,
        addr: SocketAddr,
        answer: usize,
        time_remaining: f32,
    ) -> Option<AnswerRecord> {
        if !self.is_active {
            return None;
        }
        let index = self.current_question?;
        let question = self.quiz.questions.get(index)?.clone();

        let player = self.players.iter_mut().find(|p| p.addr == addr)?;
        if player.answers.get(index)?.is_some() {
            return None;
        }

        let (is_correct, points) = score_answer(&question, answer, time_remaining);
        let record = AnswerRecord {
            option: answer,
            is_correct,
            points,
            time_remaining,
        };
        player.answers[index] = Some(record.clone());
        // Client-reported time is untrusted and the bonus is unclamped, so
        // a single award can reach u32::MAX; the total must not overflow.
        player.score = player.score.saturating_add(points);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{QuizMeta, DEFAULT_QUESTION_SECS};

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn question(points: u32, correct: usize) -> Question {
        Question {
            prompt: "?".to_string(),
            options: [
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
            ],
            correct_option: correct,
            points,
            time_limit_secs: None,
        }
    }

    fn quiz(questions: Vec<Question>) -> QuizDefinition {
        QuizDefinition {
            title: "Test quiz".to_string(),
            description: String::new(),
            questions,
        }
    }

    fn session() -> Session {
        Session::new(
            "ABCD1".to_string(),
            quiz(vec![question(100, 0), question(50, 2)]),
            None,
        )
    }

    #[test]
    fn test_join_adds_player_with_zero_score() {
        let mut s = session();
        let outcome = s.join("Alice".to_string(), test_addr(1000)).unwrap();
        assert_eq!(outcome, JoinOutcome::Added);
        assert_eq!(s.player_count(), 1);
        assert_eq!(s.players()[0].score, 0);
        assert_eq!(s.players()[0].answers.len(), 2);
    }

    #[test]
    fn test_join_duplicate_name_is_silent_noop() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        let outcome = s.join("Alice".to_string(), test_addr(1001)).unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyPresent);
        assert_eq!(s.player_count(), 1);
        // The original entry keeps its address
        assert_eq!(s.players()[0].addr, test_addr(1000));
    }

    #[test]
    fn test_join_name_matching_is_case_sensitive() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        let outcome = s.join("alice".to_string(), test_addr(1001)).unwrap();
        assert_eq!(outcome, JoinOutcome::Added);
        assert_eq!(s.player_count(), 2);
    }

    #[test]
    fn test_join_rejects_thirty_first_player() {
        let mut s = session();
        for i in 0..30 {
            s.join(format!("player-{}", i), test_addr(1000 + i as u16))
                .unwrap();
        }
        assert_eq!(s.player_count(), 30);

        let result = s.join("one-too-many".to_string(), test_addr(2000));
        assert_eq!(result, Err(SessionError::SessionFull));
        assert_eq!(s.player_count(), 30);
    }

    #[test]
    fn test_remove_player_frees_name_for_fresh_join() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        assert!(s.remove_player(test_addr(1000)).is_some());
        assert_eq!(s.player_count(), 0);

        let outcome = s.join("Alice".to_string(), test_addr(1001)).unwrap();
        assert_eq!(outcome, JoinOutcome::Added);
        assert_eq!(s.players()[0].score, 0);
    }

    #[test]
    fn test_remove_unknown_player() {
        let mut s = session();
        assert!(s.remove_player(test_addr(9999)).is_none());
    }

    #[test]
    fn test_claim_admin_is_set_once() {
        let mut s = session();
        assert!(s.claim_admin(test_addr(1)));
        assert!(s.is_admin(test_addr(1)));
        // Same connection may re-claim
        assert!(s.claim_admin(test_addr(1)));
        // A different connection may not take over
        assert!(!s.claim_admin(test_addr(2)));
        assert!(s.is_admin(test_addr(1)));
    }

    #[test]
    fn test_begin_and_advance_through_quiz() {
        let mut s = session();
        assert_eq!(s.current_index(), None);
        assert!(!s.is_active());

        s.begin();
        assert!(s.is_active());
        assert_eq!(s.current_index(), Some(0));

        assert_eq!(s.advance(), Some(1));
        assert_eq!(s.current_index(), Some(1));

        // Past the last question
        assert_eq!(s.advance(), None);
    }

    #[test]
    fn test_record_answer_correct_with_bonus() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        s.begin();
        s.open_question();

        let record = s.record_answer(test_addr(1000), 0, 8.0).unwrap();
        assert!(record.is_correct);
        assert_eq!(record.points, 130);
        assert_eq!(s.players()[0].score, 130);
    }

    #[test]
    fn test_record_answer_incorrect_scores_zero() {
        let mut s = session();
        s.join("Bob".to_string(), test_addr(1001)).unwrap();
        s.begin();
        s.open_question();

        let record = s.record_answer(test_addr(1001), 3, 9.0).unwrap();
        assert!(!record.is_correct);
        assert_eq!(record.points, 0);
        assert_eq!(s.players()[0].score, 0);
    }

    #[test]
    fn test_record_answer_first_submission_wins() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        s.begin();
        s.open_question();

        s.record_answer(test_addr(1000), 0, 8.0).unwrap();
        let second = s.record_answer(test_addr(1000), 0, 10.0);
        assert!(second.is_none());
        assert_eq!(s.players()[0].score, 130);
        assert_eq!(s.players()[0].answered_count(), 1);
    }

    #[test]
    fn test_record_answer_absurd_time_saturates_score() {
        let mut s = session();
        s.join("Mallory".to_string(), test_addr(1000)).unwrap();
        s.begin();
        s.open_question();

        // A hostile client can report any remaining time it likes
        let record = s.record_answer(test_addr(1000), 0, f32::MAX).unwrap();
        assert_eq!(record.points, u32::MAX);
        assert_eq!(s.players()[0].score, u32::MAX);

        // A second maxed award must not overflow the running total
        assert_eq!(s.advance(), Some(1));
        s.open_question();
        s.record_answer(test_addr(1000), 2, f32::MAX).unwrap();
        assert_eq!(s.players()[0].score, u32::MAX);
    }

    #[test]
    fn test_record_answer_inactive_session_dropped() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        assert!(s.record_answer(test_addr(1000), 0, 8.0).is_none());

        s.begin();
        s.open_question();
        s.finalize();
        assert!(s.record_answer(test_addr(1000), 0, 8.0).is_none());
        assert_eq!(s.players()[0].score, 0);
    }

    #[test]
    fn test_record_answer_unknown_sender_dropped() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        s.begin();
        s.open_question();
        assert!(s.record_answer(test_addr(4040), 0, 8.0).is_none());
    }

    #[test]
    fn test_answers_tracked_per_question() {
        let mut s = session();
        s.join("Alice".to_string(), test_addr(1000)).unwrap();
        s.begin();
        s.open_question();
        s.record_answer(test_addr(1000), 0, 10.0).unwrap();

        assert_eq!(s.advance(), Some(1));
        s.open_question();
        // Question 2: 50 points, correct option 2, no time left -> 25
        let record = s.record_answer(test_addr(1000), 2, 0.0).unwrap();
        assert_eq!(record.points, 25);
        assert_eq!(s.players()[0].score, 175);
        assert_eq!(s.players()[0].answered_count(), 2);
    }

    #[test]
    fn test_finalize_clears_activity_and_phase() {
        let mut s = session();
        s.begin();
        s.open_question();
        assert_eq!(s.phase(), QuestionPhase::Open);

        s.finalize();
        assert!(!s.is_active());
        assert_eq!(s.phase(), QuestionPhase::Idle);
        assert!(!s.has_pending_deadline());
    }

    #[test]
    fn test_current_question_resolves_metadata() {
        let s = {
            let mut s = session();
            s.begin();
            s
        };
        let (index, q) = s.current_question().unwrap();
        assert_eq!(index, 0);
        assert_eq!(q.points, 100);
        assert_eq!(q.time_limit(), DEFAULT_QUESTION_SECS);
    }

    #[test]
    fn test_quiz_meta_exposed_for_join_payload() {
        let s = session();
        let meta: QuizMeta = s.quiz().meta();
        assert_eq!(meta.question_count, 2);
        assert_eq!(meta.total_points, 150);
    }
}
