//! Grading entry point. The state tuple carries an `algo` tag; the grading
//! function is picked per call, so adding an algorithm is one pure function
//! and one tag, no schema change.

pub mod sm2;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::LEECH_THRESHOLD;
use crate::store::operations::srs_states::{SrsAlgorithm, SrsState};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Again),
            1 => Some(Self::Hard),
            2 => Some(Self::Good),
            3 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Again => 0,
            Self::Hard => 1,
            Self::Good => 2,
            Self::Easy => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub card_id: u64,
    pub grade: u8,
    pub next_due: DateTime<Utc>,
    pub new_interval: i64,
    pub new_ease: f64,
    pub total_reps: u32,
    pub total_lapses: u32,
    pub retention_rate: f64,
    pub became_leech: bool,
    pub elapsed_ms: Option<i64>,
}

/// Apply a grade to a card: move the SRS tuple forward, persist it together
/// with the review record, and handle the leech transition.
pub fn apply(
    store: &Store,
    card_id: u64,
    grade: Grade,
    elapsed_ms: Option<i64>,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome, StoreError> {
    let Some(card) = store.get_card(card_id)? else {
        return Err(StoreError::Precondition(format!(
            "card {card_id} does not exist"
        )));
    };

    let state = store
        .get_srs_state(card_id)?
        .unwrap_or_else(|| SrsState::new_card(card_id, now));
    let prev_interval = state.interval_days;
    let was_leech = state.lapses >= LEECH_THRESHOLD;

    let update = match state.algo {
        SrsAlgorithm::Sm2 => sm2::schedule(
            grade,
            state.interval_days,
            state.ease,
            state.reps,
            state.lapses,
        ),
        // FSRS 仅预留了 algo 标签，评分规则尚未落地，先走 SM-2
        SrsAlgorithm::Fsrs => sm2::schedule(
            grade,
            state.interval_days,
            state.ease,
            state.reps,
            state.lapses,
        ),
    };

    let mut next = SrsState {
        card_id,
        algo: state.algo,
        due: now + Duration::days(update.interval_days),
        interval_days: update.interval_days,
        ease: update.ease,
        reps: update.reps,
        lapses: update.lapses,
        last_grade: Some(grade.as_u8()),
        first_seen_at: state.first_seen_at,
        last_reviewed_at: Some(now),
    };

    // Leech transition: tag the word once and push the next due out by one
    // extra day, only on the crossing review.
    let became_leech = !was_leech && next.lapses >= LEECH_THRESHOLD;
    if became_leech {
        next.due += Duration::days(1);
        store.add_word_tag(card.word_id, "leech")?;
        tracing::info!(card_id, lapses = next.lapses, "card tagged as leech");
    }

    store.put_srs_state_with_review(&next, grade.as_u8(), elapsed_ms, prev_interval, now)?;

    Ok(ReviewOutcome {
        card_id,
        grade: grade.as_u8(),
        next_due: next.due,
        new_interval: next.interval_days,
        new_ease: next.ease,
        total_reps: next.reps,
        total_lapses: next.lapses,
        retention_rate: next.retention_rate(),
        became_leech,
        elapsed_ms,
    })
}
