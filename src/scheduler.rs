//! Daily queue composition: due SRS cards, rolling-window cards and fresh
//! cards, interleaved with priority Due > Rolling > New under adaptive caps.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::{
    DEFAULT_NEW_LIMIT, DEFAULT_QUEUE_LIMIT, LEECH_THRESHOLD, MAX_QUEUE_LIMIT,
    ROLLING_OFFSETS_DAYS,
};
use crate::store::operations::cards::Card;
use crate::store::operations::srs_states::SrsState;
use crate::store::operations::words::{natural_key, Word};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub limit: usize,
    pub new_limit: usize,
    pub include_rolling: bool,
    pub wordbook_id: Option<u64>,
    /// Injectable clock; handlers pass `Utc::now()`.
    pub now: DateTime<Utc>,
}

impl QueueOptions {
    pub fn default_at(now: DateTime<Utc>) -> Self {
        Self {
            limit: DEFAULT_QUEUE_LIMIT,
            new_limit: DEFAULT_NEW_LIMIT,
            include_rolling: true,
            wordbook_id: None,
            now,
        }
    }

    /// Malformed options clamp to valid ranges instead of erroring.
    pub fn clamped(mut self) -> Self {
        self.limit = self.limit.min(MAX_QUEUE_LIMIT);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SrsView {
    pub due: Option<DateTime<Utc>>,
    pub interval: i64,
    pub ease: f64,
    pub reps: u32,
    pub lapses: u32,
    pub retention_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueCard {
    pub card_id: u64,
    pub word_id: u64,
    pub lemma: String,
    pub meaning_zh: Option<String>,
    pub pos: Option<String>,
    pub gender: Option<String>,
    pub ipa: Option<String>,
    pub lesson: Option<String>,
    pub cefr: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub card_type: &'static str,
    pub priority: u8,
    pub template: &'static str,
    pub hint: Option<String>,
    pub srs: SrsView,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub total_cards: u64,
    pub due_today: u64,
    pub new_cards: u64,
    pub rolling_reviews: u64,
    pub reviewed_today: u64,
    pub study_queue_size: u64,
    pub wordbook_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub total_returned: usize,
    pub limit: usize,
    pub new_limit: usize,
    pub effective_new_limit: usize,
    pub include_rolling: bool,
}

/// Compose today's queue. In dry-run mode nothing is written, so the stats
/// endpoints see exactly the queue the learner would get.
pub fn next_queue(
    store: &Store,
    options: &QueueOptions,
    dry_run: bool,
) -> Result<(Vec<QueueCard>, QueueStats, QueueInfo), StoreError> {
    let options = options.clone().clamped();

    let book = match options.wordbook_id {
        Some(id) => store.get_wordbook(id)?,
        None => store.active_wordbook()?,
    };
    let Some(book) = book else {
        // 没有激活词库：空队列，统计全零
        let info = QueueInfo {
            total_returned: 0,
            limit: options.limit,
            new_limit: options.new_limit,
            effective_new_limit: options.new_limit,
            include_rolling: options.include_rolling,
        };
        return Ok((Vec::new(), QueueStats::default(), info));
    };

    let now = options.now;
    let today = now.date_naive();

    let words: HashMap<u64, Word> = store
        .words_in_book(book.id)?
        .into_iter()
        .map(|w| (w.id, w))
        .collect();

    let mut cards: Vec<(Card, Option<SrsState>)> = Vec::new();
    for word_id in words.keys() {
        for card in store.cards_for_word(*word_id)? {
            let state = store.get_srs_state(card.id)?;
            cards.push((card, state));
        }
    }
    let total_cards = cards.len() as u64;

    // 1. Due: due <= now, reps > 0
    let mut due: Vec<(Card, SrsState)> = cards
        .iter()
        .filter_map(|(card, state)| {
            let state = state.as_ref()?;
            (state.due <= now && state.reps > 0).then(|| (card.clone(), state.clone()))
        })
        .collect();
    due.sort_by(|(ca, sa), (cb, sb)| {
        sa.due
            .cmp(&sb.due)
            .then_with(|| sb.lapses.cmp(&sa.lapses))
            .then_with(|| ca.id.cmp(&cb.id))
    });
    let due_ids: HashSet<u64> = due.iter().map(|(card, _)| card.id).collect();

    // 2. Rolling: first exposure exactly D-1/2/4/7 days ago, not already due
    let mut rolling: Vec<(i64, Card, SrsState)> = Vec::new();
    if options.include_rolling {
        for (card, state) in &cards {
            let Some(state) = state else { continue };
            if due_ids.contains(&card.id) {
                continue;
            }
            let days_since = today
                .signed_duration_since(state.first_seen_at.date_naive())
                .num_days();
            if ROLLING_OFFSETS_DAYS.contains(&days_since) {
                rolling.push((days_since, card.clone(), state.clone()));
            }
        }
        rolling.sort_by(|(da, ca, _), (db, cb, _)| da.cmp(db).then_with(|| ca.id.cmp(&cb.id)));
    }

    // 3. New: no SRS state yet
    let mut fresh: Vec<Card> = cards
        .iter()
        .filter(|(_, state)| state.is_none())
        .map(|(card, _)| card.clone())
        .collect();
    fresh.sort_by(|a, b| {
        let lesson_a = words.get(&a.word_id).and_then(|w| w.lesson.as_deref());
        let lesson_b = words.get(&b.word_id).and_then(|w| w.lesson.as_deref());
        natural_key(lesson_a)
            .cmp(&natural_key(lesson_b))
            .then_with(|| a.word_id.cmp(&b.word_id))
            .then_with(|| a.id.cmp(&b.id))
    });

    // Adaptive new cap: dampen fresh inflow when a backlog exists.
    let backlog = due.len() + rolling.len();
    let effective_new_limit = if backlog > 2 * options.limit {
        let overshoot = backlog - 2 * options.limit;
        options.new_limit.saturating_sub(overshoot.div_ceil(10))
    } else {
        options.new_limit
    };

    let stats = QueueStats {
        total_cards,
        due_today: due.len() as u64,
        new_cards: fresh.len() as u64,
        rolling_reviews: rolling.len() as u64,
        reviewed_today: reviewed_today(store, now)?,
        study_queue_size: (due.len() + rolling.len() + fresh.len().min(effective_new_limit))
            .min(options.limit) as u64,
        wordbook_name: Some(book.name.clone()),
    };

    // Union with priority Due > Rolling > New, truncated to limit.
    let mut queue: Vec<QueueCard> = Vec::with_capacity(options.limit);
    let language = Some(book.language.clone());
    for (card, state) in &due {
        if queue.len() >= options.limit {
            break;
        }
        if let Some(word) = words.get(&card.word_id) {
            queue.push(build_card(word, card, Some(state), "due", 1, &language));
        }
    }
    for (_, card, state) in &rolling {
        if queue.len() >= options.limit {
            break;
        }
        if let Some(word) = words.get(&card.word_id) {
            queue.push(build_card(word, card, Some(state), "rolling", 2, &language));
        }
    }
    let mut scheduled_new: Vec<u64> = Vec::new();
    for card in fresh.iter().take(effective_new_limit) {
        if queue.len() >= options.limit {
            break;
        }
        if let Some(word) = words.get(&card.word_id) {
            queue.push(build_card(word, card, None, "new", 3, &language));
            scheduled_new.push(card.id);
        }
    }

    if !dry_run {
        // 新卡片首次进入队列时惰性建立 SRS 状态（first_seen_at = now）
        for card_id in scheduled_new {
            store.put_srs_state(&SrsState::new_card(card_id, now))?;
        }
        // Idempotent leech tagging for anything scheduled with enough lapses.
        for entry in &queue {
            if entry.srs.lapses >= LEECH_THRESHOLD {
                store.add_word_tag(entry.word_id, "leech")?;
            }
        }
    }

    let info = QueueInfo {
        total_returned: queue.len(),
        limit: options.limit,
        new_limit: options.new_limit,
        effective_new_limit,
        include_rolling: options.include_rolling,
    };
    Ok((queue, stats, info))
}

fn reviewed_today(store: &Store, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    store.count_reviews_between(start, start + Duration::days(1))
}

fn build_card(
    word: &Word,
    card: &Card,
    state: Option<&SrsState>,
    card_type: &'static str,
    priority: u8,
    language: &Option<String>,
) -> QueueCard {
    let srs = match state {
        Some(s) => SrsView {
            due: Some(s.due),
            interval: s.interval_days,
            ease: s.ease,
            reps: s.reps,
            lapses: s.lapses,
            retention_rate: s.retention_rate(),
        },
        None => SrsView {
            due: None,
            interval: 0,
            ease: 2.5,
            reps: 0,
            lapses: 0,
            retention_rate: 0.0,
        },
    };
    QueueCard {
        card_id: card.id,
        word_id: word.id,
        lemma: word.lemma.clone(),
        meaning_zh: word.meaning_zh().map(str::to_string),
        pos: word.pos.clone(),
        gender: word.gender.clone(),
        ipa: word.ipa.clone(),
        lesson: word.lesson.clone(),
        cefr: word.cefr.clone(),
        tags: word.tags.clone(),
        language: language.clone(),
        card_type,
        priority,
        template: card.template.as_str(),
        hint: card.hint.clone(),
        srs,
    }
}
