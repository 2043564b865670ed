//! Read models over reviews, SRS states and the scheduler. Pure reads; the
//! today view is a scheduler dry run so its numbers match the real queue.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::constants::{
    DEFAULT_NEW_LIMIT, DEFAULT_QUEUE_LIMIT, ESTIMATED_SECONDS_PER_CARD, MAX_FORECAST_DAYS,
    MAX_PROGRESS_DAYS,
};
use crate::scheduler::{self, QueueOptions, QueueStats};
use crate::store::{Store, StoreError};

#[derive(Debug, Serialize)]
pub struct ProgressPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub reviews: u64,
    pub average_grade: f64,
}

#[derive(Debug, Serialize)]
pub struct ProgressSummary {
    pub total_reviews: u64,
    pub avg_daily_reviews: f64,
    pub active_days: u64,
}

#[derive(Debug, Serialize)]
pub struct ProgressReport {
    pub period: ProgressPeriod,
    pub daily_data: Vec<DailyProgress>,
    pub summary: ProgressSummary,
}

/// Per-day review buckets over the trailing window. Empty days report
/// `average_grade = 0`, never an error.
pub fn progress(
    store: &Store,
    days: i64,
    now: DateTime<Utc>,
) -> Result<ProgressReport, StoreError> {
    let days = days.clamp(1, MAX_PROGRESS_DAYS);
    let today = now.date_naive();
    let start_date = today - Duration::days(days - 1);
    let start = day_start(start_date);
    let end = day_start(today) + Duration::days(1);

    let mut buckets: Vec<(u64, u64)> = vec![(0, 0); days as usize];
    for review in store.reviews_between(start, end)? {
        let offset = review
            .ts
            .date_naive()
            .signed_duration_since(start_date)
            .num_days();
        if (0..days).contains(&offset) {
            let bucket = &mut buckets[offset as usize];
            bucket.0 += 1;
            bucket.1 += review.grade as u64;
        }
    }

    let mut daily_data = Vec::with_capacity(days as usize);
    let mut total_reviews = 0u64;
    let mut active_days = 0u64;
    for (offset, (count, grade_sum)) in buckets.into_iter().enumerate() {
        total_reviews += count;
        if count > 0 {
            active_days += 1;
        }
        daily_data.push(DailyProgress {
            date: start_date + Duration::days(offset as i64),
            reviews: count,
            average_grade: if count > 0 {
                grade_sum as f64 / count as f64
            } else {
                0.0
            },
        });
    }

    Ok(ProgressReport {
        period: ProgressPeriod {
            start_date,
            end_date: today,
            days,
        },
        daily_data,
        summary: ProgressSummary {
            total_reviews,
            avg_daily_reviews: total_reviews as f64 / days as f64,
            active_days,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub due_cards: u64,
}

#[derive(Debug, Serialize)]
pub struct DueForecast {
    pub forecast_period: String,
    pub forecast: Vec<ForecastDay>,
    pub total_due: u64,
}

/// Per-day count of cards whose current `due` falls on each upcoming day.
pub fn due_forecast(
    store: &Store,
    days: i64,
    now: DateTime<Utc>,
) -> Result<DueForecast, StoreError> {
    let days = days.clamp(1, MAX_FORECAST_DAYS);
    let today = now.date_naive();

    let mut forecast = Vec::with_capacity(days as usize);
    let mut total_due = 0u64;
    for offset in 0..days {
        let date = today + Duration::days(offset);
        let start = day_start(date);
        let count = store.count_due_between(start, start + Duration::days(1))?;
        total_due += count;
        forecast.push(ForecastDay {
            date,
            due_cards: count,
        });
    }

    Ok(DueForecast {
        forecast_period: format!("{days} days"),
        forecast,
        total_due,
    })
}

#[derive(Debug, Serialize)]
pub struct Recommendations {
    pub suggested_daily_new: u64,
    pub suggested_daily_reviews: u64,
    pub estimated_time_minutes: f64,
}

#[derive(Debug, Serialize)]
pub struct TodaySummary {
    pub today: QueueStats,
    pub recommendations: Recommendations,
}

/// Today view, computed by a scheduler dry run so the numbers agree with
/// `study/next`.
pub fn today(store: &Store, now: DateTime<Utc>) -> Result<TodaySummary, StoreError> {
    let (_, stats, _) = scheduler::next_queue(store, &QueueOptions::default_at(now), true)?;

    let recommendations = Recommendations {
        suggested_daily_new: stats.new_cards.min(DEFAULT_NEW_LIMIT as u64),
        suggested_daily_reviews: (stats.due_today + stats.rolling_reviews)
            .min(DEFAULT_QUEUE_LIMIT as u64),
        // 简单线性模型：队列长度 × 每卡耗时
        estimated_time_minutes: (stats.study_queue_size * ESTIMATED_SECONDS_PER_CARD) as f64
            / 60.0,
    };

    Ok(TodaySummary {
        today: stats,
        recommendations,
    })
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}
