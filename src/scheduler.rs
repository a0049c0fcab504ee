use chrono::{DateTime, Days, FixedOffset, NaiveTime, Offset, TimeZone, Utc};

use crate::models::{CardStatus, ReviewProgress};

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Ratings with a quality score below this reset the card.
const PASSING_QUALITY: u8 = 3;
const SECOND_INTERVAL_DAYS: i64 = 6;

/// Quality score (0-5 scale) fed into the SM-2 ease update.
pub fn quality(rating: CardStatus) -> u8 {
    match rating {
        CardStatus::Wrong => 0,
        CardStatus::Difficult => 3,
        CardStatus::Good => 5,
        CardStatus::NotSeen => 0,
    }
}

/// SM-2 ease update, floored at [`MIN_EASE_FACTOR`]. No upper bound.
pub fn next_ease_factor(ease_factor: f64, quality: u8) -> f64 {
    let penalty = 5.0 - f64::from(quality);
    let updated = ease_factor + (0.1 - penalty * (0.08 + penalty * 0.02));
    updated.max(MIN_EASE_FACTOR)
}

/// A record is due when it has never been scheduled or its date has arrived.
pub fn is_due(next_review_date: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> bool {
    match next_review_date {
        None => true,
        Some(date) => date <= as_of,
    }
}

/// Scheduling fields produced by one review. The caller persists these
/// together with the rating and the review timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleOutcome {
    pub repetitions: i32,
    pub ease_factor: f64,
    pub interval: i64,
    pub next_review_date: DateTime<Utc>,
}

impl ScheduleOutcome {
    /// Record state after the review: outcome fields plus status and timestamps.
    pub fn apply_to(
        &self,
        progress: &ReviewProgress,
        rating: CardStatus,
        reviewed_at: DateTime<Utc>,
    ) -> ReviewProgress {
        ReviewProgress {
            status: rating,
            repetitions: self.repetitions,
            ease_factor: self.ease_factor,
            interval: self.interval,
            next_review_date: Some(self.next_review_date),
            last_reviewed_at: Some(reviewed_at),
            updated_at: reviewed_at,
            ..progress.clone()
        }
    }
}

/// SM-2 variant used for flashcard reviews.
///
/// Day boundaries ("start of day" for due dates, "end of day" for the review
/// queue) are taken in `reference_offset`.
#[derive(Debug, Clone, Copy)]
pub struct SM2Scheduler {
    reference_offset: FixedOffset,
}

impl Default for SM2Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SM2Scheduler {
    pub fn new() -> Self {
        Self {
            reference_offset: Utc.fix(),
        }
    }

    pub fn with_offset(reference_offset: FixedOffset) -> Self {
        Self { reference_offset }
    }

    pub fn reference_offset(&self) -> FixedOffset {
        self.reference_offset
    }

    pub fn compute_next_review(
        &self,
        current: &ReviewProgress,
        rating: CardStatus,
        now: DateTime<Utc>,
    ) -> ScheduleOutcome {
        let q = quality(rating);
        let prev_repetitions = current.repetitions.max(0);
        let prev_interval = current.interval.max(0);
        let prev_ease = sanitize_ease_factor(current.ease_factor);

        let (repetitions, interval) = if q < PASSING_QUALITY {
            (0, 1)
        } else {
            let repetitions = prev_repetitions.saturating_add(1);
            let interval = match repetitions {
                1 => 1,
                2 => SECOND_INTERVAL_DAYS,
                // Growth uses the ease factor from before this review.
                _ => grow_interval(prev_interval, prev_ease),
            };
            (repetitions, interval)
        };

        ScheduleOutcome {
            repetitions,
            ease_factor: next_ease_factor(prev_ease, q),
            interval,
            next_review_date: self.due_date_after(now, interval),
        }
    }

    /// Start of the reference-zone day `interval` days after `now`.
    pub fn due_date_after(&self, now: DateTime<Utc>, interval: i64) -> DateTime<Utc> {
        let local = now.with_timezone(&self.reference_offset);
        let days = Days::new(u64::try_from(interval).unwrap_or(0));
        match local.checked_add_days(days) {
            Some(target) => self.start_of_day(target.with_timezone(&Utc)),
            None => DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local_day = instant.with_timezone(&self.reference_offset).date_naive();
        self.reference_offset
            .from_local_datetime(&local_day.and_time(NaiveTime::MIN))
            .single()
            .map(|start| start.with_timezone(&Utc))
            .unwrap_or(instant)
    }

    /// Last millisecond of the reference-zone day containing `instant`. This
    /// is the cutoff for "due today".
    pub fn end_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local_day = instant.with_timezone(&self.reference_offset).date_naive();
        local_day
            .and_hms_milli_opt(23, 59, 59, 999)
            .and_then(|end| self.reference_offset.from_local_datetime(&end).single())
            .map(|end| end.with_timezone(&Utc))
            .unwrap_or(instant)
    }
}

fn sanitize_ease_factor(ease_factor: f64) -> f64 {
    if ease_factor.is_nan() {
        INITIAL_EASE_FACTOR
    } else {
        ease_factor.max(MIN_EASE_FACTOR)
    }
}

fn grow_interval(interval: i64, ease_factor: f64) -> i64 {
    // Float-to-int casts saturate, so huge products clamp to i64::MAX.
    ((interval as f64) * ease_factor).ceil().max(1.0) as i64
}
