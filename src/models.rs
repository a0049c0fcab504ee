use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::scheduler::INITIAL_EASE_FACTOR;

/// Last rating given to a flashcard. `NotSeen` is the state of a freshly
/// materialized progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    NotSeen,
    Wrong,
    Difficult,
    Good,
}

impl CardStatus {
    pub const ALL: [CardStatus; 4] = [
        CardStatus::NotSeen,
        CardStatus::Wrong,
        CardStatus::Difficult,
        CardStatus::Good,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::NotSeen => "NOT_SEEN",
            CardStatus::Wrong => "WRONG",
            CardStatus::Difficult => "DIFFICULT",
            CardStatus::Good => "GOOD",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid rating '{}': expected one of NOT_SEEN, WRONG, DIFFICULT, GOOD",
                    s
                )
            })
    }
}

/// Spaced-repetition state for one (user, flashcard) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewProgress {
    pub id: Uuid,
    pub user_id: String,
    pub contest_id: Uuid,
    pub flashcard_id: Uuid,
    pub status: CardStatus,
    pub repetitions: i32,
    pub ease_factor: f64,
    pub interval: i64, // days
    pub next_review_date: Option<DateTime<Utc>>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewProgress {
    /// A never-reviewed record, created when the flashcard joins the plan.
    pub fn new(user_id: &str, contest_id: Uuid, flashcard_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            contest_id,
            flashcard_id,
            status: CardStatus::NotSeen,
            repetitions: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            interval: 0,
            next_review_date: None,
            last_reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub contest_date: DateTime<Utc>,
    pub edital_text: Option<String>, // Raw exam announcement text
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub name: String,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtopic {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub name: String,
    pub order: i32,
    pub estimated_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub subtopic_id: Uuid,
    pub question: String,
    pub answer: String,
    pub importance_rank: i32,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicWithSubtopics {
    #[serde(flatten)]
    pub topic: Topic,
    pub subtopics: Vec<Subtopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectWithTopics {
    #[serde(flatten)]
    pub subject: Subject,
    pub topics: Vec<TopicWithSubtopics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub subjects: Vec<SubjectWithTopics>,
}

/// A due progress record joined with the flashcard it schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueCard {
    #[serde(flatten)]
    pub progress: ReviewProgress,
    pub flashcard: Flashcard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodaysCardsResponse {
    pub cards: Vec<DueCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContestRequest {
    pub name: String,
    pub role: String,
    pub contest_date: DateTime<Utc>,
    pub edital_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSubtopicInput {
    pub name: String,
    pub order: i32,
    pub estimated_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTopicInput {
    pub name: String,
    pub order: i32,
    pub subtopics: Vec<PlanSubtopicInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSubjectInput {
    pub name: String,
    pub order: i32,
    pub topics: Vec<PlanTopicInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudyPlanRequest {
    pub contest_id: Uuid,
    pub subjects: Vec<PlanSubjectInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtopicEstimate {
    pub subtopic_id: Uuid,
    pub estimated_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEstimatesRequest {
    pub contest_id: Uuid,
    pub estimates: Vec<SubtopicEstimate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlashcard {
    pub question: String,
    pub answer: String,
    pub importance_rank: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFlashcardsRequest {
    pub subtopic_id: Uuid,
    pub flashcards: Vec<NewFlashcard>,
}

/// Review submission as received on the wire. `rating` stays a string until
/// it has been validated against [`CardStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCardRequest {
    pub flashcard_id: Uuid,
    pub rating: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaysCardsQuery {
    pub subtopic_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_status_parsing() {
        assert_eq!("GOOD".parse::<CardStatus>().unwrap(), CardStatus::Good);
        assert_eq!("DIFFICULT".parse::<CardStatus>().unwrap(), CardStatus::Difficult);
        assert_eq!("WRONG".parse::<CardStatus>().unwrap(), CardStatus::Wrong);
        assert_eq!("NOT_SEEN".parse::<CardStatus>().unwrap(), CardStatus::NotSeen);

        assert!("good".parse::<CardStatus>().is_err());
        assert!("EASY".parse::<CardStatus>().is_err());
        assert!("".parse::<CardStatus>().is_err());
    }

    #[test]
    fn test_card_status_serializes_as_wire_name() {
        for status in CardStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
    }

    #[test]
    fn test_new_progress_is_unseen() {
        let now = Utc::now();
        let progress = ReviewProgress::new("user-1", Uuid::new_v4(), Uuid::new_v4(), now);

        assert_eq!(progress.status, CardStatus::NotSeen);
        assert_eq!(progress.repetitions, 0);
        assert_eq!(progress.ease_factor, 2.5);
        assert_eq!(progress.interval, 0);
        assert!(progress.next_review_date.is_none());
        assert!(progress.last_reviewed_at.is_none());
        assert_eq!(progress.created_at, now);
    }

    #[test]
    fn test_progress_json_uses_camel_case() {
        let progress = ReviewProgress::new("user-1", Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        let json = serde_json::to_value(&progress).unwrap();

        assert_eq!(json["easeFactor"], 2.5);
        assert_eq!(json["status"], "NOT_SEEN");
        assert!(json["nextReviewDate"].is_null());
        assert!(json.get("ease_factor").is_none());
    }
}
