use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::database::Database;
use crate::errors::ApiError;
use crate::models::*;
use crate::scheduler::SM2Scheduler;

// Import logging macros
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "study_service";

#[derive(Clone)]
pub struct StudyService {
    db: Database,
    scheduler: SM2Scheduler,
    clock: Arc<dyn Clock>,
}

impl StudyService {
    pub fn new(db: Database) -> Self {
        Self::with_components(db, SM2Scheduler::new(), Arc::new(SystemClock))
    }

    pub fn with_components(db: Database, scheduler: SM2Scheduler, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            scheduler,
            clock,
        }
    }

    // Contest operations
    pub async fn create_contest(
        &self,
        user_id: &str,
        request: CreateContestRequest,
    ) -> Result<Contest, ApiError> {
        require_non_blank("name", &request.name)?;
        require_non_blank("role", &request.role)?;

        let contest = self.db.create_contest(user_id, &request, self.clock.now()).await?;
        log_service_success!(SERVICE, "create_contest", "contest created");
        Ok(contest)
    }

    pub async fn list_contests(&self, user_id: &str) -> Result<Vec<Contest>, ApiError> {
        Ok(self.db.list_contests(user_id).await?)
    }

    pub async fn get_contest(&self, user_id: &str, contest_id: Uuid) -> Result<Contest, ApiError> {
        self.db
            .get_contest(user_id, contest_id)
            .await?
            .ok_or_else(contest_not_found)
    }

    pub async fn delete_contest(&self, user_id: &str, contest_id: Uuid) -> Result<(), ApiError> {
        log_service_start!(SERVICE, "delete_contest", contest_id = contest_id);
        if self.db.delete_contest(user_id, contest_id).await? {
            Ok(())
        } else {
            Err(contest_not_found())
        }
    }

    // Study plan operations
    pub async fn create_plan(
        &self,
        user_id: &str,
        request: CreateStudyPlanRequest,
    ) -> Result<StudyPlan, ApiError> {
        log_service_start!(SERVICE, "create_plan", contest_id = request.contest_id);
        self.get_contest(user_id, request.contest_id).await?;

        for subject in &request.subjects {
            require_non_blank("subject name", &subject.name)?;
            for topic in &subject.topics {
                require_non_blank("topic name", &topic.name)?;
                for subtopic in &topic.subtopics {
                    require_non_blank("subtopic name", &subtopic.name)?;
                    if let Some(count) = subtopic.estimated_count {
                        require_non_negative("estimatedCount", count)?;
                    }
                }
            }
        }

        let plan = self
            .db
            .create_plan(request.contest_id, &request.subjects, self.clock.now())
            .await?;
        log_service_success!(SERVICE, "create_plan", "study plan stored");
        Ok(plan)
    }

    pub async fn get_plan(&self, user_id: &str, contest_id: Uuid) -> Result<StudyPlan, ApiError> {
        self.get_contest(user_id, contest_id).await?;
        Ok(self.db.get_plan(contest_id).await?)
    }

    pub async fn update_estimates(
        &self,
        user_id: &str,
        request: UpdateEstimatesRequest,
    ) -> Result<(), ApiError> {
        self.get_contest(user_id, request.contest_id).await?;
        for estimate in &request.estimates {
            require_non_negative("estimatedCount", estimate.estimated_count)?;
        }

        let updated = self
            .db
            .update_estimates(request.contest_id, &request.estimates, self.clock.now())
            .await?;
        if updated < request.estimates.len() as u64 {
            log_service_warn!(
                SERVICE,
                "update_estimates",
                format!(
                    "{} of {} estimates matched no subtopic in the contest",
                    request.estimates.len() as u64 - updated,
                    request.estimates.len()
                )
            );
        }
        Ok(())
    }

    // Flashcard operations

    /// Stores generated flashcards for a subtopic. Each flashcard gets its
    /// unseen progress record here, not at first review.
    pub async fn add_flashcards(
        &self,
        user_id: &str,
        request: AddFlashcardsRequest,
    ) -> Result<Vec<Flashcard>, ApiError> {
        let start = Instant::now();
        let contest_id = self
            .db
            .find_subtopic_contest(user_id, request.subtopic_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("subtopic not found".to_string()))?;

        for flashcard in &request.flashcards {
            require_non_blank("question", &flashcard.question)?;
            require_non_blank("answer", &flashcard.answer)?;
        }

        let flashcards = self
            .db
            .add_flashcards(
                user_id,
                contest_id,
                request.subtopic_id,
                &request.flashcards,
                self.clock.now(),
            )
            .await?;

        log_service_success!(
            SERVICE,
            "add_flashcards",
            card_count = flashcards.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(flashcards)
    }

    // Review operations

    /// Validates the wire rating and applies one review to the caller's
    /// progress record for the flashcard.
    pub async fn submit_review(
        &self,
        user_id: &str,
        request: ReviewCardRequest,
    ) -> Result<ReviewProgress, ApiError> {
        let rating = request
            .rating
            .parse::<CardStatus>()
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;

        self.review_card(user_id, request.flashcard_id, rating).await
    }

    pub async fn review_card(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
        rating: CardStatus,
    ) -> Result<ReviewProgress, ApiError> {
        let start = Instant::now();
        log_service_start!(SERVICE, "review_card", flashcard_id = flashcard_id);

        let now = self.clock.now();
        let scheduler = self.scheduler;
        let updated = self
            .db
            .apply_review(user_id, flashcard_id, |current| {
                scheduler
                    .compute_next_review(current, rating, now)
                    .apply_to(current, rating, now)
            })
            .await
            .map_err(|e| {
                log_service_error!(SERVICE, "review_card", flashcard_id = flashcard_id, error = e);
                ApiError::DatabaseError(e)
            })?
            .ok_or_else(|| ApiError::NotFound("progress not found".to_string()))?;

        log_service_success!(
            SERVICE,
            "review_card",
            flashcard_id = flashcard_id,
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(updated)
    }

    /// Cards of a contest due by the end of today, oldest record first.
    pub async fn todays_cards(
        &self,
        user_id: &str,
        contest_id: Uuid,
        subtopic_id: Option<Uuid>,
    ) -> Result<Vec<DueCard>, ApiError> {
        self.get_contest(user_id, contest_id).await?;

        let as_of = self.scheduler.end_of_day(self.clock.now());
        Ok(self
            .db
            .get_due_cards(user_id, contest_id, as_of, subtopic_id)
            .await?)
    }

    pub async fn get_progress(
        &self,
        user_id: &str,
        flashcard_id: Uuid,
    ) -> Result<ReviewProgress, ApiError> {
        self.db
            .get_progress(user_id, flashcard_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("progress not found".to_string()))
    }
}

fn contest_not_found() -> ApiError {
    ApiError::NotFound("contest not found".to_string())
}

fn require_non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: i32) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::ValidationError(format!("{} must not be negative", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::scheduler::MIN_EASE_FACTOR;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const USER: &str = "user-1";

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    async fn create_test_service() -> (StudyService, FixedClock) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let clock = FixedClock::new(start_time());
        let service =
            StudyService::with_components(db, SM2Scheduler::new(), Arc::new(clock.clone()));
        (service, clock)
    }

    fn plan_request(contest_id: Uuid) -> CreateStudyPlanRequest {
        CreateStudyPlanRequest {
            contest_id,
            subjects: vec![PlanSubjectInput {
                name: "Portuguese".to_string(),
                order: 1,
                topics: vec![PlanTopicInput {
                    name: "Syntax".to_string(),
                    order: 1,
                    subtopics: vec![
                        PlanSubtopicInput {
                            name: "Subject and predicate".to_string(),
                            order: 1,
                            estimated_count: Some(12),
                        },
                        PlanSubtopicInput {
                            name: "Agreement".to_string(),
                            order: 2,
                            estimated_count: None,
                        },
                    ],
                }],
            }],
        }
    }

    fn flashcards(questions: &[&str]) -> Vec<NewFlashcard> {
        questions
            .iter()
            .enumerate()
            .map(|(i, question)| NewFlashcard {
                question: question.to_string(),
                answer: format!("answer {}", i),
                importance_rank: i as i32 + 1,
            })
            .collect()
    }

    /// Contest with a two-subtopic plan; returns (contest, subtopic ids).
    async fn seed_plan(service: &StudyService) -> (Contest, Vec<Uuid>) {
        let contest = service
            .create_contest(
                USER,
                CreateContestRequest {
                    name: "Court Analyst".to_string(),
                    role: "Analyst".to_string(),
                    contest_date: start_time() + Duration::days(120),
                    edital_text: Some("Edital 01/2024".to_string()),
                },
            )
            .await
            .unwrap();

        let plan = service.create_plan(USER, plan_request(contest.id)).await.unwrap();
        let subtopics = plan.subjects[0].topics[0]
            .subtopics
            .iter()
            .map(|s| s.id)
            .collect();
        (contest, subtopics)
    }

    #[tokio::test]
    async fn test_review_flow_follows_sm2() {
        let (service, clock) = create_test_service().await;
        let (_contest, subtopics) = seed_plan(&service).await;
        let cards = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["What is a subject?"]),
                },
            )
            .await
            .unwrap();
        let card_id = cards[0].id;

        let first = service.review_card(USER, card_id, CardStatus::Good).await.unwrap();
        assert_eq!(first.repetitions, 1);
        assert_eq!(first.interval, 1);
        assert!((first.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(first.status, CardStatus::Good);
        assert_eq!(first.last_reviewed_at, Some(start_time()));
        assert_eq!(
            first.next_review_date,
            Some(Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap())
        );

        clock.advance(Duration::days(1));
        let second = service.review_card(USER, card_id, CardStatus::Good).await.unwrap();
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval, 6);
        assert!((second.ease_factor - 2.7).abs() < 1e-9);

        clock.advance(Duration::days(6));
        let lapse = service.review_card(USER, card_id, CardStatus::Wrong).await.unwrap();
        assert_eq!(lapse.repetitions, 0);
        assert_eq!(lapse.interval, 1);
        assert!((lapse.ease_factor - 1.9).abs() < 1e-9);
        assert!(lapse.ease_factor >= MIN_EASE_FACTOR);

        let stored = service.get_progress(USER, card_id).await.unwrap();
        assert_eq!(stored, lapse);
    }

    #[tokio::test]
    async fn test_review_rejects_unknown_rating() {
        let (service, _clock) = create_test_service().await;
        let (_contest, subtopics) = seed_plan(&service).await;
        let cards = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["Q"]),
                },
            )
            .await
            .unwrap();

        let result = service
            .submit_review(
                USER,
                ReviewCardRequest {
                    flashcard_id: cards[0].id,
                    rating: "EASY".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::ValidationError(_))));

        let untouched = service.get_progress(USER, cards[0].id).await.unwrap();
        assert_eq!(untouched.status, CardStatus::NotSeen);
        assert!(untouched.last_reviewed_at.is_none());
    }

    #[tokio::test]
    async fn test_review_without_progress_is_not_found() {
        let (service, _clock) = create_test_service().await;

        let result = service.review_card(USER, Uuid::new_v4(), CardStatus::Good).await;
        match result {
            Err(ApiError::NotFound(message)) => assert_eq!(message, "progress not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_review_of_other_users_card_is_not_found() {
        let (service, _clock) = create_test_service().await;
        let (_contest, subtopics) = seed_plan(&service).await;
        let cards = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["Q"]),
                },
            )
            .await
            .unwrap();

        let result = service.review_card("user-2", cards[0].id, CardStatus::Good).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        let untouched = service.get_progress(USER, cards[0].id).await.unwrap();
        assert_eq!(untouched.repetitions, 0);
    }

    #[tokio::test]
    async fn test_todays_cards_due_selection() {
        let (service, clock) = create_test_service().await;
        let (contest, subtopics) = seed_plan(&service).await;
        let cards = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&[
                        "never reviewed",
                        "reviewed yesterday",
                        "reviewed twice",
                    ]),
                },
            )
            .await
            .unwrap();

        // Yesterday: two cards reviewed once, due today.
        clock.set(start_time() - Duration::days(1));
        service.review_card(USER, cards[1].id, CardStatus::Good).await.unwrap();
        service.review_card(USER, cards[2].id, CardStatus::Good).await.unwrap();

        // Today: the third card gets a 6 day interval and leaves the queue.
        clock.set(start_time());
        service.review_card(USER, cards[2].id, CardStatus::Good).await.unwrap();

        let due = service.todays_cards(USER, contest.id, None).await.unwrap();
        let due_ids: Vec<Uuid> = due.iter().map(|c| c.flashcard.id).collect();
        assert_eq!(due_ids, vec![cards[0].id, cards[1].id]);
        assert_eq!(due[0].flashcard.question, "never reviewed");
        assert!(due[0].progress.next_review_date.is_none());
    }

    #[tokio::test]
    async fn test_todays_cards_subtopic_filter_and_order() {
        let (service, _clock) = create_test_service().await;
        let (contest, subtopics) = seed_plan(&service).await;

        let first = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["a1", "a2"]),
                },
            )
            .await
            .unwrap();
        let second = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[1],
                    flashcards: flashcards(&["b1"]),
                },
            )
            .await
            .unwrap();

        let all = service.todays_cards(USER, contest.id, None).await.unwrap();
        let questions: Vec<&str> = all.iter().map(|c| c.flashcard.question.as_str()).collect();
        assert_eq!(questions, vec!["a1", "a2", "b1"]);

        let filtered = service
            .todays_cards(USER, contest.id, Some(subtopics[1]))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].flashcard.id, second[0].id);
        assert_ne!(filtered[0].flashcard.id, first[0].id);
    }

    #[tokio::test]
    async fn test_todays_cards_requires_owned_contest() {
        let (service, _clock) = create_test_service().await;
        let (contest, _subtopics) = seed_plan(&service).await;

        let result = service.todays_cards("user-2", contest.id, None).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_plan_is_returned_in_order() {
        let (service, _clock) = create_test_service().await;
        let contest = service
            .create_contest(
                USER,
                CreateContestRequest {
                    name: "Police".to_string(),
                    role: "Agent".to_string(),
                    contest_date: start_time(),
                    edital_text: None,
                },
            )
            .await
            .unwrap();

        let request = CreateStudyPlanRequest {
            contest_id: contest.id,
            subjects: vec![
                PlanSubjectInput {
                    name: "Second".to_string(),
                    order: 2,
                    topics: vec![],
                },
                PlanSubjectInput {
                    name: "First".to_string(),
                    order: 1,
                    topics: vec![
                        PlanTopicInput {
                            name: "B".to_string(),
                            order: 2,
                            subtopics: vec![],
                        },
                        PlanTopicInput {
                            name: "A".to_string(),
                            order: 1,
                            subtopics: vec![],
                        },
                    ],
                },
            ],
        };
        service.create_plan(USER, request).await.unwrap();

        let plan = service.get_plan(USER, contest.id).await.unwrap();
        let subjects: Vec<&str> = plan.subjects.iter().map(|s| s.subject.name.as_str()).collect();
        assert_eq!(subjects, vec!["First", "Second"]);
        let topics: Vec<&str> = plan.subjects[0]
            .topics
            .iter()
            .map(|t| t.topic.name.as_str())
            .collect();
        assert_eq!(topics, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_update_estimates_scoped_to_contest() {
        let (service, _clock) = create_test_service().await;
        let (contest, subtopics) = seed_plan(&service).await;
        let (other_contest, other_subtopics) = seed_plan(&service).await;

        service
            .update_estimates(
                USER,
                UpdateEstimatesRequest {
                    contest_id: contest.id,
                    estimates: vec![
                        SubtopicEstimate {
                            subtopic_id: subtopics[1],
                            estimated_count: 30,
                        },
                        SubtopicEstimate {
                            subtopic_id: other_subtopics[0],
                            estimated_count: 99,
                        },
                    ],
                },
            )
            .await
            .unwrap();

        let plan = service.get_plan(USER, contest.id).await.unwrap();
        assert_eq!(plan.subjects[0].topics[0].subtopics[1].estimated_count, 30);

        let other_plan = service.get_plan(USER, other_contest.id).await.unwrap();
        assert_eq!(other_plan.subjects[0].topics[0].subtopics[0].estimated_count, 12);

        let negative = service
            .update_estimates(
                USER,
                UpdateEstimatesRequest {
                    contest_id: contest.id,
                    estimates: vec![SubtopicEstimate {
                        subtopic_id: subtopics[0],
                        estimated_count: -1,
                    }],
                },
            )
            .await;
        assert!(matches!(negative, Err(ApiError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_delete_contest_cascades_progress() {
        let (service, _clock) = create_test_service().await;
        let (contest, subtopics) = seed_plan(&service).await;
        let cards = service
            .add_flashcards(
                USER,
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["Q1", "Q2"]),
                },
            )
            .await
            .unwrap();

        service.delete_contest(USER, contest.id).await.unwrap();

        assert!(matches!(
            service.get_progress(USER, cards[0].id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            service.get_contest(USER, contest.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_contest(USER, contest.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_flashcards_to_foreign_subtopic() {
        let (service, _clock) = create_test_service().await;
        let (_contest, subtopics) = seed_plan(&service).await;

        let result = service
            .add_flashcards(
                "user-2",
                AddFlashcardsRequest {
                    subtopic_id: subtopics[0],
                    flashcards: flashcards(&["Q"]),
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_contest_validation() {
        let (service, _clock) = create_test_service().await;

        let result = service
            .create_contest(
                USER,
                CreateContestRequest {
                    name: "   ".to_string(),
                    role: "Analyst".to_string(),
                    contest_date: start_time(),
                    edital_text: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::ValidationError(_))));
        assert!(service.list_contests(USER).await.unwrap().is_empty());
    }
}
