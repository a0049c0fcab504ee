use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    errors::{ApiError, ErrorContext},
    models::*,
    study_service::StudyService,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

/// Header carrying the caller's identity, set by the authenticating proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Clone)]
pub struct AppState {
    pub study_service: StudyService,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Authenticated caller. Requests without a non-blank user header are
/// rejected before reaching a handler.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiResponse<()>>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(AuthUser(user_id.to_string())),
            None => {
                let error = ApiError::Unauthorized("missing user identity".to_string());
                Err(error.to_response_with_context(ErrorContext::new("authenticate", "user")))
            }
        }
    }
}

// Contest endpoints
pub async fn create_contest(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateContestRequest>,
) -> ApiResult<Contest> {
    log_api_start!("create_contest", user_id = user_id);

    match state.study_service.create_contest(&user_id, request).await {
        Ok(contest) => {
            log_api_success!("create_contest", contest_id = contest.id, "contest created");
            Ok(Json(ApiResponse::success(contest)))
        }
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("create_contest", "contest"))),
    }
}

pub async fn list_contests(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<Contest>> {
    log_api_start!("list_contests", user_id = user_id);

    match state.study_service.list_contests(&user_id).await {
        Ok(contests) => {
            log_api_success!("list_contests", count = contests.len(), "contests retrieved");
            Ok(Json(ApiResponse::success(contests)))
        }
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("list_contests", "contest"))),
    }
}

pub async fn get_contest(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Contest> {
    match state.study_service.get_contest(&user_id, id).await {
        Ok(contest) => Ok(Json(ApiResponse::success(contest))),
        Err(e) => {
            let context = ErrorContext::new("get_contest", "contest").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn delete_contest(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    log_api_start!("delete_contest", user_id = user_id, contest_id = id);

    match state.study_service.delete_contest(&user_id, id).await {
        Ok(()) => {
            log_api_success!("delete_contest", contest_id = id, "contest deleted");
            Ok(Json(ApiResponse::success(())))
        }
        Err(e) => {
            let context = ErrorContext::new("delete_contest", "contest").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

// Study plan endpoints
pub async fn create_plan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateStudyPlanRequest>,
) -> ApiResult<StudyPlan> {
    let contest_id = request.contest_id;
    log_api_start!("create_plan", user_id = user_id, contest_id = contest_id);

    match state.study_service.create_plan(&user_id, request).await {
        Ok(plan) => {
            log_api_success!("create_plan", contest_id = contest_id, "study plan created");
            Ok(Json(ApiResponse::success(plan)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("create_plan", "contest").with_id(&contest_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_plan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(contest_id): Path<Uuid>,
) -> ApiResult<StudyPlan> {
    match state.study_service.get_plan(&user_id, contest_id).await {
        Ok(plan) => Ok(Json(ApiResponse::success(plan))),
        Err(e) => {
            let context = ErrorContext::new("get_plan", "contest").with_id(&contest_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn update_estimates(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<UpdateEstimatesRequest>,
) -> ApiResult<()> {
    let contest_id = request.contest_id;

    match state.study_service.update_estimates(&user_id, request).await {
        Ok(()) => Ok(Json(ApiResponse::success(()))),
        Err(e) => {
            let context =
                ErrorContext::new("update_estimates", "contest").with_id(&contest_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

// Flashcard endpoints
pub async fn add_flashcards(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<AddFlashcardsRequest>,
) -> ApiResult<Vec<Flashcard>> {
    let subtopic_id = request.subtopic_id;
    log_api_start!("add_flashcards", user_id = user_id);

    match state.study_service.add_flashcards(&user_id, request).await {
        Ok(flashcards) => {
            log_api_success!("add_flashcards", count = flashcards.len(), "flashcards stored");
            Ok(Json(ApiResponse::success(flashcards)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("add_flashcards", "subtopic").with_id(&subtopic_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

// Review endpoints
pub async fn review_card(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ReviewCardRequest>,
) -> ApiResult<()> {
    let flashcard_id = request.flashcard_id;
    log_api_start!("review_card", user_id = user_id, flashcard_id = flashcard_id);

    match state.study_service.submit_review(&user_id, request).await {
        Ok(progress) => {
            log_api_success!(
                "review_card",
                flashcard_id = flashcard_id,
                format!("next review in {} day(s)", progress.interval)
            );
            Ok(Json(ApiResponse::success(())))
        }
        Err(e) => {
            if matches!(e, ApiError::NotFound(_)) {
                log_api_warn!("review_card", flashcard_id = flashcard_id, "progress not found");
            }
            let context =
                ErrorContext::new("review_card", "progress").with_id(&flashcard_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_todays_cards(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(contest_id): Path<Uuid>,
    Query(query): Query<TodaysCardsQuery>,
) -> ApiResult<TodaysCardsResponse> {
    log_api_start!("todays_cards", user_id = user_id, contest_id = contest_id);

    match state
        .study_service
        .todays_cards(&user_id, contest_id, query.subtopic_id)
        .await
    {
        Ok(cards) => {
            log_api_success!("todays_cards", count = cards.len(), "due cards retrieved");
            Ok(Json(ApiResponse::success(TodaysCardsResponse { cards })))
        }
        Err(e) => {
            if matches!(e, ApiError::NotFound(_)) {
                log_api_warn!("todays_cards", contest_id = contest_id, "contest not found");
            }
            let context =
                ErrorContext::new("todays_cards", "contest").with_id(&contest_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_progress(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(flashcard_id): Path<Uuid>,
) -> ApiResult<ReviewProgress> {
    match state.study_service.get_progress(&user_id, flashcard_id).await {
        Ok(progress) => Ok(Json(ApiResponse::success(progress))),
        Err(e) => {
            let context =
                ErrorContext::new("get_progress", "progress").with_id(&flashcard_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))

        // Contest routes
        .route("/api/contests", post(create_contest).get(list_contests))
        .route("/api/contests/:id", get(get_contest).delete(delete_contest))

        // Study plan routes
        .route("/api/study/plans", post(create_plan))
        .route("/api/study/plans/:contest_id", get(get_plan))
        .route("/api/study/estimates", put(update_estimates))
        .route("/api/study/flashcards", post(add_flashcards))

        // Review routes
        .route("/api/study/review", post(review_card))
        .route("/api/study/todays-cards/:contest_id", get(get_todays_cards))
        .route("/api/study/progress/:flashcard_id", get(get_progress))

        .with_state(state)
}
