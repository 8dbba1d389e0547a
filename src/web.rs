//! JSON-over-HTTP shell around one shared [`Engine`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

use crate::{
    DEFAULT_STORE_FILE, DecisionError, Engine, ErrorKind, GUIDE, JsonFileStore, SelectRequest,
    SolutionUpdate, Store, Strategy, StrategyKind, Ticket,
};

/// Every request runs its load, mutation and save under this one lock.
pub struct AppState<S: Store> {
    engine: Mutex<Engine<S>>,
}

type SharedState<S> = Arc<AppState<S>>;

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub store_path: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let engine = Engine::open(JsonFileStore::new(&config.store_path));
    if let Some(warning) = engine.load_status().warning() {
        warn!("{warning}");
    }
    let router = build_router(engine);
    info!(
        %config.addr,
        store = %config.store_path.display(),
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<DecisionError> for ApiError {
    fn from(err: DecisionError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Duplicate | ErrorKind::StaleSuggestion => StatusCode::CONFLICT,
            ErrorKind::EmptySet => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router<S>(engine: Engine<S>) -> Router
where
    S: Store + Send + 'static,
{
    let state = Arc::new(AppState {
        engine: Mutex::new(engine),
    });
    Router::new()
        .route("/healthz", get(health))
        .route("/api/guide", get(guide))
        .route("/api/problems", get(list_problems::<S>).post(add_problem::<S>))
        .route("/api/problems/:problem", delete(delete_problem::<S>))
        .route(
            "/api/problems/:problem/solutions",
            get(list_solutions::<S>).post(add_solution::<S>),
        )
        .route(
            "/api/problems/:problem/solutions/:solution",
            patch(update_solution::<S>).delete(delete_solution::<S>),
        )
        .route("/api/problems/:problem/stats", get(stats::<S>))
        .route("/api/problems/:problem/choose", post(choose::<S>))
        .route("/api/suggestions/:ticket/accept", post(accept::<S>))
        .route("/api/suggestions/:ticket/reject", post(reject::<S>))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn guide() -> Json<Value> {
    let strategies: Vec<_> = StrategyKind::ALL
        .iter()
        .map(|kind| json!({ "strategy": kind, "label": kind.label() }))
        .collect();
    Json(json!({ "guide": GUIDE, "strategies": strategies }))
}

async fn list_problems<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
) -> Json<Value> {
    let engine = state.engine.lock();
    let problems: Vec<_> = engine
        .decisions()
        .iter()
        .map(|(name, solutions)| json!({ "problem": name, "solutions": solutions.len() }))
        .collect();
    Json(Value::Array(problems))
}

#[derive(Debug, Deserialize)]
struct NewProblem {
    name: String,
}

async fn add_problem<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Json(body): Json<NewProblem>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.lock().add_problem(&body.name)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "problem": body.name.trim() })),
    ))
}

async fn delete_problem<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(problem): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.lock().delete_problem(&problem)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_solutions<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(problem): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let engine = state.engine.lock();
    let solutions = engine.solutions(&problem)?;
    Ok(Json(json!({ "problem": problem, "solutions": solutions })))
}

#[derive(Debug, Default, Deserialize)]
struct SolutionBody {
    #[serde(default)]
    text: String,
    /// Number or text; anything but a positive integer leaves it unranked.
    #[serde(default)]
    ranking: Option<Value>,
    #[serde(default)]
    moods: Option<Vec<String>>,
}

impl SolutionBody {
    fn update(self) -> SolutionUpdate {
        SolutionUpdate {
            ranking: self.ranking.map(|value| match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                _ => String::new(),
            }),
            moods: self.moods,
        }
    }
}

async fn add_solution<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(problem): Path<String>,
    Json(body): Json<SolutionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let text = body.text.clone();
    let mut engine = state.engine.lock();
    let solution = engine.add_solution_with(&problem, &text, body.update())?;
    Ok((StatusCode::CREATED, Json(json!(solution))))
}

async fn update_solution<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path((problem, solution)): Path<(String, String)>,
    Json(body): Json<SolutionBody>,
) -> Result<Json<Value>, ApiError> {
    let mut engine = state.engine.lock();
    let updated = engine.update_solution(&problem, &solution, body.update())?;
    Ok(Json(json!(updated)))
}

async fn delete_solution<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path((problem, solution)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.engine.lock().delete_solution(&problem, &solution)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(problem): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.engine.lock().stats(&problem)?;
    Ok(Json(json!(stats)))
}

#[derive(Debug, Default, Deserialize)]
struct ChooseBody {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    avoid_repeats: bool,
}

async fn choose<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(problem): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // No body means a plain random choice; a body that does not parse is an error.
    let body: ChooseBody = if body.iter().all(u8::is_ascii_whitespace) {
        ChooseBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid choose request: {err}")))?
    };
    let kind = match body.strategy.as_deref() {
        Some(raw) => raw
            .parse::<StrategyKind>()
            .map_err(|err| ApiError::bad_request(err.to_string()))?,
        None => StrategyKind::Random,
    };
    let strategy = Strategy::from_kind(kind, body.mood.as_deref())?;
    let request = SelectRequest::new(strategy).avoid_repeats(body.avoid_repeats);
    let outcome = state.engine.lock().select(&problem, &request)?;
    Ok(Json(json!(outcome)))
}

async fn accept<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(ticket): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    let mut engine = state.engine.lock();
    let solution = engine.accept(Ticket::from(ticket))?;
    Ok(Json(json!({ "accepted": solution })))
}

async fn reject<S: Store + Send + 'static>(
    State(state): State<SharedState<S>>,
    Path(ticket): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.engine.lock().reject(Ticket::from(ticket))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router() -> Router {
        build_router(Engine::with_seed(MemoryStore::new(), 3))
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, payload)
    }

    async fn seeded_lunch(router: &Router) {
        let (status, _) =
            send(router, "POST", "/api/problems", Some(json!({"name": "lunch"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let rows = [
            ("pizza", json!(1), 1),
            ("salad", json!("2"), 2),
            ("soup", json!(1), 1),
        ];
        for (text, ranking, rank) in rows {
            let (status, payload) = send(
                router,
                "POST",
                "/api/problems/lunch/solutions",
                Some(json!({"text": text, "ranking": ranking})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(payload["solutions"], text);
            assert_eq!(payload["ranking"], rank);
        }
    }

    #[tokio::test]
    async fn healthz_ok() {
        let (status, payload) = send(&test_router(), "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ok");
    }

    #[tokio::test]
    async fn guide_lists_every_strategy() {
        let (status, payload) = send(&test_router(), "GET", "/api/guide", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["strategies"].as_array().unwrap().len(), 6);
        assert!(payload["guide"].as_str().unwrap().contains("Avoid Repeats"));
    }

    #[tokio::test]
    async fn duplicate_problem_conflicts() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, payload) =
            send(&router, "POST", "/api/problems", Some(json!({"name": "lunch"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(payload["error"].as_str().unwrap().contains("lunch"));

        let (_, problems) = send(&router, "GET", "/api/problems", None).await;
        assert_eq!(problems, json!([{"problem": "lunch", "solutions": 3}]));
    }

    #[tokio::test]
    async fn choose_accept_and_stats() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, outcome) = send(
            &router,
            "POST",
            "/api/problems/lunch/choose",
            Some(json!({"strategy": "ranking"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "suggested");
        assert_eq!(outcome["decided_by"], "ranking");
        let chosen = outcome["solution"].as_str().unwrap().to_string();
        assert_ne!(chosen, "salad");

        let ticket = outcome["ticket"].as_u64().unwrap();
        let (status, accepted) = send(
            &router,
            "POST",
            &format!("/api/suggestions/{ticket}/accept"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["accepted"]["history"], 1);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/suggestions/{ticket}/accept"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, stats) = send(&router, "GET", "/api/problems/lunch/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["most_chosen"]["solutions"], json!([chosen]));
        assert_eq!(stats["most_chosen"]["times"], 1);
    }

    #[tokio::test]
    async fn choose_without_body_is_random() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, outcome) = send(&router, "POST", "/api/problems/lunch/choose", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["requested"], "random");
        assert_eq!(outcome["reason"], "Chosen at random.");
    }

    #[tokio::test]
    async fn selection_errors_map_to_statuses() {
        let router = test_router();
        send(&router, "POST", "/api/problems", Some(json!({"name": "dinner"}))).await;

        let (status, _) = send(&router, "POST", "/api/problems/dinner/choose", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&router, "POST", "/api/problems/brunch/choose", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, payload) = send(
            &router,
            "POST",
            "/api/problems/dinner/choose",
            Some(json!({"strategy": "coin flip"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload["error"].as_str().unwrap().contains("coin flip"));

        let (status, _) = send(
            &router,
            "POST",
            "/api/problems/dinner/choose",
            Some(json!({"strategy": "mood"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_choose_body_is_rejected() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, payload) = send(
            &router,
            "POST",
            "/api/problems/lunch/choose",
            Some(json!({"strategy": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload["error"].as_str().unwrap().contains("invalid choose request"));

        let request = Request::post("/api/problems/lunch/choose")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mood_miss_is_an_outcome_not_an_error() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, _) = send(
            &router,
            "PATCH",
            "/api/problems/lunch/solutions/soup",
            Some(json!({"moods": ["Cozy"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, outcome) = send(
            &router,
            "POST",
            "/api/problems/lunch/choose",
            Some(json!({"strategy": "mood", "mood": "COZY"})),
        )
        .await;
        assert_eq!(outcome["solution"], "soup");

        let (status, outcome) = send(
            &router,
            "POST",
            "/api/problems/lunch/choose",
            Some(json!({"strategy": "mood", "mood": "grumpy"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "no_mood_match");
        assert_eq!(outcome["mood"], "grumpy");
    }

    #[tokio::test]
    async fn deletes_cascade() {
        let router = test_router();
        seeded_lunch(&router).await;
        let (status, _) =
            send(&router, "DELETE", "/api/problems/lunch/solutions/salad", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, listed) = send(&router, "GET", "/api/problems/lunch/solutions", None).await;
        assert_eq!(listed["solutions"].as_array().unwrap().len(), 2);

        let (status, _) = send(&router, "DELETE", "/api/problems/lunch", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, "GET", "/api/problems/lunch/solutions", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
