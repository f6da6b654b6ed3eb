use crate::intent::Intent;
use crate::model::{ChatRequest, ChatResponse, UserId};
use crate::router::ChatPipeline;
use crate::window::Period;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub model: String,
}

pub fn create_router(pipeline: Arc<ChatPipeline>, model: impl Into<String>) -> Router {
    let state = AppState {
        pipeline,
        model: model.into(),
    };

    Router::new()
        .route("/api/chat/query", post(chat_query))
        .route("/api/chat/examples", get(chat_examples))
        .route("/api/chat/capabilities", get(chat_capabilities))
        .route("/api/chat/health", get(chat_health))
        .with_state(state)
}

async fn chat_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let user_id = user_id_from_headers(&headers)?;
    if request.query.trim().is_empty() {
        return Err(AppError::bad_request("Query must not be empty"));
    }

    // A panic inside one request must not take the connection task down with it.
    let pipeline = state.pipeline.clone();
    let response = tokio::spawn(async move {
        pipeline
            .process(&request.query, user_id, request.chat_id)
            .await
    })
    .await?;

    Ok(Json(response))
}

fn user_id_from_headers(headers: &HeaderMap) -> Result<UserId, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing user id"))?;

    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse::<UserId>().ok())
        .ok_or_else(|| {
            warn!("Rejected malformed {} header", USER_ID_HEADER);
            AppError::unauthorized("Invalid user id")
        })
}

async fn chat_examples() -> Json<Value> {
    Json(json!({
        "message": "Here are some example questions you can ask:",
        "examples": {
            "energy_usage": [
                "How much energy did my fridge use yesterday?",
                "What's the power consumption of my AC today?",
                "Show me the energy usage for my TV",
                "How much power is my washing machine using?"
            ],
            "comparisons": [
                "Which of my devices are using the most power?",
                "Compare energy usage between my devices",
                "What are my top 3 energy consuming devices?",
                "Show me the most efficient devices"
            ],
            "summaries": [
                "Show me my energy summary for today",
                "What's my total energy usage this week?",
                "Give me an energy report for yesterday",
                "How much energy did I use last month?"
            ],
            "devices": [
                "List my devices",
                "Show me all my registered devices",
                "What devices do I have?",
                "Which devices are active?"
            ],
            "general": [
                "Hello",
                "What can you help me with?",
                "How can I save energy?",
                "Thank you"
            ]
        }
    }))
}

async fn chat_capabilities() -> Json<Value> {
    let intents: Vec<Value> = Intent::ALL
        .iter()
        .filter_map(|intent| {
            let (name, description, examples) = describe(*intent)?;
            Some(json!({
                "intent": intent.as_str(),
                "name": name,
                "description": description,
                "examples": examples,
            }))
        })
        .collect();

    let periods: Vec<&str> = [
        Period::Today,
        Period::Yesterday,
        Period::LastWeek,
        Period::LastMonth,
    ]
    .iter()
    .map(Period::as_str)
    .collect();

    Json(json!({
        "intents": intents,
        "time_periods": periods,
        "features": [
            "Natural language processing",
            "Intent classification",
            "Parameter extraction",
            "Structured data responses",
            "Real-time energy data access"
        ]
    }))
}

fn describe(intent: Intent) -> Option<(&'static str, &'static str, [&'static str; 2])> {
    let described = match intent {
        Intent::EnergyUsage => (
            "Energy Usage",
            "Get energy consumption data for specific devices",
            ["How much energy did my fridge use?", "What's my AC power usage?"],
        ),
        Intent::DeviceComparison => (
            "Device Comparison",
            "Compare energy usage between devices",
            ["Which devices use the most power?", "Compare my devices"],
        ),
        Intent::TopConsumers => (
            "Top Consumers",
            "Find highest energy consuming devices",
            [
                "What are my top energy consumers?",
                "Show me the most power-hungry devices",
            ],
        ),
        Intent::EnergySummary => (
            "Energy Summary",
            "Get overall energy usage summaries",
            ["Show me my energy summary", "What's my total usage today?"],
        ),
        Intent::DeviceList => (
            "Device Management",
            "List your registered devices",
            ["List my devices", "Show me my registered devices"],
        ),
        _ => return None,
    };
    Some(described)
}

async fn chat_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "conversational_ai",
        "model": state.model,
        "capabilities": "energy_monitoring_queries"
    }))
}

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: anyhow::anyhow!(message.to_string()),
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("API error: {}", self.error);
            return (
                self.status,
                Json(json!({ "detail": "Internal server error" })),
            )
                .into_response();
        }

        (self.status, Json(json!({ "detail": self.error.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}
