use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::AppState;
use crate::alarm::outcome::{TIMEOUT_EVENT, TIMEOUT_MESSAGE};
use crate::alarm::{ArmMode, CommandRequest, Outcome, SystemState};

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: ArmMode,
    #[serde(default)]
    pub code: String,
}

/// What the keypad receives for a settled command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SystemState>,
}

impl From<&Outcome> for CommandResponse {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { event, state } => Self {
                success: true,
                message: None,
                event: Some(event.clone()),
                state: Some(*state),
            },
            Outcome::DomainError { kind, message } => Self {
                success: false,
                message: Some(message.clone()),
                event: kind.event().map(str::to_string),
                state: None,
            },
            Outcome::Timeout => Self {
                success: false,
                message: Some(TIMEOUT_MESSAGE.to_string()),
                event: Some(TIMEOUT_EVENT.to_string()),
                state: None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorQuery {
    #[serde(default)]
    pub open_only: bool,
}

pub async fn command(
    State(state): State<AppState>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!("Rejected command body: {}", rejection.body_text());
            let response = json!({
                "success": false,
                "message": format!("Invalid command request: {}", rejection.body_text()),
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(response)).into_response();
        }
    };

    let outcome = state
        .correlator
        .issue_command(CommandRequest::new(body.command, body.code))
        .await;
    Json(CommandResponse::from(&outcome)).into_response()
}

pub async fn current_state(State(state): State<AppState>) -> impl IntoResponse {
    match state.broadcaster.current_state() {
        Some(snapshot) => Json(json!({
            "state": snapshot.state,
            "timestamp": snapshot.timestamp,
        })),
        None => Json(json!({ "state": null })),
    }
}

pub async fn sensors(
    State(state): State<AppState>,
    Query(query): Query<SensorQuery>,
) -> impl IntoResponse {
    let sensors = state.sensors.list(query.open_only).await;
    if sensors.len() < state.sensors.configured().len() && !query.open_only {
        warn!(
            "Listing {} of {} configured sensors",
            sensors.len(),
            state.sensors.configured().len()
        );
    }
    Json(sensors)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let connection = state.bus_status.borrow().connection_state;
    Json(json!({ "status": "ok", "mqtt": connection }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{ControllerEvent, ErrorKind};
    use crate::api::{build_router, AppState};
    use crate::broadcast::{BroadcastSettings, BroadcasterHandle};
    use crate::config::HomeAssistantConfig;
    use crate::correlator::{CommandCorrelator, CorrelatorSettings, DEFAULT_TIMEOUT};
    use crate::mqtt::memory_bus::InMemoryBus;
    use crate::mqtt::{BusGateway, BusStatus, ConnectionState, Topics};
    use crate::sensors::SensorProxy;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct Harness {
        bus: Arc<InMemoryBus>,
        broadcaster: BroadcasterHandle,
        router: Router,
        _status: watch::Sender<BusStatus>,
        _shutdown: CancellationToken,
    }

    fn harness() -> Harness {
        let bus = Arc::new(InMemoryBus::new());
        let shutdown = CancellationToken::new();
        let (broadcaster, _task) = BroadcasterHandle::spawn(
            bus.subscribe("home/alarm"),
            BroadcastSettings::default(),
            shutdown.clone(),
        );
        let correlator = CommandCorrelator::new(
            bus.clone(),
            broadcaster.clone(),
            CorrelatorSettings {
                topics: Topics {
                    command: "home/alarm/set".to_string(),
                    event: "home/alarm/event".to_string(),
                    state: "home/alarm".to_string(),
                },
                default_timeout: DEFAULT_TIMEOUT,
            },
        );
        let (status_tx, status_rx) = watch::channel(BusStatus {
            connection_state: ConnectionState::Connected,
            ..BusStatus::default()
        });
        let state = AppState {
            correlator: Arc::new(correlator),
            broadcaster: broadcaster.clone(),
            sensors: Arc::new(SensorProxy::new(&HomeAssistantConfig::default()).unwrap()),
            bus_status: status_rx,
        };
        Harness {
            bus,
            broadcaster,
            router: build_router(state),
            _status: status_tx,
            _shutdown: shutdown,
        }
    }

    fn post_command(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/command")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn response_shapes() {
        let success = serde_json::to_value(CommandResponse::from(&Outcome::success(
            "ARM_AWAY",
            SystemState::ArmedAway,
        )))
        .unwrap();
        assert_eq!(
            success,
            json!({"success": true, "event": "ARM_AWAY", "state": "armed_away"})
        );

        let rejected = serde_json::to_value(CommandResponse::from(&Outcome::error(
            ErrorKind::Rejected(ControllerEvent::FailedToArm),
            "Failed to arm: one or more sensors are open",
        )))
        .unwrap();
        assert_eq!(
            rejected,
            json!({
                "success": false,
                "message": "Failed to arm: one or more sensors are open",
                "event": "FAILED_TO_ARM"
            })
        );

        let timeout = serde_json::to_value(CommandResponse::from(&Outcome::Timeout)).unwrap();
        assert_eq!(timeout["event"], "TIMEOUT");

        let transport = serde_json::to_value(CommandResponse::from(&Outcome::error(
            ErrorKind::PublishFailed,
            "Failed to publish command",
        )))
        .unwrap();
        assert_eq!(
            transport,
            json!({"success": false, "message": "Failed to publish command"})
        );
    }

    #[tokio::test]
    async fn command_without_code_is_answered_immediately() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_command(r#"{"command": "arm_away", "code": ""}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["event"], "NO_CODE_PROVIDED");
        assert_eq!(h.bus.published_to("home/alarm/set"), 0);
    }

    #[tokio::test]
    async fn command_waits_for_the_panel() {
        let h = harness();
        let router = h.router.clone();
        let request = tokio::spawn(async move {
            router
                .oneshot(post_command(r#"{"command": "arm_away", "code": "1234"}"#))
                .await
                .unwrap()
        });

        h.bus.wait_for_publishes(1).await;
        h.bus.inject("home/alarm/event", r#"{"event":"ARM_AWAY"}"#);

        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"success": true, "event": "ARM_AWAY", "state": "armed_away"})
        );
    }

    #[tokio::test]
    async fn unknown_command_is_unprocessable() {
        let h = harness();
        for body in [r#"{"command": "self_destruct", "code": "1"}"#, "not json"] {
            let response = h.router.clone().oneshot(post_command(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(json_body(response).await["success"], false);
        }
    }

    #[tokio::test]
    async fn state_is_null_until_the_panel_reports() {
        let h = harness();
        let response = h.router.clone().oneshot(get("/api/state")).await.unwrap();
        assert_eq!(json_body(response).await, json!({"state": null}));

        let mut cache = h.broadcaster.subscribe();
        h.bus.inject("home/alarm", "armed_night");
        cache.wait_for(|snapshot| snapshot.is_some()).await.unwrap();

        let response = h.router.clone().oneshot(get("/api/state")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["state"], "armed_night");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_reports_broker_state() {
        let h = harness();
        let response = h.router.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"status": "ok", "mqtt": "connected"})
        );
    }

    #[tokio::test]
    async fn no_configured_sensors_lists_nothing() {
        let h = harness();
        let response = h
            .router
            .oneshot(get("/api/sensors?open_only=true"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));
    }
}
