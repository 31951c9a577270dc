use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use crate::error::ApiError;
use crate::mailer::{AlertTransport, OutboundAlert, SmtpMailer};
use crate::state::{AppState, Settings};
use crate::types::{LogLevel, SimulationStep, WebhookSummary};

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    }
}

async fn root_info() -> &'static str {
    "Robô de plantão ChatGuru online"
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    state
        .log(LogLevel::Info, "webhook recebido", Some(payload.clone()))
        .await;

    let summary = WebhookSummary {
        nome: string_field(&payload, "nome"),
        texto_mensagem: string_field(&payload, "texto_mensagem"),
        tipo_mensagem: string_field(&payload, "tipo_mensagem"),
        celular: string_field(&payload, "celular"),
        chat_id: string_field(&payload, "chat_id"),
        timestamp: string_field(&payload, "datetime_post").unwrap_or_else(now_iso),
    };

    Json(json!({
        "status": "received",
        "mode": "SIMULATION_ONLY",
        "receivedSummary": summary,
    }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.status_snapshot().await)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.after_hours.read().await.clone();
    let chatguru = state.chatguru.read().await.clone();
    Json(json!({
        "status": "ok",
        "uptimeSeconds": state.uptime_seconds(),
        "robotEnabled": config.robot_enabled,
        "port": state.port,
        "instanceId": chatguru.instance_id,
        "timestamp": now_iso(),
    }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.full_config().await?))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.apply_config_update(&body).await?))
}

async fn list_emergency_emails(State(state): State<Arc<AppState>>) -> Json<Value> {
    let contacts = state.registry.lock().await.list();
    Json(json!({ "emails": contacts }))
}

async fn add_emergency_email(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let email = match body.get("email") {
        Some(Value::String(value)) => value.clone(),
        _ => return Err(ApiError::validation("email is required and must be a string")),
    };
    let name = body.get("name").and_then(Value::as_str);

    let (contact, contacts) = {
        let mut registry = state.registry.lock().await;
        let contact = registry.add(name, &email)?;
        (contact, registry.contacts().to_vec())
    };

    state
        .log(
            LogLevel::Info,
            format!("email de emergência adicionado: {}", contact.email),
            None,
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "email": contact, "emails": contacts })),
    ))
}

async fn delete_emergency_email(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let contacts = {
        let mut registry = state.registry.lock().await;
        registry.remove(&id)?;
        registry.contacts().to_vec()
    };

    state
        .log(
            LogLevel::Info,
            format!("email de emergência removido: {id}"),
            None,
        )
        .await;

    Ok(Json(json!({ "removed": id, "emails": contacts })))
}

/// Shared alert path for `/admin/emergency/alert` and `/config/email/test`.
/// An unconfigured transport is reported back with HTTP 200, never treated
/// as a server error; an actual delivery failure is a 500.
async fn dispatch_alert(
    state: &Arc<AppState>,
    subject: &str,
    message: &str,
) -> Result<Response, ApiError> {
    let subject = subject.trim();
    let message = message.trim();
    if subject.is_empty() || message.is_empty() {
        return Err(ApiError::validation("subject and message are required"));
    }

    let recipients = state.registry.lock().await.active_emails();
    if recipients.is_empty() {
        return Err(ApiError::validation(
            "no active emergency emails configured",
        ));
    }

    let Some(mailer) = state.mailer.clone() else {
        state
            .log(
                LogLevel::Warn,
                "alerta não enviado: transporte SMTP não configurado",
                Some(json!({ "subject": subject })),
            )
            .await;
        return Ok((
            StatusCode::OK,
            Json(json!({
                "success": false,
                "emailSent": false,
                "message": "SMTP transport not configured (SMTP_HOST/SMTP_PORT/SMTP_USER/SMTP_PASS)",
            })),
        )
            .into_response());
    };

    let from = state
        .effective_from()
        .await
        .unwrap_or_else(|| "no-reply@localhost".to_string());
    let alert = OutboundAlert {
        from,
        recipients: recipients.clone(),
        subject: subject.to_string(),
        message: message.to_string(),
    };

    match mailer.deliver(&alert).await {
        Ok(()) => {
            state
                .log(
                    LogLevel::Info,
                    format!("alerta de emergência enviado: {subject}"),
                    Some(json!({ "recipients": recipients })),
                )
                .await;
            Ok((
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "emailSent": true,
                    "recipients": recipients,
                })),
            )
                .into_response())
        }
        Err(err) => {
            tracing::error!(%err, "emergency alert delivery failed");
            state
                .log(
                    LogLevel::Error,
                    format!("falha no envio do alerta: {err}"),
                    Some(json!({ "subject": subject })),
                )
                .await;
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "emailSent": false,
                    "error": err.to_string(),
                })),
            )
                .into_response())
        }
    }
}

async fn send_emergency_alert(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let subject = body.get("subject").and_then(Value::as_str).unwrap_or("");
    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    dispatch_alert(&state, subject, message).await
}

async fn get_email_sender(State(state): State<Arc<AppState>>) -> Json<Value> {
    let from = state.email_from.read().await.clone();
    Json(json!({ "from": from }))
}

async fn update_email_sender(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let from = state.apply_email_sender_update(&body).await;
    Json(json!({ "from": from }))
}

async fn test_email_sender(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    dispatch_alert(
        &state,
        "Teste de alerta",
        "Mensagem de teste enviada pelo robô de plantão.",
    )
    .await
}

async fn get_chatguru(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.chatguru.read().await.clone();
    Json(json!(config))
}

async fn update_chatguru(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let config = state.apply_chatguru_update(&body).await;
    Json(json!(config))
}

async fn chatguru_diagnostics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.chatguru.read().await.clone();
    Json(json!({
        "configured": config.is_configured(),
        "apiUrl": config.api_url,
        "accountId": config.account_id,
        "instanceId": config.instance_id,
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<String>,
}

async fn get_logs(
    Query(query): Query<LogsQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    let limit = query
        .limit
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| v.floor() as usize)
        .unwrap_or(10);

    let logs = state.diagnostics.lock().await.recent(limit);
    Json(json!({ "logs": logs }))
}

async fn test_robot(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.after_hours.read().await.clone();
    let message = if config.robot_enabled {
        "robô de plantão habilitado"
    } else {
        "robô de plantão desabilitado"
    };

    state
        .log(LogLevel::Info, format!("teste do robô: {message}"), None)
        .await;

    Json(json!({
        "success": true,
        "robotEnabled": config.robot_enabled,
        "message": message,
        "config": config,
    }))
}

async fn test_chatguru(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.chatguru.read().await.clone();
    if config.is_configured() {
        Json(json!({
            "success": true,
            "message": "configuração ChatGuru completa",
            "apiUrl": config.api_url,
            "instanceId": config.instance_id,
        }))
    } else {
        Json(json!({
            "success": false,
            "message": "configuração ChatGuru incompleta: apiUrl e instanceId são obrigatórios",
        }))
    }
}

async fn run_simulation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if message.is_empty() {
        return Err(ApiError::validation("message is required"));
    }
    let is_new_client = body
        .get("isNewClient")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let at = body
        .get("simulateAt")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(now_iso);

    let config = state.after_hours.read().await.clone();
    let reply = format!(
        "Olá! No momento estamos fora do horário de atendimento ({} às {}). Sua mensagem foi registrada e retornaremos assim que possível.",
        config.business_hours_start, config.business_hours_end,
    );

    let transcript = vec![
        SimulationStep {
            sender: "cliente".to_string(),
            text: message.to_string(),
            at: at.clone(),
        },
        SimulationStep {
            sender: "robo".to_string(),
            text: reply,
            at,
        },
    ];

    state
        .log(LogLevel::Info, "simulação executada", None)
        .await;

    Ok(Json(json!({
        "mode": "SIMULATION_ONLY",
        "isNewClient": is_new_client,
        "transcript": transcript,
    })))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_info).post(receive_webhook))
        .route("/status", get(get_status))
        .route("/admin/after-hours/health", get(health))
        .route("/diagnostics/robot", get(health))
        .route(
            "/admin/config",
            get(get_config).post(update_config).put(update_config),
        )
        .route(
            "/admin/after-hours/config",
            get(get_config).post(update_config).put(update_config),
        )
        .route(
            "/config",
            get(get_config).post(update_config).put(update_config),
        )
        .route(
            "/admin/emergency/emails",
            get(list_emergency_emails).post(add_emergency_email),
        )
        .route("/admin/emergency/emails/{id}", delete(delete_emergency_email))
        .route("/admin/emergency/alert", post(send_emergency_alert))
        .route(
            "/config/email",
            get(get_email_sender).post(update_email_sender),
        )
        .route("/config/email/test", post(test_email_sender))
        .route("/config/chatguru", get(get_chatguru).post(update_chatguru))
        .route("/diagnostics/chatguru", get(chatguru_diagnostics))
        .route("/diagnostics/logs", get(get_logs))
        .route("/diagnostics/robot/test", post(test_robot))
        .route("/diagnostics/chatguru/test", post(test_chatguru))
        .route("/simulator/run", post(run_simulation))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let mailer: Option<Arc<dyn AlertTransport>> = match settings.smtp.as_ref() {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(err) => {
                tracing::warn!(%err, "failed to build SMTP transport, alerts disabled");
                None
            }
        },
        None => {
            tracing::info!("SMTP not configured, emergency alerts will be reported as unsent");
            None
        }
    };

    let port = settings.port;
    let state = AppState::new(settings, mailer);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind TCP listener");

    tracing::info!("after-hours robot server running at http://localhost:{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failure");
}
