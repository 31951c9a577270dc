use std::{collections::VecDeque, env, path::PathBuf, sync::Arc, time::Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::ApiError;
use crate::mailer::{AlertTransport, SmtpSettings};
use crate::registry::EmergencyRegistry;
use crate::types::{AfterHoursConfig, ChatGuruConfig, DiagnosticLogEntry, LogLevel};

const LOG_CAPACITY: usize = 100;

pub struct Settings {
    pub port: u16,
    pub timezone: String,
    pub email_from: Option<String>,
    pub chatguru: ChatGuruConfig,
    pub smtp: Option<SmtpSettings>,
    pub emails_file: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(4000);
        let timezone = env::var("AFTER_HOURS_TIMEZONE")
            .unwrap_or_else(|_| "America/Sao_Paulo".to_string());
        let email_from = env::var("EMERGENCY_EMAIL_FROM")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let chatguru = ChatGuruConfig {
            api_url: env::var("CHATGURU_API_URL").unwrap_or_default(),
            account_id: env::var("CHATGURU_ACCOUNT_ID").unwrap_or_default(),
            instance_id: env::var("CHATGURU_INSTANCE_ID").unwrap_or_default(),
        };
        let emails_file = env::var("EMERGENCY_EMAILS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/emergency-emails.json"));

        Self {
            port,
            timezone,
            email_from,
            chatguru,
            smtp: SmtpSettings::from_env(),
            emails_file,
        }
    }
}

#[derive(Default)]
pub struct DiagnosticLog {
    entries: VecDeque<DiagnosticLogEntry>,
}

impl DiagnosticLog {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        self.entries.push_front(DiagnosticLogEntry {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            context,
        });
        self.entries.truncate(LOG_CAPACITY);
    }

    pub fn recent(&self, limit: usize) -> Vec<DiagnosticLogEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }
}

pub struct AppState {
    pub started_at: Instant,
    pub port: u16,
    pub after_hours: RwLock<AfterHoursConfig>,
    pub chatguru: RwLock<ChatGuruConfig>,
    pub email_from: RwLock<Option<String>>,
    pub smtp_user: Option<String>,
    pub mailer: Option<Arc<dyn AlertTransport>>,
    pub registry: Mutex<EmergencyRegistry>,
    pub diagnostics: Mutex<DiagnosticLog>,
}

impl AppState {
    pub fn new(settings: Settings, mailer: Option<Arc<dyn AlertTransport>>) -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            port: settings.port,
            after_hours: RwLock::new(AfterHoursConfig::with_timezone(settings.timezone)),
            chatguru: RwLock::new(settings.chatguru),
            email_from: RwLock::new(settings.email_from),
            smtp_user: settings.smtp.map(|smtp| smtp.user),
            mailer,
            registry: Mutex::new(EmergencyRegistry::open(settings.emails_file)),
            diagnostics: Mutex::new(DiagnosticLog::default()),
        })
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        let mut diagnostics = self.diagnostics.lock().await;
        diagnostics.push(level, message, context);
    }

    pub async fn status_snapshot(&self) -> Value {
        let after_hours = self.after_hours.read().await.clone();
        let chatguru = self.chatguru.read().await.clone();
        let recipients = self.registry.lock().await.active_emails();
        json!({
            "robotEnabled": after_hours.robot_enabled,
            "timezone": after_hours.timezone,
            "chatguru": chatguru,
            "emergencyRecipients": recipients,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    pub async fn full_config(&self) -> Result<Value, ApiError> {
        let after_hours = self.after_hours.read().await.clone();
        let chatguru = self.chatguru.read().await.clone();
        let mut config = serde_json::to_value(after_hours).map_err(|_| ApiError::Internal)?;
        if let Some(map) = config.as_object_mut() {
            map.insert(
                "chatguru".to_string(),
                serde_json::to_value(chatguru).map_err(|_| ApiError::Internal)?,
            );
        }
        Ok(config)
    }

    /// Best-effort partial merge: present, well-typed fields win; everything
    /// else keeps its previous value. Invalid maxAutoReplies is skipped, not
    /// rejected.
    pub async fn apply_config_update(&self, body: &Value) -> Result<Value, ApiError> {
        {
            let mut config = self.after_hours.write().await;
            if let Some(enabled) = body.get("robotEnabled").and_then(Value::as_bool) {
                config.robot_enabled = enabled;
            }
            if let Some(start) = body.get("atendimentoInicio").and_then(Value::as_str) {
                config.business_hours_start = start.to_string();
            }
            if let Some(end) = body.get("atendimentoFim").and_then(Value::as_str) {
                config.business_hours_end = end.to_string();
            }
            if let Some(max) = body.get("maxAutoReplies").and_then(Value::as_f64) {
                if max.is_finite() && max > 0.0 {
                    config.max_auto_replies = max.floor() as u32;
                }
            }
        }

        if let Some(chatguru) = body.get("chatguru") {
            self.apply_chatguru_update(chatguru).await;
        }

        let config = self.full_config().await?;
        self.log(
            LogLevel::Info,
            "configuração geral atualizada",
            Some(config.clone()),
        )
        .await;
        Ok(config)
    }

    pub async fn apply_chatguru_update(&self, body: &Value) -> ChatGuruConfig {
        let updated = {
            let mut config = self.chatguru.write().await;
            if let Some(url) = body.get("apiUrl").and_then(Value::as_str) {
                config.api_url = url.trim().to_string();
            }
            if let Some(account) = body.get("accountId").and_then(Value::as_str) {
                config.account_id = account.trim().to_string();
            }
            if let Some(instance) = body.get("instanceId").and_then(Value::as_str) {
                config.instance_id = instance.trim().to_string();
            }
            config.clone()
        };

        self.log(
            LogLevel::Info,
            "configuração ChatGuru atualizada",
            serde_json::to_value(&updated).ok(),
        )
        .await;
        updated
    }

    /// `from` absent leaves the value, explicit null clears it, a string is
    /// trimmed (blank normalizes to unset). Other types are ignored.
    pub async fn apply_email_sender_update(&self, body: &Value) -> Option<String> {
        let updated = {
            let mut from = self.email_from.write().await;
            match body.get("from") {
                None => {}
                Some(Value::Null) => *from = None,
                Some(Value::String(value)) => {
                    let trimmed = value.trim();
                    *from = if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    };
                }
                Some(_) => {}
            }
            from.clone()
        };

        self.log(
            LogLevel::Info,
            "remetente de email atualizado",
            Some(json!({ "from": updated })),
        )
        .await;
        updated
    }

    /// Sender address for outbound alerts: the configured override, falling
    /// back to the SMTP user.
    pub async fn effective_from(&self) -> Option<String> {
        let from = self.email_from.read().await.clone();
        from.or_else(|| self.smtp_user.clone())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
