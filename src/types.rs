use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursConfig {
    pub robot_enabled: bool,
    #[serde(rename = "atendimentoInicio")]
    pub business_hours_start: String,
    #[serde(rename = "atendimentoFim")]
    pub business_hours_end: String,
    pub max_auto_replies: u32,
    pub timezone: String,
}

impl AfterHoursConfig {
    pub fn with_timezone(timezone: String) -> Self {
        Self {
            robot_enabled: true,
            business_hours_start: "09:00".to_string(),
            business_hours_end: "18:00".to_string(),
            max_auto_replies: 3,
            timezone,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGuruConfig {
    pub api_url: String,
    pub account_id: String,
    pub instance_id: String,
}

impl ChatGuruConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_url.trim().is_empty() && !self.instance_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticLogEntry {
    pub id: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Normalized subset of a ChatGuru webhook payload, echoed back in the
/// simulation-only acknowledgement. Field names match the platform's wire
/// format.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookSummary {
    pub nome: Option<String>,
    pub texto_mensagem: Option<String>,
    pub tipo_mensagem: Option<String>,
    pub celular: Option<String>,
    pub chat_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStep {
    pub sender: String,
    pub text: String,
    pub at: String,
}
