use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::error::{HarrierError, Result};
use crate::tool::Tool;
use crate::types::ToolResponse;

/// Outbound email stub. Delivery is logged rather than sent, which keeps
/// demos and tests free of SMTP credentials.
#[derive(Debug, Default)]
pub struct EmailTool;

impl EmailTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for EmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send emails with specified subject and content"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Recipient email address"
                },
                "subject": {
                    "type": "string",
                    "description": "Email subject line"
                },
                "content": {
                    "type": "string",
                    "description": "Email body"
                }
            },
            "required": ["to", "subject", "content"]
        }))
    }

    fn validate_params(&self, params: &Map<String, Value>) -> bool {
        for field in ["to", "subject", "content"] {
            if !params.contains_key(field) {
                error!("missing required email field: {field}");
                return false;
            }
        }

        let Some(to) = params.get("to").and_then(Value::as_str) else {
            error!("email recipient must be a string");
            return false;
        };
        if !to.contains('@') || !to.contains('.') {
            error!("invalid email address format: {to}");
            return false;
        }
        true
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse> {
        let to = required_str(&params, "to")?;
        let subject = required_str(&params, "subject")?;
        let _content = required_str(&params, "content")?;

        info!("sending email to {to} with subject `{subject}`");
        Ok(ToolResponse::ok(json!(format!("Email sent to {to}"))))
    }
}

fn required_str<'a>(params: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HarrierError::Protocol(format!("missing '{field}' parameter")))
}
