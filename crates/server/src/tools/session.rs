//! session_get and session_set tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{Engine, Error};

use super::json_result;

/// Parameters for the session_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSetParams {
    /// New current session id.
    pub session: String,
}

/// Output from the session tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionOutput {
    pub session: String,
    /// Session that was current before a session_set call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

pub(crate) fn set_output(engine: &Engine, params: SessionSetParams) -> Result<SessionOutput, Error> {
    let previous = engine.get_session();
    engine.set_session(&params.session)?;
    Ok(SessionOutput { session: engine.get_session(), previous: Some(previous) })
}

/// Implementation of the session_get tool.
pub async fn get_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    json_result(&SessionOutput { session: engine.get_session(), previous: None })
}

/// Implementation of the session_set tool.
pub async fn set_impl(engine: &Engine, params: SessionSetParams) -> Result<CallToolResult, McpError> {
    let output = set_output(engine, params)?;
    json_result(&output)
}
