use serde_json::Value;

use super::params::Params;
use crate::error::{BridgeError, BridgeResult};

/// Reserved health-check payload, answered without touching the router.
pub const PING: &str = "ping";

/// A decoded request line: `{"type": domain, "params": {"action": .., ..}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub domain: String,
    pub action: String,
    pub params: Params,
}

pub fn is_ping(line: &str) -> bool {
    line.trim() == PING
}

pub fn decode(line: &str) -> BridgeResult<Command> {
    let value: Value = serde_json::from_str(line.trim())?;
    let Value::Object(mut envelope) = value else {
        return Err(BridgeError::malformed("Command must be a JSON object."));
    };
    let domain = match envelope.get("type") {
        Some(Value::String(domain)) if !domain.trim().is_empty() => domain.trim().to_string(),
        _ => return Err(BridgeError::missing("type")),
    };
    let params = match envelope.remove("params") {
        None | Some(Value::Null) => Params::default(),
        Some(Value::Object(map)) => Params::new(map),
        Some(_) => return Err(BridgeError::malformed("'params' must be an object.")),
    };
    let action = params
        .str("action")
        .filter(|a| !a.is_empty())
        .ok_or_else(|| BridgeError::missing("action"))?;
    Ok(Command {
        domain,
        action,
        params,
    })
}
