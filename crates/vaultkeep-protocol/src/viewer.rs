use serde::{Deserialize, Serialize};

use crate::actions::EMPTY_OBJECT;

/// One entry of the array pushed to viewers.
/// Wire: `{ "id": "s2", "out": "", "err": "disk full" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsMsg {
    pub id: String,
    #[serde(default)]
    pub out: String,
    #[serde(default)]
    pub err: String,
}

impl WsMsg {
    pub fn output(id: impl Into<String>, out: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            out: out.into(),
            err: String::new(),
        }
    }

    pub fn error(id: impl Into<String>, err: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            out: String::new(),
            err: err.into(),
        }
    }
}

/// True for payloads that carry no information: empty, whitespace, or `{}`.
pub fn is_blank(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.is_empty() || trimmed == EMPTY_OBJECT
}
