// Well-known path segments and payload sentinels. Must match the bundled UI.

// /api/schedules/{id}/{action}
pub const ACTION_RUN: &str = "run";
pub const ACTION_STOP: &str = "stop";

// status channel
pub const WS_PATH: &str = "/api/ws";

/// Payload the UI treats as "no information"; never forwarded to viewers.
pub const EMPTY_OBJECT: &str = "{}";
