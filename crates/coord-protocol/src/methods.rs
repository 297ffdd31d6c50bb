//! Method and notification name constants.
//!
//! Each constant is the exact string sent over the wire as the `method` field.

/// All request method names, grouped by namespace.
pub struct Methods;

impl Methods {
    // ── Node ────────────────────────────────────────────────────────────
    pub const NODE_CREATE: &str = "node/create";
    pub const NODE_GET_DATA: &str = "node/getData";
    pub const NODE_SET_DATA: &str = "node/setData";
    pub const NODE_DELETE: &str = "node/delete";
    pub const NODE_EXISTS: &str = "node/exists";
    pub const NODE_CHILDREN: &str = "node/children";

    // ── Server ──────────────────────────────────────────────────────────
    pub const SERVER_PING: &str = "server/ping";
}

/// Server-to-client notification names.
pub struct Notifications;

impl Notifications {
    pub const SERVER_CONNECTED: &str = "server/connected";
}

/// Returns true if the given string is a known method.
pub fn is_known_method(method: &str) -> bool {
    matches!(
        method,
        Methods::NODE_CREATE
            | Methods::NODE_GET_DATA
            | Methods::NODE_SET_DATA
            | Methods::NODE_DELETE
            | Methods::NODE_EXISTS
            | Methods::NODE_CHILDREN
            | Methods::SERVER_PING
    )
}

/// Type alias: the method name is always a `&str` at the protocol level.
pub type MethodName = &'static str;
