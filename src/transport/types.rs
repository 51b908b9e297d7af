use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: u32,
    pub name: String,
    /// Derived from the user collection whenever the directory is published.
    pub user_count: u32,
}

/// A connected user. `session` is the server-assigned ephemeral id, not an account id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub session: u32,
    pub name: String,
    pub channel_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Handshaking,
    Authenticated,
}
