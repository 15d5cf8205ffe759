// Wire types and endpoint paths for the two local control planes.
//
// Only the fields that automation decisions depend on are modelled; everything
// else in the upstream documents is ignored during deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Endpoint paths
// ---------------------------------------------------------------------------

/// Primary control plane (game client).
pub mod league {
    pub const GAMEFLOW_PHASE: &str = "/lol-gameflow/v1/gameflow-phase";
    pub const READY_CHECK_ACCEPT: &str = "/lol-matchmaking/v1/ready-check/accept";
    pub const CHAMP_SELECT_SESSION: &str = "/lol-champ-select/v1/session";
    pub const CHAT_SESSION: &str = "/lol-chat/v1/session";
    pub const CHAT_ME: &str = "/lol-chat/v1/me";
    pub const CURRENT_SUMMONER: &str = "/lol-summoner/v1/current-summoner";

    /// Resource path for a single champion-select action.
    pub fn champ_select_action(action_id: i64) -> String {
        format!("{CHAMP_SELECT_SESSION}/actions/{action_id}")
    }
}

/// Companion control plane (launcher).
pub mod riot {
    pub const CHAT_SESSION: &str = "/chat/v1/session";
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// HTTP verbs used against the control planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Normalized result of a single control-plane request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// True iff `status` is in `[200, 300)`.
    pub ok: bool,
    pub status: u16,
    /// Parsed JSON body, or the raw body as a JSON string when it did not
    /// parse (some endpoints answer with bare text).
    pub body: Value,
}

impl ApiResponse {
    pub fn from_parts(status: u16, raw: &str) -> Self {
        let body = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        ApiResponse {
            ok: (200..300).contains(&status),
            status,
            body,
        }
    }

    /// Decode the body into a typed document, `None` when the shape does not
    /// match.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.body.clone()).ok()
    }
}

// ---------------------------------------------------------------------------
// Game-flow phase
// ---------------------------------------------------------------------------

/// Game-flow phase. Opaque except for the two values that drive decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameflowPhase {
    ReadyCheck,
    ChampSelect,
    Other(String),
}

impl GameflowPhase {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ReadyCheck" => GameflowPhase::ReadyCheck,
            "ChampSelect" => GameflowPhase::ChampSelect,
            other => GameflowPhase::Other(other.to_string()),
        }
    }

    /// Read the phase out of a response body. The endpoint answers with a
    /// JSON string; anything else is stringified with quotes stripped.
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::String(s) => Self::parse(s.trim_matches('"')),
            other => Self::parse(&other.to_string().replace('"', "")),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GameflowPhase::ReadyCheck => "ReadyCheck",
            GameflowPhase::ChampSelect => "ChampSelect",
            GameflowPhase::Other(s) => s,
        }
    }
}

impl std::fmt::Display for GameflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Champion-select session
// ---------------------------------------------------------------------------

/// Read-only snapshot of the champion-select session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampSelectSession {
    pub local_player_cell_id: i64,
    #[serde(default)]
    pub actions: Vec<Vec<SessionAction>>,
    #[serde(default)]
    pub bans: SessionBans,
    #[serde(default)]
    pub my_team: Vec<TeamMember>,
    #[serde(default)]
    pub their_team: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAction {
    pub id: i64,
    pub actor_cell_id: i64,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Pick,
    Ban,
    /// Any other action type (e.g. `ten_bans_reveal`).
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBans {
    #[serde(default)]
    pub my_team_bans: Vec<i64>,
    #[serde(default)]
    pub their_team_bans: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(default)]
    pub cell_id: i64,
    /// 0 when unset.
    #[serde(default)]
    pub champion_id: i64,
}

/// Body submitted to an action resource to lock a champion in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPatch {
    pub champion_id: i64,
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Summoner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSummoner {
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub tag_line: String,
    #[serde(default)]
    pub summoner_level: u32,
}

impl CurrentSummoner {
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}
