// Presence toggle: suppress or restore the user's chat visibility across both
// control planes.
//
// Each sub-step is best-effort. A plane that cannot be discovered, or whose
// request dies at the transport level, is skipped. A plane that answers with
// an auth or server error fails its step; the remaining steps still run and
// the first failure is reported in the outcome.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use riftpilot_core::client::ControlPlane;
use riftpilot_core::protocol::{league, riot, Method};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Availability shown to friends once presence is restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    #[default]
    Chat,
    Away,
    Dnd,
    Mobile,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Chat => "chat",
            Availability::Away => "away",
            Availability::Dnd => "dnd",
            Availability::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "online" => Ok(Availability::Chat),
            "away" => Ok(Availability::Away),
            "dnd" => Ok(Availability::Dnd),
            "mobile" => Ok(Availability::Mobile),
            other => Err(format!("unknown availability `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceMode {
    Suppressed,
    Restored(Availability),
}

// ---------------------------------------------------------------------------
// Shared flag
// ---------------------------------------------------------------------------

/// Last requested presence mode, shared between the command layer, the
/// sequencer and the engine's status reporting.
#[derive(Debug, Clone, Default)]
pub struct PresenceFlag(Arc<AtomicBool>);

impl PresenceFlag {
    pub fn is_suppressed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.0.store(suppressed, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("{plane} rejected {step} with status {status}")]
    Rejected {
        plane: String,
        step: &'static str,
        status: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceOutcome {
    pub success: bool,
    pub error_message: Option<String>,
}

impl PresenceOutcome {
    fn from_errors(errors: &[PresenceError]) -> Self {
        match errors.first() {
            None => PresenceOutcome {
                success: true,
                error_message: None,
            },
            Some(first) => PresenceOutcome {
                success: false,
                error_message: Some(first.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct PresenceSequencer<P, C> {
    primary: Arc<P>,
    companion: Arc<C>,
    flag: PresenceFlag,
    offline_chat_url: String,
}

impl<P: ControlPlane, C: ControlPlane> PresenceSequencer<P, C> {
    pub fn new(
        primary: Arc<P>,
        companion: Arc<C>,
        flag: PresenceFlag,
        offline_chat_url: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            companion,
            flag,
            offline_chat_url: offline_chat_url.into(),
        }
    }

    pub fn flag(&self) -> &PresenceFlag {
        &self.flag
    }

    pub async fn set_presence(&self, mode: PresenceMode) -> PresenceOutcome {
        self.flag
            .set_suppressed(matches!(mode, PresenceMode::Suppressed));

        let mut errors = Vec::new();
        match mode {
            PresenceMode::Suppressed => {
                if self.companion.connect().await {
                    let body = json!({
                        "chatUrl": self.offline_chat_url,
                        "availability": "offline",
                        "statusMessage": "",
                        "idToken": "",
                        "lol": { "gameStatus": "outOfGame" },
                    });
                    record(
                        &mut errors,
                        run_step(
                            &*self.companion,
                            "session overwrite",
                            Method::Put,
                            riot::CHAT_SESSION,
                            Some(&body),
                        )
                        .await,
                    );
                } else {
                    debug!("{} not running, skipping", self.companion.name());
                }

                if self.primary.connect().await {
                    record(
                        &mut errors,
                        run_step(
                            &*self.primary,
                            "chat session delete",
                            Method::Delete,
                            league::CHAT_SESSION,
                            None,
                        )
                        .await,
                    );
                } else {
                    debug!("{} not running, skipping", self.primary.name());
                }
            }
            PresenceMode::Restored(availability) => {
                if self.companion.connect().await {
                    let body = json!({ "availability": "chat", "statusMessage": "" });
                    record(
                        &mut errors,
                        run_step(
                            &*self.companion,
                            "session restore",
                            Method::Put,
                            riot::CHAT_SESSION,
                            Some(&body),
                        )
                        .await,
                    );
                } else {
                    debug!("{} not running, skipping", self.companion.name());
                }

                if self.primary.connect().await {
                    record(
                        &mut errors,
                        run_step(
                            &*self.primary,
                            "chat session create",
                            Method::Post,
                            league::CHAT_SESSION,
                            Some(&json!({})),
                        )
                        .await,
                    );
                    let me = json!({
                        "availability": availability.as_str(),
                        "lol": { "gameStatus": "outOfGame" },
                    });
                    record(
                        &mut errors,
                        run_step(
                            &*self.primary,
                            "presence update",
                            Method::Put,
                            league::CHAT_ME,
                            Some(&me),
                        )
                        .await,
                    );
                } else {
                    debug!("{} not running, skipping", self.primary.name());
                }
            }
        }

        let outcome = PresenceOutcome::from_errors(&errors);
        if outcome.success {
            info!(?mode, "Presence updated");
        } else {
            warn!(?mode, "Presence update incomplete: {:?}", outcome.error_message);
        }
        outcome
    }
}

fn record(errors: &mut Vec<PresenceError>, result: Result<(), PresenceError>) {
    if let Err(e) = result {
        errors.push(e);
    }
}

/// Issue one sub-step. 4xx other than auth failures means the resource is
/// already in the requested state and counts as done.
async fn run_step<T: ControlPlane + ?Sized>(
    plane: &T,
    step: &'static str,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> Result<(), PresenceError> {
    let Some(response) = plane.request(method, path, body).await else {
        debug!(step, "{} dropped the request", plane.name());
        return Ok(());
    };
    let status = response.status;
    if response.ok {
        return Ok(());
    }
    if status >= 500 || status == 401 || status == 403 {
        return Err(PresenceError::Rejected {
            plane: plane.name().to_string(),
            step,
            status,
        });
    }
    debug!(step, status, "{} reports nothing to change", plane.name());
    Ok(())
}
