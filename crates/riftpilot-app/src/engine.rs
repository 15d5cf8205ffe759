// Polling automation engine.
//
// One tick: rediscover the primary control plane, read the game-flow phase,
// then act on it. Ready check: accept. Champion select: submit the configured
// ban and pick for every open action the local player owns. Ticks run one
// after another on a fixed interval and never overlap, so an action cannot be
// submitted twice concurrently. Nothing is remembered between ticks except
// the published status.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use riftpilot_core::client::ControlPlane;
use riftpilot_core::protocol::{
    league, ActionKind, ActionPatch, ChampSelectSession, GameflowPhase, Method,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::catalog::ChampionCatalog;
use crate::config::{AutomationSettings, SettingsHandle};
use crate::presence::PresenceFlag;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ban { action_id: i64, champion_id: i64 },
    Pick { action_id: i64, champion_id: i64 },
}

impl Decision {
    pub fn action_id(&self) -> i64 {
        match *self {
            Decision::Ban { action_id, .. } | Decision::Pick { action_id, .. } => action_id,
        }
    }

    pub fn champion_id(&self) -> i64 {
        match *self {
            Decision::Ban { champion_id, .. } | Decision::Pick { champion_id, .. } => champion_id,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Decision::Ban { .. } => "ban",
            Decision::Pick { .. } => "pick",
        }
    }
}

/// Every banned champion plus every champion already on either roster.
pub fn taken_champions(session: &ChampSelectSession) -> HashSet<i64> {
    let bans = session
        .bans
        .my_team_bans
        .iter()
        .chain(&session.bans.their_team_bans)
        .copied();
    let rosters = session
        .my_team
        .iter()
        .chain(&session.their_team)
        .map(|member| member.champion_id)
        .filter(|&id| id != 0);
    bans.chain(rosters).collect()
}

/// Primary if free, else secondary if free. Unresolvable names are skipped.
fn choose_pick(
    settings: &AutomationSettings,
    catalog: &ChampionCatalog,
    taken: &HashSet<i64>,
) -> Option<i64> {
    [&settings.primary_pick, &settings.secondary_pick]
        .into_iter()
        .filter_map(|name| catalog.resolve(name))
        .find(|id| !taken.contains(id))
}

/// Actions to submit for this session snapshot, in row order.
pub fn decide(
    session: &ChampSelectSession,
    settings: &AutomationSettings,
    catalog: &ChampionCatalog,
) -> Vec<Decision> {
    let taken = taken_champions(session);
    let mut decisions = Vec::new();

    for action in session.actions.iter().flatten() {
        if action.actor_cell_id != session.local_player_cell_id || action.completed {
            continue;
        }
        match action.kind {
            ActionKind::Ban if settings.auto_ban => {
                if let Some(champion_id) = catalog.resolve(&settings.ban) {
                    decisions.push(Decision::Ban {
                        action_id: action.id,
                        champion_id,
                    });
                }
            }
            ActionKind::Pick if settings.auto_pick => {
                if let Some(champion_id) = choose_pick(settings, catalog, &taken) {
                    decisions.push(Decision::Pick {
                        action_id: action.id,
                        champion_id,
                    });
                }
            }
            _ => {}
        }
    }

    decisions
}

// ---------------------------------------------------------------------------
// Tick outcome and published status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Disconnected,
    /// Connected, but the phase could not be read.
    PhaseUnavailable,
    Idle(GameflowPhase),
    ReadyCheck { accepted: bool },
    /// In champion select but the session snapshot was unavailable.
    SessionUnavailable,
    ChampSelect { submitted: Vec<Decision> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub description: String,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    pub connected: bool,
    pub phase: Option<String>,
    pub last_action: Option<ActionRecord>,
    pub presence_suppressed: bool,
    pub ticks: u64,
    pub updated_at: Option<DateTime<Local>>,
}

impl EngineStatus {
    fn record(&mut self, outcome: &TickOutcome, catalog: &ChampionCatalog, presence: bool) {
        let now = Local::now();
        self.ticks += 1;
        self.updated_at = Some(now);
        self.presence_suppressed = presence;
        self.connected = !matches!(outcome, TickOutcome::Disconnected);

        match outcome {
            TickOutcome::Disconnected | TickOutcome::PhaseUnavailable => self.phase = None,
            TickOutcome::Idle(phase) => self.phase = Some(phase.to_string()),
            TickOutcome::ReadyCheck { accepted } => {
                self.phase = Some(GameflowPhase::ReadyCheck.to_string());
                if *accepted {
                    self.last_action = Some(ActionRecord {
                        description: "accepted ready check".to_string(),
                        at: now,
                    });
                }
            }
            TickOutcome::SessionUnavailable => {
                self.phase = Some(GameflowPhase::ChampSelect.to_string());
            }
            TickOutcome::ChampSelect { submitted } => {
                self.phase = Some(GameflowPhase::ChampSelect.to_string());
                if let Some(last) = submitted.last() {
                    let champion = catalog
                        .name_of(last.champion_id())
                        .map(str::to_string)
                        .unwrap_or_else(|| last.champion_id().to_string());
                    self.last_action = Some(ActionRecord {
                        description: format!("{} {champion}", last.verb()),
                        at: now,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AutomationEngine<P> {
    client: Arc<P>,
    settings: SettingsHandle,
    catalog: Arc<ChampionCatalog>,
    presence: PresenceFlag,
    interval: Duration,
}

impl<P: ControlPlane> AutomationEngine<P> {
    pub fn new(
        client: Arc<P>,
        settings: SettingsHandle,
        catalog: Arc<ChampionCatalog>,
        presence: PresenceFlag,
    ) -> Self {
        Self {
            client,
            settings,
            catalog,
            presence,
            interval: TICK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one evaluation. Failures degrade to "nothing done this tick".
    pub async fn tick(&self) -> TickOutcome {
        // Fresh read every tick so edits apply without a restart.
        let settings = self.settings.snapshot();

        if !self.client.connect().await {
            return TickOutcome::Disconnected;
        }

        let phase = match self
            .client
            .request(Method::Get, league::GAMEFLOW_PHASE, None)
            .await
        {
            Some(resp) if resp.ok => GameflowPhase::from_body(&resp.body),
            Some(resp) => {
                debug!(status = resp.status, "Game-flow phase not available");
                return TickOutcome::PhaseUnavailable;
            }
            None => return TickOutcome::PhaseUnavailable,
        };

        match phase {
            GameflowPhase::ReadyCheck if settings.auto_accept => self.accept_ready_check().await,
            GameflowPhase::ChampSelect => self.champ_select(&settings).await,
            other => TickOutcome::Idle(other),
        }
    }

    async fn accept_ready_check(&self) -> TickOutcome {
        let accepted = match self
            .client
            .request(Method::Post, league::READY_CHECK_ACCEPT, None)
            .await
        {
            Some(resp) if resp.ok => {
                info!("Ready check accepted");
                true
            }
            Some(resp) => {
                warn!(status = resp.status, "Ready check accept rejected");
                false
            }
            None => false,
        };
        TickOutcome::ReadyCheck { accepted }
    }

    async fn champ_select(&self, settings: &AutomationSettings) -> TickOutcome {
        if !settings.auto_ban && !settings.auto_pick {
            return TickOutcome::Idle(GameflowPhase::ChampSelect);
        }

        let session = match self
            .client
            .request(Method::Get, league::CHAMP_SELECT_SESSION, None)
            .await
        {
            Some(resp) if resp.ok => resp.decode::<ChampSelectSession>(),
            Some(resp) => {
                debug!(status = resp.status, "Champion select session not available");
                None
            }
            None => None,
        };
        let Some(session) = session else {
            return TickOutcome::SessionUnavailable;
        };

        let mut submitted = Vec::new();
        for decision in decide(&session, settings, &self.catalog) {
            if self.submit(decision).await {
                submitted.push(decision);
            }
        }
        TickOutcome::ChampSelect { submitted }
    }

    async fn submit(&self, decision: Decision) -> bool {
        let patch = ActionPatch {
            champion_id: decision.champion_id(),
            completed: true,
        };
        let Ok(body) = serde_json::to_value(patch) else {
            return false;
        };
        let path = league::champ_select_action(decision.action_id());
        match self.client.request(Method::Patch, &path, Some(&body)).await {
            Some(resp) if resp.ok => {
                info!(
                    action_id = decision.action_id(),
                    champion_id = decision.champion_id(),
                    "Submitted {}",
                    decision.verb()
                );
                true
            }
            Some(resp) => {
                warn!(
                    action_id = decision.action_id(),
                    champion_id = decision.champion_id(),
                    status = resp.status,
                    "{} rejected",
                    decision.verb()
                );
                false
            }
            None => false,
        }
    }

    /// Tick on the configured interval until `shutdown` flips to true (or its
    /// sender goes away). Shutdown is only observed between ticks.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        status: watch::Sender<EngineStatus>,
    ) {
        info!(interval_ms = self.interval.as_millis() as u64, "Automation engine started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "Tick complete");
                    let suppressed = self.presence.is_suppressed();
                    status.send_modify(|s| s.record(&outcome, &self.catalog, suppressed));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Automation engine stopped");
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
