// Operator commands typed at the prompt: parsing and execution.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use riftpilot_core::client::ControlPlane;
use riftpilot_core::protocol::{league, CurrentSummoner, Method};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::catalog::ChampionCatalog;
use crate::config::{save_automation, AutomationSettings, SettingsHandle};
use crate::engine::EngineStatus;
use crate::presence::{Availability, PresenceMode, PresenceSequencer};

/// Most champions listed by `champions` before truncating.
const LIST_LIMIT: usize = 40;

pub const HELP: &str = "\
commands:
  status                      connection, phase, settings, last action
  offline                     hide from friends
  online [chat|away|dnd|mobile]
                              show again (default chat)
  accept on|off               auto-accept ready checks
  pick on|off                 auto-pick in champion select
  ban on|off                  auto-ban in champion select
  primary <name|none>         first-choice pick
  secondary <name|none>       fallback pick
  banpick <name|none>         champion to ban
  champions [filter]          list champion names
  help                        this text
  quit                        exit";

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Accept,
    Pick,
    Ban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChampionSlot {
    Primary,
    Secondary,
    Ban,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Status,
    Presence(PresenceMode),
    Toggle(Toggle, bool),
    /// `None` clears the slot.
    SetChampion(ChampionSlot, Option<String>),
    Champions(Option<String>),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),

    #[error("`{command}` expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("`{command}`: {message}")]
    InvalidArgument {
        command: &'static str,
        message: String,
    },
}

pub fn parse_command(line: &str) -> Result<UserCommand, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then_some(rest);

    match word.to_lowercase().as_str() {
        "" => Err(CommandError::Empty),
        "status" => Ok(UserCommand::Status),
        "offline" => Ok(UserCommand::Presence(PresenceMode::Suppressed)),
        "online" => {
            let availability = match arg {
                None => Availability::Chat,
                Some(a) => a.parse().map_err(|message| CommandError::InvalidArgument {
                    command: "online",
                    message,
                })?,
            };
            Ok(UserCommand::Presence(PresenceMode::Restored(availability)))
        }
        "accept" => parse_toggle("accept", Toggle::Accept, arg),
        "pick" => parse_toggle("pick", Toggle::Pick, arg),
        "ban" => parse_toggle("ban", Toggle::Ban, arg),
        "primary" => parse_champion("primary", ChampionSlot::Primary, arg),
        "secondary" => parse_champion("secondary", ChampionSlot::Secondary, arg),
        "banpick" => parse_champion("banpick", ChampionSlot::Ban, arg),
        "champions" => Ok(UserCommand::Champions(arg.map(str::to_string))),
        "help" | "?" => Ok(UserCommand::Help),
        "quit" | "exit" => Ok(UserCommand::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_toggle(
    command: &'static str,
    toggle: Toggle,
    arg: Option<&str>,
) -> Result<UserCommand, CommandError> {
    let enabled = match arg.map(str::to_lowercase).as_deref() {
        Some("on" | "true" | "yes") => true,
        Some("off" | "false" | "no") => false,
        Some(other) => {
            return Err(CommandError::InvalidArgument {
                command,
                message: format!("expected on or off, got `{other}`"),
            })
        }
        None => {
            return Err(CommandError::MissingArgument {
                command,
                expected: "on or off",
            })
        }
    };
    Ok(UserCommand::Toggle(toggle, enabled))
}

fn parse_champion(
    command: &'static str,
    slot: ChampionSlot,
    arg: Option<&str>,
) -> Result<UserCommand, CommandError> {
    match arg {
        None => Err(CommandError::MissingArgument {
            command,
            expected: "a champion name or `none`",
        }),
        Some(name) if name.eq_ignore_ascii_case("none") => {
            Ok(UserCommand::SetChampion(slot, None))
        }
        Some(name) => Ok(UserCommand::SetChampion(slot, Some(name.to_string()))),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Everything a command may touch.
pub struct CommandContext<P, C> {
    primary: Arc<P>,
    presence: PresenceSequencer<P, C>,
    settings: SettingsHandle,
    catalog: Arc<ChampionCatalog>,
    status: watch::Receiver<EngineStatus>,
    /// Config file that setting edits are written back to.
    config_path: Option<PathBuf>,
}

impl<P: ControlPlane, C: ControlPlane> CommandContext<P, C> {
    pub fn new(
        primary: Arc<P>,
        presence: PresenceSequencer<P, C>,
        settings: SettingsHandle,
        catalog: Arc<ChampionCatalog>,
        status: watch::Receiver<EngineStatus>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            primary,
            presence,
            settings,
            catalog,
            status,
            config_path,
        }
    }

    /// Run one command and return the text to show the operator.
    pub async fn execute(&self, command: UserCommand) -> String {
        match command {
            UserCommand::Status => self.status_report().await,
            UserCommand::Presence(mode) => {
                let outcome = self.presence.set_presence(mode).await;
                let label = match mode {
                    PresenceMode::Suppressed => "offline".to_string(),
                    PresenceMode::Restored(a) => format!("online ({a})"),
                };
                match outcome.error_message {
                    None => format!("presence: {label}"),
                    Some(e) => format!("presence: {label}, with errors: {e}"),
                }
            }
            UserCommand::Toggle(toggle, enabled) => {
                let updated = self.settings.update(|s| match toggle {
                    Toggle::Accept => s.auto_accept = enabled,
                    Toggle::Pick => s.auto_pick = enabled,
                    Toggle::Ban => s.auto_ban = enabled,
                });
                let name = match toggle {
                    Toggle::Accept => "auto accept",
                    Toggle::Pick => "auto pick",
                    Toggle::Ban => "auto ban",
                };
                self.persisted(&updated, format!("{name}: {}", on_off(enabled)))
            }
            UserCommand::SetChampion(slot, name) => self.set_champion(slot, name),
            UserCommand::Champions(filter) => self.list_champions(filter.as_deref()),
            UserCommand::Help => HELP.to_string(),
            UserCommand::Quit => "bye".to_string(),
        }
    }

    fn set_champion(&self, slot: ChampionSlot, name: Option<String>) -> String {
        let canonical = match name {
            None => String::new(),
            Some(name) if self.catalog.is_empty() => name,
            Some(name) => match self.catalog.resolve(&name).and_then(|id| self.catalog.name_of(id)) {
                Some(found) => found.to_string(),
                None => {
                    let suggestions: Vec<&str> = self
                        .catalog
                        .search(&name)
                        .into_iter()
                        .take(5)
                        .map(|c| c.name.as_str())
                        .collect();
                    if suggestions.is_empty() {
                        return format!("unknown champion `{name}`");
                    }
                    return format!(
                        "unknown champion `{name}`; did you mean: {}",
                        suggestions.join(", ")
                    );
                }
            },
        };

        let updated = self.settings.update(|s| {
            let field = match slot {
                ChampionSlot::Primary => &mut s.primary_pick,
                ChampionSlot::Secondary => &mut s.secondary_pick,
                ChampionSlot::Ban => &mut s.ban,
            };
            *field = canonical.clone();
        });
        let label = match slot {
            ChampionSlot::Primary => "primary pick",
            ChampionSlot::Secondary => "secondary pick",
            ChampionSlot::Ban => "ban",
        };
        self.persisted(&updated, format!("{label}: {}", display_name(&canonical)))
    }

    /// Write settings back to the config file and append any failure to the
    /// reply.
    fn persisted(&self, settings: &AutomationSettings, reply: String) -> String {
        let Some(path) = &self.config_path else {
            return reply;
        };
        match save_automation(path, settings) {
            Ok(()) => {
                info!(?settings, "Automation settings saved");
                reply
            }
            Err(e) => {
                warn!("Failed to save automation settings: {e}");
                format!("{reply} (not saved: {e})")
            }
        }
    }

    fn list_champions(&self, filter: Option<&str>) -> String {
        if self.catalog.is_empty() {
            return "champion list unavailable".to_string();
        }
        let hits = self.catalog.search(filter.unwrap_or(""));
        if hits.is_empty() {
            return "no matching champions".to_string();
        }
        let mut out = hits
            .iter()
            .take(LIST_LIMIT)
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if hits.len() > LIST_LIMIT {
            let _ = write!(out, " ... ({} more)", hits.len() - LIST_LIMIT);
        }
        out
    }

    async fn status_report(&self) -> String {
        let status = self.status.borrow().clone();
        let settings = self.settings.snapshot();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "client:   {}",
            if status.connected { "connected" } else { "disconnected" }
        );
        let _ = writeln!(out, "phase:    {}", status.phase.as_deref().unwrap_or("-"));
        let _ = writeln!(
            out,
            "presence: {}",
            if self.presence.flag().is_suppressed() { "offline" } else { "online" }
        );
        let _ = writeln!(out, "accept:   {}", on_off(settings.auto_accept));
        let _ = writeln!(
            out,
            "pick:     {} (primary {}, secondary {})",
            on_off(settings.auto_pick),
            display_name(&settings.primary_pick),
            display_name(&settings.secondary_pick)
        );
        let _ = writeln!(
            out,
            "ban:      {} ({})",
            on_off(settings.auto_ban),
            display_name(&settings.ban)
        );
        match &status.last_action {
            Some(action) => {
                let _ = writeln!(
                    out,
                    "last:     {} at {}",
                    action.description,
                    action.at.format("%H:%M:%S")
                );
            }
            None => {
                let _ = writeln!(out, "last:     -");
            }
        }
        if let Some(summoner) = self.summoner().await {
            let _ = writeln!(
                out,
                "summoner: {} (level {})",
                summoner.riot_id(),
                summoner.summoner_level
            );
        }
        out.trim_end().to_string()
    }

    async fn summoner(&self) -> Option<CurrentSummoner> {
        if !self.primary.is_connected() {
            return None;
        }
        let resp = self
            .primary
            .request(Method::Get, league::CURRENT_SUMMONER, None)
            .await?;
        if !resp.ok {
            return None;
        }
        resp.decode()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "-"
    } else {
        name
    }
}
