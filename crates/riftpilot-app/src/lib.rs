// Automation layer on top of the control-plane clients: configuration,
// champion catalog, the polling engine, the presence sequencer and the
// operator command handler.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod engine;
pub mod presence;

#[cfg(test)]
mod test_support;
