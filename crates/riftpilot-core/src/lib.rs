// Core plumbing for talking to the local client control planes: credential
// discovery, the authenticated request client, and the wire types the
// automation layer reads.

pub mod client;
pub mod locator;
pub mod protocol;
