//! The media bridge: telephony peer on one side, voice agent on the other.

pub mod agent;
pub mod escalation;
pub mod protocol;
pub mod registry;
pub mod session;

pub use agent::{AgentFrame, AgentLink, AgentLinkParams};
pub use registry::{RegistryGuard, SessionRegistry};
pub use session::{BridgeSession, BridgeState};
