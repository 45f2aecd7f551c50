//! Netfleet Core Library
//!
//! Domain types for declarative fleet configuration: intent modelling,
//! deterministic rendering, line-set diffing and the session/parser
//! interfaces the deployment pipeline consumes.

pub mod diff;
pub mod error;
pub mod fakes;
pub mod intent;
pub mod parser;
pub mod render;
pub mod session;
pub mod telemetry;

pub use diff::{diff_configs, ConfigDiff};
pub use error::{NetfleetError, Result};
pub use intent::{
    DeviceIntent, EnterpriseSettings, FleetIntent, IntentRepository, InterfaceIntent, PeerIntent,
    VrfDefinition,
};
pub use parser::{
    CheckCategory, ConfigStateParser, InterfaceState, OutputParser, PeerState, ProtocolState,
};
pub use render::{content_digest, ConfigRenderer, GeneratedConfig};
pub use session::{DeviceSession, DirSessionProvider, SessionProvider};
pub use telemetry::init_tracing;

/// Netfleet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
