//! Exchange orchestration for the voxlink relay.
//!
//! Takes an inbound audio or text message, runs it through a persistent
//! streaming session and hands back a uniform [`voxlink_types::RelayReply`].
//! The happy path is ingress transcode → chunked upload → event-driven
//! response accumulation → egress transcode; every failure mode funnels
//! into the fallback coordinator, which guarantees a non-empty text reply
//! in bounded time.

pub mod collaborators;
pub mod config;
pub mod egress;
pub mod error;
pub mod fallback;
pub mod ingress;
pub mod latency;
pub mod relay;

pub use collaborators::{CollaboratorError, HttpCompletion, HttpSynthesis, SpeechSynthesis, TextCompletion};
pub use config::{load_config, ConfigError, RelayConfig};
pub use egress::EgressPipeline;
pub use error::RelayError;
pub use fallback::{FallbackCoordinator, FallbackOutcome, LAST_RESORT_REPLY};
pub use ingress::{IngressPipeline, IngressStats};
pub use latency::LatencyGovernor;
pub use relay::Relay;
