mod assembler;
mod error;
mod orchestrator;

pub use assembler::SynthBody;
pub use error::BridgeError;
pub use orchestrator::{Bridge, BridgeSettings, SynthReply};
