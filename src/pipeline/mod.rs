//! Pipeline wiring
//!
//! A [`Bridge`] connects an input, any number of [`ProcessorStage`]s and an
//! output through capacity-one transaction channels, so a slow sink holds
//! back every stage before it.

mod bridge;
mod stage;

pub use bridge::Bridge;
pub use stage::ProcessorStage;
