//! Domain module containing the observation record, typed events, and
//! alerts exchanged between the perception boundary, the monitoring agents,
//! and the orchestrator.

pub mod alert;
pub mod events;
pub mod observation;

pub use alert::*;
pub use events::*;
pub use observation::*;
