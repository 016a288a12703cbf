pub mod calibrate;
pub mod clock;
pub mod engine;
pub mod filter;
pub mod listing;
pub mod plan;
pub mod scan;
pub mod schedule;
pub mod state;

#[cfg(test)]
pub mod testing;

pub use engine::{Mirror, PassKind, PassOutcome};
pub use schedule::{Scheduler, Trigger};
