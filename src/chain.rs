//! Selection chain state machine
//!
//! A chain walks six ordered steps (city, brand, model, generation,
//! specification, maintenance). Transitions are pure: they take the current
//! chain and an event and return the next chain plus the effects the flow
//! layer has to run.

mod effect;
pub mod event;
pub mod state;
pub mod step;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::ChainEvent;
pub use state::{highest_selected, ChainError, ChatRef, SelectionChain, Selections};
pub use step::Step;
pub use transition::{deep_link, transition, ChainContext, TransitionError, TransitionResult};
