//! Test helpers shared across Parley crates.

pub mod events;
pub mod services;
pub mod store;

pub use events::RecordingSink;
pub use services::{
    FailingAssistant, FailingEnhancer, FixedEnhancer, GatedAssistant, ScriptedAssistant,
};
pub use store::{FlakyStore, GatedEnhancementStore, Operation};
