pub mod mute;
pub mod ngword;

pub use mute::MuteRegistry;
pub use ngword::{NgMatch, NgWords};
