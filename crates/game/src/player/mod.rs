mod config;
mod controller;
mod input;
mod state;

pub use config::PlayerConfig;
pub use controller::PlayerController;
pub use input::{InputFlags, PlayerInput};
pub use state::PlayerState;
