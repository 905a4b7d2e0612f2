mod state_goaway;
mod state_ping_pong;
mod state_settings;

pub use state_goaway::StateGoAway;
pub use state_ping_pong::StatePingPong;
pub use state_settings::StateSettings;
