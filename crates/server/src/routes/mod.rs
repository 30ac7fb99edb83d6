pub mod health;
pub mod lobby;
pub mod multiplayer_ws;
pub mod single_player;
