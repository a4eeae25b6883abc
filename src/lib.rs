pub mod config;
pub mod context;
pub mod elo;
pub mod error;
pub mod features;
pub mod game_log;
pub mod head_to_head;
pub mod models;
pub mod predict_job;
pub mod rolling;
pub mod store;
pub mod team_directory;
pub mod training_frame;
