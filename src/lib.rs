pub mod engine;
pub mod fall;
pub mod levels;
pub mod models;
pub mod playback;
pub mod playback_generator;
pub mod solver;
pub mod state;
pub mod support;
#[cfg(test)]
pub mod test_cwd;
pub mod validate_levels_toml;
pub mod verify;
pub mod verify_all;
