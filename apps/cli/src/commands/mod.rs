pub mod presets;
pub mod wait;
