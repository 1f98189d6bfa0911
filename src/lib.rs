pub mod application;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod renderer;
pub mod scene;
pub mod texture;
pub mod util;
