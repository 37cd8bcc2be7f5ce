pub mod preview;
pub mod render;
