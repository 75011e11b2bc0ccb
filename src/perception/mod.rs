pub mod font;
pub mod grid;
pub mod guard;
pub mod pipeline;
pub mod screenshot;
pub mod types;
