pub mod hierarchy;
pub mod summarizer;
pub mod turn;
