pub mod generation;
pub mod dispatch;
