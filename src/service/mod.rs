pub mod shortener;

pub use shortener::{CreateRequest, Shortener};
