pub mod barrier;
pub mod lottery;
pub mod results;

pub use lottery::{Lottery, Settings};
