pub mod commands;
pub mod model;

pub use commands::{minimum_next_bid, BidEngine};
pub use model::BidEnvelope;
