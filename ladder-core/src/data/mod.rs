//! Market data: primary book path, secondary trade tape, and the fusion
//! layer that guarantees a usable snapshot.

pub mod book_path;
pub mod fusion;
pub mod trade_path;

pub use book_path::BookPath;
pub use fusion::{DualPathFeed, FeedStats};
pub use trade_path::TradePath;
