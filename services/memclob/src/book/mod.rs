//! Order book infrastructure module
//!
//! Contains price levels, book sides, the per-market order index and the
//! short-term cancellation table.

pub mod price_level;
pub mod book_side;
pub mod order_index;
pub mod cancels;

pub use price_level::PriceLevel;
pub use book_side::BookSide;
pub use order_index::{LevelHandle, Orderbook, OrderbookSnapshot};
pub use cancels::CancellationTable;
