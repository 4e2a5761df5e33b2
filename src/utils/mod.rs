pub mod trade_id;

pub use trade_id::TradeIdGenerator;
