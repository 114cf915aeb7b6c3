// Cycle scheduling module
pub mod clock;
pub mod trading_loop;

pub use clock::{Clock, SystemClock};
pub use trading_loop::{CycleOutcome, TradingLoop};
