pub mod cnb;
pub mod util;
pub mod yahoo_finance;
