pub mod caching;
pub mod util;
pub mod yahoo_finance;

pub use caching::CachingGateway;
pub use yahoo_finance::YahooFinanceGateway;
