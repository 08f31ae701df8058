pub mod binance;
pub mod demo;
pub mod provider;
