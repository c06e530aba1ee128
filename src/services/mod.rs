pub mod currency;
pub mod market;
pub mod news;
pub mod portfolio;
pub mod stocks;
pub mod users;
pub mod valuation;
