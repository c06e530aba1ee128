pub mod auth;
pub mod news;
pub mod portfolios;
pub mod prices;
pub mod stocks;
pub mod users;
