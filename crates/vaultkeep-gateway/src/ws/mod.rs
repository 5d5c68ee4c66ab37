pub mod coalesce;
pub mod feed;
pub mod hub;
pub mod session;
