pub mod appointment;
pub mod availability;
pub mod filter;
pub mod time;
pub mod user;
