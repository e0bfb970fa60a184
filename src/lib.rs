pub mod config;
pub mod console;
pub mod datetime;
pub mod error;
pub mod geolocation;
pub mod history_command;
pub mod identity;
pub mod notify;
pub mod parking;
pub mod parking_command;
pub mod postgrest;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timer;
pub mod timer_command;
