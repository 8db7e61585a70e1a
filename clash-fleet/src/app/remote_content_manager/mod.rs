pub mod healthcheck;
pub mod providers;
