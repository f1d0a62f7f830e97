mod app;
mod config;
mod logging;
mod signals;

pub use app::run_from_args;
