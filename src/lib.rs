pub mod bookmarks;
pub mod database;
pub mod errors;
pub mod models;
pub mod player;
pub mod session;
pub mod spotify;

pub use errors::AppError;
pub use session::Session;

/// Opt-in logging init for hosts and tests; safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
