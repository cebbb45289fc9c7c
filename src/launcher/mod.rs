pub mod routes;
pub mod server;
pub mod ws;

pub use routes::LauncherState;
