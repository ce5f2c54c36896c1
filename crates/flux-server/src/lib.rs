pub mod api;
pub mod app;

pub use api::create_router;
