pub mod api;
pub mod form;
pub mod server;
