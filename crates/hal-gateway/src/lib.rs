pub mod connection;
pub mod dispatcher;

pub use connection::{GatewayContext, authenticate, handle_connection, handle_connection_authenticated, mark_read};
pub use dispatcher::Dispatcher;
