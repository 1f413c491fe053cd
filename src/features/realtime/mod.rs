pub mod events;
pub mod fanout;
pub mod handlers;
pub mod routes;

pub use events::PushEvent;
pub use fanout::Fanout;
