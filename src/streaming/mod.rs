mod broadcaster;
mod handlers;
mod server;
#[cfg(test)]
mod tests;

pub use broadcaster::{SseBroadcaster, SseChannel, Subscription};
pub use server::{ServerState, StreamServer, StreamServerBuilder};
