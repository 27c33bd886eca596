//! # Event subscribers.
//!
//! ```text
//! Worker/Controller/App ── publish(Event) ──► Bus ──► SubscriberSet::forward
//!                                                        ├──► LogWriter
//!                                                        └──► custom ... (by interest)
//! ```

mod log;
mod subscriber;
mod subscriber_set;

pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
pub(crate) use subscriber_set::panic_message;
