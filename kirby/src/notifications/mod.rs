//! Notification groups and the escalation engine.
//!
//! [`classify`] decides which groups hear about a retry or a failure,
//! [`Escalation`] is the pure hand-off record, and [`Escalator`] passes it
//! to a [`NotificationTransport`].

mod escalation;
mod groups;
mod transport;

pub use escalation::{classify, recipients, Escalation, Escalator};
pub use groups::{NotificationEmail, NotificationGroup};
pub use transport::{CollectingTransport, LoggingTransport, NotificationTransport};
