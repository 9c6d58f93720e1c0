pub mod channels;
pub mod dedup;
pub mod dispatcher;
pub mod types;

pub use channels::{AlertChannel, InMemoryChannel, SmtpChannel};
pub use dispatcher::{dispatch_pending, AlertSink, AlertStore};
pub use types::{Alert, AlertKind, AlertSeverity};
