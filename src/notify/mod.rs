//! Notification composition and delivery.

mod composer;
mod dispatcher;
mod ledger;

pub use composer::{
    DEFAULT_REFERENCE_TEMPLATE, FINDINGS_LIMIT, NotificationComposer, NotificationMessage, RunMetadata,
    TYPES_LIMIT, summary_line,
};
pub use dispatcher::{DEFAULT_TIMEOUT_SECS, DispatchOutcome, NotificationDispatcher};
pub use ledger::{DEFAULT_RETENTION_DAYS, DeliveryLedger, DeliveryRecord};
