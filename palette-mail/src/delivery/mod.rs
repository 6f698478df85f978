//! Email delivery
//!
//! Compiles templates, hands them to a [`MailTransport`], and keeps the
//! sender's history and notifications up to date.

pub mod dispatcher;
pub mod history;
pub mod notifications;
pub mod transport;

pub use dispatcher::{DeliveryReport, EmailDispatcher, SendEmailRequest, TestEmailReport};
pub use history::{DeliveryStatus, EmailHistory, HistoryManager, HistoryStats};
pub use notifications::{
    AppChannelSettings, EmailChannelSettings, MarkRead, Notification, NotificationKind,
    NotificationManager, NotificationPage, NotificationQuery, NotificationSettings,
};
pub use transport::{MailTransport, OutgoingEmail, SmtpTransport};
