//! Email adapter - transactional notifications via Resend.

mod resend_notifier;

pub use resend_notifier::ResendNotifier;
