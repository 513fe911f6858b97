//! Ports - async trait contracts at the system's seams.
//!
//! Collaborators (user store, payment gateway, notification sender, feature
//! hooks) are consumed through these traits; adapters provide the concrete
//! implementations.

mod billing_hooks;
mod notifier;
mod payment_gateway;
mod user_store;

pub use billing_hooks::{BillingHooks, NoopBillingHooks};
pub use notifier::{Notifier, NoopNotifier, NotifyError};
pub use payment_gateway::{
    CardCredential, CreateSubscriptionRequest, GatewayCustomer, GatewayError, PaymentGateway,
    PaymentIntent, PaymentMethodInfo, RemoteCoupon, RemoteDiscount, RemoteInvoice,
    RemoteInvoiceLine, RemotePeriod, RemoteSubscription, RemoteSubscriptionItem,
    UpdateSubscriptionRequest,
};
pub use user_store::{StoreError, UserRecord, UserStore};
