//! PaymentMethodManager - card and customer lifecycle.
//!
//! Owns the lazy creation of the provider customer: a customer exists only
//! once the user first supplies a card. The only persistence write in this
//! module is recording a freshly created customer id.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::ports::{CardCredential, PaymentGateway, StoreError, UserRecord, UserStore};

/// Handler for card management operations.
pub struct PaymentMethodManager {
    store: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentMethodManager {
    pub fn new(store: Arc<dyn UserStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Attach a card to the user's provider customer, creating the customer
    /// first if they have none. Returns the customer id.
    ///
    /// With an existing customer this performs no persistence writes: a
    /// tokenized payment method is attached and made the invoice default, a
    /// legacy card token replaces the default source. Without one, the
    /// customer is created carrying the credential and the new id is
    /// persisted on the user record (exactly one write).
    pub async fn ensure_customer(
        &self,
        user: &UserRecord,
        credential: &CardCredential,
    ) -> Result<String, BillingError> {
        if let Some(customer_id) = user.billing.customer_id.clone() {
            match credential {
                CardCredential::PaymentMethod(payment_method_id) => {
                    self.gateway
                        .attach_payment_method(payment_method_id, &customer_id)
                        .await?;
                    self.gateway
                        .set_default_payment_method(&customer_id, payment_method_id)
                        .await?;
                }
                CardCredential::CardToken(card_token) => {
                    self.gateway
                        .replace_default_source(&customer_id, card_token)
                        .await?;
                }
            }
            return Ok(customer_id);
        }

        let customer_id = self.gateway.create_customer(&user.email, credential).await?;
        tracing::info!(user_id = %user.id, customer_id = %customer_id, "created provider customer");

        // Re-read before writing so fields changed since the caller loaded
        // the record are preserved.
        let mut record = self
            .store
            .find_by_id(&user.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(user.id.clone()))?;
        record.billing.customer_id = Some(customer_id.clone());
        self.store.save(&record).await?;

        Ok(customer_id)
    }

    /// Detach a stored card from its customer.
    pub async fn remove_card(&self, payment_method_id: &str) -> Result<(), BillingError> {
        self.gateway.detach_payment_method(payment_method_id).await?;
        Ok(())
    }

    /// Make a stored card the user's invoice default.
    pub async fn set_default_card(
        &self,
        user: &UserRecord,
        payment_method_id: &str,
    ) -> Result<(), BillingError> {
        let customer_id = user
            .billing
            .customer_id
            .as_deref()
            .ok_or(BillingError::PaymentRequired)?;
        self.gateway
            .set_default_payment_method(customer_id, payment_method_id)
            .await?;
        Ok(())
    }
}
