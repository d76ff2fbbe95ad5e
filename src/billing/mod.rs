// Billing provider integration: signed webhooks and checkout sessions

pub mod gateway;
pub mod handler;
pub mod signature;

pub use gateway::{BillingGateway, CheckoutRequest, HttpBillingGateway};
pub use handler::{BillingEventHandler, BillingOutcome};
pub use signature::SignatureVerifier;

use crate::errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Carries the rejection reason for logs; never sent to the caller
    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error("invalid billing event: {0}")]
    Payload(String),

    #[error("billing gateway request failed: {0}")]
    Gateway(String),

    #[error(transparent)]
    Store(#[from] AppError),
}
