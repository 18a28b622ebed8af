//! Address registry: sender lookup and race-tolerant creation

use log::{debug, error, warn};

use crate::ingest::IngestError;
use crate::models::{Address, normalize_email};
use crate::storage::{CreateAddressError, MailStore};

/// Look up an address by email, normalizing it first
pub fn find_address(store: &dyn MailStore, email: &str) -> anyhow::Result<Option<Address>> {
    store.get_address_by_email(&normalize_email(email))
}

/// Get the address for `email`, creating it when absent.
///
/// A concurrent creator can win between the lookup and the insert; the
/// resulting conflict is resolved by reading once more. If that read still
/// finds nothing the store is inconsistent and the error is fatal.
pub fn get_or_create_address(
    store: &dyn MailStore,
    email: &str,
    name: Option<&str>,
) -> Result<Address, IngestError> {
    let email = normalize_email(email);

    if let Some(existing) = store.get_address_by_email(&email)? {
        return Ok(existing);
    }

    match store.create_address(&email, name) {
        Ok(address) => {
            debug!("Registered sender {} as {}", email, address.id);
            Ok(address)
        }
        Err(CreateAddressError::Conflict { .. }) => {
            warn!("Sender {} was created concurrently, re-reading", email);
            match store.get_address_by_email(&email)? {
                Some(address) => Ok(address),
                None => {
                    error!("Sender {} missing after creation conflict", email);
                    Err(IngestError::AddressReconciliation { email })
                }
            }
        }
        Err(CreateAddressError::Store(e)) => Err(e.into()),
    }
}
