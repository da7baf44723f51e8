use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::Address;
use crate::error::{Result, SyncError};
use crate::payload::{AddressInput, AddressPayload};
use crate::storage::Transaction;

/// Turns an address reference or raw address fields into a stored Address
pub struct AddressResolver;

impl AddressResolver {
    /// Resolve the address found under `key` of a handler block.
    ///
    /// An existing reference is returned as stored and never duplicated; raw
    /// fields always create exactly one new Address. An absent key is a
    /// validation failure, not a no-op.
    pub async fn resolve(
        tx: &mut dyn Transaction,
        key: &str,
        input: Option<&AddressInput>,
    ) -> Result<Address> {
        let input = input.ok_or_else(|| {
            warn!("Missing required address field: {}", key);
            SyncError::Validation(format!("missing required address field '{}'", key))
        })?;

        match input {
            AddressInput::Existing(reference) => {
                let address = tx.get_address(reference.address_id).await?.ok_or_else(|| {
                    SyncError::Validation(format!(
                        "{} references unknown address {}",
                        key, reference.address_id
                    ))
                })?;
                debug!("Using existing address {} for {}", reference.address_id, key);
                Ok(address)
            }
            AddressInput::Raw(fields) => {
                let mut address = Self::from_payload(fields);
                tx.create_address(&mut address).await?;
                Ok(address)
            }
        }
    }

    fn from_payload(fields: &AddressPayload) -> Address {
        Address {
            id: None,
            street_number: fields.street_number.clone(),
            address1: fields.address1.clone(),
            address2: fields.address2.clone(),
            city: fields.city.as_ref().and_then(|c| c.name.clone().or_else(|| c.code.clone())),
            state: fields.state.as_ref().and_then(|s| s.code.clone().or_else(|| s.name.clone())),
            country: fields
                .country
                .as_ref()
                .and_then(|c| c.code.clone().or_else(|| c.name.clone())),
            zip: fields.zip.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{AddressRef, Locality};
    use crate::storage::{InMemoryStorage, Storage};

    fn raw() -> AddressInput {
        AddressInput::Raw(AddressPayload {
            street_number: Some("123".to_string()),
            address1: "Main St".to_string(),
            address2: None,
            city: Some(Locality { code: None, name: Some("Richmond".to_string()) }),
            state: Some(Locality { code: Some("VA".to_string()), name: Some("Virginia".to_string()) }),
            country: Some(Locality { code: Some("US".to_string()), name: None }),
            zip: Some("23219".to_string()),
        })
    }

    #[tokio::test]
    async fn raw_fields_create_exactly_one_address() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let address = AddressResolver::resolve(tx.as_mut(), "siteAddress", Some(&raw()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(address.id.is_some());
        assert_eq!(address.city.as_deref(), Some("Richmond"));
        assert_eq!(address.state.as_deref(), Some("VA"));
        assert_eq!(storage.counts().await.unwrap().addresses, 1);
    }

    #[tokio::test]
    async fn existing_reference_is_reused() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let first = AddressResolver::resolve(tx.as_mut(), "siteAddress", Some(&raw()))
            .await
            .unwrap();
        let reference = AddressInput::Existing(AddressRef {
            address_id: first.id.unwrap(),
        });
        let second = AddressResolver::resolve(tx.as_mut(), "mailingAddress", Some(&reference))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.counts().await.unwrap().addresses, 1);
    }

    #[tokio::test]
    async fn missing_key_is_a_validation_failure() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let err = AddressResolver::resolve(tx.as_mut(), "mailingAddress", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(msg) if msg.contains("mailingAddress")));
    }

    #[tokio::test]
    async fn unknown_reference_is_a_validation_failure() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let reference = AddressInput::Existing(AddressRef {
            address_id: uuid::Uuid::new_v4(),
        });
        let err = AddressResolver::resolve(tx.as_mut(), "siteAddress", Some(&reference))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
