use chrono::Utc;

use crate::domain::{Contact, Phone};
use crate::error::Result;
use crate::payload::ContactPayload;
use crate::storage::Transaction;

/// Creates handler-scoped contacts. Contacts are never deduplicated.
pub struct ContactAssembler;

impl ContactAssembler {
    pub async fn assemble(tx: &mut dyn Transaction, data: &ContactPayload) -> Result<Contact> {
        let mut contact = Contact {
            id: None,
            first_name: data.first_name.clone(),
            middle_initial: data.middle_initial.clone(),
            last_name: data.last_name.clone(),
            email: data.email.clone(),
            company_name: data.company_name.clone(),
            phone: data.phone.as_ref().map(|p| Phone {
                number: p.number.clone(),
                extension: p.extension.clone(),
            }),
            created_at: Utc::now(),
        };
        tx.create_contact(&mut contact).await?;
        Ok(contact)
    }
}
