use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assembly::address::AddressResolver;
use crate::assembly::contact::ContactAssembler;
use crate::context::SyncContext;
use crate::domain::{EpaPhone, Handler};
use crate::error::{Result, SyncError};
use crate::payload::{HandlerPayload, PhonePayload};
use crate::storage::Transaction;

/// Outcome of a get-or-create, so callers can tell reuse from creation
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResolution {
    Existing(Handler),
    Created(Handler),
}

impl HandlerResolution {
    pub fn handler(&self) -> &Handler {
        match self {
            HandlerResolution::Existing(h) | HandlerResolution::Created(h) => h,
        }
    }

    pub fn into_handler(self) -> Handler {
        match self {
            HandlerResolution::Existing(h) | HandlerResolution::Created(h) => h,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, HandlerResolution::Created(_))
    }
}

/// Records created for a new handler, in creation order
#[derive(Debug)]
struct HandlerParts {
    contact_id: Uuid,
    emergency_phone_id: Option<Uuid>,
    site_address_id: Uuid,
    mail_address_id: Uuid,
}

/// Get-or-create of handlers keyed by `epa_id`
pub struct HandlerRegistry;

impl HandlerRegistry {
    /// Return the handler stored for `data.epa_id`, or create it along with
    /// its contact, emergency phone and addresses.
    ///
    /// First write wins: an existing handler is returned untouched and the
    /// rest of `data` is ignored. The lookup and the insert run inside the
    /// caller's transaction, which holds the store exclusively, so two
    /// ingestions of the same new `epa_id` cannot both create it.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, epa_id = ?data.epa_id))]
    pub async fn get_or_create(
        ctx: &SyncContext,
        tx: &mut dyn Transaction,
        data: &HandlerPayload,
    ) -> Result<HandlerResolution> {
        let epa_id = required(data.epa_id.as_deref(), "epaSiteId")?;

        if let Some(existing) = tx.get_handler_by_epa_id(epa_id).await? {
            debug!("Using existing handler {}", existing);
            counter!("trak_handlers_reused_total").increment(1);
            return Ok(HandlerResolution::Existing(existing));
        }

        let name = required(data.name.as_deref(), "name")?;
        let parts = Self::create_parts(tx, data).await?;

        let mut handler = Handler {
            id: None,
            epa_id: epa_id.to_string(),
            name: name.to_string(),
            site_type: data.site_type,
            site_address_id: parts.site_address_id,
            mail_address_id: parts.mail_address_id,
            contact_id: parts.contact_id,
            emergency_phone_id: parts.emergency_phone_id,
            modified: data.modified,
            registered: data.registered,
            gis_primary: Some(data.gis_primary.unwrap_or(false)),
            can_esign: data.can_esign,
            limited_esign: data.limited_esign,
            registered_emanifest_user: Some(data.registered_emanifest_user.unwrap_or(false)),
            created_at: Utc::now(),
        };
        tx.create_handler(&mut handler).await?;

        info!("Created handler {} for {}", handler, ctx.username);
        counter!("trak_handlers_created_total").increment(1);
        Ok(HandlerResolution::Created(handler))
    }

    /// Contact, then emergency phone, then site and mailing addresses.
    async fn create_parts(tx: &mut dyn Transaction, data: &HandlerPayload) -> Result<HandlerParts> {
        let contact_data = data.contact.as_ref().ok_or_else(|| {
            warn!("Error while creating handler: missing contact");
            SyncError::MissingField("contact".to_string())
        })?;
        let contact = ContactAssembler::assemble(tx, contact_data).await?;
        let contact_id = contact
            .id
            .ok_or_else(|| SyncError::Storage("contact stored without id".to_string()))?;

        let emergency_phone_id = Self::emergency_phone(tx, data.emergency_phone.as_ref()).await?;

        let site_address = AddressResolver::resolve(tx, "siteAddress", data.site_address.as_ref()).await?;
        let mail_address =
            AddressResolver::resolve(tx, "mailingAddress", data.mail_address.as_ref()).await?;

        Ok(HandlerParts {
            contact_id,
            emergency_phone_id,
            site_address_id: stored_id(site_address.id, "address")?,
            mail_address_id: stored_id(mail_address.id, "address")?,
        })
    }

    async fn emergency_phone(
        tx: &mut dyn Transaction,
        data: Option<&PhonePayload>,
    ) -> Result<Option<Uuid>> {
        let Some(data) = data else {
            return Ok(None);
        };
        let mut phone = EpaPhone {
            id: None,
            number: data.number.clone(),
            extension: data.extension.clone(),
            created_at: Utc::now(),
        };
        let id = tx.create_epa_phone(&mut phone).await?;
        Ok(Some(id))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => {
            warn!("Error while creating handler: missing {}", key);
            Err(SyncError::MissingField(key.to_string()))
        }
    }
}

fn stored_id(id: Option<Uuid>, what: &str) -> Result<Uuid> {
    id.ok_or_else(|| SyncError::Storage(format!("{} stored without id", what)))
}
