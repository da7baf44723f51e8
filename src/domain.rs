use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of regulated site a handler operates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SiteType {
    Tsdf,
    Generator,
    Transporter,
    Broker,
}

/// The part a handler plays on one manifest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HandlerRole {
    Generator,
    Transporter,
    DesignatedFacility,
}

/// A physical or mailing location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub id: Option<Uuid>,
    pub street_number: Option<String>,
    pub address1: String,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A phone number value carried by a contact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Phone {
    pub number: String,
    pub extension: Option<String>,
}

/// A person tied to exactly one handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Option<Uuid>,
    pub first_name: Option<String>,
    pub middle_initial: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<Phone>,
    pub created_at: DateTime<Utc>,
}

/// Emergency response phone owned by at most one handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpaPhone {
    pub id: Option<Uuid>,
    pub number: String,
    pub extension: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A regulated entity, unique by `epa_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handler {
    pub id: Option<Uuid>,
    pub epa_id: String,
    pub name: String,
    pub site_type: Option<SiteType>,
    pub site_address_id: Uuid,
    pub mail_address_id: Uuid,
    pub contact_id: Uuid,
    pub emergency_phone_id: Option<Uuid>,
    pub modified: Option<bool>,
    pub registered: Option<bool>,
    pub gis_primary: Option<bool>,
    pub can_esign: Option<bool>,
    pub limited_esign: Option<bool>,
    pub registered_emanifest_user: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.epa_id)
    }
}

/// Who signed an electronic signature
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signer {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub middle_initial: Option<String>,
    pub last_name: Option<String>,
    pub signer_role: Option<String>,
    pub company_name: Option<String>,
}

/// A physical custody-transfer signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperSignature {
    pub id: Option<Uuid>,
    pub printed_name: String,
    pub sign_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// An electronic custody-transfer signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ESignature {
    pub id: Option<Uuid>,
    pub manifest_handler_id: Uuid,
    pub signer: Option<Signer>,
    pub sign_date: DateTime<Utc>,
    pub cromerr_activity_id: Option<String>,
    pub on_behalf: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// One handler's participation on one manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestHandler {
    pub id: Option<Uuid>,
    pub handler_id: Uuid,
    pub role: HandlerRole,
    /// Position in the transporter chain; `None` for other roles
    pub order: Option<u32>,
    pub paper_signature_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The top-level shipment record, unique by `mtn`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub id: Option<Uuid>,
    pub mtn: String,
    pub status: Option<String>,
    pub submission_type: Option<String>,
    pub origin_type: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub potential_ship_date: Option<DateTime<Utc>>,
    pub rejection: bool,
    pub generator_id: Uuid,
    pub transporter_ids: Vec<Uuid>,
    pub designated_facility_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    /// ManifestHandler ids in manifest order: generator, transporters, facility
    pub fn manifest_handler_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.transporter_ids.len() + 2);
        ids.push(self.generator_id);
        ids.extend(self.transporter_ids.iter().copied());
        ids.push(self.designated_facility_id);
        ids
    }
}

/// A ManifestHandler joined with its handler and signatures for reading
#[derive(Debug, Clone)]
pub struct ManifestHandlerView {
    pub manifest_handler: ManifestHandler,
    pub handler: Handler,
    pub paper_signature: Option<PaperSignature>,
    pub e_signatures: Vec<ESignature>,
}

impl ManifestHandlerView {
    /// True when a paper signature or at least one e-signature exists
    pub fn signed(&self) -> bool {
        self.paper_signature.is_some() || !self.e_signatures.is_empty()
    }
}

impl std::fmt::Display for ManifestHandlerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ManifestHandler: {}", self.handler.epa_id)
    }
}
