//! Manifest documents as RCRAInfo returns them.
//!
//! Nested blocks the assemblers must see are kept as `Option` so a missing
//! key reaches the assembler and is reported there instead of failing the
//! whole deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::SiteType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPayload {
    pub manifest_tracking_number: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submission_type: Option<String>,
    #[serde(default)]
    pub origin_type: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipped_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub potential_ship_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection: Option<bool>,
    pub generator: ManifestHandlerPayload,
    #[serde(default)]
    pub transporters: Vec<ManifestHandlerPayload>,
    pub designated_facility: ManifestHandlerPayload,
}

/// A handler block plus the signatures it carries on this manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestHandlerPayload {
    #[serde(flatten)]
    pub handler: HandlerPayload,
    #[serde(rename = "paperSignatureInfo", default)]
    pub paper_signature: Option<PaperSignaturePayload>,
    #[serde(rename = "electronicSignaturesInfo", default)]
    pub e_signatures: Vec<ESignaturePayload>,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerPayload {
    #[serde(rename = "epaSiteId", default)]
    pub epa_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub site_type: Option<SiteType>,
    #[serde(default)]
    pub site_address: Option<AddressInput>,
    #[serde(rename = "mailingAddress", default)]
    pub mail_address: Option<AddressInput>,
    #[serde(default)]
    pub contact: Option<ContactPayload>,
    #[serde(default)]
    pub emergency_phone: Option<PhonePayload>,
    #[serde(default)]
    pub modified: Option<bool>,
    #[serde(default)]
    pub registered: Option<bool>,
    #[serde(default)]
    pub gis_primary: Option<bool>,
    #[serde(default)]
    pub can_esign: Option<bool>,
    #[serde(default)]
    pub limited_esign: Option<bool>,
    #[serde(rename = "hasRegisteredEmanifestUser", default)]
    pub registered_emanifest_user: Option<bool>,
}

/// Either a reference to an address already stored locally or the raw
/// fields of a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AddressInput {
    Existing(AddressRef),
    Raw(AddressPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressRef {
    pub address_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    #[serde(default)]
    pub street_number: Option<String>,
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<Locality>,
    #[serde(default)]
    pub state: Option<Locality>,
    #[serde(default)]
    pub country: Option<Locality>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// RCRAInfo's `{code, name}` shape used for cities, states and countries
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locality {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_initial: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub phone: Option<PhonePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhonePayload {
    pub number: String,
    #[serde(default)]
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSignaturePayload {
    #[serde(default)]
    pub printed_name: Option<String>,
    #[serde(rename = "signatureDate", default)]
    pub sign_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ESignaturePayload {
    #[serde(default)]
    pub signer: Option<SignerPayload>,
    #[serde(rename = "signatureDate", default)]
    pub sign_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cromerr_activity_id: Option<String>,
    #[serde(default)]
    pub on_behalf: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_initial: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub signer_role: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn address_input_distinguishes_reference_from_raw() {
        let id = Uuid::new_v4();
        let existing: AddressInput =
            serde_json::from_value(json!({ "addressId": id.to_string() })).unwrap();
        assert_eq!(existing, AddressInput::Existing(AddressRef { address_id: id }));

        let raw: AddressInput = serde_json::from_value(json!({
            "address1": "123 Main St",
            "city": { "name": "Richmond" },
            "state": { "code": "VA" },
            "zip": "23219"
        }))
        .unwrap();
        match raw {
            AddressInput::Raw(addr) => {
                assert_eq!(addr.address1, "123 Main St");
                assert_eq!(addr.state.and_then(|s| s.code).as_deref(), Some("VA"));
            }
            other => panic!("expected raw address, got {:?}", other),
        }
    }

    #[test]
    fn manifest_handler_reads_flattened_handler_and_signatures() {
        let mh: ManifestHandlerPayload = serde_json::from_value(json!({
            "epaSiteId": "VATESTGEN001",
            "name": "Test Generator",
            "siteType": "Generator",
            "hasRegisteredEmanifestUser": true,
            "paperSignatureInfo": {
                "printedName": "Jane Doe",
                "signatureDate": "2021-08-13T13:21:28Z"
            },
            "electronicSignaturesInfo": [
                { "signatureDate": "2021-08-14T10:00:00Z", "signer": { "userId": "jdoe" } }
            ]
        }))
        .unwrap();
        assert_eq!(mh.handler.epa_id.as_deref(), Some("VATESTGEN001"));
        assert_eq!(mh.handler.site_type, Some(SiteType::Generator));
        assert_eq!(mh.handler.registered_emanifest_user, Some(true));
        assert!(mh.handler.contact.is_none());
        assert!(mh.paper_signature.is_some());
        assert_eq!(mh.e_signatures.len(), 1);
    }
}
