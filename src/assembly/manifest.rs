use chrono::Utc;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::assembly::manifest_handler::ManifestHandlerAssembler;
use crate::constants::MTN_PATTERN;
use crate::context::SyncContext;
use crate::domain::{HandlerRole, Manifest};
use crate::error::{FieldError, Result, SyncError};
use crate::payload::ManifestPayload;
use crate::storage::Transaction;

const MANIFEST_SCHEMA_SOURCE: &str = include_str!("../../schemas/manifest.v1.json");

// jsonschema 0.17 borrows the schema for 'static; it is parsed once and leaked
static MANIFEST_SCHEMA: Lazy<std::result::Result<JSONSchema, String>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(MANIFEST_SCHEMA_SOURCE).map_err(|e| e.to_string())?;
    let schema_static: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::options()
        .compile(schema_static)
        .map_err(|e| e.to_string())
});

static MTN_RE: Lazy<std::result::Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(MTN_PATTERN));

/// Field-level validation of raw manifest documents
pub struct ManifestValidator;

impl ManifestValidator {
    /// Check `document` against the manifest schema and field rules and
    /// return the typed payload. Every violation found is reported.
    pub fn validate(document: &Value) -> Result<ManifestPayload> {
        let schema = MANIFEST_SCHEMA
            .as_ref()
            .map_err(|e| SyncError::Config(format!("manifest schema failed to compile: {}", e)))?;
        let mtn_re = MTN_RE
            .as_ref()
            .map_err(|e| SyncError::Config(format!("invalid MTN pattern: {}", e)))?;

        let mut errors: Vec<FieldError> = match schema.validate(document) {
            Ok(()) => Vec::new(),
            Err(violations) => violations
                .map(|v| FieldError {
                    path: pointer_or_root(&v.instance_path.to_string()),
                    message: v.to_string(),
                })
                .collect(),
        };

        if let Some(mtn) = document.get("manifestTrackingNumber").and_then(Value::as_str) {
            if !mtn_re.is_match(mtn) {
                errors.push(FieldError {
                    path: "/manifestTrackingNumber".to_string(),
                    message: format!("'{}' is not a valid manifest tracking number", mtn),
                });
            }
        }

        if !errors.is_empty() {
            warn!("malformed manifest data: {} field errors", errors.len());
            return Err(SyncError::InvalidManifest { errors });
        }

        serde_json::from_value(document.clone()).map_err(|e| SyncError::InvalidManifest {
            errors: vec![FieldError {
                path: "/".to_string(),
                message: e.to_string(),
            }],
        })
    }
}

fn pointer_or_root(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

/// Persists a validated manifest and its handler graph
pub struct ManifestAssembler;

impl ManifestAssembler {
    /// Must run inside the caller's transaction; nothing is visible until
    /// the caller commits.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, mtn = %payload.manifest_tracking_number))]
    pub async fn save(
        ctx: &SyncContext,
        tx: &mut dyn Transaction,
        payload: &ManifestPayload,
    ) -> Result<Manifest> {
        let mtn = &payload.manifest_tracking_number;
        if tx.get_manifest_by_mtn(mtn).await?.is_some() {
            return Err(SyncError::Conflict(format!("manifest {} already exists", mtn)));
        }

        let generator = ManifestHandlerAssembler::assemble(
            ctx,
            tx,
            HandlerRole::Generator,
            None,
            &payload.generator,
        )
        .await?;

        let mut transporter_ids = Vec::with_capacity(payload.transporters.len());
        for (index, transporter) in payload.transporters.iter().enumerate() {
            let order = transporter.order.unwrap_or(index as u32 + 1);
            let mh = ManifestHandlerAssembler::assemble(
                ctx,
                tx,
                HandlerRole::Transporter,
                Some(order),
                transporter,
            )
            .await?;
            transporter_ids.push((order, stored(mh.id)?));
        }
        transporter_ids.sort_by_key(|(order, _)| *order);

        let facility = ManifestHandlerAssembler::assemble(
            ctx,
            tx,
            HandlerRole::DesignatedFacility,
            None,
            &payload.designated_facility,
        )
        .await?;

        let mut manifest = Manifest {
            id: None,
            mtn: mtn.clone(),
            status: payload.status.clone(),
            submission_type: payload.submission_type.clone(),
            origin_type: payload.origin_type.clone(),
            created_date: payload.created_date,
            updated_date: payload.updated_date,
            shipped_date: payload.shipped_date,
            potential_ship_date: payload.potential_ship_date,
            rejection: payload.rejection.unwrap_or(false),
            generator_id: stored(generator.id)?,
            transporter_ids: transporter_ids.into_iter().map(|(_, id)| id).collect(),
            designated_facility_id: stored(facility.id)?,
            created_at: Utc::now(),
        };
        tx.create_manifest(&mut manifest).await?;
        debug!("manifest graph assembled for {}", ctx.username);
        info!("saved manifest {}", manifest.mtn);
        Ok(manifest)
    }
}

fn stored(id: Option<uuid::Uuid>) -> Result<uuid::Uuid> {
    id.ok_or_else(|| SyncError::Storage("manifest handler stored without id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStorage, Storage};
    use serde_json::json;

    fn handler(epa_id: &str) -> Value {
        json!({
            "epaSiteId": epa_id,
            "name": format!("Handler {}", epa_id),
            "siteAddress": { "address1": "1 Main St", "state": { "code": "VA" } },
            "mailingAddress": { "address1": "PO Box 1" },
            "contact": { "firstName": "Jane", "lastName": "Doe" }
        })
    }

    fn document() -> Value {
        json!({
            "manifestTrackingNumber": "123456789ELC",
            "status": "Scheduled",
            "generator": handler("VATESTGEN001"),
            "transporters": [
                { "order": 2, "epaSiteId": "VATESTTR0002", "name": "T2",
                  "siteAddress": { "address1": "2 Road" }, "mailingAddress": { "address1": "2 Road" },
                  "contact": {} },
                { "order": 1, "epaSiteId": "VATESTTR0001", "name": "T1",
                  "siteAddress": { "address1": "1 Road" }, "mailingAddress": { "address1": "1 Road" },
                  "contact": {} }
            ],
            "designatedFacility": handler("VATESTTSDF01")
        })
    }

    #[test]
    fn valid_document_yields_payload() {
        let payload = ManifestValidator::validate(&document()).unwrap();
        assert_eq!(payload.manifest_tracking_number, "123456789ELC");
        assert_eq!(payload.transporters.len(), 2);
    }

    #[test]
    fn bad_mtn_and_missing_generator_are_both_reported() {
        let mut doc = document();
        doc["manifestTrackingNumber"] = json!("NOT-AN-MTN");
        doc.as_object_mut().unwrap().remove("generator");

        match ManifestValidator::validate(&doc) {
            Err(SyncError::InvalidManifest { errors }) => {
                assert!(errors.iter().any(|e| e.path == "/manifestTrackingNumber"));
                assert!(errors.iter().any(|e| e.message.contains("generator")));
            }
            other => panic!("expected InvalidManifest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn transporters_are_stored_in_order() {
        let storage = InMemoryStorage::new();
        let ctx = SyncContext::new("testuser1");
        let payload = ManifestValidator::validate(&document()).unwrap();

        let mut tx = storage.begin().await.unwrap();
        let manifest = ManifestAssembler::save(&ctx, tx.as_mut(), &payload).await.unwrap();
        tx.commit().await.unwrap();

        let first = storage
            .get_manifest_handler(manifest.transporter_ids[0])
            .await
            .unwrap()
            .unwrap();
        let first_handler = storage.get_handler(first.handler_id).await.unwrap().unwrap();
        assert_eq!(first.order, Some(1));
        assert_eq!(first_handler.epa_id, "VATESTTR0001");
        assert_eq!(manifest.manifest_handler_ids().len(), 4);
        assert_eq!(storage.counts().await.unwrap().handlers, 4);
    }

    #[tokio::test]
    async fn duplicate_mtn_is_a_conflict() {
        let storage = InMemoryStorage::new();
        let ctx = SyncContext::new("testuser1");
        let payload = ManifestValidator::validate(&document()).unwrap();

        let mut tx = storage.begin().await.unwrap();
        ManifestAssembler::save(&ctx, tx.as_mut(), &payload).await.unwrap();
        let err = ManifestAssembler::save(&ctx, tx.as_mut(), &payload).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }
}
