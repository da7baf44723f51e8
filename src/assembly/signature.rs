use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ESignature, PaperSignature, Signer};
use crate::error::{Result, SyncError};
use crate::payload::{ESignaturePayload, PaperSignaturePayload, SignerPayload};
use crate::storage::Transaction;

/// Builds the paper and electronic signatures of a ManifestHandler.
///
/// The paper signature is referenced from the ManifestHandler row, so it is
/// created before that row exists; e-signatures reference the row and are
/// attached after it.
pub struct SignatureAssembler;

impl SignatureAssembler {
    pub async fn paper_signature(
        tx: &mut dyn Transaction,
        data: Option<&PaperSignaturePayload>,
    ) -> Result<Option<PaperSignature>> {
        let Some(data) = data else {
            return Ok(None);
        };
        let printed_name = data
            .printed_name
            .clone()
            .ok_or_else(|| missing("paperSignatureInfo.printedName"))?;
        let sign_date = data
            .sign_date
            .ok_or_else(|| missing("paperSignatureInfo.signatureDate"))?;

        let mut signature = PaperSignature {
            id: None,
            printed_name,
            sign_date,
            created_at: Utc::now(),
        };
        tx.create_paper_signature(&mut signature).await?;
        Ok(Some(signature))
    }

    /// Attach each e-signature, in order, to `manifest_handler_id`
    pub async fn attach_e_signatures(
        tx: &mut dyn Transaction,
        manifest_handler_id: Uuid,
        data: &[ESignaturePayload],
    ) -> Result<Vec<ESignature>> {
        debug!("e_signature data count {}", data.len());
        let mut created = Vec::with_capacity(data.len());
        for (index, entry) in data.iter().enumerate() {
            let sign_date = entry.sign_date.ok_or_else(|| {
                missing(&format!("electronicSignaturesInfo[{}].signatureDate", index))
            })?;
            let mut signature = ESignature {
                id: None,
                manifest_handler_id,
                signer: entry.signer.as_ref().map(signer),
                sign_date,
                cromerr_activity_id: entry.cromerr_activity_id.clone(),
                on_behalf: entry.on_behalf,
                created_at: Utc::now(),
            };
            tx.create_e_signature(&mut signature).await?;
            debug!("ESignature created for manifest handler {}", manifest_handler_id);
            created.push(signature);
        }
        Ok(created)
    }
}

fn signer(data: &SignerPayload) -> Signer {
    Signer {
        user_id: data.user_id.clone(),
        first_name: data.first_name.clone(),
        middle_initial: data.middle_initial.clone(),
        last_name: data.last_name.clone(),
        signer_role: data.signer_role.clone(),
        company_name: data.company_name.clone(),
    }
}

fn missing(key: &str) -> SyncError {
    warn!("Error while creating signature: missing {}", key);
    SyncError::MissingField(key.to_string())
}
