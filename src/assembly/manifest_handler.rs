use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::assembly::handler::HandlerRegistry;
use crate::assembly::signature::SignatureAssembler;
use crate::context::SyncContext;
use crate::domain::{HandlerRole, ManifestHandler, ManifestHandlerView};
use crate::error::{Result, SyncError};
use crate::payload::ManifestHandlerPayload;
use crate::storage::{Storage, Transaction};
use uuid::Uuid;

/// Composes handler resolution and signatures into one ManifestHandler
pub struct ManifestHandlerAssembler;

impl ManifestHandlerAssembler {
    #[instrument(skip_all, fields(run_id = %ctx.run_id, role = ?role))]
    pub async fn assemble(
        ctx: &SyncContext,
        tx: &mut dyn Transaction,
        role: HandlerRole,
        order: Option<u32>,
        data: &ManifestHandlerPayload,
    ) -> Result<ManifestHandler> {
        let paper_signature =
            SignatureAssembler::paper_signature(tx, data.paper_signature.as_ref()).await?;

        let resolution = HandlerRegistry::get_or_create(ctx, tx, &data.handler)
            .await
            .map_err(|e| {
                warn!("Error while creating manifest handler: {}", e);
                e
            })?;
        if resolution.was_created() {
            debug!("Handler created {}", resolution.handler());
        } else {
            debug!("Using existing Handler {}", resolution.handler());
        }
        let handler = resolution.into_handler();
        let handler_id = handler
            .id
            .ok_or_else(|| SyncError::Storage(format!("handler {} has no id", handler)))?;

        let mut manifest_handler = ManifestHandler {
            id: None,
            handler_id,
            role,
            order,
            paper_signature_id: paper_signature.and_then(|s| s.id),
            created_at: Utc::now(),
        };
        let manifest_handler_id = tx.create_manifest_handler(&mut manifest_handler).await?;
        debug!("ManifestHandler created for {}", handler);

        SignatureAssembler::attach_e_signatures(tx, manifest_handler_id, &data.e_signatures).await?;

        Ok(manifest_handler)
    }
}

/// Load a committed ManifestHandler with its handler and signatures
pub async fn load_view(storage: &dyn Storage, id: Uuid) -> Result<ManifestHandlerView> {
    let manifest_handler = storage
        .get_manifest_handler(id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("manifest handler {}", id)))?;
    let handler = storage
        .get_handler(manifest_handler.handler_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("handler {}", manifest_handler.handler_id)))?;
    let paper_signature = match manifest_handler.paper_signature_id {
        Some(signature_id) => storage.get_paper_signature(signature_id).await?,
        None => None,
    };
    let e_signatures = storage.get_e_signatures_for(id).await?;

    Ok(ManifestHandlerView {
        manifest_handler,
        handler,
        paper_signature,
        e_signatures,
    })
}

/// Whether a committed ManifestHandler carries any signature
pub async fn is_signed(storage: &dyn Storage, id: Uuid) -> Result<bool> {
    Ok(load_view(storage, id).await?.signed())
}
