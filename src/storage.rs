use crate::domain::*;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Row counts per record type, mostly for checking rollbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub addresses: usize,
    pub contacts: usize,
    pub epa_phones: usize,
    pub handlers: usize,
    pub paper_signatures: usize,
    pub e_signatures: usize,
    pub manifest_handlers: usize,
    pub manifests: usize,
}

/// Committed-state access plus the entry point for units of work.
///
/// The `get_*` reads see committed state only. They may be called while a
/// transaction is open, including from the task that holds it.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a unit of work. Writes become visible only on commit.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn get_address(&self, id: Uuid) -> Result<Option<Address>>;
    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>>;
    async fn get_epa_phone(&self, id: Uuid) -> Result<Option<EpaPhone>>;
    async fn get_handler_by_epa_id(&self, epa_id: &str) -> Result<Option<Handler>>;
    async fn get_handler(&self, id: Uuid) -> Result<Option<Handler>>;
    async fn get_paper_signature(&self, id: Uuid) -> Result<Option<PaperSignature>>;
    async fn get_e_signatures_for(&self, manifest_handler_id: Uuid) -> Result<Vec<ESignature>>;
    async fn get_manifest_handler(&self, id: Uuid) -> Result<Option<ManifestHandler>>;
    async fn get_manifest_by_mtn(&self, mtn: &str) -> Result<Option<Manifest>>;
    async fn counts(&self) -> Result<StoreCounts>;
}

/// A single atomic unit of work. Dropping it without `commit` discards
/// every write made through it.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>>;
    async fn get_handler_by_epa_id(&self, epa_id: &str) -> Result<Option<Handler>>;
    async fn get_manifest_by_mtn(&self, mtn: &str) -> Result<Option<Manifest>>;

    async fn create_address(&mut self, address: &mut Address) -> Result<Uuid>;
    async fn create_contact(&mut self, contact: &mut Contact) -> Result<Uuid>;
    async fn create_epa_phone(&mut self, phone: &mut EpaPhone) -> Result<Uuid>;
    async fn create_handler(&mut self, handler: &mut Handler) -> Result<Uuid>;
    async fn create_paper_signature(&mut self, signature: &mut PaperSignature) -> Result<Uuid>;
    async fn create_e_signature(&mut self, signature: &mut ESignature) -> Result<Uuid>;
    async fn create_manifest_handler(&mut self, manifest_handler: &mut ManifestHandler)
        -> Result<Uuid>;
    async fn create_manifest(&mut self, manifest: &mut Manifest) -> Result<Uuid>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    addresses: HashMap<Uuid, Address>,
    contacts: HashMap<Uuid, Contact>,
    epa_phones: HashMap<Uuid, EpaPhone>,
    handlers: HashMap<Uuid, Handler>,
    handler_ids_by_epa_id: HashMap<String, Uuid>,
    paper_signatures: HashMap<Uuid, PaperSignature>,
    attached_paper_signatures: HashSet<Uuid>,
    e_signatures: HashMap<Uuid, ESignature>,
    manifest_handlers: HashMap<Uuid, ManifestHandler>,
    manifests: HashMap<Uuid, Manifest>,
    manifest_ids_by_mtn: HashMap<String, Uuid>,
}

impl StoreState {
    fn handler_by_epa_id(&self, epa_id: &str) -> Option<Handler> {
        self.handler_ids_by_epa_id
            .get(epa_id)
            .and_then(|id| self.handlers.get(id))
            .cloned()
    }

    fn manifest_by_mtn(&self, mtn: &str) -> Option<Manifest> {
        self.manifest_ids_by_mtn
            .get(mtn)
            .and_then(|id| self.manifests.get(id))
            .cloned()
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            addresses: self.addresses.len(),
            contacts: self.contacts.len(),
            epa_phones: self.epa_phones.len(),
            handlers: self.handlers.len(),
            paper_signatures: self.paper_signatures.len(),
            e_signatures: self.e_signatures.len(),
            manifest_handlers: self.manifest_handlers.len(),
            manifests: self.manifests.len(),
        }
    }

    /// Move every record written by a transaction into this state
    fn absorb(&mut self, pending: StoreState) {
        self.addresses.extend(pending.addresses);
        self.contacts.extend(pending.contacts);
        self.epa_phones.extend(pending.epa_phones);
        self.handlers.extend(pending.handlers);
        self.handler_ids_by_epa_id
            .extend(pending.handler_ids_by_epa_id);
        self.paper_signatures.extend(pending.paper_signatures);
        self.attached_paper_signatures
            .extend(pending.attached_paper_signatures);
        self.e_signatures.extend(pending.e_signatures);
        self.manifest_handlers.extend(pending.manifest_handlers);
        self.manifests.extend(pending.manifests);
        self.manifest_ids_by_mtn.extend(pending.manifest_ids_by_mtn);
    }
}

/// In-memory storage implementation for development/testing.
///
/// Transactions are serializable: `begin` takes the writer lock and holds it
/// until the transaction commits or drops. A transaction records only its
/// own writes and reads through to the committed state, which cannot change
/// underneath it. Committed reads take a separate read lock and never wait
/// on an open transaction.
#[derive(Clone)]
pub struct InMemoryStorage {
    committed: Arc<RwLock<StoreState>>,
    writer: Arc<Mutex<()>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(StoreState::default())),
            writer: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let writer = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            _writer: writer,
            committed: self.committed.clone(),
            pending: StoreState::default(),
        }))
    }

    async fn get_address(&self, id: Uuid) -> Result<Option<Address>> {
        Ok(self.committed.read().await.addresses.get(&id).cloned())
    }

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>> {
        Ok(self.committed.read().await.contacts.get(&id).cloned())
    }

    async fn get_epa_phone(&self, id: Uuid) -> Result<Option<EpaPhone>> {
        Ok(self.committed.read().await.epa_phones.get(&id).cloned())
    }

    async fn get_handler_by_epa_id(&self, epa_id: &str) -> Result<Option<Handler>> {
        Ok(self.committed.read().await.handler_by_epa_id(epa_id))
    }

    async fn get_handler(&self, id: Uuid) -> Result<Option<Handler>> {
        Ok(self.committed.read().await.handlers.get(&id).cloned())
    }

    async fn get_paper_signature(&self, id: Uuid) -> Result<Option<PaperSignature>> {
        Ok(self.committed.read().await.paper_signatures.get(&id).cloned())
    }

    async fn get_e_signatures_for(&self, manifest_handler_id: Uuid) -> Result<Vec<ESignature>> {
        let state = self.committed.read().await;
        let mut signatures: Vec<ESignature> = state
            .e_signatures
            .values()
            .filter(|s| s.manifest_handler_id == manifest_handler_id)
            .cloned()
            .collect();
        signatures.sort_by(|a, b| a.sign_date.cmp(&b.sign_date));
        Ok(signatures)
    }

    async fn get_manifest_handler(&self, id: Uuid) -> Result<Option<ManifestHandler>> {
        Ok(self.committed.read().await.manifest_handlers.get(&id).cloned())
    }

    async fn get_manifest_by_mtn(&self, mtn: &str) -> Result<Option<Manifest>> {
        Ok(self.committed.read().await.manifest_by_mtn(mtn))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        Ok(self.committed.read().await.counts())
    }
}

pub struct InMemoryTransaction {
    _writer: OwnedMutexGuard<()>,
    committed: Arc<RwLock<StoreState>>,
    pending: StoreState,
}

impl InMemoryTransaction {
    /// Look in this transaction's writes first, then in committed state
    async fn find<T>(&self, lookup: impl Fn(&StoreState) -> Option<T>) -> Option<T> {
        match lookup(&self.pending) {
            Some(found) => Some(found),
            None => lookup(&*self.committed.read().await),
        }
    }

    async fn exists(&self, check: impl Fn(&StoreState) -> bool) -> bool {
        check(&self.pending) || check(&*self.committed.read().await)
    }

    async fn require(&self, what: &str, id: Uuid, check: impl Fn(&StoreState) -> bool) -> Result<()> {
        if self.exists(check).await {
            Ok(())
        } else {
            Err(SyncError::NotFound(format!("{} {}", what, id)))
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_address(&self, id: Uuid) -> Result<Option<Address>> {
        Ok(self.find(|s| s.addresses.get(&id).cloned()).await)
    }

    async fn get_handler_by_epa_id(&self, epa_id: &str) -> Result<Option<Handler>> {
        Ok(self.find(|s| s.handler_by_epa_id(epa_id)).await)
    }

    async fn get_manifest_by_mtn(&self, mtn: &str) -> Result<Option<Manifest>> {
        Ok(self.find(|s| s.manifest_by_mtn(mtn)).await)
    }

    async fn create_address(&mut self, address: &mut Address) -> Result<Uuid> {
        let id = Uuid::new_v4();
        address.id = Some(id);
        self.pending.addresses.insert(id, address.clone());

        debug!("Created address: {} with id {}", address.address1, id);
        Ok(id)
    }

    async fn create_contact(&mut self, contact: &mut Contact) -> Result<Uuid> {
        let id = Uuid::new_v4();
        contact.id = Some(id);
        self.pending.contacts.insert(id, contact.clone());

        debug!("Created contact with id {}", id);
        Ok(id)
    }

    async fn create_epa_phone(&mut self, phone: &mut EpaPhone) -> Result<Uuid> {
        let id = Uuid::new_v4();
        phone.id = Some(id);
        self.pending.epa_phones.insert(id, phone.clone());

        debug!("Created emergency phone: {} with id {}", phone.number, id);
        Ok(id)
    }

    async fn create_handler(&mut self, handler: &mut Handler) -> Result<Uuid> {
        let epa_id = handler.epa_id.as_str();
        if self.exists(|s| s.handler_ids_by_epa_id.contains_key(epa_id)).await {
            return Err(SyncError::Conflict(format!(
                "handler with epa_id {} already exists",
                handler.epa_id
            )));
        }
        let site = handler.site_address_id;
        let mail = handler.mail_address_id;
        let contact = handler.contact_id;
        self.require("address", site, |s| s.addresses.contains_key(&site))
            .await?;
        self.require("address", mail, |s| s.addresses.contains_key(&mail))
            .await?;
        self.require("contact", contact, |s| s.contacts.contains_key(&contact))
            .await?;
        if let Some(phone) = handler.emergency_phone_id {
            self.require("emergency phone", phone, |s| s.epa_phones.contains_key(&phone))
                .await?;
        }

        let id = Uuid::new_v4();
        handler.id = Some(id);
        self.pending
            .handler_ids_by_epa_id
            .insert(handler.epa_id.clone(), id);
        self.pending.handlers.insert(id, handler.clone());

        debug!("Created handler: {} with id {}", handler.epa_id, id);
        Ok(id)
    }

    async fn create_paper_signature(&mut self, signature: &mut PaperSignature) -> Result<Uuid> {
        let id = Uuid::new_v4();
        signature.id = Some(id);
        self.pending.paper_signatures.insert(id, signature.clone());

        debug!("Created paper signature: {} with id {}", signature.printed_name, id);
        Ok(id)
    }

    async fn create_e_signature(&mut self, signature: &mut ESignature) -> Result<Uuid> {
        let mh_id = signature.manifest_handler_id;
        self.require("manifest handler", mh_id, |s| {
            s.manifest_handlers.contains_key(&mh_id)
        })
        .await?;

        let id = Uuid::new_v4();
        signature.id = Some(id);
        self.pending.e_signatures.insert(id, signature.clone());

        debug!("Created e-signature with id {}", id);
        Ok(id)
    }

    async fn create_manifest_handler(
        &mut self,
        manifest_handler: &mut ManifestHandler,
    ) -> Result<Uuid> {
        let handler_id = manifest_handler.handler_id;
        self.require("handler", handler_id, |s| s.handlers.contains_key(&handler_id))
            .await?;
        if let Some(signature_id) = manifest_handler.paper_signature_id {
            self.require("paper signature", signature_id, |s| {
                s.paper_signatures.contains_key(&signature_id)
            })
            .await?;
            if self
                .exists(|s| s.attached_paper_signatures.contains(&signature_id))
                .await
            {
                return Err(SyncError::Conflict(format!(
                    "paper signature {} is already attached",
                    signature_id
                )));
            }
            self.pending.attached_paper_signatures.insert(signature_id);
        }

        let id = Uuid::new_v4();
        manifest_handler.id = Some(id);
        self.pending
            .manifest_handlers
            .insert(id, manifest_handler.clone());

        debug!("Created manifest handler with id {}", id);
        Ok(id)
    }

    async fn create_manifest(&mut self, manifest: &mut Manifest) -> Result<Uuid> {
        let mtn = manifest.mtn.as_str();
        if self.exists(|s| s.manifest_ids_by_mtn.contains_key(mtn)).await {
            return Err(SyncError::Conflict(format!(
                "manifest {} already exists",
                manifest.mtn
            )));
        }
        for mh_id in manifest.manifest_handler_ids() {
            self.require("manifest handler", mh_id, |s| {
                s.manifest_handlers.contains_key(&mh_id)
            })
            .await?;
        }

        let id = Uuid::new_v4();
        manifest.id = Some(id);
        self.pending
            .manifest_ids_by_mtn
            .insert(manifest.mtn.clone(), id);
        self.pending.manifests.insert(id, manifest.clone());

        debug!("Created manifest: {} with id {}", manifest.mtn, id);
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            _writer,
            committed,
            pending,
        } = *self;
        let written = pending.counts();
        committed.write().await.absorb(pending);
        debug!("Committed transaction: {:?}", written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn address(line: &str) -> Address {
        Address {
            id: None,
            street_number: None,
            address1: line.to_string(),
            address2: None,
            city: Some("Richmond".to_string()),
            state: Some("VA".to_string()),
            country: Some("US".to_string()),
            zip: Some("23219".to_string()),
            created_at: Utc::now(),
        }
    }

    fn contact() -> Contact {
        Contact {
            id: None,
            first_name: Some("Jane".to_string()),
            middle_initial: None,
            last_name: Some("Doe".to_string()),
            email: None,
            company_name: None,
            phone: None,
            created_at: Utc::now(),
        }
    }

    async fn insert_handler(tx: &mut Box<dyn Transaction>, epa_id: &str) -> Result<Uuid> {
        let site = tx.create_address(&mut address("1 Site Rd")).await?;
        let mail = tx.create_address(&mut address("2 Mail Rd")).await?;
        let contact_id = tx.create_contact(&mut contact()).await?;
        let mut handler = Handler {
            id: None,
            epa_id: epa_id.to_string(),
            name: "Test Handler".to_string(),
            site_type: Some(SiteType::Generator),
            site_address_id: site,
            mail_address_id: mail,
            contact_id,
            emergency_phone_id: None,
            modified: None,
            registered: None,
            gis_primary: None,
            can_esign: None,
            limited_esign: None,
            registered_emanifest_user: None,
            created_at: Utc::now(),
        };
        tx.create_handler(&mut handler).await
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let id = insert_handler(&mut tx, "VATEST000001").await.unwrap();
        tx.commit().await.unwrap();

        let handler = storage.get_handler_by_epa_id("VATEST000001").await.unwrap();
        assert_eq!(handler.and_then(|h| h.id), Some(id));
        assert_eq!(storage.counts().await.unwrap().addresses, 2);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let storage = InMemoryStorage::new();
        {
            let mut tx = storage.begin().await.unwrap();
            insert_handler(&mut tx, "VATEST000001").await.unwrap();
        }
        assert_eq!(storage.counts().await.unwrap(), StoreCounts::default());
        assert!(storage
            .get_handler_by_epa_id("VATEST000001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_epa_id_is_a_conflict() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        insert_handler(&mut tx, "VATEST000001").await.unwrap();
        let err = insert_handler(&mut tx, "VATEST000001").await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn reads_do_not_wait_on_an_open_transaction() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        insert_handler(&mut tx, "VATEST000001").await.unwrap();

        let seen = tokio::time::timeout(
            Duration::from_secs(1),
            storage.get_handler_by_epa_id("VATEST000001"),
        )
        .await
        .expect("committed read blocked behind the open transaction")
        .unwrap();
        assert!(seen.is_none());

        tx.commit().await.unwrap();
        assert!(storage
            .get_handler_by_epa_id("VATEST000001")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn later_transaction_sees_earlier_commits() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let id = insert_handler(&mut tx, "VATEST000001").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        let found = tx.get_handler_by_epa_id("VATEST000001").await.unwrap();
        assert_eq!(found.and_then(|h| h.id), Some(id));
        let err = insert_handler(&mut tx, "VATEST000001").await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        drop(tx);

        let counts = storage.counts().await.unwrap();
        assert_eq!(counts.handlers, 1);
        assert_eq!(counts.addresses, 2);
    }

    #[tokio::test]
    async fn e_signature_requires_its_manifest_handler() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let mut signature = ESignature {
            id: None,
            manifest_handler_id: Uuid::new_v4(),
            signer: None,
            sign_date: Utc::now(),
            cromerr_activity_id: None,
            on_behalf: None,
            created_at: Utc::now(),
        };
        let err = tx.create_e_signature(&mut signature).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
