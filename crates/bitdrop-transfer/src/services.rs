//! Wiring of the pipeline components over one storage root

use std::sync::Arc;

use bitdrop_core::{AuthSecret, BitdropConfig, BitdropResult};
use bitdrop_crypto::KdfParams;
use bitdrop_storage::{DurableStore, Layout, StagingArea};

use crate::decrypt::DecryptionEngine;
use crate::deleter::RecordDeleter;
use crate::finalizer::{FinalizerSettings, UploadFinalizer};
use crate::notify::Notifier;
use crate::receiver::ChunkReceiver;
use crate::retriever::ContentRetriever;

/// Every component, sharing one staging area and one durable store.
pub struct Services {
    pub layout: Layout,
    pub staging: StagingArea,
    pub store: Arc<DurableStore>,
    pub receiver: ChunkReceiver,
    pub finalizer: UploadFinalizer,
    pub retriever: ContentRetriever,
    pub decrypter: DecryptionEngine,
    pub deleter: RecordDeleter,
}

impl Services {
    /// Open the store under `config.storage.root` and build the components.
    ///
    /// `auth` and `notifier` are resolved once by the caller and shared by
    /// every finalize.
    pub async fn open(
        config: &BitdropConfig,
        auth: AuthSecret,
        notifier: Arc<dyn Notifier>,
    ) -> BitdropResult<Self> {
        let layout = Layout::new(&config.storage.root);
        let staging = StagingArea::new(layout.clone());
        let store = Arc::new(DurableStore::open(layout.clone()).await?);
        let retriever = ContentRetriever::new(store.clone());
        let params = KdfParams {
            iterations: config.crypto.pbkdf2_iterations,
        };

        Ok(Self {
            receiver: ChunkReceiver::new(staging.clone()),
            finalizer: UploadFinalizer::new(
                staging.clone(),
                store.clone(),
                Arc::new(auth),
                notifier,
                FinalizerSettings::from(config),
            ),
            decrypter: DecryptionEngine::new(retriever.clone(), params),
            deleter: RecordDeleter::new(store.clone()),
            retriever,
            staging,
            store,
            layout,
        })
    }
}
