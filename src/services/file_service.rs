//! The bundle of core components handed to the HTTP layer as router state.

use super::{
    links::ShareLinks,
    reader::ShareReader,
    upload::{UploadOrchestrator, UploadPolicy},
};
use crate::gateway::StorageGateway;
use std::sync::Arc;

/// Every component is built around the same gateway value; nothing reaches
/// the store through global state.
#[derive(Clone)]
pub struct FileService {
    pub gateway: Arc<dyn StorageGateway>,
    pub uploader: UploadOrchestrator,
    pub reader: ShareReader,
    pub links: ShareLinks,
    /// Publish uploads as soon as they are finalized.
    pub share_on_upload: bool,
}

impl FileService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        policy: UploadPolicy,
        public_origin: &str,
        share_on_upload: bool,
    ) -> Self {
        Self {
            uploader: UploadOrchestrator::new(gateway.clone(), policy),
            reader: ShareReader::new(gateway.clone()),
            links: ShareLinks::new(public_origin),
            gateway,
            share_on_upload,
        }
    }
}
