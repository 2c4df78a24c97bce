//! Business logic services.

use std::sync::Arc;

use crate::config::PipelinePolicy;
use crate::db::PipelineStore;

pub mod ai_client;
pub mod approval;
pub mod classifier;
pub mod dedup;
pub mod extraction;
pub mod extraction_schema;
pub mod quality_gate;
pub mod reconciliation;
pub mod status;
pub mod storage;
pub mod sweeper;
pub mod transform;
pub mod upload;

pub use ai_client::{DocumentAi, DocumentUpload, HttpDocumentAi};
pub use classifier::{Classification, ClassifierRule};
pub use storage::{MemoryObjectStore, ObjectStore, S3Storage};
pub use sweeper::{SweeperConfig, start_sweeper_task};
pub use transform::waste::HazardRule;

/// Collaborators and policy shared by every pipeline operation.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn PipelineStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub ai: Arc<dyn DocumentAi>,
    pub policy: Arc<PipelinePolicy>,
    /// Ordered destination rules, first match wins
    pub classifier_rules: Arc<Vec<ClassifierRule>>,
    /// Ordered waste hazard keyword rules, first match wins
    pub hazard_rules: Arc<Vec<HazardRule>>,
    pub max_upload_size: usize,
}

impl PipelineContext {
    /// Context with the default classifier and hazard rule tables.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        objects: Arc<dyn ObjectStore>,
        ai: Arc<dyn DocumentAi>,
        policy: PipelinePolicy,
        max_upload_size: usize,
    ) -> Self {
        Self {
            store,
            objects,
            ai,
            policy: Arc::new(policy),
            classifier_rules: Arc::new(classifier::default_rules()),
            hazard_rules: Arc::new(transform::waste::default_hazard_rules()),
            max_upload_size,
        }
    }
}
