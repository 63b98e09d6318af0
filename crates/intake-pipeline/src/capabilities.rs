//! The set of external collaborators a pipeline is wired with.

use std::sync::Arc;

use intake_core::traits::{
    AdmissionsCapability, BlobStorage, ClassificationCapability, ClinicalCapability,
    DocumentationCapability, ExtractionCapability, OcrProvider, ReimbursementCapability,
};

/// Handles to every external capability. Cheap to clone.
#[derive(Clone)]
pub struct Capabilities {
    pub blobs: Arc<dyn BlobStorage>,
    pub ocr: Arc<dyn OcrProvider>,
    pub classifier: Arc<dyn ClassificationCapability>,
    pub extractor: Arc<dyn ExtractionCapability>,
    pub admissions: Arc<dyn AdmissionsCapability>,
    pub reimbursement: Arc<dyn ReimbursementCapability>,
    pub clinical: Arc<dyn ClinicalCapability>,
    pub documentation: Arc<dyn DocumentationCapability>,
}
