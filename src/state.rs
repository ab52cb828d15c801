use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::assessment::{
    AssessmentResult, ChunkedAssessor, IseClient, IseConfig, Language, PronunciationAssessor,
};

/// Shared application state.
///
/// Holds no per-request data; every assessment opens its own provider session.
pub struct AppState {
    pub config: ServerConfig,
    pub ise: IseConfig,
    pub assessor: Arc<dyn PronunciationAssessor>,
}

impl AppState {
    /// Build state backed by the ISE WebSocket client.
    pub fn new(config: ServerConfig) -> AssessmentResult<Arc<Self>> {
        let ise = config.ise_config();
        let client = IseClient::new(ise.clone())?;
        info!(
            "ISE assessor ready (endpoint {}, language {:?}, session timeout {:?})",
            ise.endpoint, ise.language, ise.session_timeout
        );
        Ok(Self::with_assessor(config, Arc::new(client)))
    }

    /// Build state around any assessor.
    pub fn with_assessor(
        config: ServerConfig,
        assessor: Arc<dyn PronunciationAssessor>,
    ) -> Arc<Self> {
        let ise = config.ise_config();
        Arc::new(Self {
            config,
            ise,
            assessor,
        })
    }

    /// Long-audio orchestrator for one request.
    pub fn chunked_assessor(&self, language: Language) -> ChunkedAssessor {
        ChunkedAssessor::from_config(self.assessor.clone(), &self.ise).with_language(language)
    }
}
