//! Gateway state
//!
//! Shared by the WebSocket endpoint and the REST handlers.

use std::sync::Arc;

use chat_common::RealtimeConfig;
use chat_core::CredentialVerifier;
use chat_service::ServiceContext;

use crate::engine::GatewayHandle;

#[derive(Clone)]
pub struct GatewayState {
    services: Arc<ServiceContext>,
    engine: GatewayHandle,
    verifier: Arc<dyn CredentialVerifier>,
    realtime: Arc<RealtimeConfig>,
}

impl GatewayState {
    pub fn new(
        services: ServiceContext,
        engine: GatewayHandle,
        verifier: Arc<dyn CredentialVerifier>,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            services: Arc::new(services),
            engine,
            verifier,
            realtime: Arc::new(realtime),
        }
    }

    pub fn service_context(&self) -> &ServiceContext {
        &self.services
    }

    pub fn engine(&self) -> &GatewayHandle {
        &self.engine
    }

    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.verifier.as_ref()
    }

    pub fn realtime(&self) -> &RealtimeConfig {
        &self.realtime
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("engine", &self.engine)
            .field("realtime", &self.realtime)
            .finish_non_exhaustive()
    }
}
