use crate::{GatewayApi, ReuseCheckRequest, ReuseDecision};
use envpack_schema::ProjectId;

/// Asks the gateway whether a manifest's dependency set is already packaged.
///
/// Reuse is an optimization, so this never fails: an unreachable or confused
/// gateway is logged and treated as "not found", and the caller builds fresh.
pub struct ReuseResolver<'a> {
    gateway: &'a dyn GatewayApi,
}

impl<'a> ReuseResolver<'a> {
    pub fn new(gateway: &'a dyn GatewayApi) -> Self {
        Self { gateway }
    }

    pub fn check_reusable(&self, project: &ProjectId, manifest_text: &str) -> ReuseDecision {
        let request = ReuseCheckRequest {
            project_id: project.clone(),
            manifest_text: manifest_text.to_owned(),
        };
        match self.gateway.reusable_check(&request) {
            Ok(decision) if decision.is_reusable() => {
                tracing::info!(
                    "reusable artifact found for project {project}: {}",
                    decision.artifact_path
                );
                decision
            }
            Ok(decision) => {
                if decision.exists {
                    tracing::warn!(
                        "gateway reported a reusable artifact without a path; building fresh"
                    );
                }
                ReuseDecision::not_found()
            }
            Err(e) => {
                tracing::warn!("reuse check failed, building fresh: {e}");
                ReuseDecision::not_found()
            }
        }
    }
}
