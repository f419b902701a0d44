//! Rule set queries and patches

use crate::service::AlertService;
use protocol::{AdminResponse, RulePatchSet};
use tracing::{info, warn};

pub async fn handle_get(service: &AlertService) -> AdminResponse {
    AdminResponse::Rules {
        rules: service.rules().await.as_ref().clone(),
    }
}

pub async fn handle_update(service: &AlertService, patch: &RulePatchSet) -> AdminResponse {
    match service.update_rules(patch).await {
        Ok(rules) => {
            info!(patched = patch.len(), "Rules updated");
            AdminResponse::Rules {
                rules: rules.as_ref().clone(),
            }
        }
        Err(e) => {
            warn!("Rule update rejected: {}", e);
            AdminResponse::error(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::service;
    use protocol::{RulePatch, Threshold};
    use tempfile::TempDir;

    fn patch(title: &str, enabled: bool, variable: Option<(&str, Threshold)>) -> RulePatchSet {
        let mut variables = indexmap::IndexMap::new();
        if let Some((name, threshold)) = variable {
            variables.insert(name.to_string(), threshold);
        }
        let mut set = RulePatchSet::new();
        set.insert(title.to_string(), RulePatch { enabled, variables });
        set
    }

    #[tokio::test]
    async fn test_update_returns_new_rules() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 50);

        let response = handle_update(
            &service,
            &patch("Temp", true, Some(("temp", Threshold::new(-10.0, 70.0)))),
        )
        .await;

        match response {
            AdminResponse::Rules { rules } => {
                assert_eq!(rules[0].variables["temp"], Threshold::new(-10.0, 70.0));
                assert_eq!(rules.len(), 2);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(handle_get(&service).await, AdminResponse::Rules {
            rules: service.rules().await.as_ref().clone()
        });
    }

    #[tokio::test]
    async fn test_invalid_patch_leaves_rules_alone() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 50);
        let before = handle_get(&service).await;

        let response = handle_update(
            &service,
            &patch("Temp", true, Some(("temp", Threshold::new(90.0, 10.0)))),
        )
        .await;

        assert!(matches!(response, AdminResponse::Error { .. }));
        assert_eq!(handle_get(&service).await, before);
    }
}
