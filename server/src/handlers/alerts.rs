//! Alert log queries

use crate::error::EngineError;
use crate::service::AlertService;
use protocol::AdminResponse;
use tracing::{error, info};
use uuid::Uuid;

pub async fn handle_list(service: &AlertService) -> AdminResponse {
    match service.list_alerts().await {
        Ok(entries) => AdminResponse::Alerts { entries },
        Err(e) => {
            error!("Failed to list alerts: {}", e);
            AdminResponse::error(e.to_string())
        }
    }
}

pub async fn handle_delete(service: &AlertService, id: Uuid) -> AdminResponse {
    match service.delete_alert(id).await {
        Ok(()) => {
            info!(id = %id, "Alert deleted");
            AdminResponse::Deleted { count: 1 }
        }
        Err(EngineError::NotFound(id)) => AdminResponse::NotFound { id },
        Err(e) => {
            error!(id = %id, "Failed to delete alert: {}", e);
            AdminResponse::error(e.to_string())
        }
    }
}

pub async fn handle_delete_all(service: &AlertService) -> AdminResponse {
    match service.delete_all_alerts().await {
        Ok(count) => {
            info!(count, "Alert log cleared");
            AdminResponse::Deleted { count }
        }
        Err(e) => {
            error!("Failed to clear alert log: {}", e);
            AdminResponse::error(e.to_string())
        }
    }
}
