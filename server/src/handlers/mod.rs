//! Admin request handlers

pub mod alerts;
pub mod rules;
pub mod subscribe;

use crate::service::AlertService;
use crate::session::SessionManager;
use protocol::{AdminRequest, AdminResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Shared state every admin handler needs
#[derive(Clone)]
pub struct AdminContext {
    pub service: Arc<AlertService>,
    pub sessions: Arc<SessionManager>,
}

/// Handle one decoded admin request
pub async fn dispatch(request: AdminRequest, peer: SocketAddr, ctx: &AdminContext) -> AdminResponse {
    debug!(peer = %peer, request = ?request, "Admin request");

    match request {
        AdminRequest::ListAlerts => alerts::handle_list(&ctx.service).await,
        AdminRequest::DeleteAlert { id } => alerts::handle_delete(&ctx.service, id).await,
        AdminRequest::DeleteAllAlerts => alerts::handle_delete_all(&ctx.service).await,
        AdminRequest::GetRules => rules::handle_get(&ctx.service).await,
        AdminRequest::UpdateRules { patch } => rules::handle_update(&ctx.service, &patch).await,
        AdminRequest::Subscribe { channel } => {
            subscribe::handle_subscribe(&ctx.sessions, peer, channel).await
        }
        AdminRequest::Unsubscribe { channel } => {
            subscribe::handle_unsubscribe(&ctx.sessions, peer, channel).await
        }
    }
}
