use nominalroll_auth::{Principal, require};
use nominalroll_personnel::{AuditLogEntry, AuditQuery};

use super::{PersonnelService, ServiceResult};

impl PersonnelService {
    /// Read-only, newest first.
    pub async fn query_audit(&self, principal: &Principal, query: AuditQuery) -> ServiceResult<Vec<AuditLogEntry>> {
        require(principal.capabilities().view_audit, "view the audit log")?;
        Ok(self.store.query_audit(&query).await?)
    }
}
