pub mod locks;
pub mod memory;
pub mod snapshot;

use crate::domain::downtime::DowntimePeriod;
use crate::domain::invoices::Invoice;
use crate::domain::line_items::LineItem;
use crate::domain::resources::ResourceRef;
use crate::domain::types::{CustomerId, InvoiceId, InvoicePeriod, LineItemId};
use crate::error::Result;
use async_trait::async_trait;

pub use locks::{LockKey, LockRegistry, LockSet};
pub use memory::InMemoryLedger;
pub use snapshot::LedgerSnapshot;

/// Persistence of invoices and their line items.
///
/// Implementations must reject a second invoice for the same customer and
/// period, and list line items in creation order.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Stores a new invoice and returns it with its number assigned.
    async fn create_invoice(&self, invoice: Invoice) -> Result<Invoice>;
    async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>>;
    async fn find_invoice(
        &self,
        customer_id: &CustomerId,
        period: InvoicePeriod,
    ) -> Result<Option<Invoice>>;
    async fn update_invoice(&self, invoice: &Invoice) -> Result<()>;
    async fn list_invoices(&self, customer_id: Option<&CustomerId>) -> Result<Vec<Invoice>>;
    async fn list_invoices_for_period(&self, period: InvoicePeriod) -> Result<Vec<Invoice>>;

    async fn create_item(&self, item: &LineItem) -> Result<()>;
    async fn get_item(&self, id: &LineItemId) -> Result<Option<LineItem>>;
    async fn update_item(&self, item: &LineItem) -> Result<()>;
    async fn list_items(&self, invoice_id: &InvoiceId) -> Result<Vec<LineItem>>;
    /// Items billing `resource`, live or frozen, across all invoices in creation order.
    async fn get_resource_items(&self, resource: &ResourceRef) -> Result<Vec<LineItem>>;
}

#[async_trait]
pub trait DowntimeRepository: Send + Sync {
    async fn create_downtime(&self, period: &DowntimePeriod) -> Result<()>;
    async fn get_downtimes(&self, resource: &ResourceRef) -> Result<Vec<DowntimePeriod>>;
}
