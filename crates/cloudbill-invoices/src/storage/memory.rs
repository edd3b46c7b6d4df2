use crate::domain::downtime::DowntimePeriod;
use crate::domain::invoices::{Invoice, FIRST_INVOICE_NUMBER};
use crate::domain::line_items::LineItem;
use crate::domain::resources::ResourceRef;
use crate::domain::types::{CustomerId, InvoiceId, InvoicePeriod, LineItemId};
use crate::error::{BillingError, Result};
use crate::storage::{DowntimeRepository, InvoiceRepository, LedgerSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct LedgerState {
    invoices: Vec<Invoice>,
    items: Vec<LineItem>,
    downtimes: Vec<DowntimePeriod>,
    invoice_index: HashMap<InvoiceId, usize>,
    period_index: HashMap<(CustomerId, InvoicePeriod), InvoiceId>,
    item_index: HashMap<LineItemId, usize>,
    next_number: u64,
}

impl LedgerState {
    fn insert_invoice(&mut self, mut invoice: Invoice) -> Result<Invoice> {
        let period_key = (invoice.customer_id.clone(), invoice.period);
        if self.period_index.contains_key(&period_key) {
            return Err(BillingError::DuplicateInvoice {
                customer: invoice.customer_id.to_string(),
                period: invoice.period.to_string(),
            });
        }

        if invoice.number == 0 {
            invoice.number = self.next_number.max(FIRST_INVOICE_NUMBER);
        }
        self.next_number = self.next_number.max(invoice.number + 1);

        self.period_index.insert(period_key, invoice.id);
        self.invoice_index.insert(invoice.id, self.invoices.len());
        self.invoices.push(invoice.clone());
        Ok(invoice)
    }

    fn insert_item(&mut self, item: LineItem) -> Result<()> {
        if !self.invoice_index.contains_key(&item.invoice_id) {
            return Err(BillingError::InvoiceNotFound {
                id: item.invoice_id.to_string(),
            });
        }
        self.item_index.insert(item.id, self.items.len());
        self.items.push(item);
        Ok(())
    }
}

/// Ledger held entirely in memory; the backing store of the binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self> {
        let mut state = LedgerState::default();
        for invoice in snapshot.invoices {
            state.insert_invoice(invoice)?;
        }
        for item in snapshot.items {
            state.insert_item(item)?;
        }
        state.downtimes = snapshot.downtimes;

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Copies invoices, items and downtimes out; the resource catalog is the caller's.
    pub async fn export(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        LedgerSnapshot {
            invoices: state.invoices.clone(),
            items: state.items.clone(),
            downtimes: state.downtimes.clone(),
            resources: Vec::new(),
        }
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryLedger {
    async fn create_invoice(&self, invoice: Invoice) -> Result<Invoice> {
        self.state.write().await.insert_invoice(invoice)
    }

    async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>> {
        let state = self.state.read().await;
        Ok(state
            .invoice_index
            .get(id)
            .map(|&index| state.invoices[index].clone()))
    }

    async fn find_invoice(
        &self,
        customer_id: &CustomerId,
        period: InvoicePeriod,
    ) -> Result<Option<Invoice>> {
        let state = self.state.read().await;
        Ok(state
            .period_index
            .get(&(customer_id.clone(), period))
            .and_then(|id| state.invoice_index.get(id))
            .map(|&index| state.invoices[index].clone()))
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<()> {
        let mut state = self.state.write().await;
        let index = *state
            .invoice_index
            .get(&invoice.id)
            .ok_or_else(|| BillingError::InvoiceNotFound {
                id: invoice.id.to_string(),
            })?;
        state.invoices[index] = invoice.clone();
        Ok(())
    }

    async fn list_invoices(&self, customer_id: Option<&CustomerId>) -> Result<Vec<Invoice>> {
        let state = self.state.read().await;
        Ok(state
            .invoices
            .iter()
            .filter(|invoice| customer_id.map_or(true, |c| &invoice.customer_id == c))
            .cloned()
            .collect())
    }

    async fn list_invoices_for_period(&self, period: InvoicePeriod) -> Result<Vec<Invoice>> {
        let state = self.state.read().await;
        Ok(state
            .invoices
            .iter()
            .filter(|invoice| invoice.period == period)
            .cloned()
            .collect())
    }

    async fn create_item(&self, item: &LineItem) -> Result<()> {
        self.state.write().await.insert_item(item.clone())
    }

    async fn get_item(&self, id: &LineItemId) -> Result<Option<LineItem>> {
        let state = self.state.read().await;
        Ok(state
            .item_index
            .get(id)
            .map(|&index| state.items[index].clone()))
    }

    async fn update_item(&self, item: &LineItem) -> Result<()> {
        let mut state = self.state.write().await;
        let index = *state
            .item_index
            .get(&item.id)
            .ok_or_else(|| BillingError::LineItemNotFound {
                id: item.id.to_string(),
            })?;
        state.items[index] = item.clone();
        Ok(())
    }

    async fn list_items(&self, invoice_id: &InvoiceId) -> Result<Vec<LineItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .iter()
            .filter(|item| &item.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn get_resource_items(&self, resource: &ResourceRef) -> Result<Vec<LineItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .iter()
            .filter(|item| item.source().as_ref() == Some(resource))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DowntimeRepository for InMemoryLedger {
    async fn create_downtime(&self, period: &DowntimePeriod) -> Result<()> {
        self.state.write().await.downtimes.push(period.clone());
        Ok(())
    }

    async fn get_downtimes(&self, resource: &ResourceRef) -> Result<Vec<DowntimePeriod>> {
        let state = self.state.read().await;
        Ok(state
            .downtimes
            .iter()
            .filter(|period| &period.resource == resource)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn invoice(customer: &str, year: i32, month: u32) -> Invoice {
        Invoice::new(
            CustomerId::new(customer),
            InvoicePeriod::new(year, month).unwrap(),
            Decimal::ZERO,
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invoice_numbers_are_sequential() {
        let ledger = InMemoryLedger::new();
        let first = ledger.create_invoice(invoice("acme", 2017, 1)).await.unwrap();
        let second = ledger.create_invoice(invoice("acme", 2017, 2)).await.unwrap();

        assert_eq!(first.number, 100_000);
        assert_eq!(second.number, 100_001);
    }

    #[tokio::test]
    async fn test_duplicate_period_is_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.create_invoice(invoice("acme", 2017, 1)).await.unwrap();

        let result = ledger.create_invoice(invoice("acme", 2017, 1)).await;
        assert!(matches!(result, Err(BillingError::DuplicateInvoice { .. })));

        ledger.create_invoice(invoice("globex", 2017, 1)).await.unwrap();
        assert_eq!(ledger.list_invoices(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_period() {
        let ledger = InMemoryLedger::new();
        let created = ledger.create_invoice(invoice("acme", 2017, 1)).await.unwrap();

        let found = ledger
            .find_invoice(&CustomerId::new("acme"), InvoicePeriod::new(2017, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(found, Some(created));
        assert!(ledger
            .find_invoice(&CustomerId::new("acme"), InvoicePeriod::new(2017, 2).unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
