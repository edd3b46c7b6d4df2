use crate::domain::calendar;
use crate::domain::downtime::{self, DowntimePeriod, DowntimePolicy};
use crate::domain::invoices::{Invoice, InvoiceSummary};
use crate::domain::line_items::{CompensationOverrides, LineItem};
use crate::domain::resources::{ResourceDescriptor, ResourceRef, ResourceResolver};
use crate::domain::types::{CustomerId, InvoiceId, InvoicePeriod, LineItemId};
use crate::error::{BillingError, Result};
use crate::storage::{DowntimeRepository, InvoiceRepository, LockKey, LockRegistry, LockSet};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables the manager applies to every invoice and downtime it handles.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoicePolicy {
    pub default_tax_percent: Decimal,
    pub payment_interval_days: u32,
    pub downtime: DowntimePolicy,
}

impl Default for InvoicePolicy {
    fn default() -> Self {
        Self {
            default_tax_percent: Decimal::ZERO,
            payment_interval_days: 30,
            downtime: DowntimePolicy {
                minimal: Some(Duration::hours(24)),
                maximal: Some(Duration::days(30)),
            },
        }
    }
}

/// Outcome of one monthly rollover run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverReport {
    pub closing_period: Option<InvoicePeriod>,
    pub opening_period: Option<InvoicePeriod>,
    /// Invoices moved from pending to created by this run.
    pub issued: Vec<InvoiceId>,
    /// Invoices opened by this run for the new period.
    pub opened: Vec<InvoiceId>,
    pub frozen_items: usize,
    pub carried_items: usize,
}

/// Accepted downtime and the credits it produced, one per item it overlapped.
#[derive(Debug, Clone, PartialEq)]
pub struct DowntimeOutcome {
    pub period: DowntimePeriod,
    pub compensations: Vec<LineItem>,
}

impl DowntimeOutcome {
    pub fn credited(&self) -> Result<Decimal> {
        crate::domain::invoices::price(&self.compensations)
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Issue,
    Pay,
    Cancel,
}

#[async_trait]
pub trait InvoiceOperations: Send + Sync {
    /// Opens a line item for `resource` on its customer's invoice for the
    /// month of `start` (default: `now`), creating that invoice if needed.
    async fn register(
        &self,
        resource: ResourceRef,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<LineItem>;

    /// Resource deleted: terminates every live item billing it.
    async fn terminate_resource(
        &self,
        resource: ResourceRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<LineItem>>;

    /// Resource attributes changed: closes the live items and bills the new
    /// attributes from `at`.
    async fn reprice_resource(&self, resource: ResourceRef, at: DateTime<Utc>)
        -> Result<LineItem>;

    async fn freeze(&self, item_id: &LineItemId, now: DateTime<Utc>) -> Result<LineItem>;

    async fn terminate(
        &self,
        item_id: &LineItemId,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<LineItem>;

    async fn shift_backward(
        &self,
        item_id: &LineItemId,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<LineItem>;

    async fn extend_to_end_of_day(&self, item_id: &LineItemId, now: DateTime<Utc>)
        -> Result<LineItem>;

    async fn create_compensation(
        &self,
        item_id: &LineItemId,
        name: &str,
        overrides: CompensationOverrides,
        now: DateTime<Utc>,
    ) -> Result<LineItem>;

    async fn set_created(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice>;

    async fn mark_paid(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice>;

    async fn cancel(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice>;

    /// Closes the month before `now` and opens the month of `now`.
    ///
    /// Safe to re-run: issued invoices, existing next invoices and items
    /// already carried forward are detected and skipped.
    async fn rollover(&self, now: DateTime<Utc>) -> Result<RolloverReport>;

    async fn summary(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<InvoiceSummary>;

    async fn validate_downtime(&self, candidate: &DowntimePeriod, now: DateTime<Utc>)
        -> Result<()>;

    /// Validates and records an outage, then credits it on every item that
    /// billed the resource during the outage, each clamped to its own window.
    async fn report_downtime(
        &self,
        resource: ResourceRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DowntimeOutcome>;

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice>;

    async fn find_invoice(
        &self,
        customer_id: &CustomerId,
        period: InvoicePeriod,
    ) -> Result<Option<Invoice>>;

    async fn list_invoices(&self, customer_id: Option<&CustomerId>) -> Result<Vec<Invoice>>;

    async fn get_item(&self, item_id: &LineItemId) -> Result<LineItem>;

    async fn list_items(&self, invoice_id: &InvoiceId) -> Result<Vec<LineItem>>;
}

pub struct InvoiceManager {
    invoices: Arc<dyn InvoiceRepository>,
    downtimes: Arc<dyn DowntimeRepository>,
    resources: Arc<dyn ResourceResolver>,
    policy: InvoicePolicy,
    locks: LockRegistry,
}

impl InvoiceManager {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        downtimes: Arc<dyn DowntimeRepository>,
        resources: Arc<dyn ResourceResolver>,
        policy: InvoicePolicy,
    ) -> Self {
        Self {
            invoices,
            downtimes,
            resources,
            policy,
            locks: LockRegistry::new(),
        }
    }

    pub fn policy(&self) -> &InvoicePolicy {
        &self.policy
    }

    /// Display name of an item, resolving live resources through the manager's resolver.
    pub fn item_name(&self, item: &LineItem) -> String {
        item.name(self.resources.as_ref())
    }

    fn resolve(&self, resource: &ResourceRef) -> Result<ResourceDescriptor> {
        self.resources
            .resolve(resource)
            .ok_or_else(|| BillingError::ResourceNotFound {
                reference: resource.to_string(),
            })
    }

    async fn load_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.invoices
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound {
                id: invoice_id.to_string(),
            })
    }

    async fn load_item(&self, item_id: &LineItemId) -> Result<LineItem> {
        self.invoices
            .get_item(item_id)
            .await?
            .ok_or_else(|| BillingError::LineItemNotFound {
                id: item_id.to_string(),
            })
    }

    /// Locks the invoice owning `item_id` and returns fresh copies of both.
    async fn lock_item(&self, item_id: &LineItemId) -> Result<(LockSet, Invoice, LineItem)> {
        let item = self.load_item(item_id).await?;
        let invoice = self.load_invoice(&item.invoice_id).await?;
        let guard = self
            .locks
            .acquire_one(LockKey::invoice(&invoice.customer_id, invoice.period))
            .await;

        let item = self.load_item(item_id).await?;
        let invoice = self.load_invoice(&item.invoice_id).await?;
        Ok((guard, invoice, item))
    }

    async fn lock_invoice(&self, invoice_id: &InvoiceId) -> Result<(LockSet, Invoice)> {
        let invoice = self.load_invoice(invoice_id).await?;
        let guard = self
            .locks
            .acquire_one(LockKey::invoice(&invoice.customer_id, invoice.period))
            .await;
        let invoice = self.load_invoice(invoice_id).await?;
        Ok((guard, invoice))
    }

    /// Caller must hold the invoice lock for `(customer_id, period)`.
    async fn get_or_create_invoice(
        &self,
        customer_id: &CustomerId,
        period: InvoicePeriod,
        tax_percent: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Invoice, bool)> {
        if let Some(invoice) = self.invoices.find_invoice(customer_id, period).await? {
            return Ok((invoice, false));
        }

        let invoice = Invoice::new(customer_id.clone(), period, tax_percent, now)?;
        let invoice = self.invoices.create_invoice(invoice).await?;
        info!(
            invoice_id = %invoice.id,
            number = invoice.number,
            customer_id = %customer_id,
            period = %period,
            "Opened invoice"
        );
        Ok((invoice, true))
    }

    /// Recomputes the cached current cost from the stored items.
    async fn refresh_cost(&self, invoice: &mut Invoice, now: DateTime<Utc>) -> Result<()> {
        let items = self.invoices.list_items(&invoice.id).await?;
        invoice.update_current_cost(&items, now)?;
        self.invoices.update_invoice(invoice).await
    }

    /// Registration without the resource lock; takes the invoice lock itself.
    async fn register_unlocked(
        &self,
        resource: &ResourceDescriptor,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        let period = InvoicePeriod::containing(start);
        let _guard = self
            .locks
            .acquire_one(LockKey::invoice(&resource.customer_id, period))
            .await;

        let (mut invoice, _) = self
            .get_or_create_invoice(
                &resource.customer_id,
                period,
                self.policy.default_tax_percent,
                now,
            )
            .await?;
        invoice.ensure_mutable()?;

        let item = LineItem::register(invoice.id, resource, start)?;
        self.invoices.create_item(&item).await?;
        self.refresh_cost(&mut invoice, now).await?;

        debug!(
            item_id = %item.id,
            invoice_id = %invoice.id,
            resource = %resource.reference,
            start = %item.start,
            end = %item.end,
            "Registered line item"
        );
        Ok(item)
    }

    /// Terminates the live items of `resource`. With `hand_over` set, items
    /// started on an earlier day stop at the end of the day before `at`, so the
    /// swap day is billed once.
    async fn terminate_unlocked(
        &self,
        resource: &ResourceRef,
        at: DateTime<Utc>,
        hand_over: bool,
    ) -> Result<Vec<LineItem>> {
        let live: Vec<LineItem> = self
            .invoices
            .get_resource_items(resource)
            .await?
            .into_iter()
            .filter(|item| !item.is_frozen())
            .collect();

        let mut terminated = Vec::with_capacity(live.len());
        for item in live {
            let (_guard, mut invoice, mut item) = self.lock_item(&item.id).await?;
            if item.is_frozen() {
                continue;
            }
            invoice.ensure_mutable()?;

            let end = if hand_over && item.start.date_naive() < at.date_naive() {
                calendar::end_of_day(at - Duration::days(1))
            } else {
                at
            };
            item.terminate(self.resources.as_ref(), end)?;
            self.invoices.update_item(&item).await?;
            self.refresh_cost(&mut invoice, at).await?;

            debug!(item_id = %item.id, resource = %resource, end = %item.end, "Terminated line item");
            terminated.push(item);
        }
        Ok(terminated)
    }

    /// Read-modify-write of one item under its invoice lock.
    async fn mutate_item<F>(&self, item_id: &LineItemId, now: DateTime<Utc>, mutate: F) -> Result<LineItem>
    where
        F: FnOnce(&mut LineItem, &dyn ResourceResolver) -> Result<()> + Send,
    {
        let (_guard, mut invoice, mut item) = self.lock_item(item_id).await?;
        invoice.ensure_mutable()?;

        mutate(&mut item, self.resources.as_ref())?;
        self.invoices.update_item(&item).await?;
        self.refresh_cost(&mut invoice, now).await?;
        Ok(item)
    }

    async fn transition(
        &self,
        invoice_id: &InvoiceId,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let (_guard, mut invoice) = self.lock_invoice(invoice_id).await?;
        let from = invoice.state;
        match transition {
            Transition::Issue => invoice.set_created(now)?,
            Transition::Pay => invoice.mark_paid(now)?,
            Transition::Cancel => invoice.cancel(now)?,
        }
        self.invoices.update_invoice(&invoice).await?;

        info!(
            invoice_id = %invoice.id,
            number = invoice.number,
            from = %from,
            to = %invoice.state,
            "Invoice state changed"
        );
        Ok(invoice)
    }

    /// Rolls one closing invoice over; both period locks are held by the caller.
    async fn rollover_invoice(
        &self,
        invoice_id: &InvoiceId,
        opening: InvoicePeriod,
        now: DateTime<Utc>,
        report: &mut RolloverReport,
    ) -> Result<()> {
        let mut closing = self.load_invoice(invoice_id).await?;
        let items = self.invoices.list_items(&closing.id).await?;

        let mut carry: Vec<ResourceRef> = Vec::new();
        for item in items.iter().filter(|item| !item.is_terminated()) {
            if let Some(reference) = item.source() {
                if !carry.contains(&reference) && self.resources.resolve(&reference).is_some() {
                    carry.push(reference);
                }
            }
        }

        if closing.state.accepts_mutations() {
            let closing_end = closing.period.end();
            for mut item in items.into_iter().filter(|item| !item.is_frozen()) {
                item.end = item.end.min(closing_end);
                item.freeze(self.resources.as_ref());
                self.invoices.update_item(&item).await?;
                report.frozen_items += 1;
            }
            self.refresh_cost(&mut closing, now).await?;
            closing.set_created(now)?;
            self.invoices.update_invoice(&closing).await?;
            report.issued.push(closing.id);
            info!(
                invoice_id = %closing.id,
                number = closing.number,
                customer_id = %closing.customer_id,
                period = %closing.period,
                "Invoice issued"
            );
        }

        let (mut next, opened) = self
            .get_or_create_invoice(&closing.customer_id, opening, closing.tax_percent, now)
            .await?;
        if opened {
            report.opened.push(next.id);
        }
        if carry.is_empty() {
            return Ok(());
        }
        if !next.state.accepts_mutations() {
            warn!(
                invoice_id = %next.id,
                state = %next.state,
                "Next invoice no longer pending, nothing carried forward"
            );
            return Ok(());
        }

        let already: Vec<ResourceRef> = self
            .invoices
            .list_items(&next.id)
            .await?
            .iter()
            .filter_map(LineItem::source)
            .collect();

        let mut carried = 0;
        for reference in carry.iter().filter(|r| !already.contains(r)) {
            let Some(resource) = self.resources.resolve(reference) else {
                continue;
            };
            let item = match LineItem::register(next.id, &resource, opening.start()) {
                Ok(item) => item,
                Err(err) => {
                    warn!(resource = %reference, error = %err, "Resource not carried forward");
                    continue;
                }
            };
            self.invoices.create_item(&item).await?;
            carried += 1;
        }
        if carried > 0 {
            self.refresh_cost(&mut next, now).await?;
        }
        report.carried_items += carried;
        Ok(())
    }

    /// Items that billed `resource` at some instant of `[start, end]`, in creation order.
    async fn billed_items(
        &self,
        resource: &ResourceRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LineItem>> {
        Ok(self
            .invoices
            .get_resource_items(resource)
            .await?
            .into_iter()
            .filter(|item| {
                let item_end = item.end.min(calendar::month_end(item.start));
                item.start <= end && start <= item_end
            })
            .collect())
    }

    /// Distinct resources billed on an invoice, sorted.
    async fn billed_resources(&self, invoice_id: &InvoiceId) -> Result<Vec<ResourceRef>> {
        let mut resources: Vec<ResourceRef> = self
            .invoices
            .list_items(invoice_id)
            .await?
            .iter()
            .filter_map(LineItem::source)
            .collect();
        resources.sort();
        resources.dedup();
        Ok(resources)
    }

    /// Locks every resource billed on `invoice` plus the closing and opening
    /// invoice keys, so that no resource event interleaves with its rollover.
    /// Starts over when items for new resources land while waiting.
    async fn lock_for_rollover(
        &self,
        invoice: &Invoice,
        opening: InvoicePeriod,
    ) -> Result<LockSet> {
        let invoice_keys = [
            LockKey::invoice(&invoice.customer_id, invoice.period),
            LockKey::invoice(&invoice.customer_id, opening),
        ];
        let mut resources = self.billed_resources(&invoice.id).await?;
        loop {
            let keys = resources
                .iter()
                .copied()
                .map(LockKey::resource)
                .chain(invoice_keys.iter().cloned());
            let guard = self.locks.acquire(keys).await;

            let billed = self.billed_resources(&invoice.id).await?;
            if billed.iter().all(|resource| resources.contains(resource)) {
                return Ok(guard);
            }
            drop(guard);
            debug!(
                invoice_id = %invoice.id,
                "Resources changed while locking for rollover, retrying"
            );
            resources = billed;
        }
    }
}

#[async_trait]
impl InvoiceOperations for InvoiceManager {
    async fn register(
        &self,
        resource: ResourceRef,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        let _guard = self.locks.acquire_one(LockKey::resource(resource)).await;
        let descriptor = self.resolve(&resource)?;
        self.register_unlocked(&descriptor, start.unwrap_or(now), now)
            .await
    }

    async fn terminate_resource(
        &self,
        resource: ResourceRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<LineItem>> {
        let _guard = self.locks.acquire_one(LockKey::resource(resource)).await;
        self.terminate_unlocked(&resource, at, false).await
    }

    async fn reprice_resource(
        &self,
        resource: ResourceRef,
        at: DateTime<Utc>,
    ) -> Result<LineItem> {
        let _guard = self.locks.acquire_one(LockKey::resource(resource)).await;
        let descriptor = self.resolve(&resource)?;

        self.terminate_unlocked(&resource, at, true).await?;
        let item = self.register_unlocked(&descriptor, at, at).await?;
        info!(resource = %resource, item_id = %item.id, at = %at, "Resource repriced");
        Ok(item)
    }

    async fn freeze(&self, item_id: &LineItemId, now: DateTime<Utc>) -> Result<LineItem> {
        let (_guard, mut invoice, mut item) = self.lock_item(item_id).await?;
        if item.is_frozen() {
            return Ok(item);
        }
        invoice.ensure_mutable()?;

        item.freeze(self.resources.as_ref());
        self.invoices.update_item(&item).await?;
        self.refresh_cost(&mut invoice, now).await?;
        Ok(item)
    }

    async fn terminate(
        &self,
        item_id: &LineItemId,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        let end = end.unwrap_or(now);
        self.mutate_item(item_id, now, |item, resources| item.terminate(resources, end))
            .await
    }

    async fn shift_backward(
        &self,
        item_id: &LineItemId,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        self.mutate_item(item_id, now, |item, _| item.shift_backward(days))
            .await
    }

    async fn extend_to_end_of_day(
        &self,
        item_id: &LineItemId,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        self.mutate_item(item_id, now, |item, _| {
            item.extend_to_end_of_day();
            Ok(())
        })
        .await
    }

    async fn create_compensation(
        &self,
        item_id: &LineItemId,
        name: &str,
        overrides: CompensationOverrides,
        now: DateTime<Utc>,
    ) -> Result<LineItem> {
        let source = self.load_item(item_id).await?;
        let target_id = overrides.invoice_id.unwrap_or(source.invoice_id);
        let target = self.load_invoice(&target_id).await?;
        let _guard = self
            .locks
            .acquire_one(LockKey::invoice(&target.customer_id, target.period))
            .await;

        let mut target = self.load_invoice(&target_id).await?;
        target.ensure_mutable()?;

        let compensation = source.compensation(name, overrides)?;
        self.invoices.create_item(&compensation).await?;
        self.refresh_cost(&mut target, now).await?;

        debug!(
            item_id = %compensation.id,
            source_item_id = %source.id,
            invoice_id = %target.id,
            unit_price = %compensation.unit_price,
            "Created compensation item"
        );
        Ok(compensation)
    }

    async fn set_created(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice> {
        self.transition(invoice_id, Transition::Issue, now).await
    }

    async fn mark_paid(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice> {
        self.transition(invoice_id, Transition::Pay, now).await
    }

    async fn cancel(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<Invoice> {
        self.transition(invoice_id, Transition::Cancel, now).await
    }

    async fn rollover(&self, now: DateTime<Utc>) -> Result<RolloverReport> {
        let opening = InvoicePeriod::containing(now);
        let closing = opening.previous();
        let mut report = RolloverReport {
            closing_period: Some(closing),
            opening_period: Some(opening),
            ..Default::default()
        };

        for invoice in self.invoices.list_invoices_for_period(closing).await? {
            let _guard = self.lock_for_rollover(&invoice, opening).await?;
            self.rollover_invoice(&invoice.id, opening, now, &mut report)
                .await?;
        }

        info!(
            closing = %closing,
            opening = %opening,
            issued = report.issued.len(),
            opened = report.opened.len(),
            frozen_items = report.frozen_items,
            carried_items = report.carried_items,
            "Monthly rollover finished"
        );
        Ok(report)
    }

    async fn summary(&self, invoice_id: &InvoiceId, now: DateTime<Utc>) -> Result<InvoiceSummary> {
        let invoice = self.load_invoice(invoice_id).await?;
        let items = self.invoices.list_items(invoice_id).await?;
        InvoiceSummary::compute(&invoice, &items, now, self.policy.payment_interval_days)
    }

    async fn validate_downtime(
        &self,
        candidate: &DowntimePeriod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self
            .locks
            .acquire_one(LockKey::resource(candidate.resource))
            .await;
        let existing = self.downtimes.get_downtimes(&candidate.resource).await?;
        downtime::validate(candidate, &existing, &self.policy.downtime, now)
    }

    async fn report_downtime(
        &self,
        resource: ResourceRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DowntimeOutcome> {
        let _resource_guard = self.locks.acquire_one(LockKey::resource(resource)).await;

        let period = DowntimePeriod::new(resource, start, end)?;
        let existing = self.downtimes.get_downtimes(&resource).await?;
        downtime::validate(&period, &existing, &self.policy.downtime, now)?;

        let items = self.billed_items(&resource, start, end).await?;
        if items.is_empty() {
            self.downtimes.create_downtime(&period).await?;
            info!(downtime_id = %period.id, resource = %resource, "Downtime recorded without a billed item");
            return Ok(DowntimeOutcome {
                period,
                compensations: Vec::new(),
            });
        }

        // Credits land on each item's own invoice while it is open, else on the
        // customer's invoice for the current month.
        let current = InvoicePeriod::containing(now);
        let mut keys = Vec::with_capacity(items.len() * 2);
        for item in &items {
            let invoice = self.load_invoice(&item.invoice_id).await?;
            keys.push(LockKey::invoice(&invoice.customer_id, invoice.period));
            keys.push(LockKey::invoice(&invoice.customer_id, current));
        }
        let _invoice_guard = self.locks.acquire(keys).await;

        // Item windows may have moved while waiting; the set of items cannot,
        // since it only grows under the resource lock held here.
        let items = self.billed_items(&resource, start, end).await?;
        let mut targets: Vec<Invoice> = Vec::new();
        let mut compensations = Vec::with_capacity(items.len());
        for item in &items {
            let source_invoice = self.load_invoice(&item.invoice_id).await?;
            let target = if source_invoice.state.accepts_mutations() {
                source_invoice
            } else {
                self.get_or_create_invoice(
                    &source_invoice.customer_id,
                    current,
                    source_invoice.tax_percent,
                    now,
                )
                .await?
                .0
            };
            target.ensure_mutable()?;

            let overrides = CompensationOverrides {
                invoice_id: Some(target.id),
                start: Some(start.max(item.start)),
                end: Some(end.min(item.end).min(calendar::month_end(item.start))),
                ..Default::default()
            };
            compensations.push(item.compensation(&self.item_name(item), overrides)?);
            if !targets.iter().any(|invoice| invoice.id == target.id) {
                targets.push(target);
            }
        }

        self.downtimes.create_downtime(&period).await?;
        for compensation in &compensations {
            self.invoices.create_item(compensation).await?;
        }
        for target in &mut targets {
            self.refresh_cost(target, now).await?;
        }

        info!(
            downtime_id = %period.id,
            resource = %resource,
            start = %period.start,
            end = %period.end,
            compensation_items = compensations.len(),
            invoices = targets.len(),
            "Downtime accepted and compensated"
        );
        Ok(DowntimeOutcome {
            period,
            compensations,
        })
    }

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.load_invoice(invoice_id).await
    }

    async fn find_invoice(
        &self,
        customer_id: &CustomerId,
        period: InvoicePeriod,
    ) -> Result<Option<Invoice>> {
        self.invoices.find_invoice(customer_id, period).await
    }

    async fn list_invoices(&self, customer_id: Option<&CustomerId>) -> Result<Vec<Invoice>> {
        self.invoices.list_invoices(customer_id).await
    }

    async fn get_item(&self, item_id: &LineItemId) -> Result<LineItem> {
        self.load_item(item_id).await
    }

    async fn list_items(&self, invoice_id: &InvoiceId) -> Result<Vec<LineItem>> {
        self.invoices.list_items(invoice_id).await
    }
}
