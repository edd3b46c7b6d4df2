use crate::domain::calendar;
use crate::domain::proration::{self, PricingWindow};
use crate::domain::resources::{
    Details, ResourceDescriptor, ResourceKind, ResourceRef, ResourceResolver,
    DETAIL_RESOURCE_ID, DETAIL_RESOURCE_KIND,
};
use crate::domain::types::{BillingUnit, InvoiceId, LineItemId};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

const COMPENSATION_NAME_PREFIX: &str = "Compensation for downtime. Resource name: ";

/// One priced resource-assignment span on an invoice.
///
/// While `resource` is set the item is live and its name comes from the
/// resolver. Freezing copies the descriptive attributes into `details` and
/// clears `resource` for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub invoice_id: InvoiceId,
    pub kind: ResourceKind,
    pub resource: Option<ResourceRef>,
    #[serde(default)]
    pub details: Details,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit: BillingUnit,
    pub unit_price: Decimal,
    #[serde(default)]
    pub quantity: u32,
    pub project_id: Option<Uuid>,
    pub project_name: Option<String>,
    #[serde(default)]
    pub product_code: String,
    #[serde(default)]
    pub article_code: String,
    pub terminated_at: Option<DateTime<Utc>>,
}

/// Fields a compensation item may take from the caller instead of its source item.
#[derive(Debug, Clone, Default)]
pub struct CompensationOverrides {
    pub invoice_id: Option<InvoiceId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub unit: Option<BillingUnit>,
    pub unit_price: Option<Decimal>,
    pub quantity: Option<u32>,
}

impl LineItem {
    /// New live item for `resource`, open until the end of `start`'s month.
    ///
    /// Registered items never carry a negative unit price; credits come from
    /// [`LineItem::compensation`].
    pub fn register(
        invoice_id: InvoiceId,
        resource: &ResourceDescriptor,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        if resource.unit_price < Decimal::ZERO {
            return Err(BillingError::ValidationError {
                field: "unit_price".to_string(),
                message: format!(
                    "resource {} has negative unit price {}",
                    resource.reference, resource.unit_price
                ),
            });
        }

        Ok(Self {
            id: LineItemId::new(),
            invoice_id,
            kind: resource.reference.kind,
            resource: Some(resource.reference),
            details: Details::new(),
            start,
            end: calendar::month_end(start),
            unit: resource.unit,
            unit_price: resource.unit_price,
            quantity: resource.quantity,
            project_id: resource.project.as_ref().map(|p| p.id),
            project_name: resource.project.as_ref().map(|p| p.name.clone()),
            product_code: resource.product_code.clone(),
            article_code: resource.article_code.clone(),
            terminated_at: None,
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.resource.is_none()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated_at.is_some()
    }

    /// The resource this item bills for, live or as recorded in its snapshot.
    /// Compensation items have none.
    pub fn source(&self) -> Option<ResourceRef> {
        self.resource.or_else(|| ResourceRef::from_details(&self.details))
    }

    pub fn window(&self) -> PricingWindow {
        PricingWindow {
            unit: self.unit,
            start: self.start,
            end: self.end,
            quantity: self.quantity,
        }
    }

    pub fn factor(&self, now: DateTime<Utc>, current: bool) -> Result<Decimal> {
        self.window().factor(now, current)
    }

    /// Final price over the closed window.
    pub fn price(&self) -> Result<Decimal> {
        self.window().amount(self.unit_price, self.end, false)
    }

    /// Price accrued up to `now`.
    pub fn price_current(&self, now: DateTime<Utc>) -> Result<Decimal> {
        self.window().amount(self.unit_price, now, true)
    }

    pub fn tax(&self, tax_percent: Decimal) -> Result<Decimal> {
        Ok(proration::tax(self.price()?, tax_percent))
    }

    pub fn total(&self, tax_percent: Decimal) -> Result<Decimal> {
        Ok(proration::total(self.price()?, tax_percent))
    }

    pub fn usage_days(&self) -> Result<i64> {
        calendar::full_days(self.start, self.end)
    }

    /// Display name. Never fails: a vanished resource falls back to its snapshot,
    /// and an empty snapshot to the kind and id.
    pub fn name(&self, resolver: &dyn ResourceResolver) -> String {
        if let Some(reference) = &self.resource {
            if let Some(resource) = resolver.resolve(reference) {
                return resource.display_name();
            }
        }

        let project_name = self.project_name.as_deref();
        if let Some(name) = self.kind.name_from_snapshot(&self.details, project_name) {
            return name;
        }
        if let Some(name) = self.details.get("name") {
            return name.clone();
        }

        match self.source() {
            Some(reference) => format!("{} {}", reference.kind, reference.id),
            None => format!("{} {}", self.kind, self.id),
        }
    }

    /// Snapshots the live resource and detaches from it.
    ///
    /// Returns `false` when the item was already frozen; nothing is touched then.
    pub fn freeze(&mut self, resolver: &dyn ResourceResolver) -> bool {
        let Some(reference) = self.resource else {
            return false;
        };

        match resolver.resolve(&reference) {
            Some(resource) => {
                self.details.extend(resource.snapshot());
                if self.project_name.is_none() {
                    self.project_name = resource.project.map(|p| p.name);
                }
            }
            None => {
                warn!(
                    item_id = %self.id,
                    resource = %reference,
                    "Freezing line item whose resource can no longer be resolved"
                );
                self.details
                    .insert(DETAIL_RESOURCE_KIND.to_string(), reference.kind.to_string());
                self.details
                    .insert(DETAIL_RESOURCE_ID.to_string(), reference.id.to_string());
            }
        }
        self.resource = None;

        debug!(item_id = %self.id, resource = %reference, "Froze line item");
        true
    }

    /// Freezes the item and closes its window at `end`.
    ///
    /// `end` is clamped to the item's month; an end before `start` is rejected
    /// before anything is mutated.
    pub fn terminate(&mut self, resolver: &dyn ResourceResolver, end: DateTime<Utc>) -> Result<()> {
        let end = end.min(calendar::month_end(self.start));
        if end < self.start {
            return Err(BillingError::precondition(format!(
                "cannot terminate line item {} at {}: before its start {}",
                self.id, end, self.start
            )));
        }

        self.freeze(resolver);
        self.end = end;
        self.terminated_at = Some(end);
        Ok(())
    }

    /// Moves `end` back by `days`, never past `start`.
    pub fn shift_backward(&mut self, days: i64) -> Result<()> {
        if days < 0 {
            return Err(BillingError::ValidationError {
                field: "days".to_string(),
                message: format!("cannot shift by a negative number of days ({})", days),
            });
        }

        if (self.end - self.start).num_days() > days {
            self.end -= Duration::days(days);
        } else {
            self.end = self.start;
        }
        Ok(())
    }

    pub fn extend_to_end_of_day(&mut self) {
        self.end = calendar::end_of_day(self.end);
    }

    /// Credit item offsetting this one.
    ///
    /// Billing fields are copied, overrides applied on top, and a positive unit
    /// price is negated. The result is always frozen.
    pub fn compensation(&self, name: &str, overrides: CompensationOverrides) -> Result<LineItem> {
        let start = overrides.start.unwrap_or(self.start);
        let end = overrides.end.unwrap_or(self.end);
        if end < start {
            return Err(BillingError::precondition(format!(
                "compensation window ends at {} before it starts at {}",
                end, start
            )));
        }

        let mut unit_price = overrides.unit_price.unwrap_or(self.unit_price);
        if unit_price > Decimal::ZERO {
            unit_price = -unit_price;
        }

        let details = Details::from([(
            "name".to_string(),
            format!("{}{}", COMPENSATION_NAME_PREFIX, name),
        )]);

        Ok(LineItem {
            id: LineItemId::new(),
            invoice_id: overrides.invoice_id.unwrap_or(self.invoice_id),
            kind: ResourceKind::Generic,
            resource: None,
            details,
            start,
            end,
            unit: overrides.unit.unwrap_or(self.unit),
            unit_price,
            quantity: overrides.quantity.unwrap_or(self.quantity),
            project_id: self.project_id,
            project_name: self.project_name.clone(),
            product_code: self.product_code.clone(),
            article_code: self.article_code.clone(),
            terminated_at: None,
        })
    }
}
