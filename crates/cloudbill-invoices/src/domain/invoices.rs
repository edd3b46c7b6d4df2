use crate::domain::line_items::LineItem;
use crate::domain::proration;
use crate::domain::types::{CustomerId, InvoiceId, InvoicePeriod, InvoiceState};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const FIRST_INVOICE_NUMBER: u64 = 100_000;

/// Monthly invoice of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Sequential number handed out by the repository on insert.
    pub number: u64,
    pub customer_id: CustomerId,
    pub period: InvoicePeriod,
    pub state: InvoiceState,
    /// Cached `price_current`; always recomputable from the items.
    pub current_cost: Decimal,
    pub tax_percent: Decimal,
    pub invoice_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        customer_id: CustomerId,
        period: InvoicePeriod,
        tax_percent: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if tax_percent < Decimal::ZERO || tax_percent > Decimal::ONE_HUNDRED {
            return Err(BillingError::ValidationError {
                field: "tax_percent".to_string(),
                message: format!("{} is outside 0-100", tax_percent),
            });
        }

        Ok(Self {
            id: InvoiceId::new(),
            number: 0,
            customer_id,
            period,
            state: InvoiceState::Pending,
            current_cost: Decimal::ZERO,
            tax_percent,
            invoice_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition_to(&mut self, next: InvoiceState, action: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BillingError::IllegalState {
                entity: format!("invoice {}", self.id),
                from: self.state.to_string(),
                action: action.to_string(),
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Issues the invoice. The only place `invoice_date` is assigned.
    pub fn set_created(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(InvoiceState::Created, "issue", now)?;
        self.invoice_date = Some(now);
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(InvoiceState::Paid, "mark as paid", now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(InvoiceState::Canceled, "cancel", now)
    }

    /// Fails unless items may still be added to or changed on this invoice.
    pub fn ensure_mutable(&self) -> Result<()> {
        if self.state.accepts_mutations() {
            return Ok(());
        }
        Err(BillingError::precondition(format!(
            "invoice {} ({}) is {} and no longer accepts line item changes",
            self.number, self, self.state
        )))
    }

    pub fn due_date(&self, payment_interval_days: u32) -> Option<DateTime<Utc>> {
        self.invoice_date
            .map(|date| date + Duration::days(i64::from(payment_interval_days)))
    }

    pub fn update_current_cost(&mut self, items: &[LineItem], now: DateTime<Utc>) -> Result<()> {
        self.current_cost = price_current(items, now)?;
        self.updated_at = now;
        Ok(())
    }
}

impl fmt::Display for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.customer_id, self.period)
    }
}

/// Final price: every item over its closed window, summed in item order.
pub fn price(items: &[LineItem]) -> Result<Decimal> {
    let amounts = items
        .iter()
        .map(LineItem::price)
        .collect::<Result<Vec<_>>>()?;
    Ok(proration::sum(amounts))
}

/// Price accrued so far.
pub fn price_current(items: &[LineItem], now: DateTime<Utc>) -> Result<Decimal> {
    let amounts = items
        .iter()
        .map(|item| item.price_current(now))
        .collect::<Result<Vec<_>>>()?;
    Ok(proration::sum(amounts))
}

/// Read-side view of an invoice with every derived amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice_id: InvoiceId,
    pub number: u64,
    pub customer_id: CustomerId,
    pub period: InvoicePeriod,
    pub state: InvoiceState,
    pub item_count: usize,
    pub price: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub price_current: Decimal,
    pub tax_current: Decimal,
    pub total_current: Decimal,
    pub cached_current_cost: Decimal,
    pub invoice_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl InvoiceSummary {
    pub fn compute(
        invoice: &Invoice,
        items: &[LineItem],
        now: DateTime<Utc>,
        payment_interval_days: u32,
    ) -> Result<Self> {
        let price = price(items)?;
        let price_current = price_current(items, now)?;

        Ok(Self {
            invoice_id: invoice.id,
            number: invoice.number,
            customer_id: invoice.customer_id.clone(),
            period: invoice.period,
            state: invoice.state,
            item_count: items.len(),
            price,
            tax: proration::tax(price, invoice.tax_percent),
            total: proration::total(price, invoice.tax_percent),
            price_current,
            tax_current: proration::tax(price_current, invoice.tax_percent),
            total_current: proration::total(price_current, invoice.tax_percent),
            cached_current_cost: invoice.current_cost,
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date(payment_interval_days),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn invoice() -> Invoice {
        Invoice::new(
            CustomerId::new("acme"),
            InvoicePeriod::new(2017, 1).unwrap(),
            dec!(20),
            Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_set_created_only_from_pending() {
        let mut invoice = invoice();
        let now = Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap();
        assert!(invoice.invoice_date.is_none());

        invoice.set_created(now).unwrap();
        assert_eq!(invoice.state, InvoiceState::Created);
        assert_eq!(invoice.invoice_date, Some(now));

        let err = invoice.set_created(now).unwrap_err();
        assert!(err.is_illegal_state());

        invoice.mark_paid(now).unwrap();
        assert!(invoice.set_created(now).unwrap_err().is_illegal_state());
        assert!(invoice.cancel(now).unwrap_err().is_illegal_state());
        assert_eq!(invoice.invoice_date, Some(now));
    }

    #[test]
    fn test_cancel_requires_created() {
        let mut invoice = invoice();
        let now = Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap();

        assert!(invoice.cancel(now).unwrap_err().is_illegal_state());
        invoice.set_created(now).unwrap();
        invoice.cancel(now).unwrap();
        assert!(invoice.set_created(now).unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_due_date_and_display() {
        let mut invoice = invoice();
        assert_eq!(invoice.due_date(30), None);
        assert_eq!(invoice.to_string(), "acme | 2017-01");

        let now = Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap();
        invoice.set_created(now).unwrap();
        assert_eq!(
            invoice.due_date(30),
            Some(Utc.with_ymd_and_hms(2017, 3, 3, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_ensure_mutable() {
        let mut invoice = invoice();
        assert!(invoice.ensure_mutable().is_ok());
        invoice
            .set_created(Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(invoice.ensure_mutable().unwrap_err().is_precondition());
    }

    #[test]
    fn test_tax_percent_bounds() {
        let now = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let period = InvoicePeriod::new(2017, 1).unwrap();
        assert!(Invoice::new(CustomerId::new("acme"), period, dec!(101), now).is_err());
        assert!(Invoice::new(CustomerId::new("acme"), period, dec!(-1), now).is_err());
    }
}
