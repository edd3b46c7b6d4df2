pub mod calendar;
pub mod downtime;
pub mod invoices;
pub mod line_items;
pub mod manager;
pub mod proration;
pub mod resources;
pub mod types;

pub use downtime::{DowntimePeriod, DowntimePolicy};
pub use invoices::{Invoice, InvoiceSummary};
pub use line_items::{CompensationOverrides, LineItem};
pub use manager::{DowntimeOutcome, InvoiceManager, InvoiceOperations, InvoicePolicy, RolloverReport};
pub use proration::PricingWindow;
pub use resources::{
    Describe, ResourceCatalog, ResourceDescriptor, ResourceDetails, ResourceKind, ResourceRef,
    ResourceRegistry, ResourceResolver,
};
pub use types::{
    BillingUnit, CustomerId, DowntimeId, InvoiceId, InvoicePeriod, InvoiceState, LineItemId,
    ResourceId,
};
