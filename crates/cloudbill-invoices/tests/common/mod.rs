#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cloudbill_invoices::domain::resources::{OfferingDetails, PackageDetails, ProjectInfo};
use cloudbill_invoices::domain::{
    BillingUnit, CustomerId, InvoiceManager, InvoicePolicy, ResourceCatalog, ResourceDescriptor,
    ResourceDetails, ResourceId, ResourceKind, ResourceRef,
};
use cloudbill_invoices::storage::InMemoryLedger;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    pub catalog: Arc<ResourceCatalog>,
    pub ledger: Arc<InMemoryLedger>,
    pub manager: Arc<InvoiceManager>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(InvoicePolicy::default())
    }

    pub fn with_policy(policy: InvoicePolicy) -> Self {
        let catalog = Arc::new(ResourceCatalog::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let manager = Arc::new(InvoiceManager::new(
            ledger.clone(),
            ledger.clone(),
            catalog.clone(),
            policy,
        ));
        Self {
            catalog,
            ledger,
            manager,
        }
    }

    pub fn add(&self, resource: ResourceDescriptor) -> ResourceRef {
        let reference = resource.reference;
        self.catalog.upsert(resource);
        reference
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    at(y, m, d, 0, 0, 0)
}

pub fn customer() -> CustomerId {
    CustomerId::new("acme")
}

pub fn package(unit: BillingUnit, unit_price: Decimal) -> ResourceDescriptor {
    ResourceDescriptor {
        reference: ResourceRef::new(ResourceKind::Package, ResourceId::new()),
        customer_id: customer(),
        project: Some(ProjectInfo {
            id: Uuid::new_v4(),
            name: "research".to_string(),
        }),
        unit,
        unit_price,
        quantity: 0,
        product_code: "OS-PKG".to_string(),
        article_code: "A-100".to_string(),
        details: ResourceDetails::Package(PackageDetails {
            tenant_name: "lab-tenant".to_string(),
            tenant_uuid: Uuid::new_v4(),
            template_name: "small".to_string(),
            template_uuid: Uuid::new_v4(),
            template_category: Some("Small".to_string()),
        }),
    }
}

pub fn offering(unit: BillingUnit, unit_price: Decimal) -> ResourceDescriptor {
    ResourceDescriptor {
        reference: ResourceRef::new(ResourceKind::Offering, ResourceId::new()),
        customer_id: customer(),
        project: None,
        unit,
        unit_price,
        quantity: 0,
        product_code: String::new(),
        article_code: String::new(),
        details: ResourceDetails::Offering(OfferingDetails {
            name: "VPN".to_string(),
            offering_type: "custom".to_string(),
            offering_uuid: Uuid::new_v4(),
        }),
    }
}
