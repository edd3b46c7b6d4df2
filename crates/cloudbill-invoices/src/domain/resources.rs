//! Priced resources as seen from the invoicing side.
//!
//! Resources live in the provisioning system. Line items hold a
//! [`ResourceRef`] and resolve it through a [`ResourceResolver`] until the item
//! is frozen; after that only the captured [`Details`] snapshot is used.

use crate::domain::types::{BillingUnit, CustomerId, ResourceId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Frozen key-value snapshot of a resource's descriptive attributes.
pub type Details = BTreeMap<String, String>;

pub const DETAIL_RESOURCE_KIND: &str = "resource_kind";
pub const DETAIL_RESOURCE_ID: &str = "resource_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Generic,
    Offering,
    Package,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Generic => write!(f, "generic"),
            ResourceKind::Offering => write!(f, "offering"),
            ResourceKind::Package => write!(f, "package"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = crate::error::BillingError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "generic" => Ok(ResourceKind::Generic),
            "offering" => Ok(ResourceKind::Offering),
            "package" => Ok(ResourceKind::Package),
            other => Err(crate::error::BillingError::ValidationError {
                field: "resource_kind".to_string(),
                message: format!("unknown resource kind '{}'", other),
            }),
        }
    }
}

/// Tagged reference to a resource: which kind of lookup to use, and the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }

    /// Recovers the reference recorded in a frozen snapshot.
    pub fn from_details(details: &Details) -> Option<Self> {
        let kind = details.get(DETAIL_RESOURCE_KIND)?.parse().ok()?;
        let id = details.get(DETAIL_RESOURCE_ID)?.parse().ok()?;
        Some(Self { kind, id })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Capability every resource variant provides to line items.
pub trait Describe {
    /// Human-readable line item name while the resource is live.
    fn display_name(&self) -> String;

    /// Attributes needed to rebuild the name once the resource is gone.
    fn snapshot(&self) -> Details;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericDetails {
    pub name: String,
    pub scope_uuid: Uuid,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Describe for GenericDetails {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn snapshot(&self) -> Details {
        let mut details = self.extra.clone();
        details.insert("name".to_string(), self.name.clone());
        details.insert("scope_uuid".to_string(), self.scope_uuid.simple().to_string());
        details
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingDetails {
    pub name: String,
    pub offering_type: String,
    pub offering_uuid: Uuid,
}

impl Describe for OfferingDetails {
    fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.offering_type)
    }

    fn snapshot(&self) -> Details {
        Details::from([
            ("offering_name".to_string(), self.name.clone()),
            ("offering_type".to_string(), self.offering_type.clone()),
            ("offering_uuid".to_string(), self.offering_uuid.simple().to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub tenant_name: String,
    pub tenant_uuid: Uuid,
    pub template_name: String,
    pub template_uuid: Uuid,
    pub template_category: Option<String>,
}

impl Describe for PackageDetails {
    fn display_name(&self) -> String {
        package_name(
            &self.tenant_name,
            &self.template_name,
            self.template_category.as_deref(),
        )
    }

    fn snapshot(&self) -> Details {
        let mut details = Details::from([
            ("tenant_name".to_string(), self.tenant_name.clone()),
            ("tenant_uuid".to_string(), self.tenant_uuid.simple().to_string()),
            ("template_name".to_string(), self.template_name.clone()),
            ("template_uuid".to_string(), self.template_uuid.simple().to_string()),
        ]);
        if let Some(category) = &self.template_category {
            details.insert("template_category".to_string(), category.clone());
        }
        details
    }
}

fn package_name(tenant: &str, template: &str, category: Option<&str>) -> String {
    match category {
        Some(category) if !category.is_empty() => {
            format!("{} ({} / {})", tenant, category, template)
        }
        _ => format!("{} ({})", tenant, template),
    }
}

/// Variant-specific descriptive fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDetails {
    Generic(GenericDetails),
    Offering(OfferingDetails),
    Package(PackageDetails),
}

impl ResourceDetails {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDetails::Generic(_) => ResourceKind::Generic,
            ResourceDetails::Offering(_) => ResourceKind::Offering,
            ResourceDetails::Package(_) => ResourceKind::Package,
        }
    }

    fn describer(&self) -> &dyn Describe {
        match self {
            ResourceDetails::Generic(details) => details,
            ResourceDetails::Offering(details) => details,
            ResourceDetails::Package(details) => details,
        }
    }
}

impl Describe for ResourceDetails {
    fn display_name(&self) -> String {
        self.describer().display_name()
    }

    fn snapshot(&self) -> Details {
        self.describer().snapshot()
    }
}

impl ResourceKind {
    /// Rebuilds a display name from a frozen snapshot of this kind.
    ///
    /// Offerings recorded without a name fall back to the project the item was
    /// billed under.
    pub fn name_from_snapshot(
        &self,
        details: &Details,
        project_name: Option<&str>,
    ) -> Option<String> {
        match self {
            ResourceKind::Generic => details.get("name").cloned(),
            ResourceKind::Offering => {
                let offering_type = details.get("offering_type")?;
                let name = details
                    .get("offering_name")
                    .map(String::as_str)
                    .or(project_name)?;
                Some(format!("{} ({})", name, offering_type))
            }
            ResourceKind::Package => {
                let tenant = details.get("tenant_name")?;
                let template = details.get("template_name")?;
                Some(package_name(
                    tenant,
                    template,
                    details.get("template_category").map(String::as_str),
                ))
            }
        }
    }
}

/// Project a resource belongs to; copied onto items so it survives project removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: Uuid,
    pub name: String,
}

/// Everything the engine needs to know about a live priced resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub reference: ResourceRef,
    pub customer_id: CustomerId,
    pub project: Option<ProjectInfo>,
    pub unit: BillingUnit,
    pub unit_price: Decimal,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub product_code: String,
    #[serde(default)]
    pub article_code: String,
    pub details: ResourceDetails,
}

impl ResourceDescriptor {
    pub fn display_name(&self) -> String {
        self.details.display_name()
    }

    /// Snapshot including the reference itself, so frozen items still know their source.
    pub fn snapshot(&self) -> Details {
        let mut details = self.details.snapshot();
        details.insert(DETAIL_RESOURCE_KIND.to_string(), self.reference.kind.to_string());
        details.insert(DETAIL_RESOURCE_ID.to_string(), self.reference.id.to_string());
        details
    }
}

/// Lookup of live resources. `None` means the resource no longer exists.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, reference: &ResourceRef) -> Option<ResourceDescriptor>;
}

pub type LookupFn = Box<dyn Fn(&ResourceId) -> Option<ResourceDescriptor> + Send + Sync>;

/// Per-kind lookup functions supplied by the provisioning collaborator.
#[derive(Default)]
pub struct ResourceRegistry {
    lookups: HashMap<ResourceKind, LookupFn>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup<F>(mut self, kind: ResourceKind, lookup: F) -> Self
    where
        F: Fn(&ResourceId) -> Option<ResourceDescriptor> + Send + Sync + 'static,
    {
        self.lookups.insert(kind, Box::new(lookup));
        self
    }
}

impl ResourceResolver for ResourceRegistry {
    fn resolve(&self, reference: &ResourceRef) -> Option<ResourceDescriptor> {
        self.lookups
            .get(&reference.kind)
            .and_then(|lookup| lookup(&reference.id))
            .filter(|descriptor| descriptor.reference == *reference)
    }
}

/// In-memory resource catalog.
#[derive(Default)]
pub struct ResourceCatalog {
    resources: RwLock<HashMap<ResourceRef, ResourceDescriptor>>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            catalog.upsert(resource);
        }
        catalog
    }

    pub fn upsert(&self, resource: ResourceDescriptor) {
        self.resources.write().insert(resource.reference, resource);
    }

    pub fn remove(&self, reference: &ResourceRef) -> Option<ResourceDescriptor> {
        self.resources.write().remove(reference)
    }

    pub fn list(&self) -> Vec<ResourceDescriptor> {
        let mut resources: Vec<_> = self.resources.read().values().cloned().collect();
        resources.sort_by_key(|r| r.reference);
        resources
    }
}

impl ResourceResolver for ResourceCatalog {
    fn resolve(&self, reference: &ResourceRef) -> Option<ResourceDescriptor> {
        self.resources.read().get(reference).cloned()
    }
}
