use crate::domain::downtime::DowntimePeriod;
use crate::domain::invoices::Invoice;
use crate::domain::line_items::LineItem;
use crate::domain::resources::ResourceDescriptor;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Serializable image of a whole ledger plus the resources it prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    /// Line items in creation order.
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub downtimes: Vec<DowntimePeriod>,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

impl LedgerSnapshot {
    /// Reads a snapshot; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No ledger snapshot yet, starting empty");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!(
            path = %path.display(),
            invoices = self.invoices.len(),
            items = self.items.len(),
            "Wrote ledger snapshot"
        );
        Ok(())
    }
}
