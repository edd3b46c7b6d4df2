use crate::domain::calendar;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Customer (organization) identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_identifier!(
    /// Invoice identifier
    InvoiceId
);
uuid_identifier!(
    /// Line item identifier
    LineItemId
);
uuid_identifier!(
    /// Downtime period identifier
    DowntimeId
);
uuid_identifier!(
    /// Opaque identifier of a priced resource, issued by the provisioning side
    ResourceId
);

/// Calendar month an invoice covers, anchored on its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoicePeriod {
    first_day: NaiveDate,
}

impl InvoicePeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Self { first_day })
            .ok_or_else(|| BillingError::ValidationError {
                field: "period".to_string(),
                message: format!("{}-{} is not a valid calendar month", year, month),
            })
    }

    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            first_day: calendar::month_start(instant).date_naive(),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn next(&self) -> Self {
        Self {
            first_day: self.first_day + Duration::days(i64::from(self.days())),
        }
    }

    pub fn previous(&self) -> Self {
        Self::containing(self.start() - Duration::days(1))
    }

    /// First instant of the period (day 1, 00:00:00).
    pub fn start(&self) -> DateTime<Utc> {
        calendar::start_of_day(self.first_day)
    }

    /// Last representable second of the period (last day, 23:59:59).
    pub fn end(&self) -> DateTime<Utc> {
        calendar::month_end(self.start())
    }

    pub fn days(&self) -> u32 {
        calendar::days_in_month(self.year(), self.month())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        Self::containing(instant) == *self
    }
}

impl fmt::Display for InvoicePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}

impl FromStr for InvoicePeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BillingError::ValidationError {
            field: "period".to_string(),
            message: format!("expected YYYY-MM, got '{}'", s),
        };
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for InvoicePeriod {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InvoicePeriod> for String {
    fn from(period: InvoicePeriod) -> Self {
        period.to_string()
    }
}

/// Invoice lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Pending,
    Created,
    Paid,
    Canceled,
}

impl InvoiceState {
    /// Only pending invoices accept new or changed line items.
    pub fn accepts_mutations(&self) -> bool {
        matches!(self, InvoiceState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceState::Paid | InvoiceState::Canceled)
    }

    pub fn can_transition_to(&self, next: InvoiceState) -> bool {
        matches!(
            (self, next),
            (InvoiceState::Pending, InvoiceState::Created)
                | (InvoiceState::Created, InvoiceState::Paid)
                | (InvoiceState::Created, InvoiceState::Canceled)
        )
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceState::Pending => write!(f, "pending"),
            InvoiceState::Created => write!(f, "created"),
            InvoiceState::Paid => write!(f, "paid"),
            InvoiceState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Convention mapping an active time window onto a fraction of the unit price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingUnit {
    Quantity,
    PerDay,
    PerHalfMonth,
    PerMonth,
}

impl fmt::Display for BillingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingUnit::Quantity => write!(f, "quantity"),
            BillingUnit::PerDay => write!(f, "per_day"),
            BillingUnit::PerHalfMonth => write!(f, "per_half_month"),
            BillingUnit::PerMonth => write!(f, "per_month"),
        }
    }
}

impl FromStr for BillingUnit {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quantity" => Ok(BillingUnit::Quantity),
            "per_day" => Ok(BillingUnit::PerDay),
            "per_half_month" => Ok(BillingUnit::PerHalfMonth),
            "per_month" => Ok(BillingUnit::PerMonth),
            other => Err(BillingError::ValidationError {
                field: "unit".to_string(),
                message: format!("unknown billing unit '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invoice_state_transitions() {
        assert!(InvoiceState::Pending.can_transition_to(InvoiceState::Created));
        assert!(InvoiceState::Created.can_transition_to(InvoiceState::Paid));
        assert!(InvoiceState::Created.can_transition_to(InvoiceState::Canceled));
        assert!(!InvoiceState::Pending.can_transition_to(InvoiceState::Paid));
        assert!(!InvoiceState::Paid.can_transition_to(InvoiceState::Canceled));
        assert!(!InvoiceState::Created.can_transition_to(InvoiceState::Created));
    }

    #[test]
    fn test_period_navigation_wraps_years() {
        let december = InvoicePeriod::new(2017, 12).unwrap();
        assert_eq!(december.next(), InvoicePeriod::new(2018, 1).unwrap());
        assert_eq!(december.next().previous(), december);
        assert_eq!(december.to_string(), "2017-12");
        assert_eq!("2017-12".parse::<InvoicePeriod>().unwrap(), december);
        assert!("2017-13".parse::<InvoicePeriod>().is_err());
    }

    #[test]
    fn test_period_bounds() {
        let february = InvoicePeriod::new(2016, 2).unwrap();
        assert_eq!(february.start(), Utc.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(february.end(), Utc.with_ymd_and_hms(2016, 2, 29, 23, 59, 59).unwrap());
        assert_eq!(february.days(), 29);
        assert!(february.contains(Utc.with_ymd_and_hms(2016, 2, 15, 12, 0, 0).unwrap()));
        assert!(!february.contains(Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_billing_unit_parsing() {
        assert_eq!("per_half_month".parse::<BillingUnit>().unwrap(), BillingUnit::PerHalfMonth);
        assert_eq!(BillingUnit::PerDay.to_string(), "per_day");
        assert!("hourly".parse::<BillingUnit>().is_err());
    }
}
