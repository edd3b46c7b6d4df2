//! Reported outages and their admission rules.

use crate::domain::resources::ResourceRef;
use crate::domain::types::DowntimeId;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Duration bounds a downtime period must respect. `None` leaves a side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DowntimePolicy {
    pub minimal: Option<Duration>,
    pub maximal: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimePeriod {
    pub id: DowntimeId,
    pub resource: ResourceRef,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DowntimePeriod {
    pub fn new(resource: ResourceRef, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(BillingError::ValidationError {
                field: "end".to_string(),
                message: "Downtime end must not precede its start".to_string(),
            });
        }
        Ok(Self {
            id: DowntimeId::new(),
            resource,
            start,
            end,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive intersection: periods sharing a boundary instant intersect.
    pub fn intersects(&self, other: &DowntimePeriod) -> bool {
        !(self.end < other.start || self.start > other.end)
    }
}

/// Checks `candidate` against the bounds, the clock and the periods already
/// recorded for its resource. The first failing rule is reported.
pub fn validate(
    candidate: &DowntimePeriod,
    existing: &[DowntimePeriod],
    policy: &DowntimePolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    let duration = candidate.duration();
    if let Some(minimal) = policy.minimal {
        if duration < minimal {
            return Err(BillingError::ValidationError {
                field: "end".to_string(),
                message: format!(
                    "Downtime duration is too short. Minimal duration: {}",
                    humanize(minimal)
                ),
            });
        }
    }
    if let Some(maximal) = policy.maximal {
        if duration > maximal {
            return Err(BillingError::ValidationError {
                field: "end".to_string(),
                message: format!(
                    "Downtime duration is too long. Maximal duration: {}",
                    humanize(maximal)
                ),
            });
        }
    }

    if candidate.start > now {
        return Err(BillingError::ValidationError {
            field: "start".to_string(),
            message: "Future downtime is not supported yet. Please use date in the past instead."
                .to_string(),
        });
    }
    if candidate.end > now {
        return Err(BillingError::ValidationError {
            field: "end".to_string(),
            message: "Future downtime is not supported yet. Please use date in the past instead."
                .to_string(),
        });
    }

    let conflicting: Vec<String> = existing
        .iter()
        .filter(|period| period.id != candidate.id && period.resource == candidate.resource)
        .filter(|period| candidate.intersects(period))
        .map(|period| period.id.to_string())
        .collect();
    if !conflicting.is_empty() {
        return Err(BillingError::DowntimeOverlap { conflicting });
    }

    Ok(())
}

fn humanize(duration: Duration) -> String {
    let days = duration.num_days();
    let hours = duration.num_hours() - days * 24;
    let minutes = duration.num_minutes() - duration.num_hours() * 60;

    let parts: Vec<String> = [(days, "day"), (hours, "hour"), (minutes, "minute")]
        .into_iter()
        .filter(|(count, _)| *count != 0)
        .map(|(count, unit)| match count {
            1 => format!("1 {}", unit),
            n => format!("{} {}s", n, unit),
        })
        .collect();

    if parts.is_empty() {
        return format!("{} seconds", duration.num_seconds());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resources::ResourceKind;
    use crate::domain::types::ResourceId;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 1, d, 0, 0, 0).unwrap()
    }

    fn policy() -> DowntimePolicy {
        DowntimePolicy {
            minimal: Some(Duration::hours(24)),
            maximal: Some(Duration::days(30)),
        }
    }

    #[test]
    fn test_touching_boundary_is_rejected() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let existing = DowntimePeriod::new(resource, day(10), day(20)).unwrap();
        let now = Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap();

        let touching = DowntimePeriod::new(resource, day(20), day(25)).unwrap();
        match validate(&touching, &[existing.clone()], &policy(), now) {
            Err(BillingError::DowntimeOverlap { conflicting }) => {
                assert_eq!(conflicting, vec![existing.id.to_string()]);
            }
            other => panic!("expected overlap, got {:?}", other),
        }

        let after = DowntimePeriod::new(resource, day(21), day(25)).unwrap();
        assert!(validate(&after, &[existing], &policy(), now).is_ok());
    }

    #[test]
    fn test_every_intersection_shape_is_detected() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let existing = DowntimePeriod::new(resource, day(10), day(20)).unwrap();

        for (start, end) in [(5, 12), (15, 25), (5, 25), (12, 18)] {
            let candidate = DowntimePeriod::new(resource, day(start), day(end)).unwrap();
            assert!(candidate.intersects(&existing), "{}..{}", start, end);
        }
        let before = DowntimePeriod::new(resource, day(1), day(9)).unwrap();
        assert!(!before.intersects(&existing));
    }

    #[test]
    fn test_other_resources_do_not_conflict() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let other = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let existing = DowntimePeriod::new(other, day(10), day(20)).unwrap();
        let candidate = DowntimePeriod::new(resource, day(10), day(20)).unwrap();
        let now = day(31);

        assert!(validate(&candidate, &[existing], &policy(), now).is_ok());
    }

    #[test]
    fn test_duration_bounds() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let now = day(31);

        let short = DowntimePeriod::new(resource, day(10), day(10) + Duration::hours(2)).unwrap();
        let err = validate(&short, &[], &policy(), now).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("too short"));
        assert!(err.to_string().ends_with("Minimal duration: 1 day"));

        let long = DowntimePeriod::new(resource, day(1), day(1) + Duration::days(31)).unwrap();
        let err = validate(&long, &[], &policy(), day(1) + Duration::days(40)).unwrap_err();
        assert!(err.to_string().contains("too long"));

        assert!(validate(&short, &[], &DowntimePolicy::default(), now).is_ok());
    }

    #[test]
    fn test_future_downtime_is_rejected() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        let candidate = DowntimePeriod::new(resource, day(10), day(15)).unwrap();

        let err = validate(&candidate, &[], &policy(), day(12)).unwrap_err();
        assert!(err.is_validation());
        assert!(validate(&candidate, &[], &policy(), day(9)).is_err());
    }

    #[test]
    fn test_reversed_period_is_rejected() {
        let resource = ResourceRef::new(ResourceKind::Package, ResourceId::new());
        assert!(DowntimePeriod::new(resource, day(15), day(10))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::hours(24)), "1 day");
        assert_eq!(humanize(Duration::days(30)), "30 days");
        assert_eq!(humanize(Duration::hours(5)), "5 hours");
        assert_eq!(humanize(Duration::minutes(90)), "1 hour 30 minutes");
        assert_eq!(humanize(Duration::minutes(1)), "1 minute");
        assert_eq!(humanize(Duration::hours(25) + Duration::minutes(2)), "1 day 1 hour 2 minutes");
        assert_eq!(humanize(Duration::seconds(45)), "45 seconds");
    }
}
