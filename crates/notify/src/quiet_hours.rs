//! Recipient quiet-hours windows, evaluated in the recipient's timezone.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{NotificationPriority, NotificationType};

/// A daily window during which only override-listed priorities/types are delivered.
///
/// `start`/`end` are `HH:MM` strings. When `start > end` the window wraps
/// midnight (`22:00`–`07:00`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub start: String,
    pub end: String,
    /// IANA timezone name, e.g. `America/Los_Angeles`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Weekdays the window applies on (local weekday at check time). Empty = every day.
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub override_priorities: Vec<NotificationPriority>,
    #[serde(default)]
    pub override_types: Vec<NotificationType>,
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl QuietHours {
    pub fn new(start: &str, end: &str, timezone: &str) -> Self {
        Self {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            timezone: timezone.to_string(),
            days: Vec::new(),
            override_priorities: Vec::new(),
            override_types: Vec::new(),
        }
    }

    /// Whether a notification of `priority`/`notification_type` must wait at `now`.
    ///
    /// Override-listed priorities and types always pass. An unparseable
    /// window never suppresses; an unknown timezone falls back to UTC.
    pub fn suppresses(
        &self,
        now: DateTime<Utc>,
        priority: NotificationPriority,
        notification_type: NotificationType,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if self.override_priorities.contains(&priority)
            || self.override_types.contains(&notification_type)
        {
            return false;
        }

        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            warn!(start = %self.start, end = %self.end, "invalid quiet hours window, ignoring");
            return false;
        };

        let tz = self.tz();
        let local = now.with_timezone(&tz);

        if !self.days.is_empty() && !self.days.contains(&local.weekday()) {
            return false;
        }

        window_contains(start, end, local.time())
    }

    fn tz(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %self.timezone, "unknown quiet hours timezone, using UTC");
                chrono_tz::UTC
            }
        }
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .ok()
}

/// Half-open window test. Wrapping windows (`start > end`) contain
/// `t >= start || t < end`; others contain `start <= t < end`.
pub fn window_contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start > end {
        t >= start || t < end
    } else {
        start <= t && t < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_utc(h: u32, m: u32) -> DateTime<Utc> {
        // 2026-03-04 is a Wednesday.
        Utc.with_ymd_and_hms(2026, 3, 4, h, m, 0).unwrap()
    }

    fn overnight() -> QuietHours {
        let mut q = QuietHours::new("22:00", "07:00", "UTC");
        q.override_priorities = vec![NotificationPriority::Critical];
        q
    }

    #[test]
    fn wrap_window_late_evening_is_quiet() {
        assert!(overnight().suppresses(at_utc(23, 30), NotificationPriority::Normal, NotificationType::DispatchAlert));
    }

    #[test]
    fn wrap_window_early_morning_is_quiet() {
        assert!(overnight().suppresses(at_utc(6, 30), NotificationPriority::Normal, NotificationType::DispatchAlert));
    }

    #[test]
    fn wrap_window_midday_is_not_quiet() {
        assert!(!overnight().suppresses(at_utc(12, 0), NotificationPriority::Normal, NotificationType::DispatchAlert));
    }

    #[test]
    fn override_priority_bypasses_window() {
        assert!(!overnight().suppresses(at_utc(23, 30), NotificationPriority::Critical, NotificationType::DispatchAlert));
    }

    #[test]
    fn override_type_bypasses_window() {
        let mut q = overnight();
        q.override_types = vec![NotificationType::DispatchEscalation];
        assert!(!q.suppresses(at_utc(23, 30), NotificationPriority::Low, NotificationType::DispatchEscalation));
    }

    #[test]
    fn end_boundary_is_exclusive_start_inclusive() {
        let q = overnight();
        assert!(!q.suppresses(at_utc(7, 0), NotificationPriority::Low, NotificationType::System));
        assert!(q.suppresses(at_utc(22, 0), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn non_wrapping_window() {
        let q = QuietHours::new("12:00", "14:00", "UTC");
        assert!(q.suppresses(at_utc(13, 0), NotificationPriority::Low, NotificationType::System));
        assert!(!q.suppresses(at_utc(14, 0), NotificationPriority::Low, NotificationType::System));
        assert!(!q.suppresses(at_utc(11, 59), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn evaluated_in_recipient_timezone() {
        // 05:00 UTC is 21:00 the previous day in Los Angeles (PST, UTC-8).
        let q = QuietHours::new("20:00", "23:00", "America/Los_Angeles");
        assert!(q.suppresses(at_utc(5, 0), NotificationPriority::Low, NotificationType::System));
        // 12:00 UTC is 04:00 in Los Angeles.
        assert!(!q.suppresses(at_utc(12, 0), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn days_restrict_window_by_local_weekday() {
        let mut q = QuietHours::new("00:00", "23:59", "UTC");
        q.days = vec![Weekday::Sat, Weekday::Sun];
        assert!(!q.suppresses(at_utc(10, 0), NotificationPriority::Low, NotificationType::System));
        q.days.push(Weekday::Wed);
        assert!(q.suppresses(at_utc(10, 0), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn invalid_window_never_suppresses() {
        let q = QuietHours::new("late", "07:00", "UTC");
        assert!(!q.suppresses(at_utc(23, 30), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let q = QuietHours::new("22:00", "07:00", "Mars/Olympus_Mons");
        assert!(q.suppresses(at_utc(23, 30), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn disabled_window_never_suppresses() {
        let mut q = overnight();
        q.enabled = false;
        assert!(!q.suppresses(at_utc(23, 30), NotificationPriority::Low, NotificationType::System));
    }

    #[test]
    fn deserializes_with_defaults() {
        let q: QuietHours = serde_json::from_str(
            r#"{"start":"22:00","end":"07:00","override_priorities":["critical"]}"#,
        )
        .unwrap();
        assert!(q.enabled);
        assert_eq!(q.timezone, "UTC");
        assert!(q.days.is_empty());
        assert_eq!(q.override_priorities, vec![NotificationPriority::Critical]);
    }
}
