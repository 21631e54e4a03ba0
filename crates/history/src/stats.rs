use cropmap_storage::{local_date, DAY_MS};
use serde::Serialize;

use crate::popup::PopupEntry;

/// Summary counts over the live stack.
///
/// `today` and `this_week` are rolling windows (last 24 h, last 7 days),
/// not calendar days, so they overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

impl StackStats {
    pub fn compute(stack: &[PopupEntry], now_ms: i64) -> Self {
        let one_day_ago = now_ms.saturating_sub(DAY_MS);
        let one_week_ago = now_ms.saturating_sub(7 * DAY_MS);

        Self {
            total: stack.len(),
            today: stack.iter().filter(|p| p.timestamp > one_day_ago).count(),
            this_week: stack.iter().filter(|p| p.timestamp > one_week_ago).count(),
            oldest: stack.iter().map(|p| p.timestamp).min(),
            newest: stack.iter().map(|p| p.timestamp).max(),
        }
    }

    pub fn oldest_date(&self) -> Option<String> {
        self.oldest.and_then(local_date)
    }

    pub fn newest_date(&self) -> Option<String> {
        self.newest.and_then(local_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::NewPopup;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn at(timestamp: i64) -> PopupEntry {
        NewPopup::new(0.0, 0.0, json!({})).into_entry(format!("popup_{timestamp}"), timestamp)
    }

    #[test]
    fn test_empty_stack() {
        let stats = StackStats::compute(&[], NOW);
        assert_eq!(
            stats,
            StackStats {
                total: 0,
                today: 0,
                this_week: 0,
                oldest: None,
                newest: None,
            }
        );
        assert_eq!(stats.oldest_date(), None);
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({"total": 0, "today": 0, "thisWeek": 0, "oldest": null, "newest": null})
        );
    }

    #[test]
    fn test_rolling_windows_overlap() {
        let stack = vec![at(NOW - 1_000), at(NOW - 2 * DAY_MS), at(NOW - DAY_MS)];
        let stats = StackStats::compute(&stack, NOW);

        assert_eq!(stats.total, 3);
        // Exactly 24 h old is outside "today"
        assert_eq!(stats.today, 1);
        assert_eq!(stats.this_week, 3);
        assert_eq!(stats.oldest, Some(NOW - 2 * DAY_MS));
        assert_eq!(stats.newest, Some(NOW - 1_000));
        assert!(stats.newest_date().is_some());
    }
}
