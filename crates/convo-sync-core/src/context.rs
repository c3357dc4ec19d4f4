//! Recent conversation context.
//!
//! Picks the latest few messages of a thread plus the most recent message
//! from each side, which is what reply drafting needs as its "what was just
//! said" input.

use crate::models::{MessageRecord, Speaker};
use crate::timestamp::{sort_newest_first, TimestampParser};

/// Default number of recent messages kept for context.
pub const DEFAULT_RECENT: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct RecentContext {
    /// Newest first, at most `n` entries.
    pub recent: Vec<MessageRecord>,
    pub latest_partner: Option<MessageRecord>,
    pub latest_self: Option<MessageRecord>,
}

pub fn recent_context(
    records: &[MessageRecord],
    n: usize,
    parser: &dyn TimestampParser,
) -> RecentContext {
    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted, parser);

    let latest_partner = sorted.iter().find(|r| r.speaker == Speaker::Partner).cloned();
    let latest_self = sorted.iter().find(|r| r.speaker == Speaker::Me).cloned();
    sorted.truncate(n);

    RecentContext {
        recent: sorted,
        latest_partner,
        latest_self,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::TalkPageLocale;

    #[test]
    fn test_latest_per_speaker() {
        let records = vec![
            MessageRecord::new("2025/9/23(火)", "21:00", Speaker::Partner, "p-old"),
            MessageRecord::new("2025/9/24(水)", "06:15既読", Speaker::Me, "me-new"),
            MessageRecord::new("2025/9/24(水)", "07:30", Speaker::Partner, "p-new"),
            MessageRecord::new("2025/9/22(月)", "12:00既読", Speaker::Me, "me-old"),
        ];
        let ctx = recent_context(&records, 3, &TalkPageLocale::default());
        assert_eq!(ctx.recent.len(), 3);
        assert_eq!(ctx.recent[0].text, "p-new");
        assert_eq!(ctx.latest_partner.unwrap().text, "p-new");
        assert_eq!(ctx.latest_self.unwrap().text, "me-new");
    }

    #[test]
    fn test_empty_thread() {
        let ctx = recent_context(&[], DEFAULT_RECENT, &TalkPageLocale::default());
        assert!(ctx.recent.is_empty());
        assert!(ctx.latest_partner.is_none());
        assert!(ctx.latest_self.is_none());
    }

    #[test]
    fn test_only_one_side_present() {
        let records = vec![MessageRecord::new("2025/9/24", "07:30", Speaker::Partner, "hi")];
        let ctx = recent_context(&records, DEFAULT_RECENT, &TalkPageLocale::default());
        assert!(ctx.latest_partner.is_some());
        assert!(ctx.latest_self.is_none());
    }
}
