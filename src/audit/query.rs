//! Audit query semantics: AND-composed filters, sequence-cursor pagination
//! and CSV export

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::entry::AuditEntry;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Scan direction by sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Desc,
    Asc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Filters composed with logical AND, plus pagination parameters.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub patient_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub outcome: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub cursor: Option<u64>,
    pub direction: Direction,
}

/// One page of matches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryResult {
    pub entries: Vec<AuditEntry>,
    pub total_matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_cursor: Option<String>,
    pub has_more: bool,
}

impl AuditQuery {
    /// All entries matching the filters, in stored (ascending) order.
    pub fn filter_all(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }

    /// Apply filters then paginate by sequence cursor.
    pub fn run(&self, entries: Vec<AuditEntry>) -> AuditQueryResult {
        let mut matches = self.filter_all(entries);
        matches.sort_by_key(|e| e.sequence);
        if self.direction == Direction::Desc {
            matches.reverse();
        }
        let total_matches = matches.len();

        let start = match self.cursor {
            // Next page starts strictly after (desc) / before (asc) the cursor.
            Some(cursor) => matches
                .iter()
                .position(|e| match self.direction {
                    Direction::Desc => e.sequence < cursor,
                    Direction::Asc => e.sequence > cursor,
                })
                .unwrap_or(matches.len()),
            None => 0,
        };

        let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
        let end = (start + limit).min(matches.len());
        let page: Vec<AuditEntry> = matches[start..end].to_vec();
        let has_more = end < matches.len();

        AuditQueryResult {
            next_cursor: if has_more {
                page.last().map(|e| e.sequence.to_string())
            } else {
                None
            },
            previous_cursor: if start > 0 {
                page.first().map(|e| e.sequence.to_string())
            } else {
                None
            },
            entries: page,
            total_matches,
            has_more,
        }
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if !matches_exact(self.actor_id.as_deref(), Some(&entry.actor_id)) {
            return false;
        }
        if !matches_exact(self.actor_type.as_deref(), Some(&entry.actor_type)) {
            return false;
        }
        if !matches_exact(self.patient_id.as_deref(), entry.patient_id.as_deref()) {
            return false;
        }
        if !matches_exact(self.resource.as_deref(), Some(&entry.resource)) {
            return false;
        }
        if !matches_exact(self.action.as_deref(), Some(&entry.action)) {
            return false;
        }
        if !matches_exact(self.outcome.as_deref(), Some(&entry.outcome)) {
            return false;
        }

        if let Some(ref from) = self.from {
            match (parse_bound(from, false), parse_timestamp(&entry.timestamp)) {
                (Some(bound), Some(ts)) if ts >= bound => {}
                _ => return false,
            }
        }
        if let Some(ref to) = self.to {
            match (parse_bound(to, true), parse_timestamp(&entry.timestamp)) {
                (Some(bound), Some(ts)) if ts <= bound => {}
                _ => return false,
            }
        }

        if !self.tags.is_empty() && !self.tags.iter().all(|t| entry.tags.contains(t)) {
            return false;
        }

        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let haystack = format!(
                "{} {} {} {} {} {}",
                entry.details.as_deref().unwrap_or(""),
                serde_json::to_string(&entry.metadata).unwrap_or_default(),
                entry.actor_id,
                entry.resource,
                entry.block_hash.as_deref().unwrap_or(""),
                entry.patient_id.as_deref().unwrap_or(""),
            )
            .to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }

        true
    }
}

fn matches_exact(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => value == Some(expected),
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A bound is either a full RFC 3339 timestamp or a bare date; bare dates
/// expand to the inclusive start or end of that day.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(DateTime::from_naive_utc_and_offset(time, Utc))
}

/// Fixed CSV column order for exports.
const CSV_HEADER: &str = "sequence,id,timestamp,action,actorId,actorType,resource,outcome,patientId,ipAddress,blockHash,channel,tags,details";

/// Render entries as CSV with RFC 4180 quoting.
pub fn to_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        let fields = [
            entry.sequence.to_string(),
            entry.id.clone(),
            entry.timestamp.clone(),
            entry.action.clone(),
            entry.actor_id.clone(),
            entry.actor_type.clone(),
            entry.resource.clone(),
            entry.outcome.clone(),
            entry.patient_id.clone().unwrap_or_default(),
            entry.ip_address.clone().unwrap_or_default(),
            entry.block_hash.clone().unwrap_or_default(),
            entry.channel.clone(),
            entry.tags.join("|"),
            entry.details.clone().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AUDIT_ROOT, CHANNEL_SYSTEM, OUTCOME_SUCCESS};

    fn entry(sequence: u64, action: &str, actor: &str, tags: &[&str]) -> AuditEntry {
        AuditEntry {
            sequence,
            id: format!("a-{}", sequence),
            timestamp: format!("2025-06-{:02}T10:00:00+00:00", (sequence % 27) + 1),
            action: action.to_string(),
            actor_id: actor.to_string(),
            actor_type: "clinician".to_string(),
            resource: "ledger".to_string(),
            outcome: OUTCOME_SUCCESS.to_string(),
            patient_id: None,
            ip_address: None,
            block_hash: None,
            details: Some(format!("entry number {}", sequence)),
            metadata: serde_json::Map::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            channel: CHANNEL_SYSTEM.to_string(),
            prev_hash: AUDIT_ROOT.to_string(),
            integrity_hash: String::new(),
        }
    }

    #[test]
    fn test_pagination_walks_250_entries() {
        let entries: Vec<AuditEntry> =
            (1..=250).map(|i| entry(i, "submit", "system", &[])).collect();
        let mut query = AuditQuery {
            limit: Some(100),
            ..AuditQuery::default()
        };

        let page1 = query.run(entries.clone());
        assert_eq!(page1.entries.len(), 100);
        assert_eq!(page1.total_matches, 250);
        assert!(page1.has_more);
        assert_eq!(page1.entries[0].sequence, 250);
        assert_eq!(page1.next_cursor.as_deref(), Some("151"));
        assert!(page1.previous_cursor.is_none());

        query.cursor = Some(151);
        let page2 = query.run(entries.clone());
        assert_eq!(page2.entries.len(), 100);
        assert_eq!(page2.total_matches, 250);
        assert!(page2.has_more);
        assert_eq!(page2.next_cursor.as_deref(), Some("51"));
        assert_eq!(page2.previous_cursor.as_deref(), Some("150"));

        query.cursor = Some(51);
        let page3 = query.run(entries);
        assert_eq!(page3.entries.len(), 50);
        assert_eq!(page3.total_matches, 250);
        assert!(!page3.has_more);
        assert!(page3.next_cursor.is_none());
    }

    #[test]
    fn test_ascending_direction() {
        let entries: Vec<AuditEntry> =
            (1..=10).map(|i| entry(i, "submit", "system", &[])).collect();
        let query = AuditQuery {
            direction: Direction::Asc,
            limit: Some(4),
            cursor: Some(4),
            ..AuditQuery::default()
        };
        let page = query.run(entries);
        let sequences: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![5, 6, 7, 8]);
        assert!(page.has_more);
    }

    #[test]
    fn test_filters_and_search() {
        let entries = vec![
            entry(1, "wallet.verify", "0xabc", &["auth"]),
            entry(2, "transaction.submitted", "0xabc", &["transaction", "phi"]),
            entry(3, "transaction.submitted", "0xdef", &["transaction"]),
        ];

        let by_actor = AuditQuery {
            actor_id: Some("0xabc".to_string()),
            ..AuditQuery::default()
        };
        assert_eq!(by_actor.run(entries.clone()).total_matches, 2);

        let by_tags = AuditQuery {
            tags: vec!["transaction".to_string(), "phi".to_string()],
            ..AuditQuery::default()
        };
        let result = by_tags.run(entries.clone());
        assert_eq!(result.total_matches, 1);
        assert_eq!(result.entries[0].sequence, 2);

        let by_search = AuditQuery {
            search: Some("NUMBER 3".to_string()),
            ..AuditQuery::default()
        };
        assert_eq!(by_search.run(entries.clone()).total_matches, 1);

        let by_range = AuditQuery {
            from: Some("2025-06-02".to_string()),
            to: Some("2025-06-03".to_string()),
            ..AuditQuery::default()
        };
        assert_eq!(by_range.run(entries).total_matches, 2);
    }

    #[test]
    fn test_csv_quoting() {
        let mut e = entry(1, "submit", "system", &["a", "b"]);
        e.details = Some("contains, comma and \"quotes\"".to_string());
        let csv = to_csv(&[e]);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        let row = lines.next().unwrap();
        assert!(row.contains("a|b"));
        assert!(row.contains("\"contains, comma and \"\"quotes\"\"\""));
    }
}
