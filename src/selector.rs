//! Latest-snapshot selection.

use crate::error::TransferError;
use crate::types::SnapshotDescriptor;

/// Picks the most recent snapshot.
///
/// Snapshots are ordered by the creation time of their first node snapshot.
/// On ties the earliest listed snapshot wins.
///
/// # Errors
///
/// - `EmptyInput` if `snapshots` is empty
/// - `MalformedSnapshot` if any snapshot has no node snapshot records
pub fn pick_latest(snapshots: &[SnapshotDescriptor]) -> Result<&SnapshotDescriptor, TransferError> {
    let (first, rest) = snapshots.split_first().ok_or(TransferError::EmptyInput)?;

    let mut latest = first;
    let mut latest_time = created_at(first)?;
    for candidate in rest {
        let time = created_at(candidate)?;
        if time > latest_time {
            latest = candidate;
            latest_time = time;
        }
    }

    Ok(latest)
}

fn created_at(
    snapshot: &SnapshotDescriptor,
) -> Result<chrono::DateTime<chrono::Utc>, TransferError> {
    snapshot
        .effective_create_time()
        .ok_or_else(|| TransferError::MalformedSnapshot(snapshot.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeSnapshot;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn snapshot(name: &str, node_hours: &[u32]) -> SnapshotDescriptor {
        SnapshotDescriptor {
            name: name.to_string(),
            create_time: None,
            node_snapshots: node_hours
                .iter()
                .map(|&h| NodeSnapshot {
                    snapshot_create_time: at(h),
                })
                .collect(),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(pick_latest(&[]), Err(TransferError::EmptyInput)));
    }

    #[test]
    fn test_single_snapshot() {
        let snapshots = vec![snapshot("only", &[5])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "only");
    }

    #[test]
    fn test_picks_maximum_regardless_of_position() {
        // T1 < T3 < T2 for indices 0, 1, 2
        let snapshots = vec![snapshot("s0", &[1]), snapshot("s1", &[9]), snapshot("s2", &[4])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "s1");

        let snapshots = vec![snapshot("s0", &[1]), snapshot("s1", &[2]), snapshot("s2", &[3])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "s2");
    }

    #[test]
    fn test_ties_keep_earliest() {
        let snapshots = vec![snapshot("s0", &[1]), snapshot("s1", &[7]), snapshot("s2", &[7])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "s1");
    }

    #[test]
    fn test_only_first_node_snapshot_counts() {
        // s0's second node is the newest timestamp overall, but only the first
        // node record is compared.
        let snapshots = vec![snapshot("s0", &[2, 23]), snapshot("s1", &[3, 4])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "s1");
    }

    #[test]
    fn test_descriptor_level_time_is_ignored() {
        let mut old = snapshot("old", &[1]);
        old.create_time = Some(at(22));
        let snapshots = vec![old, snapshot("new", &[2])];
        assert_eq!(pick_latest(&snapshots).unwrap().name, "new");
    }

    #[test]
    fn test_malformed_snapshot() {
        let snapshots = vec![snapshot("s0", &[1]), snapshot("broken", &[])];
        match pick_latest(&snapshots) {
            Err(TransferError::MalformedSnapshot(name)) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
