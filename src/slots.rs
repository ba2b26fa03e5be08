use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::config::Endpoint;
use crate::error::ClusterError;
use crate::resp::Value;

pub const SLOT_COUNT: u16 = 16384;

/// Dense mapping from hash slot to the ordered endpoint keys serving it:
/// the primary at index 0, replicas after.
///
/// Mutation happens from the refresher (serialized, see the fetcher module)
/// and from eager MOVED updates; a stale refresh may briefly overwrite a
/// fresher MOVED hint, which the next redirection reconciles.
pub struct SlotMap {
    table: RwLock<Vec<Vec<String>>>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(vec![Vec::new(); SLOT_COUNT as usize]),
        }
    }

    /// Ordered endpoint keys for a slot, or `None` when unassigned.
    pub fn get(&self, slot: u16) -> Option<Vec<String>> {
        let table = self.table.read();
        let entry = table.get(slot as usize)?;
        if entry.is_empty() {
            None
        } else {
            Some(entry.clone())
        }
    }

    /// Assign `keys` to every slot in `start..=end`. A later assignment of
    /// an overlapping range wins.
    pub fn set_range(&self, start: u16, end: u16, keys: Vec<String>) {
        let mut table = self.table.write();
        for slot in start..=end.min(SLOT_COUNT - 1) {
            table[slot as usize] = keys.clone();
        }
    }

    /// Replace the whole table at once.
    pub fn replace_all(&self, entries: Vec<Vec<String>>) {
        let mut table = vec![Vec::new(); SLOT_COUNT as usize];
        for (slot, keys) in entries.into_iter().enumerate().take(SLOT_COUNT as usize) {
            table[slot] = keys;
        }
        *self.table.write() = table;
    }

    /// Eager local update after a MOVED reply: rewrite the primary for one
    /// slot, keeping any known replicas in place.
    pub fn set_master(&self, slot: u16, key: &str) {
        let mut table = self.table.write();
        let entry = &mut table[slot as usize];
        if entry.is_empty() {
            entry.push(key.to_string());
        } else {
            entry[0] = key.to_string();
        }
    }

    pub(crate) fn apply_ranges(&self, ranges: &[SlotRange]) {
        let mut table = self.table.write();
        for range in ranges {
            for slot in range.start..=range.end.min(SLOT_COUNT - 1) {
                table[slot as usize] = range.keys.clone();
            }
        }
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        Self::new()
    }
}

/// One `CLUSTER SLOTS` tuple: a slot range and the ordered endpoint keys
/// serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub keys: Vec<String>,
}

/// Parse a `CLUSTER SLOTS` reply into slot ranges plus the deduplicated
/// endpoint set. The first endpoint of each tuple is the primary; the rest
/// are marked read-only. An endpoint seen as primary anywhere keeps the
/// primary role.
pub fn parse_cluster_slots(
    reply: &Value,
) -> Result<(Vec<SlotRange>, Vec<Endpoint>), ClusterError> {
    let entries = reply
        .as_array()
        .ok_or_else(|| ClusterError::Reply("CLUSTER SLOTS must return an array".into()))?;

    let mut ranges = Vec::with_capacity(entries.len());
    let mut endpoints: HashMap<String, Endpoint> = HashMap::new();

    for entry in entries {
        let fields = entry
            .as_array()
            .ok_or_else(|| ClusterError::Reply("slot entry must be an array".into()))?;
        if fields.len() < 3 {
            return Err(ClusterError::Reply(
                "slot entry must contain start, end, and primary".into(),
            ));
        }

        let start = extract_slot(&fields[0])?;
        let end = extract_slot(&fields[1])?;
        if start > end {
            return Err(ClusterError::Reply(format!(
                "slot range {start}-{end} out of order"
            )));
        }

        let mut keys = Vec::with_capacity(fields.len() - 2);
        for (position, field) in fields[2..].iter().enumerate() {
            let mut endpoint = extract_endpoint(field)?;
            endpoint.read_only = position != 0;
            let key = endpoint.key();
            endpoints
                .entry(key.clone())
                .and_modify(|existing| {
                    if !endpoint.read_only {
                        existing.read_only = false;
                    }
                })
                .or_insert(endpoint);
            keys.push(key);
        }

        ranges.push(SlotRange { start, end, keys });
    }

    let mut endpoints: Vec<Endpoint> = endpoints.into_values().collect();
    endpoints.sort_by(|a, b| a.key().cmp(&b.key()));
    Ok((ranges, endpoints))
}

fn extract_slot(value: &Value) -> Result<u16, ClusterError> {
    let int = value
        .as_integer()
        .ok_or_else(|| ClusterError::Reply("slot bound must be an integer".into()))?;
    if !(0..i64::from(SLOT_COUNT)).contains(&int) {
        return Err(ClusterError::Reply(format!("slot {int} out of bounds")));
    }
    Ok(int as u16)
}

fn extract_endpoint(value: &Value) -> Result<Endpoint, ClusterError> {
    let fields = value
        .as_array()
        .ok_or_else(|| ClusterError::Reply("endpoint must be an array".into()))?;
    if fields.len() < 2 {
        return Err(ClusterError::Reply(
            "endpoint must contain host and port".into(),
        ));
    }
    let host = fields[0]
        .as_bytes()
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .ok_or_else(|| ClusterError::Reply("endpoint host must be a string".into()))?;
    let port = fields[1]
        .as_integer()
        .ok_or_else(|| ClusterError::Reply("endpoint port must be an integer".into()))?;
    Ok(Endpoint::new(host, port as u16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::Value;

    fn endpoint_value(host: &str, port: i64) -> Value {
        Value::Array(vec![Value::bulk(host), Value::Integer(port)])
    }

    fn slots_reply(tuples: &[(u16, u16, &[(&str, i64)])]) -> Value {
        Value::Array(
            tuples
                .iter()
                .map(|(start, end, nodes)| {
                    let mut fields = vec![
                        Value::Integer(i64::from(*start)),
                        Value::Integer(i64::from(*end)),
                    ];
                    fields.extend(
                        nodes
                            .iter()
                            .map(|&(host, port)| endpoint_value(host, port)),
                    );
                    Value::Array(fields)
                })
                .collect(),
        )
    }

    #[test]
    fn parse_keeps_primary_first() {
        let reply = slots_reply(&[(0, 2, &[("10.0.0.1", 7000), ("10.0.0.2", 7000)])]);
        let (ranges, endpoints) = parse_cluster_slots(&reply).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].keys, vec!["10.0.0.1:7000", "10.0.0.2:7000"]);

        let primary = endpoints.iter().find(|e| e.port == 7000 && e.host == "10.0.0.1");
        assert!(!primary.unwrap().read_only);
        let replica = endpoints.iter().find(|e| e.host == "10.0.0.2");
        assert!(replica.unwrap().read_only);
    }

    #[test]
    fn parse_is_invariant_under_tuple_permutation() {
        let forward = slots_reply(&[
            (0, 5460, &[("a", 1)]),
            (5461, 16383, &[("b", 2)]),
        ]);
        let backward = slots_reply(&[
            (5461, 16383, &[("b", 2)]),
            (0, 5460, &[("a", 1)]),
        ]);

        let map_a = SlotMap::new();
        let (ranges, _) = parse_cluster_slots(&forward).unwrap();
        map_a.apply_ranges(&ranges);
        let map_b = SlotMap::new();
        let (ranges, _) = parse_cluster_slots(&backward).unwrap();
        map_b.apply_ranges(&ranges);

        for slot in [0u16, 5460, 5461, 16383] {
            assert_eq!(map_a.get(slot), map_b.get(slot));
        }
    }

    #[test]
    fn apply_ranges_leaves_undeclared_slots_alone() {
        let map = SlotMap::new();
        map.set_range(100, 200, vec!["old:1".into()]);
        let (ranges, _) =
            parse_cluster_slots(&slots_reply(&[(0, 50, &[("new", 1)])])).unwrap();
        map.apply_ranges(&ranges);
        assert_eq!(map.get(25), Some(vec!["new:1".to_string()]));
        assert_eq!(map.get(150), Some(vec!["old:1".to_string()]));
    }

    #[test]
    fn later_set_range_wins_on_overlap() {
        let map = SlotMap::new();
        map.set_range(0, 100, vec!["a:1".into()]);
        map.set_range(50, 150, vec!["b:1".into()]);
        assert_eq!(map.get(49), Some(vec!["a:1".to_string()]));
        assert_eq!(map.get(50), Some(vec!["b:1".to_string()]));
        assert_eq!(map.get(150), Some(vec!["b:1".to_string()]));
    }

    #[test]
    fn set_master_replaces_index_zero_only() {
        let map = SlotMap::new();
        map.set_range(10, 10, vec!["a:1".into(), "replica:1".into()]);
        map.set_master(10, "b:1");
        assert_eq!(
            map.get(10),
            Some(vec!["b:1".to_string(), "replica:1".to_string()])
        );
    }

    #[test]
    fn set_master_creates_missing_entry() {
        let map = SlotMap::new();
        map.set_master(42, "a:1");
        assert_eq!(map.get(42), Some(vec!["a:1".to_string()]));
    }

    #[test]
    fn parse_rejects_bad_replies() {
        assert!(parse_cluster_slots(&Value::ok()).is_err());
        let missing_primary = Value::Array(vec![Value::Array(vec![
            Value::Integer(0),
            Value::Integer(10),
        ])]);
        assert!(parse_cluster_slots(&missing_primary).is_err());
        let out_of_bounds = slots_reply(&[(0, 16383, &[("a", 1)])]);
        assert!(parse_cluster_slots(&out_of_bounds).is_ok());
        let bad = Value::Array(vec![Value::Array(vec![
            Value::Integer(0),
            Value::Integer(20000),
            endpoint_value("a", 1),
        ])]);
        assert!(parse_cluster_slots(&bad).is_err());
    }
}
