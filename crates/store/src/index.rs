use modelsync_api::NodeId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Named string-keyed node indexes with a reverse map for node deletion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct IndexTable {
    entries: BTreeMap<SmolStr, BTreeMap<SmolStr, BTreeSet<NodeId>>>,
    by_node: HashMap<NodeId, BTreeSet<(SmolStr, SmolStr)>>,
}

impl IndexTable {
    pub fn add(&mut self, index: &str, key: &str, node: NodeId) -> bool {
        let inserted = self
            .entries
            .entry(SmolStr::new(index))
            .or_default()
            .entry(SmolStr::new(key))
            .or_default()
            .insert(node);
        if inserted {
            self.by_node
                .entry(node)
                .or_default()
                .insert((SmolStr::new(index), SmolStr::new(key)));
        }
        inserted
    }

    /// Returns the keys whose entry for `node` was actually dropped.
    pub fn remove(&mut self, index: &str, key: Option<&str>, node: NodeId) -> Vec<SmolStr> {
        let keys: Vec<SmolStr> = match key {
            Some(k) => vec![SmolStr::new(k)],
            None => self
                .by_node
                .get(&node)
                .map(|set| {
                    set.iter()
                        .filter(|(i, _)| i == index)
                        .map(|(_, k)| k.clone())
                        .collect()
                })
                .unwrap_or_default(),
        };

        keys.into_iter()
            .filter(|key| self.remove_entry(index, key, node))
            .collect()
    }

    /// Drops every entry of `node` across all indexes and returns them as
    /// `(index, key)` pairs.
    pub fn remove_node(&mut self, node: NodeId) -> Vec<(SmolStr, SmolStr)> {
        let Some(set) = self.by_node.remove(&node) else {
            return Vec::new();
        };
        for (index, key) in &set {
            if let Some(keys) = self.entries.get_mut(index) {
                if let Some(nodes) = keys.get_mut(key) {
                    nodes.remove(&node);
                    if nodes.is_empty() {
                        keys.remove(key);
                    }
                }
            }
        }
        set.into_iter().collect()
    }

    fn remove_entry(&mut self, index: &str, key: &str, node: NodeId) -> bool {
        let mut removed = false;
        if let Some(keys) = self.entries.get_mut(index) {
            if let Some(nodes) = keys.get_mut(key) {
                removed = nodes.remove(&node);
                if nodes.is_empty() {
                    keys.remove(key);
                }
            }
        }
        if let Some(set) = self.by_node.get_mut(&node) {
            set.remove(&(SmolStr::new(index), SmolStr::new(key)));
            if set.is_empty() {
                self.by_node.remove(&node);
            }
        }
        removed
    }

    pub fn get(&self, index: &str, key: &str) -> Vec<NodeId> {
        self.entries
            .get(index)
            .and_then(|keys| keys.get(key))
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn query(&self, index: &str, pattern: &str) -> Vec<(SmolStr, NodeId)> {
        let Some(keys) = self.entries.get(index) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        match pattern.strip_suffix('*') {
            Some(prefix) => {
                for (key, nodes) in keys
                    .range(SmolStr::new(prefix)..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                {
                    hits.extend(nodes.iter().map(|n| (key.clone(), *n)));
                }
            }
            None => {
                if let Some((key, nodes)) = keys.get_key_value(pattern) {
                    hits.extend(nodes.iter().map(|n| (key.clone(), *n)));
                }
            }
        }
        hits
    }

    pub fn names(&self) -> Vec<SmolStr> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_query_stops_at_boundary() {
        let mut table = IndexTable::default();
        table.add("access", "12##name", NodeId(1));
        table.add("access", "12##size", NodeId(2));
        table.add("access", "123##name", NodeId(3));

        let hits: Vec<NodeId> = table
            .query("access", "12##*")
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(hits, vec![NodeId(1), NodeId(2)]);
        assert_eq!(table.query("access", "*").len(), 3);
    }

    #[test]
    fn remove_without_key_clears_node_in_one_index() {
        let mut table = IndexTable::default();
        table.add("a", "k1", NodeId(7));
        table.add("a", "k2", NodeId(7));
        table.add("b", "k1", NodeId(7));

        table.remove("a", None, NodeId(7));
        assert!(table.get("a", "k1").is_empty());
        assert!(table.get("a", "k2").is_empty());
        assert_eq!(table.get("b", "k1"), vec![NodeId(7)]);

        table.remove_node(NodeId(7));
        assert!(table.get("b", "k1").is_empty());
    }
}
