use crate::error::Result;
use modelsync_api::schema::{INDEX_PROXIES, PROXY_PREFIX};
use modelsync_api::{GraphStore, NodeId, PropertyValue};
use serde::Serialize;
use smol_str::SmolStr;

/// One reference waiting for its target element to appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyTuple {
    /// `<target-file-key>#<fragment>`
    pub target_uri: SmolStr,
    pub label: SmolStr,
    pub containment: bool,
    pub container: bool,
}

impl ProxyTuple {
    pub fn new(
        target_file: &str,
        fragment: &str,
        label: &str,
        containment: bool,
        container: bool,
    ) -> Self {
        Self {
            target_uri: SmolStr::from(format!("{}#{}", target_file, fragment)),
            label: SmolStr::new(label),
            containment,
            container,
        }
    }

    /// Identifier part of the target URI, given the file key it was filed under.
    pub fn fragment(&self, target_file: &str) -> &str {
        match self
            .target_uri
            .strip_prefix(target_file)
            .and_then(|rest| rest.strip_prefix('#'))
        {
            Some(fragment) => fragment,
            None => self
                .target_uri
                .rsplit_once('#')
                .map(|(_, f)| f)
                .unwrap_or(&self.target_uri),
        }
    }

    fn to_value(&self) -> PropertyValue {
        PropertyValue::List(vec![
            self.target_uri.clone().into(),
            self.label.clone().into(),
            self.containment.into(),
            self.container.into(),
        ])
    }

    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value.as_list()? {
            [uri, label, containment, container] => Some(Self {
                target_uri: SmolStr::new(uri.as_str()?),
                label: SmolStr::new(label.as_str()?),
                containment: containment.as_bool()?,
                container: container.as_bool()?,
            }),
            _ => None,
        }
    }
}

/// Proxy records live as `_proxyRef:<target-file>` properties on the
/// referencing node and are indexed by target file so that indexing that file
/// finds every record waiting on it.
#[derive(Debug, Default)]
pub struct ProxyDictionary {
    created: usize,
    resolved: usize,
}

impl ProxyDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property_key(target_file: &str) -> String {
        format!("{}{}", PROXY_PREFIX, target_file)
    }

    /// Counts of tuples created and resolved since the last call.
    pub fn take_counts(&mut self) -> (usize, usize) {
        let counts = (self.created, self.resolved);
        self.created = 0;
        self.resolved = 0;
        counts
    }

    /// Appends a tuple unless an identical one is already pending.
    pub fn add<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        source: NodeId,
        target_file: &str,
        tuple: ProxyTuple,
    ) -> Result<bool> {
        let mut tuples = Self::tuples(store, source, target_file)?;
        if tuples.contains(&tuple) {
            return Ok(false);
        }
        tuples.push(tuple);
        self.write(store, source, target_file, &tuples)?;
        store.index_add(INDEX_PROXIES, target_file, source)?;
        self.created += 1;
        Ok(true)
    }

    pub fn tuples<S: GraphStore + ?Sized>(
        store: &S,
        source: NodeId,
        target_file: &str,
    ) -> Result<Vec<ProxyTuple>> {
        let value = store.property(source, &Self::property_key(target_file))?;
        Ok(value
            .as_ref()
            .and_then(PropertyValue::as_list)
            .map(|items| items.iter().filter_map(ProxyTuple::from_value).collect())
            .unwrap_or_default())
    }

    /// Keeps only `remaining`; `resolved` tuples are counted as closed.
    pub fn replace<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        source: NodeId,
        target_file: &str,
        remaining: Vec<ProxyTuple>,
        resolved: usize,
    ) -> Result<()> {
        self.resolved += resolved;
        if remaining.is_empty() {
            store.remove_property(source, &Self::property_key(target_file))?;
            store.index_remove(INDEX_PROXIES, Some(target_file), source)?;
        } else {
            self.write(store, source, target_file, &remaining)?;
        }
        Ok(())
    }

    /// Drops every proxy record of `source`; returns how many tuples went away.
    pub fn clear_node<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        source: NodeId,
    ) -> Result<usize> {
        let mut dropped = 0;
        for target_file in Self::target_files_of(store, source)? {
            dropped += Self::tuples(store, source, &target_file)?.len();
            store.remove_property(source, &Self::property_key(&target_file))?;
        }
        store.index_remove(INDEX_PROXIES, None, source)?;
        Ok(dropped)
    }

    /// Target files `source` still has pending proxies for.
    pub fn target_files_of<S: GraphStore + ?Sized>(
        store: &S,
        source: NodeId,
    ) -> Result<Vec<SmolStr>> {
        Ok(store
            .property_keys(source)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(PROXY_PREFIX).map(SmolStr::new))
            .collect())
    }

    /// Nodes with pending proxies on `target_file`.
    pub fn sources<S: GraphStore + ?Sized>(store: &S, target_file: &str) -> Vec<NodeId> {
        store.index_get(INDEX_PROXIES, target_file)
    }

    /// Every `(target-file, source)` pair, grouped by target file.
    pub fn entries<S: GraphStore + ?Sized>(store: &S) -> Vec<(SmolStr, NodeId)> {
        store.index_query(INDEX_PROXIES, "*")
    }

    /// Number of pending proxy sets.
    pub fn pending<S: GraphStore + ?Sized>(store: &S) -> usize {
        Self::entries(store).len()
    }

    fn write<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        source: NodeId,
        target_file: &str,
        tuples: &[ProxyTuple],
    ) -> Result<()> {
        let value = PropertyValue::List(tuples.iter().map(ProxyTuple::to_value).collect());
        store.set_property(source, &Self::property_key(target_file), value)?;
        Ok(())
    }
}
