//! In-memory hierarchy and the aggregator that owns it
//!
//! Workers never touch the tree. A stage's outcomes are buffered until its
//! pool has drained, then folded in by [`Aggregator::apply`] on a single
//! task, so no locking is needed.

use crate::crawler::FailureKind;
use crate::extract::ExtractedRecord;
use crate::url::canonical_key;
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

/// One persisted entity of the catalog tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub name: String,

    /// Absolute URL, or empty when the entity has none
    pub url: String,

    pub attributes: BTreeMap<String, String>,

    /// Entities one level down, in first-seen order
    pub children: Vec<HierarchyNode>,

    /// Sibling entities listed alongside the children (popular regions)
    pub related: Vec<HierarchyNode>,

    /// Why this branch could not be expanded fully
    pub failure: Option<String>,
}

impl HierarchyNode {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            related: Vec::new(),
            failure: None,
        }
    }

    pub fn from_record(record: &ExtractedRecord) -> Self {
        let mut node = Self::new(
            record.name.clone(),
            record.url.as_ref().map(Url::to_string).unwrap_or_default(),
        );
        node.attributes = record.attributes.clone();
        node
    }

    /// Canonical de-duplication key
    pub fn key(&self) -> String {
        canonical_key(&self.name, &self.url)
    }

    pub fn parsed_url(&self) -> Option<Url> {
        Url::parse(&self.url).ok()
    }
}

/// Drops records whose canonical key was already seen, keeping the first
pub fn dedupe_records(records: impl IntoIterator<Item = ExtractedRecord>) -> Vec<ExtractedRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

/// Turns a batch of records into unique child nodes, in first-seen order
pub fn merge(parent_key: &str, records: Vec<ExtractedRecord>) -> Vec<HierarchyNode> {
    let total = records.len();
    let nodes: Vec<HierarchyNode> = dedupe_records(records)
        .iter()
        .map(HierarchyNode::from_record)
        .collect();

    if nodes.len() < total {
        tracing::trace!(
            "Merged {} records under {} into {} unique nodes",
            total,
            parent_key,
            nodes.len()
        );
    }
    nodes
}

/// A node the next stage should expand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionTarget {
    pub key: String,
    pub name: String,
    pub url: Option<Url>,

    /// URL of the node's parent, used as referer
    pub parent_url: Option<Url>,
}

/// Result of expanding one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchUpdate {
    pub children: Vec<ExtractedRecord>,
    pub related: Vec<ExtractedRecord>,
    pub failure: Option<FailureKind>,
}

impl BranchUpdate {
    pub fn failed(kind: FailureKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::default()
        }
    }
}

/// Owner of the tree for the whole run
#[derive(Debug, Default)]
pub struct Aggregator {
    regions: Vec<HierarchyNode>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the top level and returns how many unique regions it holds
    pub fn set_regions(&mut self, records: Vec<ExtractedRecord>) -> usize {
        self.regions = merge("catalog", records);
        self.regions.len()
    }

    pub fn regions(&self) -> &[HierarchyNode] {
        &self.regions
    }

    /// Keeps only the first `limit` regions
    pub fn truncate_regions(&mut self, limit: usize) {
        self.regions.truncate(limit);
    }

    /// Healthy nodes at `depth` (0 = regions), one entry per canonical key
    ///
    /// A node reachable through several parents is listed once; the first
    /// parent seen provides the referer.
    pub fn expansion_targets(&self, depth: usize) -> Vec<ExpansionTarget> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        visit(&self.regions, None, depth, &mut |node, parent| {
            if node.failure.is_some() {
                return;
            }
            let key = node.key();
            if seen.insert(key.clone()) {
                targets.push(ExpansionTarget {
                    key,
                    name: node.name.clone(),
                    url: node.parsed_url(),
                    parent_url: parent.and_then(HierarchyNode::parsed_url),
                });
            }
        });

        targets
    }

    /// Folds one stage's results into every node at `depth`
    ///
    /// Nodes sharing a key all receive the same update, which is how a
    /// country referenced by several regions gets grafted under each.
    /// A healthy node with no update is marked as failed so that missing
    /// data is never silent.
    pub fn apply(&mut self, depth: usize, updates: &HashMap<String, BranchUpdate>) {
        visit_mut(&mut self.regions, depth, &mut |node| {
            if node.failure.is_some() {
                return;
            }
            match updates.get(&node.key()) {
                Some(update) => {
                    let key = node.key();
                    node.children = merge(&key, update.children.clone());
                    node.related = merge(&key, update.related.clone());
                    node.failure = update.failure.as_ref().map(ToString::to_string);
                }
                None => node.failure = Some("no outcome recorded".to_string()),
            }
        });
    }

    /// Number of nodes at `depth`, counting each canonical key once
    pub fn distinct_at(&self, depth: usize) -> usize {
        let mut keys = HashSet::new();
        visit(&self.regions, None, depth, &mut |node, _| {
            keys.insert(node.key());
        });
        keys.len()
    }

    /// Number of distinct related entities attached at `depth`
    pub fn distinct_related_at(&self, depth: usize) -> usize {
        let mut keys = HashSet::new();
        visit(&self.regions, None, depth, &mut |node, _| {
            keys.extend(node.related.iter().map(HierarchyNode::key));
        });
        keys.len()
    }

    /// Number of nodes carrying a failure, anywhere in the tree
    pub fn failed_branches(&self) -> usize {
        fn count(nodes: &[HierarchyNode]) -> usize {
            nodes
                .iter()
                .map(|n| usize::from(n.failure.is_some()) + count(&n.children))
                .sum()
        }
        count(&self.regions)
    }
}

fn visit<'a>(
    nodes: &'a [HierarchyNode],
    parent: Option<&'a HierarchyNode>,
    depth: usize,
    f: &mut impl FnMut(&'a HierarchyNode, Option<&'a HierarchyNode>),
) {
    for node in nodes {
        if depth == 0 {
            f(node, parent);
        } else {
            visit(&node.children, Some(node), depth - 1, f);
        }
    }
}

fn visit_mut(nodes: &mut [HierarchyNode], depth: usize, f: &mut impl FnMut(&mut HierarchyNode)) {
    for node in nodes {
        if depth == 0 {
            f(node);
        } else {
            visit_mut(&mut node.children, depth - 1, f);
        }
    }
}
