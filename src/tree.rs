use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::menu::MenuNode;

/// The caller's authorized node set. Superusers pass `All`.
#[derive(Debug, Clone)]
pub enum Authorized {
    All,
    Only(HashSet<i64>),
}

impl Authorized {
    fn permits(&self, id: i64) -> bool {
        match self {
            Authorized::All => true,
            Authorized::Only(ids) => ids.contains(&id),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuTreeNode {
    #[serde(flatten)]
    pub node: MenuNode,
    pub children: Vec<MenuTreeNode>,
}

/// Assembles flat menu rows into a forest pruned to the authorized set.
///
/// Each node's inclusion is decided independently: an authorized node whose
/// parent was pruned re-attaches to its nearest surviving ancestor, or
/// becomes a root. Siblings order by `sort`, then `id`, so identical inputs
/// always produce a structurally identical tree.
pub fn build_tree(nodes: Vec<MenuNode>, authorized: &Authorized) -> Vec<MenuTreeNode> {
    let parent_of: HashMap<i64, Option<i64>> =
        nodes.iter().map(|node| (node.id, node.parent_id)).collect();

    let included: Vec<MenuNode> = nodes
        .into_iter()
        .filter(|node| authorized.permits(node.id))
        .collect();
    let included_ids: HashSet<i64> = included.iter().map(|node| node.id).collect();

    let mut buckets: HashMap<Option<i64>, Vec<MenuNode>> = HashMap::new();
    for node in included {
        let anchor = nearest_surviving_ancestor(node.parent_id, &parent_of, &included_ids);
        buckets.entry(anchor).or_default().push(node);
    }

    for bucket in buckets.values_mut() {
        bucket.sort_by_key(|node| (node.sort, node.id));
    }

    assemble(None, &mut buckets)
}

fn nearest_surviving_ancestor(
    mut parent: Option<i64>,
    parent_of: &HashMap<i64, Option<i64>>,
    included: &HashSet<i64>,
) -> Option<i64> {
    // Visited guard: parent links are expected to form a forest, but a bad
    // row must not loop the request.
    let mut seen = HashSet::new();
    while let Some(id) = parent {
        if !seen.insert(id) {
            return None;
        }
        if included.contains(&id) {
            return Some(id);
        }
        parent = parent_of.get(&id).copied().flatten();
    }
    None
}

fn assemble(
    anchor: Option<i64>,
    buckets: &mut HashMap<Option<i64>, Vec<MenuNode>>,
) -> Vec<MenuTreeNode> {
    let Some(nodes) = buckets.remove(&anchor) else {
        return Vec::new();
    };

    nodes
        .into_iter()
        .map(|node| {
            let children = assemble(Some(node.id), buckets);
            MenuTreeNode { node, children }
        })
        .collect()
}
