// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stable element identity
//!
//! An element keeps the first id it was given: the marker attribute is written
//! back into the tree and reused by every later observation. New ids come from
//! the natural `id` attribute when present, otherwise from a hash of tag, class
//! and the structural path from the nearest ancestor with a natural id.

use sr_domain_types::{DomId, Node};
use std::collections::HashSet;
use tracing::trace;

const HASHED_ID_PREFIX: &str = "sr-";
const HASHED_ID_HEX_LEN: usize = 12;

/// Compute the identity an unmarked element would receive
pub fn element_id(node: &Node, structural_path: &str) -> DomId {
    if let Some(natural) = node.natural_id() {
        return DomId::new(natural);
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(node.tag.as_bytes());
    hasher.update(b"|");
    hasher.update(node.attr("class").unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(structural_path.as_bytes());
    let hex = hasher.finalize().to_hex();

    DomId::new(format!("{HASHED_ID_PREFIX}{}", &hex[..HASHED_ID_HEX_LEN]))
}

/// Mark every element of `root` that does not carry an identity yet
///
/// Returns how many elements received a new id.
pub fn assign_ids(root: &mut Node) -> usize {
    let mut taken = HashSet::new();
    root.walk(&mut |node| {
        if let Some(id) = node.dom_id() {
            taken.insert(id);
        }
    });

    let mut assigned = 0;
    assign_subtree(root, String::new(), &mut taken, &mut assigned);
    assigned
}

fn assign_subtree(node: &mut Node, path: String, taken: &mut HashSet<DomId>, assigned: &mut usize) {
    if node.is_text() {
        return;
    }

    let path = if node.is_fragment() {
        path
    } else {
        if node.dom_id().is_none() {
            let id = unique(element_id(node, &path), taken);
            trace!(dom_id = %id, tag = %node.tag, "assigned element identity");
            node.set_dom_id(&id);
            *assigned += 1;
        }
        match node.natural_id() {
            Some(natural) => format!("#{natural}"),
            None => path,
        }
    };

    for (index, child) in node.children.iter_mut().enumerate() {
        if child.is_text() {
            continue;
        }
        let child_path = format!("{path}/{}:{index}", child.tag);
        assign_subtree(child, child_path, taken, assigned);
    }
}

fn unique(candidate: DomId, taken: &mut HashSet<DomId>) -> DomId {
    let mut id = candidate.clone();
    let mut suffix = 2;
    while taken.contains(&id) {
        id = DomId::new(format!("{candidate}~{suffix}"));
        suffix += 1;
    }
    taken.insert(id.clone());
    id
}
