// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Significance scoring of drained mutation batches

use sr_domain_types::MutationRecord;

/// Attributes whose change is likely to be visible
pub const SIGNIFICANT_ATTRIBUTES: &[&str] = &["class", "style", "src", "href", "display"];

const NODE_WEIGHT: f64 = 2.0;
const ATTRIBUTE_WEIGHT: f64 = 1.0;
const TEXT_WEIGHT: f64 = 0.5;

pub fn score(mutations: &[MutationRecord]) -> f64 {
    mutations.iter().map(score_one).sum()
}

fn score_one(mutation: &MutationRecord) -> f64 {
    match mutation {
        MutationRecord::ChildList { added, removed, .. } => {
            NODE_WEIGHT * (added.len() + removed.len()) as f64
        }
        MutationRecord::Attributes { name, .. } => {
            if SIGNIFICANT_ATTRIBUTES.contains(&name.as_str()) {
                ATTRIBUTE_WEIGHT
            } else {
                0.0
            }
        }
        MutationRecord::CharacterData { .. } => TEXT_WEIGHT,
    }
}
