//! Flattening resolution
//!
//! A nested target property can be supplied by a nested source property of
//! another type when rules are registered for that pair. Candidates are the
//! record-typed property paths of the source, a bounded number of levels
//! deep. A target property may have at most one candidate.

use crate::cache::AccessorCache;
use crate::path::{Access, PropertyPath, ResolvedPath};
use crate::{Error, Result};
use objmap_reflect::classify;
use objmap_reflect::{PropertyInfo, TypeInfo};
use std::collections::HashSet;

/// Record type behind a target property the engine descends into
/// automatically, if any.
pub(crate) fn descent_target(property: &PropertyInfo) -> Option<TypeInfo> {
    if !property.is_writable() {
        return None;
    }
    let ty = property.type_info();
    classify::descent_shape(&ty)?;
    ty.record_type()
}

#[derive(Debug, Clone)]
struct Candidate {
    path: PropertyPath,
    /// Record type found at `path`
    ty: TypeInfo,
}

fn candidate_paths(source: &TypeInfo, max_depth: usize) -> Vec<Candidate> {
    let mut found = Vec::new();
    let mut prefix = Vec::new();
    walk(source, source, max_depth, &mut prefix, &mut found);
    found
}

fn walk(
    root: &TypeInfo,
    owner: &TypeInfo,
    remaining: usize,
    prefix: &mut Vec<String>,
    found: &mut Vec<Candidate>,
) {
    if remaining == 0 {
        return;
    }
    let Some(shape) = owner.as_record() else {
        return;
    };

    for property in shape.properties {
        if !property.is_readable() {
            continue;
        }
        let ty = property.type_info();
        if classify::descent_shape(&ty).is_none() {
            continue;
        }
        let Some(record) = ty.record_type() else {
            continue;
        };
        // The source itself is handled by same-type recursion
        if record == *root {
            continue;
        }

        prefix.push(property.name.to_string());
        found.push(Candidate {
            path: PropertyPath::from_segments(prefix.clone()),
            ty: record.clone(),
        });
        walk(root, &record, remaining - 1, prefix, found);
        prefix.pop();
    }
}

/// For every descent property of `target`, the unique source path that can
/// supply it.
fn unique_candidates(
    target: &TypeInfo,
    source: &TypeInfo,
    max_depth: usize,
    has_rules: &dyn Fn(&TypeInfo, &TypeInfo) -> bool,
) -> Result<Vec<(&'static PropertyInfo, Candidate)>> {
    let Some(shape) = target.as_record() else {
        return Ok(Vec::new());
    };

    let candidates = candidate_paths(source, max_depth);
    let mut unique = Vec::new();
    if candidates.is_empty() {
        return Ok(unique);
    }

    for property in shape.properties {
        let Some(property_record) = descent_target(property) else {
            continue;
        };
        let matching: Vec<&Candidate> = candidates
            .iter()
            .filter(|candidate| has_rules(&property_record, &candidate.ty))
            .collect();

        match matching.as_slice() {
            [] => {}
            [only] => unique.push((property, (*only).clone())),
            many => {
                return Err(Error::AmbiguousFlattening {
                    source_type: source.name().to_string(),
                    target_type: format!("{}::{}", target.name(), property.name),
                    candidates: many
                        .iter()
                        .map(|candidate| format!("{} ({})", candidate.path, candidate.ty))
                        .collect(),
                });
            }
        }
    }

    Ok(unique)
}

/// `seeds` plus every pair automatic descent reaches from them: mapping
/// (T, S) also maps (P, S) for each descent property of T.
pub(crate) fn reachable_pairs(seeds: Vec<(TypeInfo, TypeInfo)>) -> Vec<(TypeInfo, TypeInfo)> {
    let mut seen = HashSet::new();
    let mut reached = Vec::new();
    let mut pending = seeds;

    while let Some((target, source)) = pending.pop() {
        if !seen.insert((target.id(), source.id())) {
            continue;
        }
        if let Some(shape) = target.as_record() {
            pending.extend(
                shape
                    .properties
                    .iter()
                    .filter_map(descent_target)
                    .map(|nested| (nested, source.clone())),
            );
        }
        reached.push((target, source));
    }

    reached
}

/// Check every pair reachable from `seeds` for ambiguous flattening.
pub(crate) fn check_ambiguity(
    seeds: Vec<(TypeInfo, TypeInfo)>,
    max_depth: usize,
    has_rules: &dyn Fn(&TypeInfo, &TypeInfo) -> bool,
) -> Result<()> {
    for (target, source) in reachable_pairs(seeds) {
        unique_candidates(&target, &source, max_depth, has_rules)?;
    }
    Ok(())
}

/// A target property supplied by a nested source value
#[derive(Debug)]
pub(crate) struct FlattenEntry {
    pub property: &'static PropertyInfo,
    pub source_path: ResolvedPath,
    pub source_type: TypeInfo,
}

/// Resolved flattening for one (target, source) pair
#[derive(Debug, Default)]
pub(crate) struct FlattenPlan {
    entries: Vec<FlattenEntry>,
}

impl FlattenPlan {
    pub fn entry(&self, property: &str) -> Option<&FlattenEntry> {
        self.entries
            .iter()
            .find(|entry| entry.property.name == property)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Resolve the flattening plan of one (target, source) pair.
pub(crate) fn resolve_plan(
    target: &TypeInfo,
    source: &TypeInfo,
    max_depth: usize,
    has_rules: &dyn Fn(&TypeInfo, &TypeInfo) -> bool,
    cache: &AccessorCache,
) -> Result<FlattenPlan> {
    let entries = unique_candidates(target, source, max_depth, has_rules)?
        .into_iter()
        .map(|(property, candidate)| {
            Ok(FlattenEntry {
                property,
                source_path: ResolvedPath::resolve(source, &candidate.path, cache, Access::Read)?,
                source_type: candidate.ty,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FlattenPlan { entries })
}
