//! Forwarding resolution: wrapper and mixed procedures take their result
//! shape from the routine they EXEC.
//!
//! Runs only after extraction has completed for *all* routines (a hard phase
//! barrier) and is recomputed every run: provenance-tagged sets from prior
//! runs are dropped first, so hydrated shapes re-forward against the
//! target's current shape. Wrapper chains settle through a bounded fixpoint.

use std::collections::BTreeMap;

use crate::context::RunContext;
use crate::error::DiagnosticKind;
use crate::model::{ColumnReference, ReferenceKind, ResultSet, RoutineKind};
use crate::pipeline::RoutineAnalysis;

/// Forwarding classification of one routine, recomputed per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardState {
    #[default]
    NoForward,
    /// Own shape was empty; the target's sets replaced it.
    PureWrapper,
    /// Own shape was meaningful; the target's sets were appended.
    MixedLocalPlusForward,
}

/// Any realistic wrapper chain settles well below this.
const MAX_FORWARD_PASSES: usize = 8;

/// Resolve forwarding across all routines. Returns the number of routines
/// that received forwarded sets.
pub fn resolve_forwarding(
    ctx: &mut RunContext,
    routines: &mut BTreeMap<String, RoutineAnalysis>,
) -> usize {
    // Provenance is not ownership: drop previously-forwarded sets before
    // recomputing against current targets.
    for analysis in routines.values_mut() {
        analysis.result_sets.retain(|rs| !rs.is_forwarded());
        analysis.forward_state = ForwardState::NoForward;
    }

    let keys: Vec<String> = routines.keys().cloned().collect();
    let mut forwarded = 0usize;
    let mut changed = true;
    let mut pass = 0usize;

    while changed && pass < MAX_FORWARD_PASSES {
        changed = false;
        pass += 1;

        for key in &keys {
            let Some(target_key) = eligible_target_key(&routines[key], key) else {
                continue;
            };
            let Some(target) = routines.get(&target_key) else {
                continue;
            };
            if !target.result_sets.iter().any(ResultSet::is_meaningful) {
                continue;
            }

            let cloned = clone_target_sets(target);
            let own_meaningful = routines[key]
                .result_sets
                .iter()
                .any(ResultSet::is_meaningful);

            let analysis = routines.get_mut(key).expect("key from map");
            if own_meaningful {
                analysis.forward_state = ForwardState::MixedLocalPlusForward;
                analysis.result_sets.extend(cloned);
            } else {
                analysis.forward_state = ForwardState::PureWrapper;
                analysis.result_sets = cloned;
            }
            forwarded += 1;
            changed = true;
        }
    }

    report_unresolvable(ctx, routines, &keys);
    forwarded
}

/// A routine is forwarding-eligible when it has exactly one statically-named
/// EXEC target and no forwarded sets yet this run.
fn eligible_target_key(analysis: &RoutineAnalysis, own_key: &str) -> Option<String> {
    if analysis.result_sets.iter().any(|rs| rs.is_forwarded()) {
        return None;
    }
    if analysis.exec_targets.len() != 1 || analysis.exec_targets[0].dynamic {
        return None;
    }
    let target = &analysis.exec_targets[0];
    let schema = target
        .schema
        .clone()
        .unwrap_or_else(|| analysis.descriptor.schema.clone());
    let key = format!("{}.{}", schema, target.name).to_lowercase();
    if key == own_key {
        return None;
    }
    Some(key)
}

fn clone_target_sets(target: &RoutineAnalysis) -> Vec<ResultSet> {
    let reference_kind = match target.descriptor.kind {
        RoutineKind::Procedure => ReferenceKind::Procedure,
        RoutineKind::Function => ReferenceKind::Function,
    };
    target
        .result_sets
        .iter()
        .map(|rs| {
            let mut cloned = rs.clone();
            cloned.exec_source_schema = Some(target.descriptor.schema.clone());
            cloned.exec_source_name = Some(target.descriptor.name.clone());
            for col in &mut cloned.columns {
                col.reference = Some(ColumnReference {
                    kind: reference_kind,
                    schema: target.descriptor.schema.clone(),
                    name: target.descriptor.name.clone(),
                });
            }
            cloned
        })
        .collect()
}

fn report_unresolvable(
    ctx: &mut RunContext,
    routines: &BTreeMap<String, RoutineAnalysis>,
    keys: &[String],
) {
    let mut findings = Vec::new();
    for key in keys {
        let analysis = &routines[key];
        let Some(target_key) = eligible_target_key(analysis, key) else {
            continue;
        };
        if routines.contains_key(&target_key) {
            continue;
        }
        let mut message = format!("EXEC target `{target_key}` not found");
        if let Some(suggestion) = closest_key(&target_key, keys) {
            message.push_str(&format!("; did you mean `{suggestion}`?"));
        }
        findings.push((analysis.descriptor.qualified_name(), message));
    }
    for (object, message) in findings {
        ctx.diag(DiagnosticKind::ForwardingUnresolvable, object, message);
    }
}

fn closest_key<'a>(target: &str, keys: &'a [String]) -> Option<&'a String> {
    keys.iter()
        .map(|k| (k, strsim::jaro_winkler(target, &k.to_lowercase())))
        .filter(|(_, score)| *score > 0.88)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}
