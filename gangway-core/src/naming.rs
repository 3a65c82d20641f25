//! Deterministic profile name generation.

use std::collections::HashMap;

use crate::discovery::RoleBinding;

/// Label used when an account has no human-friendly name.
const FALLBACK_ACCOUNT_LABEL: &str = "aws";

/// Suggest a profile name for an account/role pair.
///
/// Lower-cases both parts, replaces internal spaces with hyphens, and joins
/// them as `<account>-<role>`. Falls back to the literal `aws` label when the
/// account has no name.
pub fn suggest_profile_name(account_label: &str, role_name: &str) -> String {
    let label = if account_label.is_empty() {
        FALLBACK_ACCOUNT_LABEL
    } else {
        account_label
    };
    format!("{}-{}", slug(label), slug(role_name))
}

fn slug(value: &str) -> String {
    value.replace(' ', "-").to_lowercase()
}

/// Allocate a unique profile name per binding, in input order.
///
/// Base names are computed and counted for the whole batch first, then
/// assigned: the first occurrence of a duplicated base keeps the bare name
/// and later occurrences get `-2`, `-3`, … in first-seen order. Base names
/// occurring exactly once are left untouched. Counting before assigning makes
/// the result deterministic regardless of processing order within the batch.
pub fn allocate_unique_names(bindings: &[RoleBinding]) -> Vec<String> {
    let bases: Vec<String> = bindings
        .iter()
        .map(|binding| {
            suggest_profile_name(&binding.account.account_name, &binding.role.role_name)
        })
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for base in &bases {
        *counts.entry(base.as_str()).or_default() += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    bases
        .iter()
        .map(|base| {
            if counts[base.as_str()] > 1 {
                let occurrence = seen.entry(base.as_str()).or_default();
                *occurrence += 1;
                if *occurrence == 1 {
                    base.clone()
                } else {
                    format!("{base}-{occurrence}")
                }
            } else {
                base.clone()
            }
        })
        .collect()
}
