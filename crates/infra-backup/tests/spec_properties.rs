//! Property-based tests for the spec builder and config validator
//!
//! Uses proptest to check, for arbitrary namespace inventories and
//! selections:
//! - the cluster-scoped spec includes exactly the sorted intersection
//! - the excluded resources never depend on the inputs
//! - building is deterministic
//! - the namespaced spec ignores cluster state

use std::collections::BTreeSet;

use proptest::prelude::*;

use infra_backup::spec::{CLUSTER_EXCLUDED_RESOURCES, NAMESPACED_RESOURCES};
use infra_backup::{
    build_specs, compute_cluster_scoped_spec, compute_namespace_scoped_spec, validate,
    NamespaceName, ReconcileSettings, RelationEndpoint,
};

const NAME: &str = "[a-z0-9]([a-z0-9-]{0,10}[a-z0-9])?";

fn names(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(NAME, 0..max)
}

fn configured(max: usize) -> impl Strategy<Value = BTreeSet<NamespaceName>> {
    prop::collection::btree_set(NAME, 1..max).prop_map(|set| {
        set.into_iter()
            .filter_map(|n| NamespaceName::new(n).ok())
            .collect()
    })
}

fn included(cluster: &BTreeSet<String>, selected: &BTreeSet<NamespaceName>) -> Vec<String> {
    compute_cluster_scoped_spec(cluster, selected)
        .include_namespaces
        .unwrap_or_default()
        .iter()
        .map(|n| n.as_str().to_string())
        .collect()
}

proptest! {
    /// Property: included namespaces are the sorted intersection of the
    /// cluster inventory and the selection
    #[test]
    fn prop_cluster_spec_is_sorted_intersection(
        cluster in names(12),
        selected in configured(8),
        shared in configured(4),
    ) {
        let cluster: BTreeSet<String> = cluster
            .into_iter()
            .chain(shared.iter().map(|n| n.as_str().to_string()))
            .collect();
        let selected: BTreeSet<NamespaceName> = selected.into_iter().chain(shared).collect();

        let got = included(&cluster, &selected);

        let expected: Vec<String> = selected
            .iter()
            .map(|n| n.as_str().to_string())
            .filter(|n| cluster.contains(n))
            .collect();
        prop_assert_eq!(&got, &expected);

        let mut sorted = got.clone();
        sorted.sort();
        prop_assert_eq!(got, sorted);
    }

    /// Property: the cluster-scoped exclusions and flags never change
    #[test]
    fn prop_cluster_spec_exclusions_are_constant(
        cluster in names(12),
        selected in configured(8),
    ) {
        let spec = compute_cluster_scoped_spec(&cluster, &selected);
        let expected: Vec<String> = CLUSTER_EXCLUDED_RESOURCES.iter().map(|s| s.to_string()).collect();

        prop_assert_eq!(spec.exclude_resources, Some(expected));
        prop_assert_eq!(spec.include_cluster_resources, Some(true));
        prop_assert!(spec.include_namespaces.is_some());
        prop_assert_eq!(spec.include_resources, None);
        prop_assert_eq!(spec.exclude_namespaces, None);
        prop_assert_eq!(spec.label_selector, None);
        prop_assert_eq!(spec.ttl, None);
    }

    /// Property: identical inputs build identical specs, and the namespaced
    /// spec does not depend on the cluster at all
    #[test]
    fn prop_build_specs_is_deterministic(
        cluster in names(12),
        selected in configured(8),
        include_cilium in any::<bool>(),
    ) {
        let settings = ReconcileSettings {
            include_cilium,
            ..ReconcileSettings::default()
        };

        let first = build_specs(&settings, &cluster, &selected);
        let second = build_specs(&settings, &cluster, &selected);
        prop_assert_eq!(&first, &second);

        prop_assert_eq!(
            &first[&RelationEndpoint::NamespacedInfraBackup],
            &compute_namespace_scoped_spec(include_cilium)
        );
        let resources = first[&RelationEndpoint::NamespacedInfraBackup]
            .include_resources
            .clone()
            .unwrap_or_default();
        let base = NAMESPACED_RESOURCES.len();
        prop_assert_eq!(resources.len(), if include_cilium { base + 1 } else { base });
    }

    /// Property: a valid selection, however it is spaced or repeated,
    /// validates to the same set of names
    #[test]
    fn prop_validate_ignores_spacing_and_duplicates(
        selected in configured(8),
        pad in "[ ]{0,3}",
    ) {
        prop_assume!(!selected.is_empty());
        let list: Vec<&str> = selected.iter().map(NamespaceName::as_str).collect();
        let raw = list
            .iter()
            .chain(list.iter())
            .map(|n| format!("{pad}{n}{pad}"))
            .collect::<Vec<_>>()
            .join(",");

        let parsed = validate(&raw);
        prop_assert_eq!(parsed.ok(), Some(selected));
    }
}
