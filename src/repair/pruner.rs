use super::IdSet;
use super::scanner::{holds_reference, references_any};
use crate::definition::vocabulary::{
    CHART_CONFIGURATION, DATA_SET_IDENTIFIER, FIELD_WELL_SLOTS, FIELD_WELL_TYPES, FIELD_WELLS,
    FILTER_CONTROLS, FILTER_GROUPS, FILTER_ID, FILTERS, SHEETS, SOURCE_FILTER_ID, VISUALS,
    column_identifier, definition_body_mut,
};
use crate::definition::{ControlKind, FieldKind, FilterKind, Node, TypedVariant};
use tracing::debug;

/// What a pruning pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub filters_removed: usize,
    pub filter_groups_removed: usize,
    pub filter_groups_key_removed: bool,
    pub controls_removed: usize,
    pub fields_removed: usize,
    pub residual_removed: usize,
}

impl PruneReport {
    pub fn modified(&self) -> bool {
        self.filters_removed > 0
            || self.filter_groups_removed > 0
            || self.filter_groups_key_removed
            || self.controls_removed > 0
            || self.fields_removed > 0
            || self.residual_removed > 0
    }
}

/// Removes every structure that references an identifier in `invalid`, returning
/// whether the tree changed.
pub fn prune(tree: &mut Node, invalid: &IdSet) -> bool {
    prune_with_report(tree, invalid).modified()
}

/// Runs the full pruning pass over a definition (wrapped or bare).
///
/// Each step returns its own tally and the pass sums them; removal inside a
/// sequence always happens in descending index order.
pub fn prune_with_report(tree: &mut Node, invalid: &IdSet) -> PruneReport {
    let mut report = PruneReport::default();
    if invalid.is_empty() {
        return report;
    }

    let body = definition_body_mut(tree);

    let removed_filter_ids = prune_filter_groups(body, invalid, &mut report);
    report.controls_removed = prune_filter_controls(body, &removed_filter_ids);
    report.fields_removed = prune_field_wells(body, invalid);

    // Anything outside the known shapes (calculated fields, column configurations,
    // sort options, ...) is dropped at the innermost list entry that holds it.
    report.residual_removed = sweep_sequences(tree, invalid) + strip_orphans(tree, invalid);

    debug!(?report, "pruning pass finished");
    report
}

/// Steps 1-3: filters, then emptied groups, then an emptied `FilterGroups` key.
/// Returns the ids of the filters that were removed.
fn prune_filter_groups(body: &mut Node, invalid: &IdSet, report: &mut PruneReport) -> IdSet {
    let mut removed_filter_ids = IdSet::new();
    let Some(groups) = body.get_mut(FILTER_GROUPS).and_then(Node::as_sequence_mut) else {
        return removed_filter_ids;
    };

    let mut emptied_groups = Vec::new();
    for (group_index, group) in groups.iter_mut().enumerate() {
        let Some(filters) = group.get_mut(FILTERS).and_then(Node::as_sequence_mut) else {
            continue;
        };

        let mut marked = Vec::new();
        for (filter_index, filter) in filters.iter().enumerate() {
            let Some((kind, variant)) = FilterKind::detect(filter) else {
                continue;
            };
            if column_identifier(variant).is_some_and(|id| invalid.contains(id)) {
                marked.push(filter_index);
                if let Some(filter_id) = variant.get_str(FILTER_ID) {
                    removed_filter_ids.insert(filter_id.to_string());
                }
                debug!(filter_index, kind = kind.key(), "filter references an invalid dataset");
            }
        }

        let removed = remove_indices(filters, &marked);
        report.filters_removed += removed;
        if removed > 0 && filters.is_empty() {
            emptied_groups.push(group_index);
        }
    }

    report.filter_groups_removed = remove_indices(groups, &emptied_groups);
    if report.filter_groups_removed > 0 && groups.is_empty() {
        body.remove(FILTER_GROUPS);
        report.filter_groups_key_removed = true;
    }
    removed_filter_ids
}

/// Step 4: controls whose source filter was removed. Emptied `FilterControls`
/// keys are deleted; the sheet itself is kept.
fn prune_filter_controls(body: &mut Node, removed_filter_ids: &IdSet) -> usize {
    if removed_filter_ids.is_empty() {
        return 0;
    }
    let Some(sheets) = body.get_mut(SHEETS).and_then(Node::as_sequence_mut) else {
        return 0;
    };

    let mut total = 0;
    for sheet in sheets.iter_mut() {
        let Some(controls) = sheet.get_mut(FILTER_CONTROLS).and_then(Node::as_sequence_mut)
        else {
            continue;
        };

        let marked: Vec<usize> = controls
            .iter()
            .enumerate()
            .filter(|(_, control)| {
                source_filter_id(control).is_some_and(|id| removed_filter_ids.contains(id))
            })
            .map(|(index, _)| index)
            .collect();

        let removed = remove_indices(controls, &marked);
        if removed > 0 && controls.is_empty() {
            sheet.remove(FILTER_CONTROLS);
        }
        total += removed;
    }
    total
}

fn source_filter_id(control: &Node) -> Option<&str> {
    control.get_str(SOURCE_FILTER_ID).or_else(|| {
        ControlKind::detect(control).and_then(|(_, body)| body.get_str(SOURCE_FILTER_ID))
    })
}

/// Step 5: field entries inside visual field wells. Slot arrays stay in place
/// even when every entry was removed.
fn prune_field_wells(body: &mut Node, invalid: &IdSet) -> usize {
    let Some(sheets) = body.get_mut(SHEETS).and_then(Node::as_sequence_mut) else {
        return 0;
    };

    let mut total = 0;
    for sheet in sheets.iter_mut() {
        let Some(visuals) = sheet.get_mut(VISUALS).and_then(Node::as_sequence_mut) else {
            continue;
        };
        for visual in visuals.iter_mut() {
            let Some(variants) = visual.as_mapping_mut() else {
                continue;
            };
            // A visual is wrapped by its type name (`BarChartVisual`, `TableVisual`, ...).
            for visual_body in variants.values_mut() {
                let Some(wells) = visual_body.get_path_mut(&[CHART_CONFIGURATION, FIELD_WELLS])
                else {
                    continue;
                };
                total += prune_wells(wells, invalid);
            }
        }
    }
    total
}

fn prune_wells(wells: &mut Node, invalid: &IdSet) -> usize {
    let mut total = 0;
    for well_type in FIELD_WELL_TYPES {
        let Some(well) = wells.get_mut(well_type) else {
            continue;
        };
        for slot in FIELD_WELL_SLOTS {
            let Some(fields) = well.get_mut(slot).and_then(Node::as_sequence_mut) else {
                continue;
            };
            let marked: Vec<usize> = fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field_identifier(field).is_some_and(|id| invalid.contains(id)))
                .map(|(index, _)| index)
                .collect();
            let removed = remove_indices(fields, &marked);
            if removed > 0 {
                debug!(well_type, slot, removed, "removed fields from field well");
            }
            total += removed;
        }
    }
    total
}

/// Typed fields wrap their column; unaggregated table fields carry it directly.
fn field_identifier(field: &Node) -> Option<&str> {
    match FieldKind::detect(field) {
        Some((_, body)) => column_identifier(body),
        None => column_identifier(field),
    }
}

/// Removes every sequence entry (innermost first) that still holds an invalid reference.
fn sweep_sequences(node: &mut Node, invalid: &IdSet) -> usize {
    match node {
        Node::Sequence(items) => {
            let mut removed = 0;
            for item in items.iter_mut() {
                removed += sweep_sequences(item, invalid);
            }
            let marked: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| references_any(item, invalid))
                .map(|(index, _)| index)
                .collect();
            removed + remove_indices(items, &marked)
        }
        Node::Mapping(map) => map
            .values_mut()
            .map(|value| sweep_sequences(value, invalid))
            .sum(),
        Node::Scalar(_) => 0,
    }
}

/// Handles references with no enclosing sequence by removing the mapping that
/// holds them from its parent.
fn strip_orphans(node: &mut Node, invalid: &IdSet) -> usize {
    let mut removed = 0;
    if holds_reference(node, invalid) {
        node.remove(DATA_SET_IDENTIFIER);
        removed += 1;
    }
    if let Some(map) = node.as_mapping_mut() {
        let before = map.len();
        map.retain(|_, child| !holds_reference(child, invalid));
        removed += before - map.len();
        for child in map.values_mut() {
            removed += strip_orphans(child, invalid);
        }
    }
    removed
}

/// Removes the given ascending indices from `items`, highest first, so earlier
/// indices stay valid while splicing.
fn remove_indices(items: &mut Vec<Node>, ascending: &[usize]) -> usize {
    for &index in ascending.iter().rev() {
        items.remove(index);
    }
    ascending.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(values: &[&str]) -> IdSet {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn descending_removal_keeps_survivors_in_order() {
        let mut items: Vec<Node> = (0..6).map(|i| Node::from(json!(i))).collect();
        assert_eq!(remove_indices(&mut items, &[1, 2, 4]), 3);
        let left: Vec<u64> = items.iter().filter_map(Node::as_u64).collect();
        assert_eq!(left, vec![0, 3, 5]);
    }

    #[test]
    fn empty_invalid_set_is_a_no_op() {
        let mut tree = Node::from(json!({"FilterGroups": [{"Filters": []}]}));
        let before = tree.clone();
        assert!(!prune(&mut tree, &IdSet::new()));
        assert_eq!(tree, before);
    }

    #[test]
    fn control_inside_a_typed_variant_is_matched() {
        let control = Node::from(json!({"Dropdown": {"SourceFilterId": "f1"}}));
        assert_eq!(source_filter_id(&control), Some("f1"));
    }

    #[test]
    fn orphan_reference_outside_sequences_is_stripped() {
        let mut tree = Node::from(json!({
            "Options": {"Default": {"DataSetIdentifier": "gone", "Name": "x"}, "Keep": 1}
        }));
        assert!(prune(&mut tree, &ids(&["gone"])));
        assert_eq!(serde_json::Value::from(tree), json!({"Options": {"Keep": 1}}));
    }

    #[test]
    fn residual_entries_are_removed_whole() {
        let mut tree = Node::from(json!({
            "CalculatedFields": [
                {"DataSetIdentifier": "gone", "Name": "a"},
                {"DataSetIdentifier": "kept", "Name": "b"}
            ]
        }));
        let report = prune_with_report(&mut tree, &ids(&["gone"]));
        assert_eq!(report.residual_removed, 1);
        assert_eq!(
            serde_json::Value::from(tree),
            json!({"CalculatedFields": [{"DataSetIdentifier": "kept", "Name": "b"}]})
        );
    }
}
