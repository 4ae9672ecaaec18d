//! Field names used by the analytics service's describe/create/update calls.
//!
//! These are the remote service's vocabulary, so they must match exactly.

use super::node::Node;

pub const DEFINITION: &str = "Definition";
pub const DECLARATIONS: &str = "DataSetIdentifierDeclarations";
pub const IDENTIFIER: &str = "Identifier";
pub const DATA_SET_ARN: &str = "DataSetArn";
pub const DATA_SET_IDENTIFIER: &str = "DataSetIdentifier";
pub const COLUMN: &str = "Column";

pub const FILTER_GROUPS: &str = "FilterGroups";
pub const FILTERS: &str = "Filters";
pub const FILTER_ID: &str = "FilterId";
pub const SHEETS: &str = "Sheets";
pub const FILTER_CONTROLS: &str = "FilterControls";
pub const SOURCE_FILTER_ID: &str = "SourceFilterId";
pub const VISUALS: &str = "Visuals";
pub const CHART_CONFIGURATION: &str = "ChartConfiguration";
pub const FIELD_WELLS: &str = "FieldWells";

pub const PHYSICAL_TABLE_MAP: &str = "PhysicalTableMap";
pub const DATA_SOURCE_ARN: &str = "DataSourceArn";

/// A union type whose members are distinguished by a single wrapping key,
/// e.g. `{"CategoryFilter": {...}}`. At most one member is present per entry.
pub trait TypedVariant: Copy + Sized + 'static {
    const ALL: &'static [Self];

    fn key(self) -> &'static str;

    /// Finds the variant wrapping `entry`, returning it with its body.
    fn detect(entry: &Node) -> Option<(Self, &Node)> {
        Self::ALL
            .iter()
            .find_map(|kind| entry.get(kind.key()).map(|body| (*kind, body)))
    }
}

macro_rules! typed_variants {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl TypedVariant for $name {
            const ALL: &'static [Self] = &[$($name::$variant),*];

            fn key(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

typed_variants! {
    /// Members of the filter-type union inside `FilterGroups[].Filters[]`.
    FilterKind {
        CategoryFilter,
        NumericRangeFilter,
        NumericEqualityFilter,
        TimeEqualityFilter,
        TimeRangeFilter,
        RelativeDatesFilter,
        TopBottomFilter,
        NestedFilter,
    }
}

typed_variants! {
    /// Members of the field-type union inside a field-well slot.
    FieldKind {
        CategoricalDimensionField,
        NumericalDimensionField,
        DateDimensionField,
        CategoricalMeasureField,
        NumericalMeasureField,
        DateMeasureField,
    }
}

typed_variants! {
    /// Members of the filter-control union inside `Sheets[].FilterControls[]`.
    ControlKind {
        DateTimePicker,
        List,
        Dropdown,
        TextField,
        TextArea,
        Slider,
        RelativeDateTime,
        CrossSheet,
    }
}

/// Field-well containers found under `ChartConfiguration.FieldWells`.
pub const FIELD_WELL_TYPES: &[&str] = &[
    "TableAggregatedFieldWells",
    "TableUnaggregatedFieldWells",
    "PivotTableAggregatedFieldWells",
    "LineChartAggregatedFieldWells",
    "BarChartAggregatedFieldWells",
    "PieChartAggregatedFieldWells",
    "ComboChartAggregatedFieldWells",
    "ScatterPlotCategoricallyAggregatedFieldWells",
    "HeatMapAggregatedFieldWells",
    "TreeMapAggregatedFieldWells",
    "FunnelChartAggregatedFieldWells",
    "BoxPlotAggregatedFieldWells",
];

/// Slot arrays inside a field-well container.
pub const FIELD_WELL_SLOTS: &[&str] = &[
    "Values",
    "GroupBy",
    "Colors",
    "SmallMultiples",
    "XAxis",
    "YAxis",
    "Category",
    "Rows",
    "Columns",
    "Size",
    "BarValues",
    "LineValues",
];

/// Returns the node holding the definition body, tolerating both the wrapped
/// (`{"Definition": {...}}`) and unwrapped shapes.
pub fn definition_body(tree: &Node) -> &Node {
    match tree.get(DEFINITION) {
        Some(inner) if inner.as_mapping().is_some() => inner,
        _ => tree,
    }
}

pub fn definition_body_mut(tree: &mut Node) -> &mut Node {
    let wrapped = tree
        .get(DEFINITION)
        .is_some_and(|inner| inner.as_mapping().is_some());
    if !wrapped {
        return tree;
    }
    match tree {
        // The entry is occupied when `wrapped` holds, so nothing is inserted.
        Node::Mapping(map) => map.entry(DEFINITION.to_string()).or_default(),
        other => other,
    }
}

/// Reads `Column.DataSetIdentifier` from a typed filter or field body.
pub fn column_identifier(body: &Node) -> Option<&str> {
    body.get_path(&[COLUMN, DATA_SET_IDENTIFIER])
        .and_then(Node::as_str)
}
