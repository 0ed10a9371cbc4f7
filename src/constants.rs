//! Application constants for the CBM output processor
//!
//! File names, markers, table names and sentinel values shared by the
//! parsers, the loader and the reconciler.

// =============================================================================
// Classifier Handling
// =============================================================================

/// Number of classifier slots carried by every record
pub const CLASSIFIER_SLOTS: usize = 10;

/// Number of kyoto flag fields carried by indicator and snapshot records
pub const KYOTO_FLAG_COUNT: usize = 5;

/// Value used for absent or non-positive classifier values. 0 is a valid
/// classifier index in some inputs so it cannot act as the sentinel.
pub const UNCLASSIFIED: i32 = 1;

/// Fill value for classifier slots not declared by a grouped snapshot record
pub const CLASSIFIER_PAD: i32 = -99;

/// Raw tokens treated as an absent value
pub const MISSING_TOKENS: &[&str] = &["NA", "N/A", ".", "-", "?"];

// =============================================================================
// Run Output Files
// =============================================================================

/// Default run log file name
pub const DEFAULT_LOG_FILE_NAME: &str = "CBMRun.log";

/// Default pattern for single-line snapshot files
pub const DEFAULT_SINGLE_LINE_SNAPSHOT_PATTERN: &str = "svl*.dat";

/// Default pattern for six-line grouped snapshot files
pub const DEFAULT_GROUPED_SNAPSHOT_PATTERN: &str = "svl*.grp";

/// Physical lines per grouped snapshot record
pub const GROUPED_SNAPSHOT_LINES: usize = 6;

// =============================================================================
// Run Log
// =============================================================================

/// Default literal opening a reconciliation block in the run log
pub const DEFAULT_BLOCK_START_MARKER: &str = "Disturbance Reconciliation";

/// Key whose line closes a reconciliation block
pub const BLOCK_END_KEY: &str = "Records Changed";

/// Canonical reconciliation log columns, always present in parsed output
pub const CANONICAL_LOG_COLUMNS: &[&str] = &[
    "Timestep",
    "Year",
    "Disturbance Type",
    "Default Disturbance Type",
    "Disturbance Group",
    "Sort Type",
    "Target Type",
    "Target Area",
    "Eligible Area",
    "Efficiency",
    "Surplus Area",
    "Area Prop'n",
    "Records Eligible",
    "Records Changed",
    "Records Sorted",
    "Target Biomass C",
    "Surplus Biomass C",
    "Biomass C Prop'n",
];

/// Log keys holding counts or codes, coerced to integers
pub const COUNT_LIKE_LOG_COLUMNS: &[&str] = &[
    "Timestep",
    "Year",
    "Disturbance Type",
    "Default Disturbance Type",
    "Disturbance Group",
    "Sort Type",
    "Records Eligible",
    "Records Changed",
    "Records Sorted",
];

/// Log keys kept as text
pub const TEXT_LOG_COLUMNS: &[&str] = &["Target Type"];

/// Log column names, as referenced by the reconciler
pub mod log_keys {
    pub const TIMESTEP: &str = "Timestep";
    pub const DISTURBANCE_TYPE: &str = "Disturbance Type";
    pub const DISTURBANCE_GROUP: &str = "Disturbance Group";
    pub const SORT_TYPE: &str = "Sort Type";
    pub const TARGET_TYPE: &str = "Target Type";
    pub const TARGET_AREA: &str = "Target Area";
    pub const ELIGIBLE_AREA: &str = "Eligible Area";
    pub const SURPLUS_AREA: &str = "Surplus Area";
    pub const AREA_PROPORTION: &str = "Area Prop'n";
    pub const RECORDS_ELIGIBLE: &str = "Records Eligible";
    pub const RECORDS_CHANGED: &str = "Records Changed";
    pub const RECORDS_SORTED: &str = "Records Sorted";
    pub const TARGET_BIOMASS_C: &str = "Target Biomass C";
    pub const SURPLUS_BIOMASS_C: &str = "Surplus Biomass C";
    pub const BIOMASS_C_PROPORTION: &str = "Biomass C Prop'n";
}

// =============================================================================
// Output Tables
// =============================================================================

pub mod tables {
    pub const AGE_INDICATORS: &str = "AgeIndicators";
    pub const POOL_INDICATORS: &str = "PoolIndicators";
    pub const FLUX_INDICATORS: &str = "FluxIndicators";
    pub const DIST_INDICATORS: &str = "DistIndicators";
    pub const STAND_SNAPSHOTS: &str = "StandSnapshots";
    pub const RECONCILIATION_LOG: &str = "DisturbanceReconciliationLog";
    pub const RECONCILIATION: &str = "DisturbanceReconciliation";
    pub const CLASSIFIER_SETS: &str = "ClassifierSets";
}

/// Column holding the interned classifier set id
pub const CLASSIFIER_SET_ID_COLUMN: &str = "ClassifierSetID";

/// Prefix applied to realized fields in merged reconciliation output
pub const SIMULATION_PREFIX: &str = "Simulation_";

// =============================================================================
// Defaults
// =============================================================================

/// Default rows per chunk handed to the sink
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Bounds applied when the chunk size is derived from system memory
pub const MIN_AUTO_CHUNK_SIZE: usize = 10_000;
pub const MAX_AUTO_CHUNK_SIZE: usize = 500_000;

/// Default relative tolerance when comparing configured and realized targets
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-5;
