/// File and field name constants shared by the stages, the layout and the CLI.
/// Raw source names are fixed by the archive's format convention.

// Raw sources inside the archive
pub const VEHICLE_DATA_FILE: &str = "vehicle-data.csv";
pub const TOLLPLAZA_DATA_FILE: &str = "tollplaza-data.tsv";
pub const PAYMENT_DATA_FILE: &str = "payment-data.txt";

// Normalized extracts and downstream artifacts (relative to the staging dir)
pub const CSV_EXTRACT_FILE: &str = "csv_data.csv";
pub const TSV_EXTRACT_FILE: &str = "tsv_data.csv";
pub const FIXED_WIDTH_EXTRACT_FILE: &str = "fixed_width_data.csv";
pub const CONSOLIDATED_FILE: &str = "extracted_data.csv";
pub const TRANSFORMED_FILE: &str = "transformed_data.csv";

pub const DEFAULT_ARCHIVE: &str = "tolldata.tgz";
pub const DEFAULT_STAGING_DIR: &str = "staging";
pub const EXPANSION_SUBDIR: &str = "tolldata";

// Field names
pub const ROWID: &str = "Rowid";
pub const TIMESTAMP: &str = "Timestamp";
pub const VEHICLE_NUMBER: &str = "Anonymized Vehicle number";
pub const VEHICLE_TYPE: &str = "Vehicle type";
pub const NUMBER_OF_AXLES: &str = "Number of axles";
pub const VEHICLE_CODE: &str = "Vehicle code";
pub const TOLLPLAZA_ID: &str = "Tollplaza id";
pub const TOLLPLAZA_CODE: &str = "Tollplaza code";
pub const PAYMENT_CODE: &str = "Type of Payment code";
pub const PAYMENT_VEHICLE_CODE: &str = "Vehicle Code";

/// Column widths of `payment-data.txt`, in characters.
pub const PAYMENT_FIELD_WIDTHS: [usize; 7] = [6, 20, 15, 8, 10, 20, 10];

/// Field uppercased by the transform stage unless configured otherwise.
pub const DEFAULT_TRANSFORM_FIELD: &str = VEHICLE_TYPE;

// Stage names, shared by logs, errors, the DAG and the CLI
pub const STAGE_EXPAND: &str = "expand";
pub const STAGE_EXTRACT_CSV: &str = "extract_csv";
pub const STAGE_EXTRACT_TSV: &str = "extract_tsv";
pub const STAGE_EXTRACT_FIXED_WIDTH: &str = "extract_fixed_width";
pub const STAGE_CONSOLIDATE: &str = "consolidate";
pub const STAGE_TRANSFORM: &str = "transform";
