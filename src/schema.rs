//! Positional layouts of the raw sources and the projections taken from them.
//!
//! Raw files carry no header, so a field's identity is its position. A
//! [`PositionalSchema`] names those positions; a projection picks the named
//! fields to keep, in output order.

use crate::constants::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum PositionalSchema {
    /// Single-byte delimited fields.
    Delimited { delimiter: u8, fields: Vec<String> },
    /// Fields at fixed character widths, in order.
    FixedWidth { fields: Vec<(String, usize)> },
}

impl PositionalSchema {
    pub fn delimited(delimiter: u8, fields: &[&str]) -> Self {
        PositionalSchema::Delimited {
            delimiter,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn fixed_width(fields: &[(&str, usize)]) -> Self {
        PositionalSchema::FixedWidth {
            fields: fields.iter().map(|(f, w)| (f.to_string(), *w)).collect(),
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        match self {
            PositionalSchema::Delimited { fields, .. } => fields.iter().map(String::as_str).collect(),
            PositionalSchema::FixedWidth { fields } => fields.iter().map(|(f, _)| f.as_str()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PositionalSchema::Delimited { fields, .. } => fields.len(),
            PositionalSchema::FixedWidth { fields } => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum row length for fixed-width layouts; `None` for delimited ones.
    pub fn row_width(&self) -> Option<usize> {
        match self {
            PositionalSchema::Delimited { .. } => None,
            PositionalSchema::FixedWidth { fields } => Some(fields.iter().map(|(_, w)| w).sum()),
        }
    }

    /// Resolve projected field names to positions, in projection order.
    pub fn resolve(&self, projection: &[&str]) -> std::result::Result<Vec<usize>, String> {
        let names = self.field_names();
        projection
            .iter()
            .map(|wanted| {
                names
                    .iter()
                    .position(|name| name == wanted)
                    .ok_or_else(|| format!("projected field '{}' is not in the source layout {:?}", wanted, names))
            })
            .collect()
    }

    /// Comma-delimited `vehicle-data.csv`.
    pub fn vehicle_data() -> Self {
        Self::delimited(
            b',',
            &[ROWID, TIMESTAMP, VEHICLE_NUMBER, VEHICLE_TYPE, NUMBER_OF_AXLES, VEHICLE_CODE],
        )
    }

    /// Tab-delimited `tollplaza-data.tsv`.
    pub fn tollplaza_data() -> Self {
        Self::delimited(
            b'\t',
            &[
                ROWID,
                TIMESTAMP,
                VEHICLE_NUMBER,
                VEHICLE_TYPE,
                NUMBER_OF_AXLES,
                TOLLPLAZA_ID,
                TOLLPLAZA_CODE,
            ],
        )
    }

    /// Fixed-width `payment-data.txt`.
    pub fn payment_data() -> Self {
        let names = [
            ROWID,
            TIMESTAMP,
            VEHICLE_NUMBER,
            TOLLPLAZA_ID,
            TOLLPLAZA_CODE,
            PAYMENT_CODE,
            PAYMENT_VEHICLE_CODE,
        ];
        let fields: Vec<(&str, usize)> = names.into_iter().zip(PAYMENT_FIELD_WIDTHS).collect();
        Self::fixed_width(&fields)
    }
}

pub const VEHICLE_PROJECTION: [&str; 4] = [ROWID, TIMESTAMP, VEHICLE_NUMBER, VEHICLE_TYPE];
pub const TOLLPLAZA_PROJECTION: [&str; 3] = [NUMBER_OF_AXLES, TOLLPLAZA_ID, TOLLPLAZA_CODE];
pub const PAYMENT_PROJECTION: [&str; 2] = [PAYMENT_CODE, PAYMENT_VEHICLE_CODE];
