use crate::error::DockvError;
use crate::keys::{Key, prefix_successor};
use crate::value::FieldType;

pub(crate) const SELECTIVITY_EQUALITY: f64 = 0.1;
pub(crate) const SELECTIVITY_BOTH_BOUNDS: f64 = 0.25;
pub(crate) const SELECTIVITY_SINGLE_BOUND: f64 = 0.5;
pub(crate) const SELECTIVITY_FULL_RANGE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Equal,
    Range,
    FullRange,
}

/// A compiled description of which index key ranges a filter implies.
/// `Equal` carries one key per distinct literal; `Range` and `FullRange`
/// carry a lower and an upper key. Created per query, discarded after
/// iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub query_type: QueryType,
    pub keys: Vec<Key>,
    pub field_name: String,
    pub data_type: FieldType,
    pub estimated_selectivity: f64,
    lower_inclusive: bool,
    upper_inclusive: bool,
}

impl QueryPlan {
    pub(crate) fn equality(field_name: String, data_type: FieldType, keys: Vec<Key>) -> Self {
        Self {
            query_type: QueryType::Equal,
            keys,
            field_name,
            data_type,
            estimated_selectivity: SELECTIVITY_EQUALITY,
            lower_inclusive: true,
            upper_inclusive: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn range(
        field_name: String,
        data_type: FieldType,
        lower: Key,
        lower_inclusive: bool,
        upper: Key,
        upper_inclusive: bool,
        estimated_selectivity: f64,
    ) -> Self {
        Self {
            query_type: QueryType::Range,
            keys: vec![lower, upper],
            field_name,
            data_type,
            estimated_selectivity,
            lower_inclusive,
            upper_inclusive,
        }
    }

    pub(crate) fn full_range(field_name: String, data_type: FieldType, prefix: Key) -> Self {
        Self {
            query_type: QueryType::FullRange,
            keys: vec![prefix.clone(), prefix],
            field_name,
            data_type,
            estimated_selectivity: SELECTIVITY_FULL_RANGE,
            lower_inclusive: true,
            upper_inclusive: true,
        }
    }

    /// Resolves the plan's keys into packed half-open scan bounds. Index
    /// rows extend a bound key with primary-key parts, so an inclusive upper
    /// bound (and an exclusive lower bound) becomes the bound's prefix
    /// successor.
    pub fn scan_bounds(&self) -> Result<(Vec<u8>, Vec<u8>), DockvError> {
        if self.query_type == QueryType::Equal {
            return Err(DockvError::Internal(
                "equality plans have no scan bounds".into(),
            ));
        }

        let lower = self.keys[0].serialize_to_bytes();
        let lo = if self.lower_inclusive {
            lower
        } else {
            prefix_successor(&lower)
                .ok_or_else(|| DockvError::Internal("range lower bound has no successor".into()))?
        };

        let upper = self.keys[1].serialize_to_bytes();
        let hi = if self.upper_inclusive {
            prefix_successor(&upper)
                .ok_or_else(|| DockvError::Internal("range upper bound has no successor".into()))?
        } else {
            upper
        };

        Ok((lo, hi))
    }
}
