//! Compiles leaf filters against a collection's active indexed fields into
//! one query plan. The equality builder runs first; when no equality plan
//! survives the indexable-type gate, the range builder composes comparison
//! filters into bounded scans and the tightest viable plan wins.

use crate::error::DockvError;
use crate::indexer::{field_prefix_parts, field_value_parts};
use crate::keys::Key;
use crate::query::filter::{Filter, FilterOp};
use crate::query::plan::{
    QueryPlan, SELECTIVITY_BOTH_BOUNDS, SELECTIVITY_SINGLE_BOUND,
};
use crate::schema::{Collection, QueryableField};
use crate::value::FieldValue;
use tracing::debug;

pub fn build_secondary_index_plan(
    coll: &Collection,
    filters: &[Filter],
) -> Result<QueryPlan, DockvError> {
    if filters.is_empty() {
        return Err(DockvError::InvalidArgument(
            "cannot build a query plan from an empty filter".into(),
        ));
    }

    let fields = coll.active_indexed_fields();
    if fields.is_empty() {
        return Err(DockvError::InvalidArgument("no indexable fields".into()));
    }

    if let Some(plan) = build_equality_plans(coll, filters, &fields)
        .into_iter()
        .find(|p| p.data_type.indexable())
    {
        debug!(field = %plan.field_name, keys = plan.keys.len(), "selected equality plan");
        return Ok(plan);
    }

    let mut plans = build_range_plans(coll, filters, &fields);
    if plans.is_empty() {
        return Err(DockvError::InvalidArgument(
            "could not find a query range".into(),
        ));
    }

    plans.sort_by(|a, b| a.estimated_selectivity.total_cmp(&b.estimated_selectivity));
    plans
        .into_iter()
        .find(|p| p.data_type.indexable())
        .ok_or_else(|| DockvError::InvalidArgument("could not find a usable query plan".into()))
}

fn build_equality_plans(
    coll: &Collection,
    filters: &[Filter],
    fields: &[&QueryableField],
) -> Vec<QueryPlan> {
    let mut plans = Vec::new();
    for field in fields {
        let mut literals: Vec<&FieldValue> = Vec::new();
        for filter in filters {
            if filter.op == FilterOp::Eq
                && filter.field == field.name
                && !literals.contains(&&filter.value)
            {
                literals.push(&filter.value);
            }
        }
        if literals.is_empty() {
            continue;
        }

        let keys = literals
            .into_iter()
            .map(|value| {
                Key::new(
                    coll.encoded_index_name.clone(),
                    field_value_parts(field, value),
                )
            })
            .collect();
        plans.push(QueryPlan::equality(
            field.name.clone(),
            field.field_type,
            keys,
        ));
    }
    plans
}

fn build_range_plans(
    coll: &Collection,
    filters: &[Filter],
    fields: &[&QueryableField],
) -> Vec<QueryPlan> {
    let mut plans = Vec::new();
    for field in fields {
        // Compose contiguous comparisons into the tightest bound per side.
        let mut lower: Option<(FieldValue, bool)> = None;
        let mut upper: Option<(FieldValue, bool)> = None;
        let mut touched = false;
        for filter in filters {
            if filter.field != field.name {
                continue;
            }
            match filter.op {
                FilterOp::Gt => tighten_lower(&mut lower, &filter.value, false),
                FilterOp::Gte => tighten_lower(&mut lower, &filter.value, true),
                FilterOp::Lt => tighten_upper(&mut upper, &filter.value, false),
                FilterOp::Lte => tighten_upper(&mut upper, &filter.value, true),
                // Not narrowing; the residual filter runs over a full scan
                // of the field's index.
                FilterOp::Ne => {}
                FilterOp::Eq => continue,
            }
            touched = true;
        }
        if !touched {
            continue;
        }

        let value_key = |value: &FieldValue| {
            Key::new(
                coll.encoded_index_name.clone(),
                field_value_parts(field, value),
            )
        };
        let prefix_key = || {
            Key::new(
                coll.encoded_index_name.clone(),
                field_prefix_parts(&field.name),
            )
        };

        let plan = match (lower, upper) {
            (Some((lo, lo_incl)), Some((hi, hi_incl))) => QueryPlan::range(
                field.name.clone(),
                field.field_type,
                value_key(&lo),
                lo_incl,
                value_key(&hi),
                hi_incl,
                SELECTIVITY_BOTH_BOUNDS,
            ),
            (Some((lo, lo_incl)), None) => QueryPlan::range(
                field.name.clone(),
                field.field_type,
                value_key(&lo),
                lo_incl,
                prefix_key(),
                true,
                SELECTIVITY_SINGLE_BOUND,
            ),
            (None, Some((hi, hi_incl))) => QueryPlan::range(
                field.name.clone(),
                field.field_type,
                prefix_key(),
                true,
                value_key(&hi),
                hi_incl,
                SELECTIVITY_SINGLE_BOUND,
            ),
            (None, None) => {
                QueryPlan::full_range(field.name.clone(), field.field_type, prefix_key())
            }
        };
        plans.push(plan);
    }
    plans
}

fn tighten_lower(bound: &mut Option<(FieldValue, bool)>, value: &FieldValue, inclusive: bool) {
    let replace = match bound {
        None => true,
        Some((current, current_inclusive)) => {
            value > current || (value == current && *current_inclusive && !inclusive)
        }
    };
    if replace {
        *bound = Some((value.clone(), inclusive));
    }
}

fn tighten_upper(bound: &mut Option<(FieldValue, bool)>, value: &FieldValue, inclusive: bool) {
    let replace = match bound {
        None => true,
        Some((current, current_inclusive)) => {
            value < current || (value == current && *current_inclusive && !inclusive)
        }
    };
    if replace {
        *bound = Some((value.clone(), inclusive));
    }
}

#[cfg(test)]
mod tests {
    use super::build_secondary_index_plan;
    use crate::error::DockvError;
    use crate::indexer::field_value_parts;
    use crate::query::filter::Filter;
    use crate::query::plan::QueryType;
    use crate::schema::{Collection, Field, FieldState, Index, QueryableField};
    use crate::value::{FieldType, FieldValue};

    fn users(queryable_fields: Vec<QueryableField>) -> Collection {
        Collection {
            name: "users".into(),
            encoded_name: b"t_users".to_vec(),
            encoded_index_name: b"i_users".to_vec(),
            primary_index: Index {
                name: "pkey".into(),
                fields: vec![Field {
                    name: "id".into(),
                    field_type: FieldType::Int64,
                    auto_generate: false,
                }],
            },
            queryable_fields,
        }
    }

    fn age_coll() -> Collection {
        users(vec![QueryableField::new("age", FieldType::Int64)])
    }

    #[test]
    fn equality_filter_on_indexable_field_yields_equal_plan() {
        let coll = age_coll();
        let plan = build_secondary_index_plan(&coll, &[Filter::eq("age", 30)]).expect("plan");
        assert_eq!(plan.query_type, QueryType::Equal);
        assert_eq!(plan.keys.len(), 1);
        let expected = field_value_parts(&coll.queryable_fields[0], &FieldValue::Int(30));
        assert_eq!(plan.keys[0].parts(), expected.as_slice());
    }

    #[test]
    fn equality_wins_over_range_on_another_field() {
        let coll = users(vec![
            QueryableField::new("age", FieldType::Int64),
            QueryableField::new("name", FieldType::String),
        ]);
        let plan = build_secondary_index_plan(
            &coll,
            &[Filter::gt("age", 10), Filter::eq("name", "bob")],
        )
        .expect("plan");
        assert_eq!(plan.query_type, QueryType::Equal);
        assert_eq!(plan.field_name, "name");
    }

    #[test]
    fn distinct_equality_literals_become_one_key_each() {
        let coll = age_coll();
        let plan = build_secondary_index_plan(
            &coll,
            &[
                Filter::eq("age", 30),
                Filter::eq("age", 40),
                Filter::eq("age", 30),
            ],
        )
        .expect("plan");
        assert_eq!(plan.keys.len(), 2);
    }

    #[test]
    fn comparisons_compose_into_the_tightest_range() {
        let coll = age_coll();
        let plan = build_secondary_index_plan(
            &coll,
            &[
                Filter::gte("age", 10),
                Filter::gt("age", 5),
                Filter::lt("age", 20),
            ],
        )
        .expect("plan");
        assert_eq!(plan.query_type, QueryType::Range);
        let lower = field_value_parts(&coll.queryable_fields[0], &FieldValue::Int(10));
        let upper = field_value_parts(&coll.queryable_fields[0], &FieldValue::Int(20));
        assert_eq!(plan.keys[0].parts(), lower.as_slice());
        assert_eq!(plan.keys[1].parts(), upper.as_slice());
    }

    #[test]
    fn tighter_bounds_sort_first() {
        let coll = users(vec![
            QueryableField::new("age", FieldType::Int64),
            QueryableField::new("score", FieldType::Double),
        ]);
        let plan = build_secondary_index_plan(
            &coll,
            &[
                Filter::gt("age", 10),
                Filter::gte("score", FieldValue::Double(1.5)),
                Filter::lt("score", FieldValue::Double(9.5)),
            ],
        )
        .expect("plan");
        assert_eq!(plan.field_name, "score");
        assert_eq!(plan.query_type, QueryType::Range);
    }

    #[test]
    fn ne_alone_yields_full_range() {
        let coll = age_coll();
        let plan = build_secondary_index_plan(&coll, &[Filter::ne("age", 30)]).expect("plan");
        assert_eq!(plan.query_type, QueryType::FullRange);
    }

    #[test]
    fn non_indexable_data_types_are_rejected() {
        let coll = users(vec![QueryableField::new("blob", FieldType::Bytes)]);
        let err = build_secondary_index_plan(
            &coll,
            &[Filter::eq("blob", FieldValue::Bytes(vec![1, 2]))],
        )
        .unwrap_err();
        assert!(matches!(err, DockvError::InvalidArgument(_)));
    }

    #[test]
    fn empty_filter_and_unindexed_collections_are_invalid() {
        let coll = age_coll();
        assert!(matches!(
            build_secondary_index_plan(&coll, &[]),
            Err(DockvError::InvalidArgument(_))
        ));

        let unindexed = users(vec![QueryableField {
            state: FieldState::Deleted,
            ..QueryableField::new("age", FieldType::Int64)
        }]);
        assert!(matches!(
            build_secondary_index_plan(&unindexed, &[Filter::eq("age", 1)]),
            Err(DockvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn filter_on_unknown_field_finds_no_plan() {
        let coll = age_coll();
        let err = build_secondary_index_plan(&coll, &[Filter::eq("height", 180)]).unwrap_err();
        assert!(matches!(err, DockvError::InvalidArgument(_)));
    }
}
