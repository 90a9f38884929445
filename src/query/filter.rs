use crate::value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

/// A leaf filter: one comparison against one field. Query handlers flatten
/// their filter trees into a conjunction of these before planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn gt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Gt, value)
    }

    pub fn gte(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    pub fn lte(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    pub fn ne(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }
}
