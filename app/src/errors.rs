use err_derive::Error;

use infra::ids::{Entity, Id};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "{} not found: {}", kind, id)]
pub struct NotFound {
    pub kind: &'static str,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "a {} named {:?} already exists", kind, name)]
pub struct DuplicateName {
    pub kind: &'static str,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error(display = "invalid {}: {}", what, value)]
pub struct InvalidQuantity {
    pub what: &'static str,
    pub value: f64,
}

impl NotFound {
    pub fn of<T: Entity>(id: &Id<T>) -> Self {
        NotFound {
            kind: T::PREFIX,
            id: id.to_string(),
        }
    }
}

impl DuplicateName {
    pub fn of<T: Entity>(name: &str) -> Self {
        DuplicateName {
            kind: T::PREFIX,
            name: name.to_string(),
        }
    }
}

/// Gram weights and quantities must be finite and non-negative.
pub(crate) fn check_quantity(what: &'static str, value: f64) -> Result<f64, InvalidQuantity> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(InvalidQuantity { what, value })
    }
}
