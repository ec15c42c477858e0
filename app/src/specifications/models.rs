use std::fmt;

use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

/// The reserved column that carries the ingredient's name.
pub const NAME_SPEC: &str = "ingredient";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub id: SpecId,
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: SpecKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpecification {
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: SpecKind,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationList {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<SpecificationList>,
    pub(crate) specifications: Vec<Specification>,
}

impl SpecId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        SpecId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 == NAME_SPEC
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for SpecId {
    fn from(id: &str) -> Self {
        SpecId::new(id)
    }
}

impl Default for SpecKind {
    fn default() -> Self {
        SpecKind::Text
    }
}

impl Specification {
    pub fn number(id: &str, label: &str, order: u32) -> Self {
        Specification {
            id: SpecId::new(id),
            label: label.to_string(),
            kind: SpecKind::Number,
            unit: None,
            order: Some(order),
        }
    }

    /// Whether the column takes part in nutrition rollups.
    pub fn is_aggregated(&self) -> bool {
        self.kind == SpecKind::Number && !self.id.is_reserved()
    }

    /// `Label (unit)` as shown in table headers.
    pub fn heading(&self) -> String {
        match self.unit.as_ref() {
            Some(unit) => format!("{} ({})", self.label, unit),
            None => self.label.clone(),
        }
    }
}

impl NewSpecification {
    pub fn number(label: &str) -> Self {
        NewSpecification {
            label: label.to_string(),
            kind: SpecKind::Number,
            unit: None,
        }
    }
}

pub fn defaults() -> Vec<Specification> {
    vec![
        Specification {
            id: SpecId::new(NAME_SPEC),
            label: "Ingredient".to_string(),
            kind: SpecKind::Text,
            unit: None,
            order: Some(0),
        },
        Specification::number("calorie", "Calorie", 1),
        Specification::number("carbs", "Carbs", 2),
        Specification::number("protein", "Protein", 3),
        Specification::number("fats", "Fats", 4),
        Specification::number("fiber", "Fiber", 5),
        Specification::number("sodium", "Sodium", 6),
        Specification::number("cost", "Cost (₹)", 7),
    ]
}

/// Ascending by `order`; entries without one go last, ties keep their
/// stored position.
pub fn sorted(specs: &[Specification]) -> Vec<Specification> {
    let mut specs = specs.to_vec();
    specs.sort_by_key(|s| s.order.unwrap_or(u32::MAX));
    specs
}

impl SpecificationList {
    pub(crate) fn new(id: Id<SpecificationList>) -> Self {
        let meta = DocMeta::new_with_id(id);
        let specifications = Vec::new();
        SpecificationList {
            meta,
            specifications,
        }
    }

    pub(crate) fn id() -> Id<SpecificationList> {
        Id::hashed("SpecificationList")
    }

    pub(crate) fn contains(&self, id: &SpecId) -> bool {
        self.specifications.iter().any(|s| &s.id == id)
    }
}

impl Entity for SpecificationList {
    const PREFIX: &'static str = "specification_list";
}

impl HasMeta for SpecificationList {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
