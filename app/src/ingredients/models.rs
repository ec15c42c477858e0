use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::specifications::SpecId;

/// A value for one specification column. Numeric columns normally hold
/// numbers, but values typed in as text are kept as entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Number(f64),
    Text(String),
}

/// An atomic food item; every value is per 100g.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<Ingredient>,
    #[serde(rename = "ingredient")]
    pub name: String,
    #[serde(default)]
    pub nutrients: BTreeMap<SpecId, SpecValue>,
}

/// What the user submits when creating or editing an ingredient.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngredientForm {
    #[serde(default)]
    pub id: Option<Id<Ingredient>>,
    #[serde(rename = "ingredient")]
    pub name: String,
    #[serde(default)]
    pub nutrients: BTreeMap<SpecId, SpecValue>,
}

impl SpecValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SpecValue::Number(n) => Some(*n),
            SpecValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for SpecValue {
    fn from(n: f64) -> Self {
        SpecValue::Number(n)
    }
}

impl From<&str> for SpecValue {
    fn from(s: &str) -> Self {
        SpecValue::Text(s.to_string())
    }
}

impl Ingredient {
    pub fn new(id: Id<Ingredient>, name: &str) -> Self {
        let meta = DocMeta::new_with_id(id);
        let name = name.to_string();
        let nutrients = BTreeMap::new();
        Ingredient {
            meta,
            name,
            nutrients,
        }
    }

    pub fn with<V: Into<SpecValue>>(mut self, spec: &str, value: V) -> Self {
        self.nutrients.insert(SpecId::new(spec), value.into());
        self
    }

    pub fn id(&self) -> Id<Ingredient> {
        self.meta.id
    }

    /// Per-100g value of `spec`; anything missing or unreadable counts as 0.
    pub fn value(&self, spec: &SpecId) -> f64 {
        self.nutrients
            .get(spec)
            .and_then(SpecValue::as_number)
            .filter(|n| n.is_finite())
            .unwrap_or(0.0)
    }

    pub(crate) fn matches(&self, term: &str) -> bool {
        self.name.to_lowercase().contains(&term.to_lowercase())
    }
}

impl IngredientForm {
    pub fn new(name: &str) -> Self {
        IngredientForm {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn editing(ingredient: &Ingredient) -> Self {
        IngredientForm {
            id: Some(ingredient.id()),
            name: ingredient.name.clone(),
            nutrients: ingredient.nutrients.clone(),
        }
    }

    pub fn with<V: Into<SpecValue>>(mut self, spec: &str, value: V) -> Self {
        self.nutrients.insert(SpecId::new(spec), value.into());
        self
    }
}

impl Entity for Ingredient {
    const PREFIX: &'static str = "ingredient";
}

impl HasMeta for Ingredient {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
