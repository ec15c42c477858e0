use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::ingredients::Ingredient;
use crate::links::Submitted;

/// A recipe: ingredients at gram quantities plus the weight after cooking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<Product>,
    pub name: String,
    #[serde(default)]
    pub cooked_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIngredient {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<ProductIngredient>,
    pub product_id: Id<Product>,
    pub ingredient_id: Id<Ingredient>,
    /// Grams.
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductForm {
    #[serde(default)]
    pub id: Option<Id<Product>>,
    pub name: String,
    #[serde(default)]
    pub cooked_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkForm {
    #[serde(default)]
    pub id: Option<Id<ProductIngredient>>,
    pub ingredient_id: Id<Ingredient>,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetails {
    pub product: Product,
    pub ingredients: Vec<ProductIngredient>,
}

impl Product {
    pub fn new(id: Id<Product>, name: &str, cooked_weight: f64) -> Self {
        let meta = DocMeta::new_with_id(id);
        let name = name.to_string();
        Product {
            meta,
            name,
            cooked_weight,
        }
    }

    pub fn id(&self) -> Id<Product> {
        self.meta.id
    }
}

impl ProductIngredient {
    pub fn new(
        id: Id<ProductIngredient>,
        product_id: Id<Product>,
        ingredient_id: Id<Ingredient>,
        quantity: f64,
    ) -> Self {
        let meta = DocMeta::new_with_id(id);
        ProductIngredient {
            meta,
            product_id,
            ingredient_id,
            quantity,
        }
    }

    pub fn id(&self) -> Id<ProductIngredient> {
        self.meta.id
    }
}

impl ProductForm {
    pub fn new(name: &str, cooked_weight: f64) -> Self {
        ProductForm {
            id: None,
            name: name.to_string(),
            cooked_weight,
        }
    }

    pub fn editing(product: &Product) -> Self {
        ProductForm {
            id: Some(product.id()),
            name: product.name.clone(),
            cooked_weight: product.cooked_weight,
        }
    }
}

impl LinkForm {
    pub fn new(ingredient_id: Id<Ingredient>, quantity: f64) -> Self {
        LinkForm {
            id: None,
            ingredient_id,
            quantity,
        }
    }

    pub fn editing(link: &ProductIngredient) -> Self {
        LinkForm {
            id: Some(link.id()),
            ingredient_id: link.ingredient_id,
            quantity: link.quantity,
        }
    }
}

impl Submitted<ProductIngredient> for LinkForm {
    fn id(&self) -> Option<Id<ProductIngredient>> {
        self.id
    }

    fn apply(self, link: &mut ProductIngredient) {
        link.ingredient_id = self.ingredient_id;
        link.quantity = self.quantity;
    }
}

impl Entity for Product {
    const PREFIX: &'static str = "product";
}

impl HasMeta for Product {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Entity for ProductIngredient {
    const PREFIX: &'static str = "product_ingredient";
}

impl HasMeta for ProductIngredient {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
