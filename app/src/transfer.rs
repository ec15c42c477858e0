//! Whole-database export and import as a single JSON document keyed by
//! collection name.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::*;
use r2d2::Pool;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use infra::persistence::{DocumentConnectionManager, Documents, Storage};

use crate::ingredients::Ingredient;
use crate::menus::{Menu, MenuItem};
use crate::products::{Product, ProductIngredient};
use crate::services::{Commandable, Queryable, Request};
use crate::specifications::{self, Specification, SpecificationList};

pub const SPECIFICATIONS: &str = "specifications";
pub const INGREDIENTS: &str = "ingredients";
pub const PRODUCTS: &str = "products";
pub const PRODUCT_INGREDIENTS: &str = "productIngredients";
pub const MENUS: &str = "menus";
pub const MENU_ITEMS: &str = "menuItems";

#[derive(Debug, Clone)]
pub struct Transfer {
    db: Pool<DocumentConnectionManager>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportDatabase;

/// Replaces every collection named in the document. The raw text is
/// decoded in full before anything is cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDatabase(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ImportReport {
    /// Documents stored per collection.
    pub imported: BTreeMap<String, usize>,
    /// Top-level keys that name no known collection.
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
struct Decoded {
    specifications: Option<Vec<Specification>>,
    ingredients: Option<Vec<Ingredient>>,
    products: Option<Vec<Product>>,
    product_ingredients: Option<Vec<ProductIngredient>>,
    menus: Option<Vec<Menu>>,
    menu_items: Option<Vec<MenuItem>>,
    skipped: Vec<String>,
}

/// `food-manager-export-YYYY-MM-DD.json`
pub fn export_filename(date: NaiveDate) -> String {
    format!("food-manager-export-{}.json", date.format("%Y-%m-%d"))
}

impl Transfer {
    pub fn new(db: Pool<DocumentConnectionManager>) -> Self {
        Transfer { db }
    }
}

impl Request for ExportDatabase {
    type Resp = Value;
}

impl Request for ImportDatabase {
    type Resp = ImportReport;
}

fn collection<D: Serialize>(docs: Vec<D>) -> Result<Value> {
    serde_json::to_value(docs).context("encode collection")
}

/// A non-array value reads as an empty collection.
fn decode<D: DeserializeOwned>(name: &str, value: Value) -> Result<Vec<D>> {
    match value {
        Value::Array(_) => {
            serde_json::from_value(value).with_context(|| format!("decode {}", name))
        }
        other => {
            warn!("Collection {} is not an array ({}); clearing it", name, other);
            Ok(Vec::new())
        }
    }
}

impl Decoded {
    fn parse(src: &str) -> Result<Self> {
        let top = match serde_json::from_str::<Value>(src).context("parse import document")? {
            Value::Object(map) => map,
            other => bail!("Import document must be an object, found {}", other),
        };

        let mut decoded = Decoded::default();
        for (name, value) in top {
            match name.as_str() {
                SPECIFICATIONS => decoded.specifications = Some(decode(&name, value)?),
                INGREDIENTS => decoded.ingredients = Some(decode(&name, value)?),
                PRODUCTS => decoded.products = Some(decode(&name, value)?),
                PRODUCT_INGREDIENTS => decoded.product_ingredients = Some(decode(&name, value)?),
                MENUS => decoded.menus = Some(decode(&name, value)?),
                MENU_ITEMS => decoded.menu_items = Some(decode(&name, value)?),
                _ => {
                    debug!("Skipping unknown collection {:?}", name);
                    decoded.skipped.push(name);
                }
            }
        }
        Ok(decoded)
    }

    fn apply(self, docs: &Documents) -> Result<ImportReport> {
        let mut report = ImportReport {
            skipped: self.skipped,
            ..Default::default()
        };

        if let Some(specs) = self.specifications {
            let id = SpecificationList::id();
            let mut list = docs
                .load::<SpecificationList>(&id)
                .context("load specifications")?
                .unwrap_or_else(|| SpecificationList::new(id));
            report.imported.insert(SPECIFICATIONS.to_string(), specs.len());
            list.specifications = specs;
            docs.replace_all(&[list])?;
        }
        if let Some(all) = self.ingredients {
            report
                .imported
                .insert(INGREDIENTS.to_string(), docs.replace_all(&all)?);
        }
        if let Some(all) = self.products {
            report
                .imported
                .insert(PRODUCTS.to_string(), docs.replace_all(&all)?);
        }
        if let Some(all) = self.product_ingredients {
            report
                .imported
                .insert(PRODUCT_INGREDIENTS.to_string(), docs.replace_all(&all)?);
        }
        if let Some(all) = self.menus {
            report
                .imported
                .insert(MENUS.to_string(), docs.replace_all(&all)?);
        }
        if let Some(all) = self.menu_items {
            report
                .imported
                .insert(MENU_ITEMS.to_string(), docs.replace_all(&all)?);
        }
        Ok(report)
    }
}

impl Queryable<ExportDatabase> for Transfer {
    fn query(&self, _: ExportDatabase) -> Result<Value> {
        let docs = self.db.get()?;
        let mut out = Map::new();
        out.insert(
            SPECIFICATIONS.to_string(),
            collection(specifications::peek(&docs)?)?,
        );
        out.insert(
            INGREDIENTS.to_string(),
            collection(docs.load_all::<Ingredient>()?)?,
        );
        out.insert(PRODUCTS.to_string(), collection(docs.load_all::<Product>()?)?);
        out.insert(
            PRODUCT_INGREDIENTS.to_string(),
            collection(docs.load_all::<ProductIngredient>()?)?,
        );
        out.insert(MENUS.to_string(), collection(docs.load_all::<Menu>()?)?);
        out.insert(
            MENU_ITEMS.to_string(),
            collection(docs.load_all::<MenuItem>()?)?,
        );
        debug!("Exported {} collections", out.len());
        Ok(Value::Object(out))
    }
}

impl Commandable<ImportDatabase> for Transfer {
    fn execute(&self, req: ImportDatabase) -> Result<ImportReport> {
        let ImportDatabase(src) = req;
        let decoded = Decoded::parse(&src)?;
        let docs = self.db.get()?;
        let report = decoded.apply(&docs)?;
        docs.flush()?;
        info!("Imported {:?}", report);
        Ok(report)
    }
}
