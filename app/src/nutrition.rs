//! Nutrition rollups.
//!
//! Ingredients carry values per 100g. A product's totals are the sum of its
//! ingredients scaled by their gram quantities; a menu item scales the
//! product's ingredient quantities by its serving count; a menu's displayed
//! totals are its per-item-set totals scaled once more by the batch count.
//!
//! Everything here works on an in-memory [`Snapshot`]. Links whose ingredient
//! or product no longer exists contribute nothing.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use log::*;
use serde::Serialize;

use infra::ids::Id;
use infra::persistence::{Documents, Storage};

use crate::ingredients::Ingredient;
use crate::menus::{Menu, MenuItem};
use crate::products::{Product, ProductIngredient};
use crate::specifications::{self, SpecId, Specification};

pub type Nutrients = BTreeMap<SpecId, f64>;

/// Everything the rollups read, loaded in one go.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub specifications: Vec<Specification>,
    pub ingredients: Vec<Ingredient>,
    pub products: Vec<Product>,
    pub links: Vec<ProductIngredient>,
}

/// Id-indexed view over a [`Snapshot`], built once per aggregation pass.
#[derive(Debug)]
pub struct Catalogue<'a> {
    specs: Vec<&'a Specification>,
    ingredients: HashMap<Id<Ingredient>, &'a Ingredient>,
    products: HashMap<Id<Product>, &'a Product>,
    links: HashMap<Id<Product>, Vec<&'a ProductIngredient>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTotals {
    pub product_id: Id<Product>,
    /// Sum of the ingredient gram quantities, before cooking.
    pub raw_weight: f64,
    pub cooked_weight: f64,
    pub nutrients: Nutrients,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Totals {
    pub quantity: f64,
    pub nutrients: Nutrients,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientRow {
    pub ingredient_id: Id<Ingredient>,
    pub name: String,
    /// Grams.
    pub quantity: f64,
    pub nutrients: Nutrients,
    /// Products that contributed to this row, in first-seen order.
    pub products: Vec<Id<Product>>,
}

/// The individual view of one menu item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemBreakdown {
    pub item_id: Id<MenuItem>,
    pub product_id: Id<Product>,
    pub product_name: String,
    pub servings: u32,
    pub cooked_weight: f64,
    pub rows: Vec<IngredientRow>,
    pub total: Totals,
}

/// Shopping-list style view: one row per distinct ingredient in a menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consolidated {
    pub rows: Vec<IngredientRow>,
    pub total: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuSummary {
    pub menu_id: Id<Menu>,
    pub name: String,
    pub count: u32,
    pub items: usize,
    /// Cooked weight of one item set; not scaled by `count`.
    pub cooked_weight: f64,
    /// Nutrients of one item set.
    pub per_set: Nutrients,
    /// `per_set` scaled by `count`.
    pub nutrients: Nutrients,
}

impl Snapshot {
    pub fn load(docs: &Documents) -> Result<Self> {
        let specifications = specifications::current(docs)?;
        let ingredients = docs.load_all().context("load ingredients")?;
        let products = docs.load_all().context("load products")?;
        let links = docs.load_all().context("load product ingredients")?;
        Ok(Snapshot {
            specifications,
            ingredients,
            products,
            links,
        })
    }

    pub fn catalogue(&self) -> Catalogue<'_> {
        Catalogue::new(
            &self.specifications,
            &self.ingredients,
            &self.products,
            &self.links,
        )
    }
}

impl<'a> Catalogue<'a> {
    pub fn new(
        specs: &'a [Specification],
        ingredients: &'a [Ingredient],
        products: &'a [Product],
        links: &'a [ProductIngredient],
    ) -> Self {
        let specs = specs.iter().filter(|s| s.is_aggregated()).collect();
        let ingredients = ingredients.iter().map(|i| (i.id(), i)).collect();
        let products = products.iter().map(|p| (p.id(), p)).collect();
        let mut by_product = HashMap::<_, Vec<_>>::new();
        for link in links {
            by_product.entry(link.product_id).or_default().push(link);
        }
        Catalogue {
            specs,
            ingredients,
            products,
            links: by_product,
        }
    }

    /// The aggregated columns, in display order.
    pub fn columns(&self) -> impl Iterator<Item = &'a Specification> + '_ {
        self.specs.iter().copied()
    }

    fn zero(&self) -> Nutrients {
        self.specs.iter().map(|s| (s.id.clone(), 0.0)).collect()
    }

    fn links_of(&self, product_id: &Id<Product>) -> &[&'a ProductIngredient] {
        self.links
            .get(product_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn add_grams(&self, into: &mut Nutrients, ingredient: &Ingredient, grams: f64) {
        for spec in self.specs.iter() {
            *into.entry(spec.id.clone()).or_insert(0.0) += ingredient.value(&spec.id) * grams / 100.0;
        }
    }

    /// Resolved ingredients of a product with their gram quantities scaled
    /// by `servings`.
    fn portions(
        &self,
        product_id: Id<Product>,
        servings: u32,
    ) -> impl Iterator<Item = (&'a Ingredient, f64)> + '_ {
        self.links_of(&product_id).iter().filter_map(move |link| {
            match self.ingredients.get(&link.ingredient_id) {
                Some(ingredient) => Some((*ingredient, link.quantity * f64::from(servings))),
                None => {
                    trace!(
                        "Skipping missing ingredient {} of {}",
                        link.ingredient_id,
                        product_id
                    );
                    None
                }
            }
        })
    }

    pub fn product_totals(&self, product_id: &Id<Product>) -> Option<ProductTotals> {
        let product = self.products.get(product_id)?;
        let mut nutrients = self.zero();
        let mut raw_weight = 0.0;
        for link in self.links_of(product_id) {
            raw_weight += link.quantity;
            let ingredient = match self.ingredients.get(&link.ingredient_id) {
                Some(ingredient) => ingredient,
                None => continue,
            };
            let ratio = link.quantity / 100.0;
            for spec in self.specs.iter() {
                *nutrients.entry(spec.id.clone()).or_insert(0.0) += ingredient.value(&spec.id) * ratio;
            }
        }
        Some(ProductTotals {
            product_id: *product_id,
            raw_weight,
            cooked_weight: product.cooked_weight,
            nutrients,
        })
    }

    pub fn item_breakdown(&self, item: &MenuItem) -> Option<ItemBreakdown> {
        let product = match self.products.get(&item.product_id) {
            Some(product) => product,
            None => {
                debug!("Menu item {} names missing product {}", item.id(), item.product_id);
                return None;
            }
        };

        let servings = f64::from(item.quantity);
        // Weight counts every link, resolved or not, like raw weight does.
        let mut total = Totals {
            quantity: self
                .links_of(&item.product_id)
                .iter()
                .map(|link| link.quantity * servings)
                .sum(),
            nutrients: self.zero(),
        };
        let mut rows = Vec::new();
        for (ingredient, grams) in self.portions(item.product_id, item.quantity) {
            let mut nutrients = self.zero();
            self.add_grams(&mut nutrients, ingredient, grams);
            self.add_grams(&mut total.nutrients, ingredient, grams);
            rows.push(IngredientRow {
                ingredient_id: ingredient.id(),
                name: ingredient.name.clone(),
                quantity: grams,
                nutrients,
                products: vec![item.product_id],
            });
        }

        Some(ItemBreakdown {
            item_id: item.id(),
            product_id: item.product_id,
            product_name: product.name.clone(),
            servings: item.quantity,
            cooked_weight: product.cooked_weight * servings,
            rows,
            total,
        })
    }

    pub fn breakdown(&self, items: &[MenuItem]) -> Vec<ItemBreakdown> {
        items.iter().filter_map(|i| self.item_breakdown(i)).collect()
    }

    pub fn consolidated(&self, items: &[MenuItem]) -> Consolidated {
        let mut rows: Vec<IngredientRow> = Vec::new();
        let mut index = HashMap::<Id<Ingredient>, usize>::new();

        for item in items {
            if !self.products.contains_key(&item.product_id) {
                continue;
            }
            for (ingredient, grams) in self.portions(item.product_id, item.quantity) {
                match index.get(&ingredient.id()) {
                    Some(&at) => {
                        let row = &mut rows[at];
                        row.quantity += grams;
                        self.add_grams(&mut row.nutrients, ingredient, grams);
                        if !row.products.contains(&item.product_id) {
                            row.products.push(item.product_id);
                        }
                    }
                    None => {
                        let mut nutrients = self.zero();
                        self.add_grams(&mut nutrients, ingredient, grams);
                        index.insert(ingredient.id(), rows.len());
                        rows.push(IngredientRow {
                            ingredient_id: ingredient.id(),
                            name: ingredient.name.clone(),
                            quantity: grams,
                            nutrients,
                            products: vec![item.product_id],
                        });
                    }
                }
            }
        }

        let mut total = Totals {
            quantity: 0.0,
            nutrients: self.zero(),
        };
        for row in rows.iter() {
            total.quantity += row.quantity;
            for (spec, value) in row.nutrients.iter() {
                *total.nutrients.entry(spec.clone()).or_insert(0.0) += value;
            }
        }

        Consolidated { rows, total }
    }

    pub fn menu_summary(&self, menu: &Menu, items: &[MenuItem]) -> MenuSummary {
        let mut cooked_weight = 0.0;
        let mut per_set = self.zero();
        for item in items {
            let product = match self.products.get(&item.product_id) {
                Some(product) => product,
                None => continue,
            };
            cooked_weight += product.cooked_weight * f64::from(item.quantity);
            for (ingredient, grams) in self.portions(item.product_id, item.quantity) {
                self.add_grams(&mut per_set, ingredient, grams);
            }
        }

        let batch = f64::from(menu.count);
        let nutrients = per_set
            .iter()
            .map(|(spec, value)| (spec.clone(), value * batch))
            .collect();

        MenuSummary {
            menu_id: menu.id(),
            name: menu.name.clone(),
            count: menu.count,
            items: items.len(),
            cooked_weight,
            per_set,
            nutrients,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::specifications::{defaults, SpecKind};
    use infra::ids::IdGen;

    struct Fixture {
        idgen: IdGen,
        snapshot: Snapshot,
    }

    impl Fixture {
        fn new() -> Self {
            let idgen = IdGen::new();
            let snapshot = Snapshot {
                specifications: defaults(),
                ..Default::default()
            };
            Fixture { idgen, snapshot }
        }

        fn ingredient(&mut self, name: &str, calorie: f64, protein: f64) -> Id<Ingredient> {
            let ingredient = Ingredient::new(self.idgen.generate(), name)
                .with("calorie", calorie)
                .with("protein", protein);
            let id = ingredient.id();
            self.snapshot.ingredients.push(ingredient);
            id
        }

        fn product(&mut self, name: &str, cooked: f64, parts: &[(Id<Ingredient>, f64)]) -> Id<Product> {
            let product = Product::new(self.idgen.generate(), name, cooked);
            let id = product.id();
            for &(ingredient, grams) in parts {
                self.snapshot.links.push(ProductIngredient::new(
                    self.idgen.generate(),
                    id,
                    ingredient,
                    grams,
                ));
            }
            self.snapshot.products.push(product);
            id
        }

        fn item(&self, menu: &Menu, product: Id<Product>, servings: u32) -> MenuItem {
            MenuItem::new(self.idgen.generate(), menu.id(), product, servings)
        }
    }

    fn calorie() -> SpecId {
        SpecId::new("calorie")
    }

    #[test]
    fn product_totals_scale_per_hundred_grams() {
        let mut fx = Fixture::new();
        let a = fx.ingredient("A", 100.0, 0.0);
        let b = fx.ingredient("B", 200.0, 0.0);
        let product = fx.product("AB", 80.0, &[(a, 50.0), (b, 50.0)]);

        let totals = fx
            .snapshot
            .catalogue()
            .product_totals(&product)
            .expect("product");

        assert_eq!(totals.nutrients[&calorie()], 150.0);
        assert_eq!(totals.raw_weight, 100.0);
        assert_eq!(totals.cooked_weight, 80.0);
    }

    #[test]
    fn dangling_ingredients_are_skipped() {
        let mut fx = Fixture::new();
        let a = fx.ingredient("A", 100.0, 10.0);
        let ghost = fx.idgen.generate();
        let product = fx.product("A+ghost", 0.0, &[(a, 100.0), (ghost, 40.0)]);

        let catalogue = fx.snapshot.catalogue();
        let totals = catalogue.product_totals(&product).expect("product");

        assert_eq!(totals.nutrients[&calorie()], 100.0);
        assert_eq!(totals.raw_weight, 140.0);

        let menu = Menu::new(fx.idgen.generate(), "Lunch", 1);
        let breakdown = catalogue
            .item_breakdown(&fx.item(&menu, product, 1))
            .expect("item");
        assert_eq!(breakdown.rows.len(), 1);
        assert_eq!(breakdown.rows[0].quantity, 100.0);
        assert_eq!(breakdown.total.quantity, totals.raw_weight);
        assert_eq!(breakdown.total.nutrients[&calorie()], 100.0);

        let doubled = catalogue
            .item_breakdown(&fx.item(&menu, product, 2))
            .expect("item");
        assert_eq!(doubled.total.quantity, 280.0);
        assert_eq!(doubled.rows[0].quantity, 200.0);
    }

    #[test]
    fn every_numeric_column_is_present_even_without_values() {
        let mut fx = Fixture::new();
        let mut extra = Specification::number("spec_1", "Iron", 8);
        extra.unit = Some("mg".to_string());
        fx.snapshot.specifications.push(extra);
        fx.snapshot.specifications.push(Specification {
            kind: SpecKind::Text,
            ..Specification::number("notes", "Notes", 9)
        });
        let a = fx.ingredient("A", 100.0, 0.0);
        let product = fx.product("A", 0.0, &[(a, 100.0)]);
        let empty = fx.product("Empty", 0.0, &[]);

        let catalogue = fx.snapshot.catalogue();
        let totals = catalogue.product_totals(&product).expect("product");
        let nothing = catalogue.product_totals(&empty).expect("product");

        assert_eq!(totals.nutrients[&SpecId::new("spec_1")], 0.0);
        assert_eq!(totals.nutrients.len(), defaults().len());
        assert!(!totals.nutrients.contains_key(&SpecId::new("notes")));
        assert!(!totals.nutrients.contains_key(&SpecId::new("ingredient")));
        assert!(nothing.nutrients.values().all(|v| *v == 0.0));
        assert_eq!(nothing.nutrients.len(), totals.nutrients.len());
    }

    #[test]
    fn item_breakdown_scales_by_servings() {
        let mut fx = Fixture::new();
        let rice = fx.ingredient("Rice", 130.0, 2.0);
        let dal = fx.ingredient("Dal", 350.0, 24.0);
        let product = fx.product("Khichdi", 300.0, &[(rice, 100.0), (dal, 50.0)]);
        let menu = Menu::new(fx.idgen.generate(), "Dinner", 1);

        let breakdown = fx
            .snapshot
            .catalogue()
            .item_breakdown(&fx.item(&menu, product, 2))
            .expect("item");

        assert_eq!(breakdown.product_name, "Khichdi");
        assert_eq!(breakdown.cooked_weight, 600.0);
        let grams = breakdown.rows.iter().map(|r| r.quantity).collect::<Vec<_>>();
        assert_eq!(grams, vec![200.0, 100.0]);
        assert_eq!(breakdown.rows[0].nutrients[&calorie()], 260.0);
        assert_eq!(breakdown.rows[1].nutrients[&calorie()], 350.0);
        assert_eq!(breakdown.total.quantity, 300.0);
        assert_eq!(breakdown.total.nutrients[&calorie()], 610.0);
        assert_eq!(breakdown.total.nutrients[&SpecId::new("protein")], 28.0);
    }

    #[test]
    fn consolidated_view_merges_shared_ingredients() {
        let mut fx = Fixture::new();
        let rice = fx.ingredient("Rice", 130.0, 2.0);
        let dal = fx.ingredient("Dal", 350.0, 24.0);
        let plain = fx.product("Plain rice", 250.0, &[(rice, 100.0)]);
        let khichdi = fx.product("Khichdi", 300.0, &[(rice, 50.0), (dal, 30.0)]);
        let menu = Menu::new(fx.idgen.generate(), "Thali", 1);
        let items = vec![fx.item(&menu, plain, 2), fx.item(&menu, khichdi, 1)];

        let consolidated = fx.snapshot.catalogue().consolidated(&items);

        assert_eq!(consolidated.rows.len(), 2);
        let rice_row = &consolidated.rows[0];
        assert_eq!(rice_row.name, "Rice");
        assert_eq!(rice_row.quantity, 250.0);
        assert_eq!(rice_row.nutrients[&calorie()], 325.0);
        assert_eq!(rice_row.products, vec![plain, khichdi]);
        assert_eq!(consolidated.rows[1].quantity, 30.0);
        assert_eq!(consolidated.total.quantity, 280.0);
        assert_eq!(consolidated.total.nutrients[&calorie()], 325.0 + 105.0);
    }

    #[test]
    fn consolidated_total_matches_individual_totals() {
        let mut fx = Fixture::new();
        let rice = fx.ingredient("Rice", 130.0, 2.0);
        let dal = fx.ingredient("Dal", 350.0, 24.0);
        let a = fx.product("A", 0.0, &[(rice, 100.0), (dal, 20.0)]);
        let b = fx.product("B", 0.0, &[(dal, 40.0)]);
        let menu = Menu::new(fx.idgen.generate(), "Thali", 1);
        let items = vec![fx.item(&menu, a, 1), fx.item(&menu, b, 3)];

        let catalogue = fx.snapshot.catalogue();
        let consolidated = catalogue.consolidated(&items);
        let individual: f64 = catalogue
            .breakdown(&items)
            .iter()
            .map(|b| b.total.quantity)
            .sum();

        assert_eq!(consolidated.total.quantity, individual);
        assert_eq!(consolidated.rows[1].quantity, 20.0 + 120.0);
    }

    #[test]
    fn menu_summary_scales_nutrients_by_count_once() {
        let mut fx = Fixture::new();
        let rice = fx.ingredient("Rice", 130.0, 2.0);
        let product = fx.product("Rice bowl", 250.0, &[(rice, 100.0)]);
        let menu = Menu::new(fx.idgen.generate(), "Batch", 3);
        let items = vec![fx.item(&menu, product, 2)];

        let summary = fx.snapshot.catalogue().menu_summary(&menu, &items);

        assert_eq!(summary.items, 1);
        assert_eq!(summary.cooked_weight, 500.0);
        assert_eq!(summary.per_set[&calorie()], 260.0);
        assert_eq!(summary.nutrients[&calorie()], 780.0);
        assert_ne!(summary.nutrients[&calorie()], summary.per_set[&calorie()]);
    }

    #[test]
    fn missing_products_drop_out_of_menu_views() {
        let mut fx = Fixture::new();
        let rice = fx.ingredient("Rice", 130.0, 2.0);
        let kept = fx.product("Kept", 100.0, &[(rice, 100.0)]);
        let gone = fx.idgen.generate();
        let menu = Menu::new(fx.idgen.generate(), "Partial", 2);
        let items = vec![fx.item(&menu, kept, 1), fx.item(&menu, gone, 5)];

        let catalogue = fx.snapshot.catalogue();
        let summary = catalogue.menu_summary(&menu, &items);

        assert_eq!(summary.cooked_weight, 100.0);
        assert_eq!(summary.nutrients[&calorie()], 260.0);
        assert_eq!(catalogue.breakdown(&items).len(), 1);
        assert_eq!(catalogue.consolidated(&items).rows.len(), 1);
    }
}
