use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use food_manager::config::{DbConfig, EnvLogger};
use food_manager::ingredients::{
    DeleteIngredient, Ingredient, IngredientForm, ListIngredients, SaveIngredient,
    SearchIngredients, SpecValue,
};
use food_manager::menus::{
    ConsolidateMenu, DeleteMenu, ItemForm, ListMenus, Menu, MenuBreakdown, MenuForm, SaveMenu,
    SummariseMenu,
};
use food_manager::nutrition::{IngredientRow, Nutrients, Totals};
use food_manager::products::{
    DeleteProduct, LinkForm, LoadProduct, Product, ProductForm, ProductNutrition, ProductTable,
    SaveProduct,
};
use food_manager::services::{Commandable, Queryable};
use food_manager::specifications::{
    AddSpecification, ListSpecifications, NewSpecification, SpecId, SpecKind, Specification,
};
use food_manager::transfer::{export_filename, ExportDatabase, ImportDatabase};
use food_manager::FoodManager;
use infra::ids::{Entity, Id, IdParseError};

#[derive(Debug, StructOpt)]
#[structopt(name = "fm", about = "Food manager CLI")]
struct Opt {
    /// TOML config; without one the database is read from FOOD_MANAGER_* variables
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Initialize the store and seed specifications")]
    Setup,
    #[structopt(name = "specs", about = "List specifications in display order")]
    Specs,
    #[structopt(name = "add-spec", about = "Add a specification column")]
    AddSpec {
        label: String,
        #[structopt(long)]
        unit: Option<String>,
        /// Free text column; excluded from nutrition totals
        #[structopt(long)]
        text: bool,
    },
    #[structopt(name = "ingredients", about = "List ingredients")]
    Ingredients {
        #[structopt(long)]
        search: Option<String>,
    },
    #[structopt(name = "add-ingredient", about = "Add or edit an ingredient")]
    AddIngredient {
        name: String,
        /// Edit this ingredient instead of adding one
        #[structopt(long)]
        id: Option<Id<Ingredient>>,
        /// Per-100g values as spec=value
        #[structopt(parse(try_from_str = parse_value))]
        values: Vec<(SpecId, SpecValue)>,
    },
    #[structopt(name = "delete-ingredient", about = "Delete an ingredient")]
    DeleteIngredient { id: Id<Ingredient> },
    #[structopt(name = "products", about = "List products with their totals")]
    Products,
    #[structopt(name = "add-product", about = "Add a product from ingredient=grams pairs")]
    AddProduct {
        name: String,
        #[structopt(long, default_value = "0")]
        cooked_weight: f64,
        #[structopt(parse(try_from_str = parse_pair))]
        ingredients: Vec<(Id<Ingredient>, f64)>,
    },
    #[structopt(name = "show-product", about = "Show a product and its totals")]
    ShowProduct { id: Id<Product> },
    #[structopt(name = "delete-product", about = "Delete a product and its links")]
    DeleteProduct { id: Id<Product> },
    #[structopt(name = "menus", about = "List menus")]
    Menus,
    #[structopt(name = "add-menu", about = "Add a menu from product=servings pairs")]
    AddMenu {
        name: String,
        #[structopt(long, default_value = "1")]
        count: u32,
        #[structopt(parse(try_from_str = parse_pair))]
        items: Vec<(Id<Product>, u32)>,
    },
    #[structopt(name = "show-menu", about = "Show a menu's nutrition")]
    ShowMenu {
        id: Id<Menu>,
        /// One row per ingredient across all products
        #[structopt(long)]
        consolidated: bool,
    },
    #[structopt(name = "delete-menu", about = "Delete a menu and its items")]
    DeleteMenu { id: Id<Menu> },
    #[structopt(name = "export", about = "Write every collection to a JSON file")]
    Export {
        #[structopt(parse(from_os_str))]
        path: Option<PathBuf>,
    },
    #[structopt(name = "import", about = "Replace collections from a JSON export")]
    Import {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    food_manager: food_manager::config::Config,
    #[serde(default)]
    env_logger: EnvLogger,
}

fn parse_value(src: &str) -> Result<(SpecId, SpecValue), String> {
    let (spec, value) = split(src)?;
    let value = match value.parse::<f64>() {
        Ok(n) => SpecValue::Number(n),
        Err(_) => SpecValue::Text(value.to_string()),
    };
    Ok((SpecId::new(spec), value))
}

fn parse_pair<T, N>(src: &str) -> Result<(Id<T>, N), String>
where
    T: Entity,
    N: std::str::FromStr,
    N::Err: ToString,
{
    let (id, n) = split(src)?;
    let id = id.parse().map_err(|e: IdParseError| e.to_string())?;
    let n = n.parse().map_err(|e: N::Err| e.to_string())?;
    Ok((id, n))
}

fn split(src: &str) -> Result<(&str, &str), String> {
    let mut it = src.splitn(2, '=');
    match (it.next(), it.next()) {
        (Some(k), Some(v)) if !k.is_empty() => Ok((k, v)),
        _ => Err(format!("expected key=value, got {:?}", src)),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut buf = String::new();
            File::open(path)
                .with_context(|| format!("open {:?}", path))?
                .read_to_string(&mut buf)?;
            Ok(toml::from_str(&buf).context("parse config")?)
        }
        None => Ok(Config {
            food_manager: food_manager::config::Config {
                db: DbConfig::from_env()?,
            },
            env_logger: EnvLogger::default(),
        }),
    }
}

fn print_nutrients(columns: &[Specification], nutrients: &Nutrients) {
    for spec in columns {
        let value = nutrients.get(&spec.id).copied().unwrap_or(0.0);
        print!("  {}={:.2}", spec.label, value);
    }
    println!();
}

fn print_rows(columns: &[Specification], rows: &[IngredientRow], total: &Totals) {
    for row in rows {
        print!("    {:<24} {:>9.1}g", row.name, row.quantity);
        print_nutrients(columns, &row.nutrients);
    }
    print!("    {:<24} {:>9.1}g", "Total", total.quantity);
    print_nutrients(columns, &total.nutrients);
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let config = load_config(opt.config.as_ref())?;

    config.env_logger.builder().init();

    let fm = FoodManager::new(&config.food_manager)?;
    let columns = || -> Result<Vec<Specification>> {
        let specs = fm.specifications().query(ListSpecifications)?;
        Ok(specs.into_iter().filter(Specification::is_aggregated).collect())
    };

    match opt.command {
        Commands::Setup => {
            fm.setup()?;
        }
        Commands::Specs => {
            for spec in fm.specifications().query(ListSpecifications)? {
                let kind = match spec.kind {
                    SpecKind::Number => "number",
                    SpecKind::Text => "text",
                };
                println!("{}\t{}\t{}", spec.id, spec.heading(), kind);
            }
        }
        Commands::AddSpec { label, unit, text } => {
            let kind = if text { SpecKind::Text } else { SpecKind::Number };
            let spec = fm
                .specifications()
                .execute(AddSpecification(NewSpecification { label, kind, unit }))?;
            println!("{}", spec.id);
        }
        Commands::Ingredients { search } => {
            let list = match search {
                Some(term) => fm.ingredients().query(SearchIngredients(term))?,
                None => fm.ingredients().query(ListIngredients)?,
            };
            let columns = columns()?;
            for ingredient in list {
                print!("{}: {}", ingredient.id(), ingredient.name);
                let values = columns
                    .iter()
                    .map(|s| (s.id.clone(), ingredient.value(&s.id)))
                    .collect();
                print_nutrients(&columns, &values);
            }
        }
        Commands::AddIngredient { name, id, values } => {
            let mut form = IngredientForm::new(&name);
            form.id = id;
            form.nutrients = values.into_iter().collect();
            let saved = fm.ingredients().execute(SaveIngredient(form))?;
            println!("{}", saved.id());
        }
        Commands::DeleteIngredient { id } => {
            if !fm.ingredients().execute(DeleteIngredient(id))? {
                warn!("No ingredient {}", id);
            }
        }
        Commands::Products => {
            let columns = columns()?;
            for (product, totals) in fm.products().query(ProductTable)? {
                print!(
                    "{}: {} raw={:.1}g cooked={:.1}g",
                    product.id(),
                    product.name,
                    totals.raw_weight,
                    totals.cooked_weight
                );
                print_nutrients(&columns, &totals.nutrients);
            }
        }
        Commands::AddProduct {
            name,
            cooked_weight,
            ingredients,
        } => {
            let saved = fm.products().execute(SaveProduct {
                product: ProductForm::new(&name, cooked_weight),
                ingredients: ingredients
                    .into_iter()
                    .map(|(id, grams)| LinkForm::new(id, grams))
                    .collect(),
            })?;
            println!("{}", saved.product.id());
        }
        Commands::ShowProduct { id } => {
            let details = fm
                .products()
                .query(LoadProduct(id))?
                .ok_or_else(|| anyhow!("No product {}", id))?;
            println!("{} ({:.1}g cooked)", details.product.name, details.product.cooked_weight);
            for link in details.ingredients.iter() {
                println!("  {} {:.1}g", link.ingredient_id, link.quantity);
            }
            if let Some(totals) = fm.products().query(ProductNutrition(id))? {
                print!("  raw={:.1}g", totals.raw_weight);
                print_nutrients(&columns()?, &totals.nutrients);
            }
        }
        Commands::DeleteProduct { id } => {
            if !fm.products().execute(DeleteProduct(id))? {
                warn!("No product {}", id);
            }
        }
        Commands::Menus => {
            for menu in fm.menus().query(ListMenus)? {
                println!("{}: {} x{}", menu.id(), menu.name, menu.count);
            }
        }
        Commands::AddMenu { name, count, items } => {
            let saved = fm.menus().execute(SaveMenu {
                menu: MenuForm::new(&name, count),
                items: items
                    .into_iter()
                    .map(|(id, servings)| ItemForm::new(id, servings))
                    .collect(),
            })?;
            println!("{}", saved.menu.id());
        }
        Commands::ShowMenu { id, consolidated } => {
            let columns = columns()?;
            let summary = fm
                .menus()
                .query(SummariseMenu(id))?
                .ok_or_else(|| anyhow!("No menu {}", id))?;
            println!(
                "{} x{}: {} items, {:.1}g cooked per set",
                summary.name, summary.count, summary.items, summary.cooked_weight
            );
            if consolidated {
                if let Some(view) = fm.menus().query(ConsolidateMenu(id))? {
                    print_rows(&columns, &view.rows, &view.total);
                }
            } else if let Some(items) = fm.menus().query(MenuBreakdown(id))? {
                for item in items {
                    println!(
                        "  {} x{} ({:.1}g cooked)",
                        item.product_name, item.servings, item.cooked_weight
                    );
                    print_rows(&columns, &item.rows, &item.total);
                }
            }
            print!("  Per set:");
            print_nutrients(&columns, &summary.per_set);
            print!("  Batch:");
            print_nutrients(&columns, &summary.nutrients);
        }
        Commands::DeleteMenu { id } => {
            if !fm.menus().execute(DeleteMenu(id))? {
                warn!("No menu {}", id);
            }
        }
        Commands::Export { path } => {
            let path =
                path.unwrap_or_else(|| PathBuf::from(export_filename(Local::today().naive_local())));
            let doc = fm.transfer().query(ExportDatabase)?;
            let out = File::create(&path).with_context(|| format!("create {:?}", path))?;
            serde_json::to_writer_pretty(out, &doc).context("write export")?;
            info!("Exported to {:?}", path);
            println!("{}", path.display());
        }
        Commands::Import { path } => {
            let mut buf = String::new();
            File::open(&path)
                .with_context(|| format!("open {:?}", path))?
                .read_to_string(&mut buf)?;
            let report = fm.transfer().execute(ImportDatabase(buf))?;
            for (name, n) in report.imported.iter() {
                println!("{}: {}", name, n);
            }
            for name in report.skipped.iter() {
                warn!("Skipped unknown collection {:?}", name);
            }
        }
    }

    fm.flush()?;
    Ok(())
}
