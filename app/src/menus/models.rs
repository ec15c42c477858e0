use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::links::Submitted;
use crate::products::Product;

/// A meal built from products, cooked `count` times as a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<Menu>,
    pub name: String,
    #[serde(default = "one")]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<MenuItem>,
    pub menu_id: Id<Menu>,
    pub product_id: Id<Product>,
    /// Servings.
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MenuForm {
    #[serde(default)]
    pub id: Option<Id<Menu>>,
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

/// One row of the menu form; rows without a product are dropped on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemForm {
    #[serde(default)]
    pub id: Option<Id<MenuItem>>,
    #[serde(default)]
    pub product_id: Option<Id<Product>>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuDetails {
    pub menu: Menu,
    pub items: Vec<MenuItem>,
}

fn one() -> u32 {
    1
}

impl Menu {
    pub fn new(id: Id<Menu>, name: &str, count: u32) -> Self {
        let meta = DocMeta::new_with_id(id);
        let name = name.to_string();
        Menu { meta, name, count }
    }

    pub fn id(&self) -> Id<Menu> {
        self.meta.id
    }
}

impl MenuItem {
    pub fn new(id: Id<MenuItem>, menu_id: Id<Menu>, product_id: Id<Product>, quantity: u32) -> Self {
        let meta = DocMeta::new_with_id(id);
        MenuItem {
            meta,
            menu_id,
            product_id,
            quantity,
        }
    }

    pub fn id(&self) -> Id<MenuItem> {
        self.meta.id
    }
}

impl MenuForm {
    pub fn new(name: &str, count: u32) -> Self {
        MenuForm {
            id: None,
            name: name.to_string(),
            count,
        }
    }

    pub fn editing(menu: &Menu) -> Self {
        MenuForm {
            id: Some(menu.id()),
            name: menu.name.clone(),
            count: menu.count,
        }
    }
}

impl ItemForm {
    pub fn new(product_id: Id<Product>, quantity: u32) -> Self {
        ItemForm {
            id: None,
            product_id: Some(product_id),
            quantity,
        }
    }

    pub fn editing(item: &MenuItem) -> Self {
        ItemForm {
            id: Some(item.id()),
            product_id: Some(item.product_id),
            quantity: item.quantity,
        }
    }
}

impl Submitted<MenuItem> for ItemForm {
    fn id(&self) -> Option<Id<MenuItem>> {
        self.id
    }

    fn apply(self, item: &mut MenuItem) {
        if let Some(product_id) = self.product_id {
            item.product_id = product_id;
        }
        item.quantity = self.quantity;
    }
}

impl Entity for Menu {
    const PREFIX: &'static str = "menu";
}

impl HasMeta for Menu {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Entity for MenuItem {
    const PREFIX: &'static str = "menu_item";
}

impl HasMeta for MenuItem {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
