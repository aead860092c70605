use std::path::Path;

use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    /// Ordered image paths; the first is the primary image.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub in_stock: bool,
}

impl Product {
    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .first()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Read-only product lookup consumed by the request builder.
pub trait ProductCatalog: Send + Sync {
    fn product_by_id(&self, id: &str) -> Option<&Product>;
}

/// Catalog kept in insertion order, usually loaded from a JSON array.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: IndexMap<String, Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> anyhow::Result<Self> {
        let mut map = IndexMap::new();
        for product in products {
            let id = product.id.trim().to_string();
            if id.is_empty() {
                bail!("catalog product '{}' has an empty id", product.name);
            }
            if map.contains_key(&id) {
                bail!("duplicate product id '{id}' in catalog");
            }
            map.insert(id, product);
        }
        Ok(Self { products: map })
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let products: Vec<Product> =
            serde_json::from_str(raw).context("catalog must be a JSON array of products")?;
        Self::new(products)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading catalog {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn list(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for Catalog {
    fn product_by_id(&self, id: &str) -> Option<&Product> {
        self.products.get(id.trim())
    }
}
