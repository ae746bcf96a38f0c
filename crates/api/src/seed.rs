//! JSON fixture loaded into the in-memory stores at start-up.

use std::collections::HashMap;
use std::path::Path;

use checkout::{Address, CartItem, InMemoryStore};
use common::{ProductId, UserId, VariantId};
use domain::{Coupon, Money};
use inventory::{InMemoryInventoryLedger, InventoryUnit};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cart of user {user_id} references unknown variant {variant_id}")]
    UnknownVariant {
        user_id: UserId,
        variant_id: VariantId,
    },
}

/// Catalog, addresses, coupons and carts to start the server with.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub products: Vec<SeedProduct>,
    pub addresses: Vec<Address>,
    pub coupons: Vec<Coupon>,
    pub carts: Vec<SeedCart>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub id: ProductId,
    pub name: String,
    pub variants: Vec<SeedVariant>,
}

#[derive(Debug, Deserialize)]
pub struct SeedVariant {
    pub id: VariantId,
    pub sku: String,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SeedCart {
    pub user_id: UserId,
    pub items: Vec<SeedCartLine>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCartLine {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Counts of what was loaded, for the start-up log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    pub variants: usize,
    pub addresses: usize,
    pub coupons: usize,
    pub cart_lines: usize,
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Loads everything into `ledger` and `store`.
    ///
    /// Carts are resolved against the seeded catalog; a line naming a variant
    /// that is not in it fails before any cart is written.
    pub async fn apply(
        &self,
        ledger: &InMemoryInventoryLedger,
        store: &InMemoryStore,
    ) -> Result<SeedSummary, SeedError> {
        let catalog: HashMap<VariantId, (&SeedProduct, &SeedVariant)> = self
            .products
            .iter()
            .flat_map(|product| product.variants.iter().map(move |v| (v.id, (product, v))))
            .collect();

        let mut carts = Vec::new();
        for cart in &self.carts {
            for line in &cart.items {
                let (product, variant) = catalog.get(&line.variant_id).ok_or(
                    SeedError::UnknownVariant {
                        user_id: cart.user_id,
                        variant_id: line.variant_id,
                    },
                )?;
                carts.push((
                    cart.user_id,
                    CartItem {
                        variant_id: variant.id,
                        product_id: product.id,
                        sku: variant.sku.clone(),
                        name: format!("{} / {}", product.name, variant.name),
                        quantity: line.quantity,
                        unit_price: variant.price,
                        is_active: variant.is_active,
                    },
                ));
            }
        }

        for (product, variant) in catalog.values() {
            let unit =
                InventoryUnit::new(variant.id, product.id, variant.sku.clone(), variant.stock);
            let unit = if variant.is_active { unit } else { unit.inactive() };
            ledger.insert_unit(unit).await;
        }
        for address in &self.addresses {
            store.add_address(address.clone());
        }
        for coupon in &self.coupons {
            store.add_coupon(coupon.clone());
        }
        let cart_lines = carts.len();
        for (user_id, item) in carts {
            store.add_to_cart(user_id, item);
        }

        Ok(SeedSummary {
            variants: catalog.len(),
            addresses: self.addresses.len(),
            coupons: self.coupons.len(),
            cart_lines,
        })
    }
}
