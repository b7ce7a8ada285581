//! Cart aggregate implementation.

use chrono::{DateTime, Utc};
use common::{MedicineId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::Version;

use super::{CartError, CartPolicy};
use crate::Money;
use crate::aggregate::Aggregate;
use crate::pricing::{Coupon, PriceBreakdown, PricedItem};

/// Price, name and prescription data supplied by the catalog at add time.
///
/// The cart keeps its own copy, so later catalog changes never reprice it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineSnapshot {
    pub name: String,
    pub unit_price: Money,
    pub unit_mrp: Money,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub requires_prescription: bool,
    pub available_stock: u32,
    #[serde(default)]
    pub batch_number: Option<String>,
}

/// One medicine and its quantity within a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub medicine_id: MedicineId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub unit_mrp: Money,
    pub discount_percent: Decimal,
    pub requires_prescription: bool,
    pub available_stock: u32,
    pub batch_number: Option<String>,
}

impl CartLineItem {
    fn from_snapshot(medicine_id: MedicineId, quantity: u32, snapshot: MedicineSnapshot) -> Self {
        Self {
            medicine_id,
            name: snapshot.name,
            quantity,
            unit_price: snapshot.unit_price,
            unit_mrp: snapshot.unit_mrp,
            discount_percent: snapshot.discount_percent,
            requires_prescription: snapshot.requires_prescription,
            available_stock: snapshot.available_stock,
            batch_number: snapshot.batch_number,
        }
    }

    /// Returns quantity * unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl PricedItem for CartLineItem {
    fn unit_price(&self) -> Money {
        self.unit_price
    }

    fn unit_mrp(&self) -> Money {
        self.unit_mrp
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Immutable copy of a cart handed to the order factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub user_id: UserId,
    pub items: Vec<CartLineItem>,
    pub coupon: Option<Coupon>,
    pub reward_points: u32,
    /// Pricing to copy verbatim; recomputed by the factory when absent.
    pub pricing: Option<PriceBreakdown>,
    pub requires_prescription: bool,
}

/// Per-user shopping cart.
///
/// Pricing and the prescription flag are derived: every mutation recomputes
/// them before returning, and neither has a setter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    user_id: UserId,

    #[serde(skip)]
    version: Version,

    items: Vec<CartLineItem>,

    applied_coupon: Option<Coupon>,

    applied_reward_points: u32,

    pricing: PriceBreakdown,

    requires_prescription: bool,

    updated_at: DateTime<Utc>,
}

impl Aggregate for Cart {
    fn aggregate_type() -> &'static str {
        "Cart"
    }

    fn collection() -> &'static str {
        "carts"
    }

    fn key(&self) -> String {
        self.user_id.to_string()
    }

    fn owner(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            version: Version::initial(),
            items: Vec::new(),
            applied_coupon: None,
            applied_reward_points: 0,
            pricing: PriceBreakdown::default(),
            requires_prescription: false,
            updated_at: Utc::now(),
        }
    }

    /// Returns the owning user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the line items in insertion order.
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Returns a line item by medicine ID.
    pub fn get_item(&self, medicine_id: &MedicineId) -> Option<&CartLineItem> {
        self.items.iter().find(|i| &i.medicine_id == medicine_id)
    }

    /// Returns the number of distinct medicines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total number of units.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Returns true if the cart has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the applied coupon.
    pub fn coupon(&self) -> Option<&Coupon> {
        self.applied_coupon.as_ref()
    }

    /// Returns the requested reward points.
    pub fn reward_points(&self) -> u32 {
        self.applied_reward_points
    }

    /// Returns the current pricing.
    pub fn pricing(&self) -> &PriceBreakdown {
        &self.pricing
    }

    /// Returns true if any item needs a prescription.
    pub fn requires_prescription(&self) -> bool {
        self.requires_prescription
    }

    /// Returns when the cart was last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Copies the cart for order creation.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            user_id: self.user_id,
            items: self.items.clone(),
            coupon: self.applied_coupon.clone(),
            reward_points: self.applied_reward_points,
            pricing: Some(self.pricing),
            requires_prescription: self.requires_prescription,
        }
    }
}

// Mutations: validate first, then change state, then reprice.
impl Cart {
    /// Adds units of a medicine, merging with an existing line.
    pub fn add_item(
        &mut self,
        medicine_id: MedicineId,
        quantity: u32,
        snapshot: MedicineSnapshot,
        policy: &CartPolicy,
    ) -> Result<(), CartError> {
        let existing = self.get_item(&medicine_id).map(|i| i.quantity).unwrap_or(0);
        let new_quantity = u64::from(existing) + u64::from(quantity);

        if new_quantity == 0 || new_quantity > u64::from(policy.limits.max_quantity_per_item) {
            return Err(CartError::InvalidQuantity {
                quantity: new_quantity,
                max: policy.limits.max_quantity_per_item,
            });
        }

        if new_quantity > u64::from(snapshot.available_stock) {
            return Err(CartError::InsufficientStock {
                medicine_id,
                requested: new_quantity,
                available: snapshot.available_stock,
            });
        }

        // Bounded by max_quantity_per_item above.
        let new_quantity = new_quantity as u32;

        match self.items.iter_mut().find(|i| i.medicine_id == medicine_id) {
            Some(item) => {
                // Keep the original price snapshot, refresh stock and prescription data.
                item.quantity = new_quantity;
                item.available_stock = snapshot.available_stock;
                item.requires_prescription = snapshot.requires_prescription;
            }
            None => self.items.push(CartLineItem::from_snapshot(
                medicine_id,
                new_quantity,
                snapshot,
            )),
        }

        self.reprice(policy);
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn update_item(
        &mut self,
        medicine_id: &MedicineId,
        quantity: u32,
        policy: &CartPolicy,
    ) -> Result<(), CartError> {
        let index = self.index_of(medicine_id)?;

        if quantity == 0 {
            self.items.remove(index);
            self.reprice(policy);
            return Ok(());
        }

        if quantity > policy.limits.max_quantity_per_item {
            return Err(CartError::InvalidQuantity {
                quantity: u64::from(quantity),
                max: policy.limits.max_quantity_per_item,
            });
        }

        if let Some(item) = self.items.get_mut(index) {
            if quantity > item.available_stock {
                return Err(CartError::InsufficientStock {
                    medicine_id: medicine_id.clone(),
                    requested: u64::from(quantity),
                    available: item.available_stock,
                });
            }
            item.quantity = quantity;
        }

        self.reprice(policy);
        Ok(())
    }

    /// Removes a line item.
    pub fn remove_item(
        &mut self,
        medicine_id: &MedicineId,
        policy: &CartPolicy,
    ) -> Result<(), CartError> {
        let index = self.index_of(medicine_id)?;
        self.items.remove(index);
        self.reprice(policy);
        Ok(())
    }

    /// Resets the cart: items, coupon, reward request and prescription flag.
    pub fn clear(&mut self) {
        self.items.clear();
        self.applied_coupon = None;
        self.applied_reward_points = 0;
        self.requires_prescription = false;
        self.pricing = PriceBreakdown::default();
        self.updated_at = Utc::now();
    }

    /// Removes what `snapshot` checked out, keeping anything added since.
    ///
    /// Lines shrink by the checked-out quantity and go when nothing is
    /// left. The coupon is dropped only if it is the one the order used;
    /// reward points are reset.
    pub fn remove_checked_out(&mut self, snapshot: &CartSnapshot, policy: &CartPolicy) {
        for ordered in &snapshot.items {
            if let Some(index) = self
                .items
                .iter()
                .position(|i| i.medicine_id == ordered.medicine_id)
            {
                let item = &mut self.items[index];
                if item.quantity <= ordered.quantity {
                    self.items.remove(index);
                } else {
                    item.quantity -= ordered.quantity;
                }
            }
        }

        if self.applied_coupon == snapshot.coupon {
            self.applied_coupon = None;
        }
        self.applied_reward_points = 0;
        self.reprice(policy);
    }

    /// Applies a caller-validated coupon, replacing any previous one.
    pub fn apply_coupon(&mut self, coupon: Coupon, policy: &CartPolicy) -> Result<(), CartError> {
        coupon.validate()?;
        self.applied_coupon = Some(coupon);
        self.reprice(policy);
        Ok(())
    }

    /// Removes the applied coupon.
    pub fn remove_coupon(&mut self, policy: &CartPolicy) {
        self.applied_coupon = None;
        self.reprice(policy);
    }

    /// Stores a reward points request; the engine clamps it to the cap.
    pub fn apply_reward_points(&mut self, points: u32, policy: &CartPolicy) {
        self.applied_reward_points = points;
        self.reprice(policy);
    }

    fn index_of(&self, medicine_id: &MedicineId) -> Result<usize, CartError> {
        self.items
            .iter()
            .position(|i| &i.medicine_id == medicine_id)
            .ok_or_else(|| CartError::ItemNotFound {
                medicine_id: medicine_id.clone(),
            })
    }

    fn reprice(&mut self, policy: &CartPolicy) {
        self.pricing = policy.pricing.price(
            &self.items,
            self.applied_coupon.as_ref(),
            self.applied_reward_points,
        );
        self.requires_prescription = self.items.iter().any(|i| i.requires_prescription);
        self.updated_at = Utc::now();
    }
}
