use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentforge_core::{DomainError, DomainResult, Entity, ItemId};

/// What kind of rentable thing an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A single physical unit tracked by count.
    Atomic,
    /// A bundle whose availability derives from its component items.
    Composite,
    /// Time-billed work; not stock-tracked.
    Service,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Atomic => "atomic",
            ItemKind::Composite => "composite",
            ItemKind::Service => "service",
        }
    }
}

impl core::str::FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atomic" => Ok(ItemKind::Atomic),
            "composite" => Ok(ItemKind::Composite),
            "service" => Ok(ItemKind::Service),
            other => Err(DomainError::validation(format!("unknown item kind: {other}"))),
        }
    }
}

/// A catalog item.
///
/// Invariant: `quantity_on_hand` is `Some` (and ≥ 0) exactly when the item is
/// Atomic. Composite and Service items carry no on-hand count of their own -
/// composite stock is derived from components, services are billed by time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    kind: ItemKind,
    quantity_on_hand: Option<i64>,
    created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        kind: ItemKind,
        quantity_on_hand: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        match (kind, quantity_on_hand) {
            (ItemKind::Atomic, Some(q)) if q >= 0 => {}
            (ItemKind::Atomic, Some(_)) => {
                return Err(DomainError::validation("on-hand quantity cannot be negative"));
            }
            (ItemKind::Atomic, None) => {
                return Err(DomainError::validation("atomic items require an on-hand quantity"));
            }
            (ItemKind::Composite | ItemKind::Service, None) => {}
            (ItemKind::Composite | ItemKind::Service, Some(_)) => {
                return Err(DomainError::validation(
                    "only atomic items carry an on-hand quantity",
                ));
            }
        }
        Ok(Self {
            id,
            name,
            kind,
            quantity_on_hand,
            created_at,
        })
    }

    /// Convenience constructor for an Atomic item.
    pub fn atomic(
        id: ItemId,
        name: impl Into<String>,
        quantity_on_hand: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::new(id, name, ItemKind::Atomic, Some(quantity_on_hand), created_at)
    }

    /// Convenience constructor for a Composite item.
    pub fn composite(
        id: ItemId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::new(id, name, ItemKind::Composite, None, created_at)
    }

    /// Convenience constructor for a Service item.
    pub fn service(
        id: ItemId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::new(id, name, ItemKind::Service, None, created_at)
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn quantity_on_hand(&self) -> Option<i64> {
        self.quantity_on_hand
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_atomic(&self) -> bool {
        self.kind == ItemKind::Atomic
    }

    pub fn is_composite(&self) -> bool {
        self.kind == ItemKind::Composite
    }

    pub fn is_service(&self) -> bool {
        self.kind == ItemKind::Service
    }

    /// Replace the on-hand quantity. Atomic items only; the result must stay ≥ 0.
    pub fn set_quantity_on_hand(&mut self, quantity: i64) -> DomainResult<()> {
        if !self.is_atomic() {
            return Err(DomainError::validation(
                "only atomic items carry an on-hand quantity",
            ));
        }
        if quantity < 0 {
            return Err(DomainError::validation("on-hand quantity cannot be negative"));
        }
        self.quantity_on_hand = Some(quantity);
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One bill-of-materials edge: `parent` needs `required_quantity` of `child`
/// per assembled set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEdge {
    pub parent_id: ItemId,
    pub child_id: ItemId,
    pub required_quantity: i64,
}

impl ComponentEdge {
    pub fn new(parent_id: ItemId, child_id: ItemId, required_quantity: i64) -> DomainResult<Self> {
        if required_quantity <= 0 {
            return Err(DomainError::validation("required quantity must be positive"));
        }
        Ok(Self {
            parent_id,
            child_id,
            required_quantity,
        })
    }
}
