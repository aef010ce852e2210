//! Postgres-backed store implementation.
//!
//! All reads and writes of one unit of work share a single database
//! transaction, so an availability check and the ledger writes it guards are
//! serialized by the database (read-committed or stronger), not by this
//! process.
//!
//! ## Sync-over-async bridging
//!
//! The `RentalStore` trait is synchronous while sqlx is async. Each session
//! method drives its query to completion with `tokio::runtime::Handle::block_on`,
//! so store access must happen off the runtime's worker threads (e.g. inside
//! `spawn_blocking`). A missing runtime surfaces as `StoreError::Backend`.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};
use tokio::runtime::Handle;
use tracing::{instrument, warn};
use uuid::Uuid;

use rentforge_catalog::{ComponentEdge, Item, ItemKind};
use rentforge_core::{CustomerId, ItemId, MovementId, OrderId, UserId};
use rentforge_ledger::{MovementReason, StockMovement};
use rentforge_orders::{Order, OrderLine, OrderStatus, RentalWindow};

use crate::traits::{RentalStore, StoreError, StoreReader, StoreWriter};

/// Postgres-backed rental store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// DDL for the tables this adapter expects (see `schema.sql`).
    pub const SCHEMA: &'static str = include_str!("../schema.sql");

    fn runtime_handle() -> Result<Handle, StoreError> {
        Handle::try_current().map_err(|_| {
            StoreError::Backend("no tokio runtime available for blocking store access".into())
        })
    }
}

impl RentalStore for PgStore {
    #[instrument(skip(self, f), name = "pg_store_read")]
    fn read<R, E>(&self, f: impl FnOnce(&dyn StoreReader) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let handle = Self::runtime_handle().map_err(E::from)?;
        let mut conn = handle
            .block_on(self.pool.acquire())
            .map_err(|e| E::from(map_sqlx_error(e)))?;
        let session = PgSession::new(&mut *conn, handle.clone());
        f(&session)
    }

    #[instrument(skip(self, f), name = "pg_store_transaction")]
    fn transaction<R, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let handle = Self::runtime_handle().map_err(E::from)?;
        let mut tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| E::from(map_sqlx_error(e)))?;

        let result = {
            let mut session = PgSession::new(&mut *tx, handle.clone());
            f(&mut session)
        };

        match result {
            Ok(value) => {
                handle
                    .block_on(tx.commit())
                    .map_err(|e| E::from(map_sqlx_error(e)))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = handle.block_on(tx.rollback()) {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// One unit of work: every method runs against the same connection (and,
/// inside `transaction`, the same database transaction).
struct PgSession<'c> {
    conn: RefCell<&'c mut PgConnection>,
    handle: Handle,
}

impl<'c> PgSession<'c> {
    fn new(conn: &'c mut PgConnection, handle: Handle) -> Self {
        Self {
            conn: RefCell::new(conn),
            handle,
        }
    }
}

impl StoreReader for PgSession<'_> {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT id, name, kind, quantity_on_hand, created_at \
                     FROM item WHERE id = $1",
                )
                .bind(id.as_uuid())
                .fetch_optional(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        row.map(|r| item_from_row(&r)).transpose()
    }

    fn components_of(&self, parent_id: ItemId) -> Result<Vec<ComponentEdge>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT parent_id, child_id, required_quantity \
                     FROM component_edge WHERE parent_id = $1 ORDER BY position",
                )
                .bind(parent_id.as_uuid())
                .fetch_all(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        rows.iter().map(edge_from_row).collect()
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT id, customer_id, sales_person_id, status, start_date, due_date, \
                            setup_start, order_start, order_end, cleanup_end, created_at \
                     FROM rental_order WHERE id = $1",
                )
                .bind(id.as_uuid())
                .fetch_optional(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    fn lines_of(&self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT order_id, line_no, item_id, quantity, price_per_day \
                     FROM order_line WHERE order_id = $1 ORDER BY line_no",
                )
                .bind(order_id.as_uuid())
                .fetch_all(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        rows.iter().map(line_from_row).collect()
    }

    fn active_lines_overlapping(
        &self,
        item_id: ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<OrderId>,
    ) -> Result<Vec<(Order, OrderLine)>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        // Inclusive-interval overlap on the effective window: the extended
        // setup/cleanup span blocks the resource when present.
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT o.id, o.customer_id, o.sales_person_id, o.status, \
                            o.start_date, o.due_date, o.setup_start, o.order_start, \
                            o.order_end, o.cleanup_end, o.created_at, \
                            l.order_id, l.line_no, l.item_id, l.quantity, l.price_per_day \
                     FROM rental_order o \
                     JOIN order_line l ON l.order_id = o.id \
                     WHERE l.item_id = $1 \
                       AND o.status IN ('reserved', 'checked_out') \
                       AND COALESCE(o.setup_start, o.start_date) <= $3 \
                       AND COALESCE(o.cleanup_end, o.due_date) >= $2 \
                       AND ($4::uuid IS NULL OR o.id <> $4) \
                     ORDER BY o.id, l.line_no",
                )
                .bind(item_id.as_uuid())
                .bind(start)
                .bind(end)
                .bind(exclude.map(|o| *o.as_uuid()))
                .fetch_all(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|r| Ok((order_from_row(r)?, line_from_row(r)?)))
            .collect()
    }

    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT id, item_id, order_id, delta, reason, created_by, notes, created_at \
                     FROM stock_movement WHERE item_id = $1 ORDER BY created_at, id",
                )
                .bind(item_id.as_uuid())
                .fetch_all(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        rows.iter().map(movement_from_row).collect()
    }
}

impl StoreWriter for PgSession<'_> {
    fn put_item(&mut self, item: Item) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query(
                    "INSERT INTO item (id, name, kind, quantity_on_hand, created_at) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (id) DO UPDATE SET \
                         name = EXCLUDED.name, \
                         kind = EXCLUDED.kind, \
                         quantity_on_hand = EXCLUDED.quantity_on_hand",
                )
                .bind(item.id_typed().as_uuid())
                .bind(item.name())
                .bind(item.kind().as_str())
                .bind(item.quantity_on_hand())
                .bind(item.created_at())
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn set_quantity_on_hand(&mut self, id: ItemId, quantity: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        let result = self
            .handle
            .block_on(
                sqlx::query(
                    "UPDATE item SET quantity_on_hand = $2 WHERE id = $1 AND kind = 'atomic'",
                )
                .bind(id.as_uuid())
                .bind(quantity)
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("atomic item {id}")));
        }
        Ok(())
    }

    fn upsert_component(&mut self, edge: ComponentEdge) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query(
                    "INSERT INTO component_edge (parent_id, child_id, required_quantity, position) \
                     VALUES ($1, $2, $3, \
                             COALESCE((SELECT MAX(position) + 1 FROM component_edge \
                                       WHERE parent_id = $1), 0)) \
                     ON CONFLICT (parent_id, child_id) \
                     DO UPDATE SET required_quantity = EXCLUDED.required_quantity",
                )
                .bind(edge.parent_id.as_uuid())
                .bind(edge.child_id.as_uuid())
                .bind(edge.required_quantity)
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn remove_component(
        &mut self,
        parent_id: ItemId,
        child_id: ItemId,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let result = self
            .handle
            .block_on(
                sqlx::query("DELETE FROM component_edge WHERE parent_id = $1 AND child_id = $2")
                    .bind(parent_id.as_uuid())
                    .bind(child_id.as_uuid())
                    .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    fn put_order(&mut self, order: Order) -> Result<(), StoreError> {
        let (start, due, setup_start, order_start, order_end, cleanup_end) =
            window_columns(order.window());
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query(
                    "INSERT INTO rental_order \
                         (id, customer_id, sales_person_id, status, start_date, due_date, \
                          setup_start, order_start, order_end, cleanup_end, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                     ON CONFLICT (id) DO UPDATE SET \
                         customer_id = EXCLUDED.customer_id, \
                         sales_person_id = EXCLUDED.sales_person_id, \
                         status = EXCLUDED.status, \
                         start_date = EXCLUDED.start_date, \
                         due_date = EXCLUDED.due_date, \
                         setup_start = EXCLUDED.setup_start, \
                         order_start = EXCLUDED.order_start, \
                         order_end = EXCLUDED.order_end, \
                         cleanup_end = EXCLUDED.cleanup_end",
                )
                .bind(order.id_typed().as_uuid())
                .bind(order.customer_id().as_uuid())
                .bind(order.sales_person_id().as_uuid())
                .bind(order.status().as_str())
                .bind(start)
                .bind(due)
                .bind(setup_start)
                .bind(order_start)
                .bind(order_end)
                .bind(cleanup_end)
                .bind(order.created_at())
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        let result = self
            .handle
            .block_on(
                sqlx::query("UPDATE rental_order SET status = $2 WHERE id = $1")
                    .bind(id.as_uuid())
                    .bind(status.as_str())
                    .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("order {id}")));
        }
        Ok(())
    }

    fn put_line(&mut self, line: OrderLine) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query(
                    "INSERT INTO order_line (order_id, line_no, item_id, quantity, price_per_day) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (order_id, line_no) DO UPDATE SET \
                         item_id = EXCLUDED.item_id, \
                         quantity = EXCLUDED.quantity, \
                         price_per_day = EXCLUDED.price_per_day",
                )
                .bind(line.order_id.as_uuid())
                .bind(line.line_no as i32)
                .bind(line.item_id.as_uuid())
                .bind(line.quantity)
                .bind(line.price_per_day)
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn remove_line(&mut self, order_id: OrderId, line_no: u32) -> Result<bool, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let result = self
            .handle
            .block_on(
                sqlx::query("DELETE FROM order_line WHERE order_id = $1 AND line_no = $2")
                    .bind(order_id.as_uuid())
                    .bind(line_no as i32)
                    .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query("DELETE FROM order_line WHERE order_id = $1")
                    .bind(id.as_uuid())
                    .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        self.handle
            .block_on(
                sqlx::query("DELETE FROM rental_order WHERE id = $1")
                    .bind(id.as_uuid())
                    .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn append_movement(&mut self, movement: StockMovement) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        self.handle
            .block_on(
                sqlx::query(
                    "INSERT INTO stock_movement \
                         (id, item_id, order_id, delta, reason, created_by, notes, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(movement.id.as_uuid())
                .bind(movement.item_id.as_uuid())
                .bind(movement.order_id.map(|o| *o.as_uuid()))
                .bind(movement.delta)
                .bind(movement.reason.as_str())
                .bind(movement.created_by.as_uuid())
                .bind(movement.notes.as_deref())
                .bind(movement.created_at)
                .execute(&mut **conn),
            )
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn corrupt(e: impl core::fmt::Display) -> StoreError {
    StoreError::CorruptRow(e.to_string())
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let name: String = row.try_get("name").map_err(corrupt)?;
    let kind: String = row.try_get("kind").map_err(corrupt)?;
    let kind: ItemKind = kind.parse().map_err(corrupt)?;
    let quantity_on_hand: Option<i64> = row.try_get("quantity_on_hand").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;
    Item::new(ItemId::from_uuid(id), name, kind, quantity_on_hand, created_at).map_err(corrupt)
}

fn edge_from_row(row: &PgRow) -> Result<ComponentEdge, StoreError> {
    let parent_id: Uuid = row.try_get("parent_id").map_err(corrupt)?;
    let child_id: Uuid = row.try_get("child_id").map_err(corrupt)?;
    let required_quantity: i64 = row.try_get("required_quantity").map_err(corrupt)?;
    ComponentEdge::new(
        ItemId::from_uuid(parent_id),
        ItemId::from_uuid(child_id),
        required_quantity,
    )
    .map_err(corrupt)
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let customer_id: Uuid = row.try_get("customer_id").map_err(corrupt)?;
    let sales_person_id: Uuid = row.try_get("sales_person_id").map_err(corrupt)?;
    let status: String = row.try_get("status").map_err(corrupt)?;
    let status: OrderStatus = status.parse().map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;

    let setup_start: Option<DateTime<Utc>> = row.try_get("setup_start").map_err(corrupt)?;
    let order_start: Option<DateTime<Utc>> = row.try_get("order_start").map_err(corrupt)?;
    let order_end: Option<DateTime<Utc>> = row.try_get("order_end").map_err(corrupt)?;
    let cleanup_end: Option<DateTime<Utc>> = row.try_get("cleanup_end").map_err(corrupt)?;

    let window = match (setup_start, order_start, order_end, cleanup_end) {
        (Some(setup), Some(start), Some(end), Some(cleanup)) => {
            RentalWindow::extended(setup, start, end, cleanup).map_err(corrupt)?
        }
        _ => {
            let start: Option<DateTime<Utc>> = row.try_get("start_date").map_err(corrupt)?;
            let due: Option<DateTime<Utc>> = row.try_get("due_date").map_err(corrupt)?;
            match (start, due) {
                (Some(start), Some(due)) => RentalWindow::simple(start, due).map_err(corrupt)?,
                _ => return Err(StoreError::CorruptRow(format!("order {id} has no window"))),
            }
        }
    };

    Ok(Order::from_parts(
        OrderId::from_uuid(id),
        CustomerId::from_uuid(customer_id),
        UserId::from_uuid(sales_person_id),
        status,
        window,
        created_at,
    ))
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, StoreError> {
    let order_id: Uuid = row.try_get("order_id").map_err(corrupt)?;
    let line_no: i32 = row.try_get("line_no").map_err(corrupt)?;
    let item_id: Uuid = row.try_get("item_id").map_err(corrupt)?;
    let quantity: i64 = row.try_get("quantity").map_err(corrupt)?;
    let price_per_day: i64 = row.try_get("price_per_day").map_err(corrupt)?;
    OrderLine::new(
        OrderId::from_uuid(order_id),
        line_no as u32,
        ItemId::from_uuid(item_id),
        quantity,
        price_per_day,
    )
    .map_err(corrupt)
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let item_id: Uuid = row.try_get("item_id").map_err(corrupt)?;
    let order_id: Option<Uuid> = row.try_get("order_id").map_err(corrupt)?;
    let delta: i64 = row.try_get("delta").map_err(corrupt)?;
    let reason: String = row.try_get("reason").map_err(corrupt)?;
    let reason: MovementReason = reason.parse().map_err(corrupt)?;
    let created_by: Uuid = row.try_get("created_by").map_err(corrupt)?;
    let notes: Option<String> = row.try_get("notes").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;
    StockMovement::new(
        MovementId::from_uuid(id),
        ItemId::from_uuid(item_id),
        order_id.map(OrderId::from_uuid),
        delta,
        reason,
        UserId::from_uuid(created_by),
        notes,
        created_at,
    )
    .map_err(corrupt)
}

type WindowColumns = (
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

fn window_columns(window: &RentalWindow) -> WindowColumns {
    match *window {
        RentalWindow::Simple { start, due } => (Some(start), Some(due), None, None, None, None),
        RentalWindow::Extended {
            setup_start,
            order_start,
            order_end,
            cleanup_end,
        } => (
            None,
            None,
            Some(setup_start),
            Some(order_start),
            Some(order_end),
            Some(cleanup_end),
        ),
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => {
            // 23505 unique, 23503 foreign key, 23514 check
            if let Some(code) = db.code() {
                if code.starts_with("23") {
                    return StoreError::Constraint(db.to_string());
                }
            }
            StoreError::Backend(e.to_string())
        }
        sqlx::Error::RowNotFound => StoreError::MissingRow(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}
