//! BOM edge mutation.
//!
//! The cycle check and the edge write share one store transaction, so two
//! concurrent additions cannot both validate against a stale graph and then
//! both commit.

use chrono::Utc;
use tracing::{info, instrument};

use rentforge_bom::{BomError, BomReport, detect_cycle, validate_bom_structure};
use rentforge_catalog::ComponentEdge;
use rentforge_core::ItemId;
use rentforge_events::EventBus;
use rentforge_store::RentalStore;

use crate::RentalEngine;
use crate::change::ChangeEvent;
use crate::error::EngineError;

impl<S, B> RentalEngine<S, B>
where
    S: RentalStore,
    B: EventBus<ChangeEvent>,
{
    /// Add (or re-quantify) a component edge `parent → child`.
    ///
    /// Fails `SelfReference` for a self-edge, `NotComposite`/`NotAtomic` on
    /// kind violations, and `CycleDetected` - with the offending path - if
    /// the child could reach back to the parent.
    #[instrument(skip(self), fields(parent = %parent_id, child = %child_id, qty = required_quantity))]
    pub fn add_component(
        &self,
        parent_id: ItemId,
        child_id: ItemId,
        required_quantity: i64,
    ) -> Result<ComponentEdge, EngineError> {
        if parent_id == child_id {
            return Err(BomError::SelfReference(parent_id).into());
        }
        let edge = ComponentEdge::new(parent_id, child_id, required_quantity)?;

        let edge = self.store().transaction(|tx| -> Result<ComponentEdge, EngineError> {
            let parent = tx
                .item(parent_id)?
                .ok_or(EngineError::ItemNotFound(parent_id))?;
            if !parent.is_composite() {
                return Err(BomError::NotComposite(parent_id).into());
            }
            let child = tx
                .item(child_id)?
                .ok_or(EngineError::ItemNotFound(child_id))?;
            if !child.is_atomic() {
                return Err(BomError::NotAtomic(child_id).into());
            }
            if let Some(path) = detect_cycle(&*tx, parent_id, child_id)? {
                return Err(BomError::CycleDetected { path }.into());
            }
            tx.upsert_component(edge.clone())?;
            Ok(edge)
        })?;

        info!(parent = %parent_id, child = %child_id, "component edge upserted");
        self.publish(ChangeEvent::ComponentChanged {
            parent_id,
            occurred_at: Utc::now(),
        });
        Ok(edge)
    }

    /// Remove a component edge. Fails `ComponentNotFound` if it never
    /// existed.
    #[instrument(skip(self), fields(parent = %parent_id, child = %child_id))]
    pub fn remove_component(&self, parent_id: ItemId, child_id: ItemId) -> Result<(), EngineError> {
        self.store().transaction(|tx| -> Result<(), EngineError> {
            if !tx.remove_component(parent_id, child_id)? {
                return Err(BomError::ComponentNotFound {
                    parent_id,
                    child_id,
                }
                .into());
            }
            Ok(())
        })?;

        self.publish(ChangeEvent::ComponentChanged {
            parent_id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Non-mutating health report for a bundle definition, run before
    /// activating it for sale.
    pub fn validate_bom_structure(&self, item_id: ItemId) -> Result<BomReport, EngineError> {
        self.store()
            .read(|r| validate_bom_structure(r, item_id).map_err(EngineError::from))
    }
}
