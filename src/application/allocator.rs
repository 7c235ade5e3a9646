use crate::domain::machine::Machine;
use crate::domain::order::{Audit, OrderDetail, OrderHeaderId, OrderStatus};
use crate::domain::ports::{Clock, MachineCatalog};
use crate::error::{OrderError, Result, ValidationError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Binds baskets to physical machines.
pub struct MachineAllocator {
    catalog: Arc<dyn MachineCatalog>,
    clock: Arc<dyn Clock>,
    processing_duration: Duration,
}

impl MachineAllocator {
    pub fn new(
        catalog: Arc<dyn MachineCatalog>,
        clock: Arc<dyn Clock>,
        processing_duration: Duration,
    ) -> Self {
        Self {
            catalog,
            clock,
            processing_duration,
        }
    }

    /// Looks up the machine an onsite order asked for and checks it can take
    /// the order right now.
    ///
    /// The store re-checks availability when the basket is written, so a
    /// machine claimed between this call and the insert is still refused.
    pub async fn reserve(&self, serial: &str, branch_id: &str) -> Result<Machine> {
        let machine = self.catalog.get_by_serial(serial).await?;
        self.ensure_usable(&machine, branch_id).await?;
        if machine.tier().is_none() {
            return Err(ValidationError::UnsupportedWeight(machine.weight).into());
        }
        Ok(machine)
    }

    /// The machine sits in `branch_id`, is active and runs no basket.
    async fn ensure_usable(&self, machine: &Machine, branch_id: &str) -> Result<()> {
        Self::ensure_local_and_active(machine, branch_id)?;
        let available = self
            .catalog
            .list_available_in_branch(branch_id)
            .await?
            .into_iter()
            .any(|m| m.serial == machine.serial && m.is_available);
        if !available {
            return Err(OrderError::machine_busy(&machine.serial));
        }
        Ok(())
    }

    fn ensure_local_and_active(machine: &Machine, branch_id: &str) -> Result<()> {
        if machine.branch_id != branch_id {
            return Err(OrderError::Conflict(format!(
                "machine {} does not belong to branch {branch_id}",
                machine.serial
            )));
        }
        if !machine.is_active {
            return Err(OrderError::Conflict(format!("machine {} is inactive", machine.serial)));
        }
        Ok(())
    }

    /// Builds the single processing basket of an onsite order.
    pub fn allocate(&self, header_id: OrderHeaderId, machine: &Machine, actor: &str) -> OrderDetail {
        let now = self.clock.now();
        OrderDetail {
            id: Uuid::new_v4(),
            header_id,
            line_no: 0,
            machine_serial: Some(machine.serial.clone()),
            weight: machine.weight,
            service_type: machine.machine_type.service_type(),
            status: OrderStatus::Processing,
            finished_at: Some(now + self.processing_duration),
            audit: Audit::new(actor, now),
        }
    }

    /// Puts an existing basket of the order's branch onto a machine,
    /// keeping its service and weight. Returns the serial it was bound to.
    ///
    /// Falls back to the basket's current machine when `serial` is `None`.
    /// A basket already processing on the requested machine skips the busy
    /// check.
    pub async fn assign(
        &self,
        basket: &mut OrderDetail,
        branch_id: &str,
        serial: Option<&str>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        if !basket.service_type.uses_machine() {
            return Err(ValidationError::NoMachineService(basket.service_type).into());
        }
        let serial = match serial.or(basket.machine_serial.as_deref()) {
            Some(s) => s.to_string(),
            None => return Err(ValidationError::MachineRequired.into()),
        };
        let machine = self.catalog.get_by_serial(&serial).await?;
        if machine.machine_type.service_type() != basket.service_type {
            return Err(ValidationError::MachineMismatch {
                serial,
                service: basket.service_type,
            }
            .into());
        }

        let holds_machine = basket.status == OrderStatus::Processing
            && basket.machine_serial.as_deref() == Some(serial.as_str());
        if holds_machine {
            Self::ensure_local_and_active(&machine, branch_id)?;
        } else {
            self.ensure_usable(&machine, branch_id).await?;
        }

        basket.machine_serial = Some(machine.serial);
        basket.status = OrderStatus::Processing;
        basket.finished_at =
            Some(finished_at.unwrap_or_else(|| self.clock.now() + self.processing_duration));
        Ok(serial)
    }
}
