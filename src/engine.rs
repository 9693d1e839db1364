//! Update engine.
//!
//! Every update follows the same shape: validate the positional arguments,
//! load the record, change one section, write the whole record back. The
//! operation set is closed, so it is modelled as the [`Command`] enum rather
//! than a trait.

use std::fmt;

use crate::error::{RmaError, RmaResult};
use crate::rma::{Intake, Rma, RmaNo};
use crate::store::RecordStore;

/// The operations the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Write a blank record.
    Create,
    /// Replace the intake section.
    UpdateIntake,
    /// Set the ship notice.
    UpdateShipmentNotice,
    /// Set forwarder name and location together.
    UpdateForwarderLocation,
    /// Set the order confirmation status.
    UpdateOrderConfirmation,
    /// Set the ETA.
    UpdateEta,
    /// Set the proof of delivery.
    UpdatePod,
    /// Return every record under the index.
    Query,
}

impl OperationKind {
    /// Exact number of positional arguments.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Query => 0,
            Self::Create => 1,
            Self::UpdateShipmentNotice
            | Self::UpdateOrderConfirmation
            | Self::UpdateEta
            | Self::UpdatePod => 2,
            Self::UpdateForwarderLocation => 3,
            Self::UpdateIntake => 5,
        }
    }

    /// Name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::UpdateIntake => "update_intake",
            Self::UpdateShipmentNotice => "update_shipment_notice",
            Self::UpdateForwarderLocation => "update_forwarder_location",
            Self::UpdateOrderConfirmation => "update_order_confirmation",
            Self::UpdateEta => "update_eta",
            Self::UpdatePod => "update_pod",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated operation with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// See [`OperationKind::Create`].
    Create {
        /// Record number.
        rmano: RmaNo,
    },
    /// See [`OperationKind::UpdateIntake`].
    UpdateIntake {
        /// Record number.
        rmano: RmaNo,
        /// Replacement section.
        intake: Intake,
    },
    /// See [`OperationKind::UpdateShipmentNotice`].
    UpdateShipmentNotice {
        /// Record number.
        rmano: RmaNo,
        /// New ship notice.
        notice: String,
    },
    /// See [`OperationKind::UpdateForwarderLocation`].
    UpdateForwarderLocation {
        /// Record number.
        rmano: RmaNo,
        /// Forwarder / field-engineer name.
        name: String,
        /// Forwarder / field-engineer location.
        location: String,
    },
    /// See [`OperationKind::UpdateOrderConfirmation`].
    UpdateOrderConfirmation {
        /// Record number.
        rmano: RmaNo,
        /// New status.
        status: String,
    },
    /// See [`OperationKind::UpdateEta`].
    UpdateEta {
        /// Record number.
        rmano: RmaNo,
        /// New ETA.
        eta: String,
    },
    /// See [`OperationKind::UpdatePod`].
    UpdatePod {
        /// Record number.
        rmano: RmaNo,
        /// New proof of delivery.
        pod: String,
    },
    /// See [`OperationKind::Query`].
    Query,
}

impl Command {
    /// Builds a command from positional string arguments.
    ///
    /// # Errors
    /// `InvalidArgs` if the argument count differs from `kind.arity()` or the
    /// record number is empty.
    pub fn parse<S: AsRef<str>>(kind: OperationKind, args: &[S]) -> RmaResult<Self> {
        if args.len() != kind.arity() {
            return Err(RmaError::ArgumentCount {
                operation: kind.name(),
                expected: kind.arity(),
                actual: args.len(),
            });
        }
        let arg = |i: usize| args[i].as_ref().to_string();

        if kind == OperationKind::Query {
            return Ok(Self::Query);
        }
        let rmano = RmaNo::new(arg(0))?;

        Ok(match kind {
            OperationKind::Create => Self::Create { rmano },
            OperationKind::UpdateIntake => Self::UpdateIntake {
                rmano,
                intake: Intake {
                    order_no: arg(1),
                    line_no: arg(2),
                    product_id: arg(3),
                    quantity: arg(4),
                },
            },
            OperationKind::UpdateShipmentNotice => Self::UpdateShipmentNotice {
                rmano,
                notice: arg(1),
            },
            OperationKind::UpdateForwarderLocation => Self::UpdateForwarderLocation {
                rmano,
                name: arg(1),
                location: arg(2),
            },
            OperationKind::UpdateOrderConfirmation => Self::UpdateOrderConfirmation {
                rmano,
                status: arg(1),
            },
            OperationKind::UpdateEta => Self::UpdateEta { rmano, eta: arg(1) },
            OperationKind::UpdatePod => Self::UpdatePod { rmano, pod: arg(1) },
            OperationKind::Query => Self::Query,
        })
    }

    /// The operation this command runs.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::UpdateIntake { .. } => OperationKind::UpdateIntake,
            Self::UpdateShipmentNotice { .. } => OperationKind::UpdateShipmentNotice,
            Self::UpdateForwarderLocation { .. } => OperationKind::UpdateForwarderLocation,
            Self::UpdateOrderConfirmation { .. } => OperationKind::UpdateOrderConfirmation,
            Self::UpdateEta { .. } => OperationKind::UpdateEta,
            Self::UpdatePod { .. } => OperationKind::UpdatePod,
            Self::Query => OperationKind::Query,
        }
    }

    /// Record targeted by this command, if any.
    #[must_use]
    pub const fn rmano(&self) -> Option<&RmaNo> {
        match self {
            Self::Create { rmano }
            | Self::UpdateIntake { rmano, .. }
            | Self::UpdateShipmentNotice { rmano, .. }
            | Self::UpdateForwarderLocation { rmano, .. }
            | Self::UpdateOrderConfirmation { rmano, .. }
            | Self::UpdateEta { rmano, .. }
            | Self::UpdatePod { rmano, .. } => Some(rmano),
            Self::Query => None,
        }
    }
}

/// Result of executing a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A record was written; this is the stored copy.
    Written(Rma),
    /// Every record under the index, in scan order.
    Records(Vec<Rma>),
}

/// Executes commands against a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    store: RecordStore,
}

impl UpdateEngine {
    /// Engine over `store`.
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Runs one command.
    ///
    /// # Errors
    /// See the individual operations.
    pub fn execute(&self, command: Command) -> RmaResult<Outcome> {
        match command {
            Command::Create { rmano } => self.create(&rmano).map(Outcome::Written),
            Command::UpdateIntake { rmano, intake } => {
                self.update_intake(&rmano, intake).map(Outcome::Written)
            }
            Command::UpdateShipmentNotice { rmano, notice } => self
                .update_shipment_notice(&rmano, notice)
                .map(Outcome::Written),
            Command::UpdateForwarderLocation {
                rmano,
                name,
                location,
            } => self
                .update_forwarder_location(&rmano, name, location)
                .map(Outcome::Written),
            Command::UpdateOrderConfirmation { rmano, status } => self
                .update_order_confirmation(&rmano, status)
                .map(Outcome::Written),
            Command::UpdateEta { rmano, eta } => self.update_eta(&rmano, eta).map(Outcome::Written),
            Command::UpdatePod { rmano, pod } => self.update_pod(&rmano, pod).map(Outcome::Written),
            Command::Query => self.query().map(Outcome::Records),
        }
    }

    /// Writes a blank record for `rmano`.
    ///
    /// There is no existence check: an existing record under the same number
    /// is replaced.
    ///
    /// # Errors
    /// `Corrupt` or `StoreUnavailable` from the write.
    pub fn create(&self, rmano: &RmaNo) -> RmaResult<Rma> {
        let mut rma = Rma::new(rmano.clone());
        rma.version = 1;
        self.store.save(&rma)?;
        tracing::info!(rmano = %rmano, "created rma");
        Ok(rma)
    }

    /// Replaces the intake section.
    ///
    /// # Errors
    /// `NotFound` if the record does not exist; otherwise as
    /// [`RecordStore::save_checked`].
    pub fn update_intake(&self, rmano: &RmaNo, intake: Intake) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdateIntake, |rma| rma.intake = intake)
    }

    /// Sets the ship notice.
    ///
    /// # Errors
    /// As [`UpdateEngine::update_intake`].
    pub fn update_shipment_notice(&self, rmano: &RmaNo, notice: String) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdateShipmentNotice, |rma| {
            rma.shipment.ship_notice = notice;
        })
    }

    /// Sets forwarder name and location together.
    ///
    /// # Errors
    /// As [`UpdateEngine::update_intake`].
    pub fn update_forwarder_location(
        &self,
        rmano: &RmaNo,
        name: String,
        location: String,
    ) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdateForwarderLocation, |rma| {
            rma.shipment.fe_name = name;
            rma.shipment.fe_location = location;
        })
    }

    /// Sets the order confirmation status.
    ///
    /// # Errors
    /// As [`UpdateEngine::update_intake`].
    pub fn update_order_confirmation(&self, rmano: &RmaNo, status: String) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdateOrderConfirmation, |rma| {
            rma.confirmation.order_confirm = status;
        })
    }

    /// Sets the ETA.
    ///
    /// # Errors
    /// As [`UpdateEngine::update_intake`].
    pub fn update_eta(&self, rmano: &RmaNo, eta: String) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdateEta, |rma| rma.confirmation.eta = eta)
    }

    /// Sets the proof of delivery.
    ///
    /// # Errors
    /// As [`UpdateEngine::update_intake`].
    pub fn update_pod(&self, rmano: &RmaNo, pod: String) -> RmaResult<Rma> {
        self.modify(rmano, OperationKind::UpdatePod, |rma| rma.confirmation.pod = pod)
    }

    /// Every record under the index.
    ///
    /// # Errors
    /// `StoreUnavailable` or `Corrupt` from the scan.
    pub fn query(&self) -> RmaResult<Vec<Rma>> {
        let records = self.store.query_collect()?;
        tracing::debug!(count = records.len(), "queried rmas");
        Ok(records)
    }

    fn modify(
        &self,
        rmano: &RmaNo,
        kind: OperationKind,
        mutate: impl FnOnce(&mut Rma),
    ) -> RmaResult<Rma> {
        let mut rma = self.store.load(rmano)?;
        mutate(&mut rma);
        let written = self.store.save_checked(&rma)?;
        tracing::info!(rmano = %rmano, operation = %kind, version = written.version, "updated rma");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ErrorKind;
    use crate::ledger::MemoryLedger;
    use crate::rma::{Confirmation, ShipmentStatus};

    fn engine() -> (UpdateEngine, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = UpdateEngine::new(RecordStore::new(ledger.clone()));
        (engine, ledger)
    }

    fn no(s: &str) -> RmaNo {
        RmaNo::new(s).unwrap()
    }

    #[test]
    fn test_parse_checks_arity() {
        let err = Command::parse(OperationKind::UpdateIntake, &["RMA-1", "PO1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
        assert!(err.to_string().contains("expected 5"));

        let err = Command::parse::<&str>(OperationKind::Create, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);

        let err = Command::parse(OperationKind::Query, &["x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_parse_rejects_empty_rmano() {
        let err = Command::parse(OperationKind::UpdateEta, &["", "2024"]).unwrap_err();
        assert!(matches!(err, RmaError::EmptyRecordId));
    }

    #[test]
    fn test_parse_positions() {
        let cmd = Command::parse(
            OperationKind::UpdateForwarderLocation,
            &["R", "Ana", "Lisbon"],
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::UpdateForwarderLocation {
                rmano: no("R"),
                name: "Ana".to_string(),
                location: "Lisbon".to_string(),
            }
        );
        assert_eq!(cmd.kind(), OperationKind::UpdateForwarderLocation);
        assert_eq!(cmd.rmano(), Some(&no("R")));
    }

    #[test]
    fn test_create_overwrites_silently() {
        let (engine, _) = engine();
        engine.create(&no("R")).unwrap();
        engine.update_eta(&no("R"), "soon".to_string()).unwrap();

        engine.create(&no("R")).unwrap();
        let rma = engine.store().load(&no("R")).unwrap();
        assert!(rma.is_blank());
    }

    #[test]
    fn test_update_missing_writes_nothing() {
        let (engine, ledger) = engine();
        let err = engine
            .update_intake(&no("ghost"), Intake::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn test_each_update_touches_only_its_field() {
        let (engine, _) = engine();
        let r = no("R");
        engine.create(&r).unwrap();

        let rma = engine.update_shipment_notice(&r, "shipped".to_string()).unwrap();
        assert_eq!(
            rma.shipment,
            ShipmentStatus {
                ship_notice: "shipped".to_string(),
                ..ShipmentStatus::default()
            }
        );
        assert_eq!(rma.confirmation, Confirmation::default());
        assert_eq!(rma.intake, Intake::default());

        let rma = engine
            .update_forwarder_location(&r, "Ana".to_string(), "Lisbon".to_string())
            .unwrap();
        assert_eq!(rma.shipment.ship_notice, "shipped");
        assert_eq!(rma.shipment.fe_name, "Ana");
        assert_eq!(rma.shipment.fe_location, "Lisbon");

        let rma = engine.update_order_confirmation(&r, "ok".to_string()).unwrap();
        let rma2 = engine.update_pod(&r, "signed".to_string()).unwrap();
        assert_eq!(rma2.confirmation.order_confirm, "ok");
        assert_eq!(rma2.confirmation.pod, "signed");
        assert_eq!(rma2.confirmation.eta, "");
        assert_eq!(rma2.shipment, rma.shipment);
        assert_eq!(rma2.version, rma.version + 1);
    }

    #[test]
    fn test_execute_query() {
        let (engine, _) = engine();
        assert_eq!(
            engine.execute(Command::Query).unwrap(),
            Outcome::Records(Vec::new())
        );
        engine.execute(Command::Create { rmano: no("R") }).unwrap();
        let Outcome::Records(records) = engine.execute(Command::Query).unwrap() else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 1);
    }
}
