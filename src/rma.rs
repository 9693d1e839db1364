//! The RMA record and its sections.
//!
//! An RMA (return material authorization) is identified by its record number
//! and carries three sections, each reported by a different party:
//!
//! - [`Intake`] (`3b11`): order line the return was raised against
//! - [`Confirmation`] (`3b3`): order confirmation, ETA and proof of delivery
//! - [`ShipmentStatus`] (`3b13`): ship notice and field-engineer whereabouts
//!
//! The serde names below are the persisted field names. They are part of the
//! stored format and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RmaError, RmaResult};

/// RMA record number.
///
/// Non-empty by construction. Any other string is accepted, including ones
/// containing key delimiter bytes.
///
/// # Examples
///
/// ```
/// use rmaledger::RmaNo;
///
/// let no = RmaNo::new("RMA-1").unwrap();
/// assert_eq!(no.as_str(), "RMA-1");
/// assert!(RmaNo::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RmaNo(String);

impl RmaNo {
    /// Wraps a record number.
    ///
    /// # Errors
    /// Returns [`RmaError::EmptyRecordId`] if `value` is empty.
    pub fn new(value: impl Into<String>) -> RmaResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(RmaError::EmptyRecordId);
        }
        Ok(Self(value))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes into the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RmaNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RmaNo {
    type Error = RmaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RmaNo> for String {
    fn from(value: RmaNo) -> Self {
        value.0
    }
}

impl AsRef<str> for RmaNo {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order line the return was raised against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intake {
    /// Purchase order number.
    #[serde(rename = "orderno")]
    pub order_no: String,
    /// Line within the order.
    #[serde(rename = "lineno")]
    pub line_no: String,
    /// Product identifier.
    #[serde(rename = "pid")]
    pub product_id: String,
    /// Quantity, kept verbatim.
    pub quantity: String,
}

/// Order confirmation details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Confirmation {
    /// Order confirmation status.
    #[serde(rename = "orderconfirm")]
    pub order_confirm: String,
    /// Estimated time of arrival.
    pub eta: String,
    /// Proof of delivery.
    pub pod: String,
}

/// Shipment and field-engineer status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipmentStatus {
    /// Ship notice status.
    #[serde(rename = "shipnotice")]
    pub ship_notice: String,
    /// Forwarder / field-engineer location.
    #[serde(rename = "felocation")]
    pub fe_location: String,
    /// Forwarder / field-engineer name.
    #[serde(rename = "fename")]
    pub fe_name: String,
}

/// The RMA aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rma {
    /// Record number; also embedded in the storage key.
    pub rmano: RmaNo,

    /// Intake section.
    #[serde(rename = "3b11", default)]
    pub intake: Intake,

    /// Confirmation section.
    #[serde(rename = "3b3", default)]
    pub confirmation: Confirmation,

    /// Shipment section.
    #[serde(rename = "3b13", default)]
    pub shipment: ShipmentStatus,

    /// Write counter. Records written before versioning decode as 0.
    #[serde(default)]
    pub version: u64,
}

impl Rma {
    /// A fresh record: only the number set, every section empty.
    #[must_use]
    pub fn new(rmano: RmaNo) -> Self {
        Self {
            rmano,
            intake: Intake::default(),
            confirmation: Confirmation::default(),
            shipment: ShipmentStatus::default(),
            version: 0,
        }
    }

    /// Returns true if every section is still empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.intake == Intake::default()
            && self.confirmation == Confirmation::default()
            && self.shipment == ShipmentStatus::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_blank() {
        let rma = Rma::new(RmaNo::new("RMA-1").unwrap());
        assert!(rma.is_blank());
        assert_eq!(rma.version, 0);
    }

    #[test]
    fn test_wire_names() {
        let mut rma = Rma::new(RmaNo::new("RMA-1").unwrap());
        rma.intake.order_no = "PO1".to_string();
        rma.confirmation.order_confirm = "ok".to_string();
        rma.shipment.fe_name = "Ana".to_string();

        let json: serde_json::Value = serde_json::to_value(&rma).unwrap();
        assert_eq!(json["rmano"], "RMA-1");
        assert_eq!(json["3b11"]["orderno"], "PO1");
        assert_eq!(json["3b11"]["lineno"], "");
        assert_eq!(json["3b11"]["pid"], "");
        assert_eq!(json["3b11"]["quantity"], "");
        assert_eq!(json["3b3"]["orderconfirm"], "ok");
        assert_eq!(json["3b3"]["eta"], "");
        assert_eq!(json["3b3"]["pod"], "");
        assert_eq!(json["3b13"]["shipnotice"], "");
        assert_eq!(json["3b13"]["felocation"], "");
        assert_eq!(json["3b13"]["fename"], "Ana");
    }

    #[test]
    fn test_decodes_unversioned_record() {
        let legacy = r#"{"rmano":"R1","3b11":{"orderno":"PO","lineno":"1","pid":"X","quantity":"2"},
            "3b3":{"orderconfirm":"","eta":"","pod":""},
            "3b13":{"shipnotice":"","felocation":"","fename":""}}"#;
        let rma: Rma = serde_json::from_str(legacy).unwrap();
        assert_eq!(rma.version, 0);
        assert_eq!(rma.intake.product_id, "X");
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let shuffled = r#"{"3b13":{"fename":"B","shipnotice":"S"},"version":4,"rmano":"R2"}"#;
        let rma: Rma = serde_json::from_str(shuffled).unwrap();
        assert_eq!(rma.rmano.as_str(), "R2");
        assert_eq!(rma.shipment.fe_name, "B");
        assert_eq!(rma.shipment.ship_notice, "S");
        assert_eq!(rma.version, 4);
        assert_eq!(rma.intake, Intake::default());
    }

    #[test]
    fn test_empty_rmano_rejected() {
        assert!(matches!(RmaNo::new(""), Err(RmaError::EmptyRecordId)));
        assert!(serde_json::from_str::<Rma>(r#"{"rmano":""}"#).is_err());
    }
}
