//! Outbound OCPP 1.6 payloads
//!
//! Built from `rust_ocpp::v1_6` request types and converted to JSON for the
//! frame codec. The simulator models a single connector.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::boot_notification::BootNotificationRequest;
use rust_ocpp::v1_6::messages::meter_values::MeterValuesRequest;
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionRequest;
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionRequest;
use rust_ocpp::v1_6::types::{
    ChargePointErrorCode, ChargePointStatus, Location, Measurand, MeterValue, ReadingContext,
    Reason, SampledValue, UnitOfMeasure, ValueFormat,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::IdentityConfig;
use crate::domain::MeterSample;

/// Connector used for every status and transaction message.
pub const CONNECTOR_ID: u32 = 1;

/// Actions the simulated charge point sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallAction {
    BootNotification,
    Heartbeat,
    StatusNotification,
    StartTransaction,
    StopTransaction,
    MeterValues,
}

impl CallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootNotification => "BootNotification",
            Self::Heartbeat => "Heartbeat",
            Self::StatusNotification => "StatusNotification",
            Self::StartTransaction => "StartTransaction",
            Self::StopTransaction => "StopTransaction",
            Self::MeterValues => "MeterValues",
        }
    }
}

impl fmt::Display for CallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn to_payload<T: Serialize>(request: &T) -> Value {
    serde_json::to_value(request).unwrap_or_else(|e| {
        warn!(
            request = std::any::type_name::<T>(),
            error = %e,
            "Failed to serialize OCPP request, sending null payload"
        );
        Value::Null
    })
}

pub fn boot_notification(charger_id: &str, identity: &IdentityConfig) -> Value {
    to_payload(&BootNotificationRequest {
        charge_box_serial_number: Some(format!("{}{}", identity.serial_prefix, charger_id)),
        charge_point_model: identity.model.clone(),
        charge_point_serial_number: Some(charger_id.to_string()),
        charge_point_vendor: identity.vendor.clone(),
        firmware_version: Some(identity.firmware_version.clone()),
        iccid: None,
        imsi: None,
        meter_serial_number: None,
        meter_type: None,
    })
}

pub fn heartbeat() -> Value {
    Value::Object(Default::default())
}

pub fn status_notification(status: ChargePointStatus, timestamp: DateTime<Utc>) -> Value {
    to_payload(&StatusNotificationRequest {
        connector_id: CONNECTOR_ID,
        error_code: ChargePointErrorCode::NoError,
        info: None,
        status,
        timestamp: Some(timestamp),
        vendor_id: None,
        vendor_error_code: None,
    })
}

pub fn start_transaction(id_tag: &str, meter_start: i32, timestamp: DateTime<Utc>) -> Value {
    to_payload(&StartTransactionRequest {
        connector_id: CONNECTOR_ID,
        id_tag: id_tag.to_string(),
        meter_start,
        reservation_id: None,
        timestamp,
    })
}

pub fn stop_transaction(
    transaction_id: i32,
    id_tag: &str,
    meter_stop: i32,
    timestamp: DateTime<Utc>,
) -> Value {
    to_payload(&StopTransactionRequest {
        id_tag: Some(id_tag.to_string()),
        meter_stop,
        timestamp,
        transaction_id,
        reason: Some(Reason::Local),
        transaction_data: None,
    })
}

fn sampled(value: f64, measurand: Measurand, unit: UnitOfMeasure) -> SampledValue {
    SampledValue {
        value: format!("{:.2}", value),
        context: Some(ReadingContext::SamplePeriodic),
        format: Some(ValueFormat::Raw),
        measurand: Some(measurand),
        phase: None,
        location: Some(Location::Outlet),
        unit: Some(unit),
    }
}

/// One periodic sample: energy register, current, voltage and power.
/// `transactionId` is omitted while the transaction is still pending.
pub fn meter_values(
    transaction_id: Option<i32>,
    sample: &MeterSample,
    timestamp: DateTime<Utc>,
) -> Value {
    to_payload(&MeterValuesRequest {
        connector_id: CONNECTOR_ID,
        transaction_id,
        meter_value: vec![MeterValue {
            timestamp,
            sampled_value: vec![
                sampled(
                    sample.energy_wh,
                    Measurand::EnergyActiveImportRegister,
                    UnitOfMeasure::Wh,
                ),
                sampled(sample.current_a, Measurand::CurrentImport, UnitOfMeasure::A),
                sampled(sample.voltage_v, Measurand::Voltage, UnitOfMeasure::V),
                sampled(sample.power_w, Measurand::PowerActiveImport, UnitOfMeasure::W),
            ],
        }],
    })
}
