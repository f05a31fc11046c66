// In crates/web-server/src/payload.rs

//! Validation of the loosely-typed bodies posted by producers.
//!
//! Producers send either `application/json` or `text/plain` containing JSON,
//! and numbers may arrive as JSON numbers or numeric strings.

use crate::{Error, Result};
use core_types::{Side, TradeSignal};
use events::{Notification, NotificationKind};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Builds a [`TradeSignal`] from an ingress body.
///
/// # Arguments
///
/// * `body`: The raw request body.
/// * `query_client_id`: The `clientId` query parameter, used when the body
///   does not carry one.
/// * `now_ms`: Timestamp applied when the body has no usable `ts`.
pub fn normalize_signal(
    body: &str,
    query_client_id: Option<&str>,
    now_ms: i64,
) -> Result<TradeSignal> {
    let data = parse_object(body, "Invalid or non-JSON payload")?;

    let side = text_field(&data, "side")
        .and_then(|s| Side::from_str(&s).ok())
        .ok_or_else(|| Error::Validation("Field 'side' must be 'long' or 'short'".into()))?;

    let atr = non_null(&data, "atr")
        .or_else(|| non_null(&data, "atrBin"))
        .and_then(to_decimal)
        .ok_or_else(|| Error::Validation("Missing numeric 'atr' or 'atrBin'".into()))?;

    let price = data.get("price").and_then(to_decimal);
    let ts = timestamp(&data, now_ms);
    let client_id = text_field(&data, "clientId")
        .or_else(|| query_client_id.map(str::to_string))
        .unwrap_or_default();

    TradeSignal::new(side, price, atr, ts, client_id).map_err(|e| Error::Validation(e.to_string()))
}

/// Builds a validated [`Notification`] from a `/notify` body.
pub fn normalize_notification(body: &str, now_ms: i64) -> Result<Notification> {
    let data = parse_object(body, "Invalid payload")?;

    let kind = text_field(&data, "type")
        .unwrap_or_default()
        .parse::<NotificationKind>()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let side = match text_field(&data, "side").filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<Side>().map_err(|_| {
            Error::Validation(format!(
                "For '{kind}' the field 'side' must be 'long' or 'short'"
            ))
        })?),
        None => None,
    };

    let mut notification = Notification::new(kind, timestamp(&data, now_ms));
    notification.side = side;
    notification.symbol = text_field(&data, "symbol").filter(|s| !s.is_empty());
    notification.entry_price = non_null(&data, "entryPrice")
        .or_else(|| data.get("price"))
        .and_then(to_decimal);
    notification.take_profit = data.get("tp").and_then(to_decimal);
    notification.stop_loss = data.get("sl").and_then(to_decimal);
    notification.exit_price = data.get("exitPrice").and_then(to_decimal);
    notification.quantity = data.get("qty").and_then(to_decimal);
    notification.leverage = data.get("leverage").and_then(to_decimal);
    notification.note = text_field(&data, "note").filter(|s| !s.is_empty());
    notification.atr = data.get("atr").and_then(to_decimal);
    notification.client_id = text_field(&data, "clientId").filter(|s| !s.is_empty());

    notification
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;
    Ok(notification)
}

fn parse_object(body: &str, message: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(Error::Validation(message.to_string())),
    }
}

fn non_null<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    data.get(key).filter(|v| !v.is_null())
}

// Strings are taken trimmed, numbers and booleans in their JSON form.
fn text_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

// Missing, zero or non-numeric timestamps fall back to `now_ms`.
fn timestamp(data: &Map<String, Value>, now_ms: i64) -> i64 {
    let ts = match data.get("ts") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    ts.filter(|ts| *ts != 0).unwrap_or(now_ms)
}
