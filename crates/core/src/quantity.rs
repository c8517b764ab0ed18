//! Packaging-unit arithmetic.
//!
//! Items are packed three levels deep: units into boxes (`pack_size` units per
//! box) and boxes into cartons. All conversions are pure; failures are
//! [`DomainError::InvalidQuantity`].

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};
use crate::money::Money;

/// Boxes per carton when the caller does not specify one.
pub const DEFAULT_BOXES_PER_CARTON: i64 = 12;

/// Total loose units for a box/unit pair: `box_qty * pack_size + unit_qty`.
pub fn total_units(box_qty: i64, unit_qty: i64, pack_size: i64) -> DomainResult<i64> {
    if box_qty < 0 {
        return Err(DomainError::invalid_quantity("box quantity cannot be negative"));
    }
    if unit_qty < 0 {
        return Err(DomainError::invalid_quantity("unit quantity cannot be negative"));
    }
    ensure_pack_size(pack_size)?;
    box_qty
        .checked_mul(pack_size)
        .and_then(|boxes| boxes.checked_add(unit_qty))
        .ok_or_else(|| DomainError::invalid_quantity("total units overflow"))
}

/// Split loose units into whole boxes and a unit remainder.
pub fn breakdown(total_units: i64, pack_size: i64) -> DomainResult<(i64, i64)> {
    if total_units < 0 {
        return Err(DomainError::invalid_quantity("total units cannot be negative"));
    }
    ensure_pack_size(pack_size)?;
    Ok((total_units / pack_size, total_units % pack_size))
}

/// Whole cartons needed for `box_qty` boxes, rounding up on any remainder.
///
/// Fractional box quantities are accepted (a part-filled box still occupies
/// carton space) and round up the same way.
pub fn carton_count(box_qty: f64, boxes_per_carton: i64) -> DomainResult<i64> {
    if !box_qty.is_finite() || box_qty < 0.0 {
        return Err(DomainError::invalid_quantity("box quantity cannot be negative"));
    }
    if boxes_per_carton <= 0 {
        return Err(DomainError::invalid_quantity("boxes per carton must be positive"));
    }
    Ok((box_qty / boxes_per_carton as f64).ceil() as i64)
}

/// Convert a per-unit rate to a per-box rate.
pub fn unit_rate_to_box_rate(unit_rate: Money, pack_size: i64) -> DomainResult<Money> {
    ensure_rate(unit_rate)?;
    ensure_pack_size(pack_size)?;
    Ok(unit_rate * pack_size)
}

/// Convert a per-box rate to a per-unit rate.
pub fn box_rate_to_unit_rate(box_rate: Money, pack_size: i64) -> DomainResult<Money> {
    ensure_rate(box_rate)?;
    ensure_pack_size(pack_size)?;
    Ok(box_rate.divide_by(Decimal::from(pack_size)))
}

/// Human-readable carton/box/unit display.
///
/// Each component pluralizes independently and zero-valued components are
/// omitted; the literal `"0"` is returned when all three are zero.
pub fn format_packed(cartons: i64, boxes: i64, units: i64) -> String {
    let mut parts = Vec::with_capacity(3);
    if cartons > 0 {
        parts.push(pluralize(cartons, "Carton"));
    }
    if boxes > 0 {
        parts.push(pluralize(boxes, "Box"));
    }
    if units > 0 {
        parts.push(pluralize(units, "Unit"));
    }
    if parts.is_empty() {
        "0".to_string()
    } else {
        parts.join(" ")
    }
}

fn pluralize(count: i64, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else if noun == "Box" {
        format!("{count} Boxes")
    } else {
        format!("{count} {noun}s")
    }
}

fn ensure_pack_size(pack_size: i64) -> DomainResult<()> {
    if pack_size <= 0 {
        return Err(DomainError::invalid_quantity("pack size must be positive"));
    }
    Ok(())
}

fn ensure_rate(rate: Money) -> DomainResult<()> {
    if rate.is_negative() {
        return Err(DomainError::invalid_quantity("rate cannot be negative"));
    }
    Ok(())
}
