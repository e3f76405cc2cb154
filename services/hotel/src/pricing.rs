//! Room pricing: availability bands, demand-driven nightly rates and the
//! checkout quote.
//!
//! Everything here is pure arithmetic on [`Decimal`] so the rules can be
//! tested without a database. Repositories and handlers feed in the stored
//! hotel figures and persist what comes out.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::Serialize;

/// Share of the subtotal charged as tax (12 %)
pub const TAX_RATE: Decimal = Decimal::from_parts(12, 0, 0, false, 2);
/// Flat service fee added to every booking
pub const SERVICE_FEE: Decimal = Decimal::from_parts(2500, 0, 0, false, 2);
/// Loyalty points worth one currency unit
pub const POINTS_PER_UNIT: i64 = 100;
/// Bookings within 24 hours above which a hotel counts as popular
pub const POPULAR_THRESHOLD: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Limited,
    AlmostFull,
    Full,
}

impl AvailabilityStatus {
    /// Band a hotel by the share of rooms still free
    pub fn from_rooms(available: i32, total: i32) -> Self {
        if total <= 0 || available <= 0 {
            return AvailabilityStatus::Full;
        }
        let (available, total) = (i64::from(available), i64::from(total));
        if available * 10 < total {
            AvailabilityStatus::AlmostFull
        } else if available * 10 < total * 3 {
            AvailabilityStatus::Limited
        } else {
            AvailabilityStatus::Available
        }
    }

    /// Parse the query-string form used by the hotel list filter
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(AvailabilityStatus::Available),
            "limited" => Some(AvailabilityStatus::Limited),
            "almost_full" => Some(AvailabilityStatus::AlmostFull),
            "full" => Some(AvailabilityStatus::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Limited => "limited",
            AvailabilityStatus::AlmostFull => "almost_full",
            AvailabilityStatus::Full => "full",
        }
    }

    /// Shown to guests as a "only a few rooms left" badge
    pub fn is_limited(&self) -> bool {
        matches!(self, AvailabilityStatus::Limited | AvailabilityStatus::AlmostFull)
    }
}

pub fn is_popular(bookings_24h: i32) -> bool {
    bookings_24h > POPULAR_THRESHOLD
}

/// Multiplier applied to the base price for the current demand
pub fn demand_multiplier(total_rooms: i32, available_rooms: i32, bookings_24h: i32) -> Decimal {
    let total = i64::from(total_rooms.max(1));
    let occupied = (total - i64::from(available_rooms.clamp(0, total_rooms.max(1)))).max(0);

    let occupancy = if occupied * 100 > total * 80 {
        Decimal::new(130, 2)
    } else if occupied * 100 > total * 60 {
        Decimal::new(115, 2)
    } else if occupied * 100 < total * 20 {
        Decimal::new(85, 2)
    } else {
        Decimal::ONE
    };

    if is_popular(bookings_24h) {
        occupancy * Decimal::new(11, 1)
    } else {
        occupancy
    }
}

/// Nightly rate derived from the base price and demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicPrice {
    pub price: Decimal,
    pub multiplier: Decimal,
    pub discount_percent: i32,
    pub original_price: Option<Decimal>,
}

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

pub fn dynamic_price(
    base_price: Decimal,
    total_rooms: i32,
    available_rooms: i32,
    bookings_24h: i32,
) -> DynamicPrice {
    let multiplier = demand_multiplier(total_rooms, available_rooms, bookings_24h);
    let price = round_half_up(base_price * multiplier, 0);

    if price < base_price && base_price > Decimal::ZERO {
        let percent = round_half_up((base_price - price) / base_price * Decimal::ONE_HUNDRED, 0);
        DynamicPrice {
            price,
            multiplier,
            discount_percent: percent.to_i32().unwrap_or(0),
            original_price: Some(base_price),
        }
    } else {
        DynamicPrice {
            price,
            multiplier,
            discount_percent: 0,
            original_price: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrend {
    Up,
    Down,
    Stable,
}

impl PriceTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTrend::Up => "up",
            PriceTrend::Down => "down",
            PriceTrend::Stable => "stable",
        }
    }
}

/// Compare a new price against the last one recorded in the past 24 hours.
///
/// Returns the trend and the size of the drop (zero unless the price fell).
pub fn price_movement(previous: Option<Decimal>, current: Decimal) -> (PriceTrend, Decimal) {
    match previous {
        Some(previous) if current < previous => (PriceTrend::Down, previous - current),
        Some(previous) if current > previous => (PriceTrend::Up, Decimal::ZERO),
        _ => (PriceTrend::Stable, Decimal::ZERO),
    }
}

/// Number of nights between two dates, `None` unless check-out is later
pub fn nights(check_in: NaiveDate, check_out: NaiveDate) -> Option<i64> {
    let days = (check_out - check_in).num_days();
    (days >= 1).then_some(days)
}

/// Most points that may be spent on an order totalling `total` before discount
pub fn max_redeemable_points(total: Decimal, available_points: i64) -> i64 {
    let cap = (total.max(Decimal::ZERO) * Decimal::from(POINTS_PER_UNIT)).floor();
    let cap = cap.to_i64().unwrap_or(i64::MAX);
    available_points.max(0).min(cap)
}

pub fn points_value(points: i64) -> Decimal {
    Decimal::from(points) / Decimal::from(POINTS_PER_UNIT)
}

/// Price breakdown of a prospective booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub nights: i64,
    pub rooms: i32,
    pub price_per_night: Decimal,
    pub subtotal: Decimal,
    pub taxes: Decimal,
    pub fees: Decimal,
    pub total_before_points: Decimal,
    pub max_redeemable_points: i64,
    pub points_redeemed: i64,
    pub points_discount: Decimal,
    pub total: Decimal,
}

/// Price `rooms` rooms for `nights` nights, spending up to `requested_points`.
///
/// The points actually spent are capped so their value never exceeds the
/// order total.
pub fn quote(
    price_per_night: Decimal,
    nights: i64,
    rooms: i32,
    requested_points: i64,
    available_points: i64,
) -> Quote {
    let subtotal = price_per_night * Decimal::from(nights) * Decimal::from(rooms);
    let taxes = round_half_up(subtotal * TAX_RATE, 2);
    let total_before_points = subtotal + taxes + SERVICE_FEE;

    let max_points = max_redeemable_points(total_before_points, available_points);
    let points_redeemed = requested_points.clamp(0, max_points);
    let points_discount = points_value(points_redeemed);

    Quote {
        nights,
        rooms,
        price_per_night,
        subtotal,
        taxes,
        fees: SERVICE_FEE,
        total_before_points,
        max_redeemable_points: max_points,
        points_redeemed,
        points_discount,
        total: (total_before_points - points_discount).max(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_availability_bands() {
        assert_eq!(AvailabilityStatus::from_rooms(0, 100), AvailabilityStatus::Full);
        assert_eq!(AvailabilityStatus::from_rooms(9, 100), AvailabilityStatus::AlmostFull);
        assert_eq!(AvailabilityStatus::from_rooms(10, 100), AvailabilityStatus::Limited);
        assert_eq!(AvailabilityStatus::from_rooms(29, 100), AvailabilityStatus::Limited);
        assert_eq!(AvailabilityStatus::from_rooms(30, 100), AvailabilityStatus::Available);
        assert!(AvailabilityStatus::AlmostFull.is_limited());
        assert!(!AvailabilityStatus::Full.is_limited());
    }

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in [
            AvailabilityStatus::Available,
            AvailabilityStatus::Limited,
            AvailabilityStatus::AlmostFull,
            AvailabilityStatus::Full,
        ] {
            assert_eq!(AvailabilityStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AvailabilityStatus::parse("sold_out"), None);
    }

    #[test]
    fn test_popularity_threshold() {
        assert!(!is_popular(5));
        assert!(is_popular(6));
    }

    #[test]
    fn test_demand_multiplier_bands() {
        // 90 % occupied
        assert_eq!(demand_multiplier(100, 10, 0), d("1.30"));
        // 70 % occupied
        assert_eq!(demand_multiplier(100, 30, 0), d("1.15"));
        // 50 % occupied
        assert_eq!(demand_multiplier(100, 50, 0), Decimal::ONE);
        // 10 % occupied
        assert_eq!(demand_multiplier(100, 90, 0), d("0.85"));
        // exactly 80 % is not above 80 %
        assert_eq!(demand_multiplier(100, 20, 0), d("1.15"));
    }

    #[test]
    fn test_popular_hotels_cost_more() {
        assert_eq!(demand_multiplier(100, 10, 6), d("1.430"));
        assert_eq!(demand_multiplier(100, 50, 6), d("1.1"));
    }

    #[test]
    fn test_low_demand_sets_discount() {
        let price = dynamic_price(d("200"), 100, 95, 0);
        assert_eq!(price.price, d("170"));
        assert_eq!(price.discount_percent, 15);
        assert_eq!(price.original_price, Some(d("200")));
    }

    #[test]
    fn test_high_demand_rounds_to_whole_units() {
        let price = dynamic_price(d("99"), 10, 1, 0);
        // 99 * 1.3 = 128.7
        assert_eq!(price.price, d("129"));
        assert_eq!(price.discount_percent, 0);
        assert_eq!(price.original_price, None);
    }

    #[test]
    fn test_price_movement() {
        assert_eq!(price_movement(None, d("100")), (PriceTrend::Stable, Decimal::ZERO));
        assert_eq!(price_movement(Some(d("120")), d("100")), (PriceTrend::Down, d("20")));
        assert_eq!(price_movement(Some(d("100")), d("115")), (PriceTrend::Up, Decimal::ZERO));
        assert_eq!(price_movement(Some(d("100")), d("100")), (PriceTrend::Stable, Decimal::ZERO));
    }

    #[test]
    fn test_nights_requires_later_checkout() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
        assert_eq!(nights(day(1), day(4)), Some(3));
        assert_eq!(nights(day(4), day(4)), None);
        assert_eq!(nights(day(5), day(4)), None);
    }

    #[test]
    fn test_quote_breakdown() {
        let quote = quote(d("150"), 3, 2, 0, 0);
        assert_eq!(quote.subtotal, d("900"));
        assert_eq!(quote.taxes, d("108.00"));
        assert_eq!(quote.fees, d("25.00"));
        assert_eq!(quote.total, d("1033.00"));
        assert_eq!(quote.points_discount, Decimal::ZERO);
    }

    #[test]
    fn test_points_reduce_total() {
        let quote = quote(d("100"), 1, 1, 5_000, 10_000);
        // 100 + 12 + 25 = 137, minus 50
        assert_eq!(quote.points_redeemed, 5_000);
        assert_eq!(quote.points_discount, d("50"));
        assert_eq!(quote.total, d("87.00"));
    }

    #[test]
    fn test_points_never_exceed_order_total() {
        let quote = quote(d("100"), 1, 1, 1_000_000, 1_000_000);
        assert_eq!(quote.max_redeemable_points, 13_700);
        assert_eq!(quote.points_redeemed, 13_700);
        assert_eq!(quote.total, Decimal::ZERO);
    }

    #[test]
    fn test_points_capped_by_balance() {
        assert_eq!(max_redeemable_points(d("137.00"), 2_500), 2_500);
        assert_eq!(max_redeemable_points(d("10.559"), 50_000), 1_055);
        assert_eq!(max_redeemable_points(d("10"), -5), 0);

        let quote = quote(d("100"), 1, 1, 9_000, 2_500);
        assert_eq!(quote.points_redeemed, 2_500);
    }

    #[test]
    fn test_negative_request_spends_nothing() {
        let quote = quote(d("100"), 1, 1, -10, 2_500);
        assert_eq!(quote.points_redeemed, 0);
        assert_eq!(quote.total, d("137.00"));
    }
}
