//! Domain records stored by DriverLedger.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::storage::{Collection, Record};

/// Normalized form of a driver id used for loose comparisons.
#[must_use]
pub fn normalize_driver_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Whether two driver ids refer to the same driver, ignoring case and
/// surrounding whitespace.
#[must_use]
pub fn same_driver(a: &str, b: &str) -> bool {
    normalize_driver_id(a) == normalize_driver_id(b)
}

/// Lenient date handling.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, and naive ISO timestamps.
/// Always serializes as `YYYY-MM-DD`.
pub mod flexible_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Parse a date from any accepted representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.date_naive());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.date())
    }

    /// Serialize as an ISO date.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format("%Y-%m-%d"))
    }

    /// Deserialize from any accepted representation.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a recognizable date.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
    }
}

/// A driver profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Record id.
    pub id: String,
    /// Owning user.
    #[serde(default)]
    pub user_id: String,
    /// Display name, unique across drivers.
    pub name: String,
    /// Hashed driver password. Never sent to clients.
    pub password_hash: String,
}

impl Driver {
    /// Client-facing view without the password hash.
    #[must_use]
    pub fn view(&self) -> DriverView {
        DriverView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
        }
    }
}

impl Record for Driver {
    const COLLECTION: Collection = Collection::Drivers;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Driver as returned over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverView {
    /// Record id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Display name.
    pub name: String,
}

/// Request body for creating or replacing a driver.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverInput {
    /// Display name.
    pub name: String,
    /// Plaintext password, hashed before storage.
    pub password: String,
}

/// A logged trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Record id.
    pub id: String,
    /// Owning user.
    #[serde(default)]
    pub user_id: String,
    /// Driver who made the trip.
    pub driver_id: String,
    /// Ride-hailing platform.
    pub platform: String,
    /// Trip date.
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    /// Distance in kilometers.
    pub distance: f64,
    /// Gross earnings.
    pub earnings: f64,
    /// Start location.
    pub origin: String,
    /// End location.
    pub destination: String,
}

impl Trip {
    /// Build a trip owned by `user_id`.
    #[must_use]
    pub fn new(id: String, user_id: String, input: TripInput) -> Self {
        Self {
            id,
            user_id,
            driver_id: input.driver_id.trim().to_string(),
            platform: input.platform,
            date: input.date,
            distance: input.distance,
            earnings: input.earnings,
            origin: input.origin,
            destination: input.destination,
        }
    }
}

impl Record for Trip {
    const COLLECTION: Collection = Collection::Trips;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for creating or replacing a trip.
#[derive(Debug, Clone, Deserialize)]
pub struct TripInput {
    /// Driver who made the trip.
    pub driver_id: String,
    /// Ride-hailing platform.
    pub platform: String,
    /// Trip date.
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    /// Distance in kilometers.
    pub distance: f64,
    /// Gross earnings.
    pub earnings: f64,
    /// Start location.
    pub origin: String,
    /// End location.
    pub destination: String,
}

/// Expense category. Wire values are the Portuguese labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    /// Fuel.
    #[serde(rename = "Combustível", alias = "Combustivel", alias = "fuel")]
    Fuel,
    /// Maintenance.
    #[serde(rename = "Manutenção", alias = "Manutencao", alias = "maintenance")]
    Maintenance,
    /// Taxes.
    #[serde(rename = "Impostos", alias = "taxes")]
    Taxes,
    /// Insurance.
    #[serde(rename = "Seguro", alias = "insurance")]
    Insurance,
    /// Anything else.
    #[serde(rename = "Outros", alias = "other")]
    Other,
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fuel => "Combustível",
            Self::Maintenance => "Manutenção",
            Self::Taxes => "Impostos",
            Self::Insurance => "Seguro",
            Self::Other => "Outros",
        };
        f.write_str(label)
    }
}

/// Fuel type for fuel expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    /// Gasoline.
    #[serde(rename = "Gasolina")]
    Gasoline,
    /// Ethanol.
    #[serde(rename = "Etanol")]
    Ethanol,
    /// Diesel.
    #[serde(rename = "Diesel")]
    Diesel,
    /// Compressed natural gas.
    #[serde(rename = "GNV")]
    Cng,
    /// Flex-fuel mix.
    #[serde(rename = "Flex")]
    Flex,
}

/// A logged expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Record id.
    pub id: String,
    /// Owning user.
    #[serde(default)]
    pub user_id: String,
    /// Driver the expense belongs to.
    pub driver_id: String,
    /// Related trip, if any.
    #[serde(default)]
    pub trip_id: Option<String>,
    /// Category.
    pub category: ExpenseCategory,
    /// Amount spent.
    pub amount: f64,
    /// Expense date.
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    /// Free-form description.
    pub description: String,
    /// Odometer reading (fuel only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometer: Option<f64>,
    /// Fuel type (fuel only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<FuelType>,
    /// Liters filled (fuel only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liters: Option<f64>,
    /// Price per liter (fuel only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_liter: Option<f64>,
}

impl Expense {
    /// Build an expense owned by `user_id`. Fuel details are discarded for
    /// non-fuel categories.
    #[must_use]
    pub fn new(id: String, user_id: String, input: ExpenseInput) -> Self {
        let fuel = input.category == ExpenseCategory::Fuel;
        Self {
            id,
            user_id,
            driver_id: input.driver_id.trim().to_string(),
            trip_id: input.trip_id.filter(|t| !t.trim().is_empty()),
            category: input.category,
            amount: input.amount,
            date: input.date,
            description: input.description,
            odometer: input.odometer.filter(|_| fuel),
            fuel_type: input.fuel_type.filter(|_| fuel),
            liters: input.liters.filter(|_| fuel),
            price_per_liter: input.price_per_liter.filter(|_| fuel),
        }
    }

    /// Whether this is a fuel expense.
    #[must_use]
    pub fn is_fuel(&self) -> bool {
        self.category == ExpenseCategory::Fuel
    }

    /// Whether every fuel detail is filled in. Always true for non-fuel.
    #[must_use]
    pub const fn fuel_details_complete(&self) -> bool {
        !matches!(self.category, ExpenseCategory::Fuel)
            || (self.odometer.is_some()
                && self.fuel_type.is_some()
                && self.liters.is_some()
                && self.price_per_liter.is_some())
    }
}

impl Record for Expense {
    const COLLECTION: Collection = Collection::Expenses;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for creating or replacing an expense.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    /// Driver the expense belongs to.
    pub driver_id: String,
    /// Related trip, if any.
    #[serde(default)]
    pub trip_id: Option<String>,
    /// Category.
    pub category: ExpenseCategory,
    /// Amount spent.
    pub amount: f64,
    /// Expense date.
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Odometer reading.
    #[serde(default)]
    pub odometer: Option<f64>,
    /// Fuel type.
    #[serde(default)]
    pub fuel_type: Option<FuelType>,
    /// Liters filled.
    #[serde(default)]
    pub liters: Option<f64>,
    /// Price per liter.
    #[serde(default)]
    pub price_per_liter: Option<f64>,
}

/// A savings goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Record id.
    pub id: String,
    /// Owning user.
    #[serde(default)]
    pub user_id: String,
    /// Driver the goal tracks.
    pub driver_id: String,
    /// Goal name.
    pub name: String,
    /// Amount to reach.
    pub target_amount: f64,
    /// Net profit accumulated so far.
    #[serde(default)]
    pub current_amount: f64,
    /// Target date.
    #[serde(with = "flexible_date")]
    pub deadline: NaiveDate,
}

impl Goal {
    /// Build a goal owned by `user_id` with no progress.
    #[must_use]
    pub fn new(id: String, user_id: String, input: GoalInput) -> Self {
        Self {
            id,
            user_id,
            driver_id: input.driver_id.trim().to_string(),
            name: input.name,
            target_amount: input.target_amount,
            current_amount: 0.0,
            deadline: input.deadline,
        }
    }

    /// Replace the editable fields, keeping id, owner and progress.
    pub fn apply(&mut self, input: GoalInput) {
        self.driver_id = input.driver_id.trim().to_string();
        self.name = input.name;
        self.target_amount = input.target_amount;
        self.deadline = input.deadline;
    }

    /// Percentage of the target reached by `net`, capped at 100.
    #[must_use]
    pub fn progress_for(&self, net: f64) -> f64 {
        if self.target_amount > 0.0 {
            (net / self.target_amount * 100.0).min(100.0)
        } else {
            0.0
        }
    }
}

impl Record for Goal {
    const COLLECTION: Collection = Collection::Goals;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for creating or replacing a goal.
#[derive(Debug, Clone, Deserialize)]
pub struct GoalInput {
    /// Driver the goal tracks.
    pub driver_id: String,
    /// Goal name.
    pub name: String,
    /// Amount to reach.
    pub target_amount: f64,
    /// Target date.
    #[serde(with = "flexible_date")]
    pub deadline: NaiveDate,
}

/// Progress of one goal inside a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    /// Goal name.
    pub name: String,
    /// Percentage reached, capped at 100.
    pub progress: f64,
}

/// A generated financial report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Record id.
    pub id: String,
    /// User who requested it.
    #[serde(default)]
    pub user_id: String,
    /// Driver covered.
    pub driver_id: String,
    /// First day of the period.
    #[serde(with = "flexible_date")]
    pub period_start: NaiveDate,
    /// Last day of the period, inclusive.
    #[serde(with = "flexible_date")]
    pub period_end: NaiveDate,
    /// Sum of trip earnings.
    pub total_earnings: f64,
    /// Sum of expenses.
    pub total_expenses: f64,
    /// Earnings minus expenses.
    #[serde(default)]
    pub net_profit: f64,
    /// Progress per goal id.
    #[serde(default)]
    pub goals_progress: BTreeMap<String, GoalProgress>,
}

impl Record for Report {
    const COLLECTION: Collection = Collection::Reports;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for report generation and period checks.
///
/// Fields are optional so that missing values surface as a client error
/// rather than a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    /// Driver to report on.
    #[serde(default)]
    pub driver_id: Option<String>,
    /// First day, as a date or timestamp string.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Last day, as a date or timestamp string.
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Period bounds echoed back by a data check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    /// First day.
    #[serde(with = "flexible_date")]
    pub start: NaiveDate,
    /// Last day.
    #[serde(with = "flexible_date")]
    pub end: NaiveDate,
}

/// Whether a driver has any data in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodData {
    /// True when any trip or expense falls in the period.
    pub has_data: bool,
    /// Trips in the period.
    pub trips_count: usize,
    /// Expenses in the period.
    pub expenses_count: usize,
    /// Driver checked.
    pub driver_id: String,
    /// Period checked.
    pub period: PeriodBounds,
}
