//! Ledger aggregation and driver-id maintenance.
//!
//! Reports, goal progress and the data-repair operations all work over the
//! trip, expense, goal and report collections of one [`DocumentStore`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{DocumentStore, Record, Repository, StorageError, new_id};
use crate::types::{
    Expense, Goal, GoalProgress, PeriodBounds, PeriodData, Report, ReportRequest, Trip,
    flexible_date, normalize_driver_id, same_driver,
};

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The request was incomplete or inconsistent.
    #[error("{0}")]
    InvalidRequest(String),

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// A validated report period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPeriod {
    /// Driver covered.
    pub driver_id: String,
    /// First day.
    pub start: NaiveDate,
    /// Last day, inclusive.
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// Validate a raw report request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when a field is missing or blank, a date does
    /// not parse, or the period ends before it starts.
    pub fn from_request(request: &ReportRequest) -> Result<Self, LedgerError> {
        fn non_blank(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }

        let (Some(driver_id), Some(start), Some(end)) = (
            non_blank(request.driver_id.as_deref()),
            non_blank(request.start_date.as_deref()),
            non_blank(request.end_date.as_deref()),
        ) else {
            return Err(LedgerError::InvalidRequest(
                "incomplete report request: driver_id, start_date and end_date are required"
                    .to_string(),
            ));
        };

        let parse = |raw: &str| {
            flexible_date::parse(raw)
                .ok_or_else(|| LedgerError::InvalidRequest(format!("invalid date format: {raw}")))
        };
        let start = parse(start)?;
        let end = parse(end)?;

        if end < start {
            return Err(LedgerError::InvalidRequest(
                "period end precedes period start".to_string(),
            ));
        }

        Ok(Self {
            driver_id: driver_id.to_string(),
            start,
            end,
        })
    }

    /// Whether `date` falls inside the period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// One variant rewrite performed by expense normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRewrite {
    /// Variant found in storage.
    pub from: String,
    /// Canonical id written.
    pub to: String,
    /// Expenses updated.
    pub updated: usize,
}

/// Outcome of normalizing expense driver ids for one driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseNormalization {
    /// Canonical id.
    pub driver_id: String,
    /// Distinct variants found.
    pub variants: Vec<String>,
    /// Rewrites per variant.
    pub results: Vec<VariantRewrite>,
}

/// Records touched per collection by a driver-id rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteCounts {
    /// Trips updated.
    pub trips: usize,
    /// Expenses updated.
    pub expenses: usize,
    /// Goals updated.
    pub goals: usize,
    /// Reports updated.
    pub reports: usize,
}

impl RewriteCounts {
    /// Total records updated.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.trips + self.expenses + self.goals + self.reports
    }
}

/// A record that belongs to one driver.
trait DriverScoped: Record {
    fn driver_id(&self) -> &str;
    fn set_driver_id(&mut self, id: String);
}

macro_rules! driver_scoped {
    ($($ty:ty),*) => {
        $(impl DriverScoped for $ty {
            fn driver_id(&self) -> &str {
                &self.driver_id
            }

            fn set_driver_id(&mut self, id: String) {
                self.driver_id = id;
            }
        })*
    };
}

driver_scoped!(Trip, Expense, Goal, Report);

async fn rewrite_driver_ids<T: DriverScoped>(
    repo: &Repository<T>,
    rewrite: impl Fn(&str) -> Option<String> + Send + Sync,
) -> Result<usize, LedgerError> {
    let mut updated = 0;
    for mut record in repo.list().await? {
        if let Some(id) = rewrite(record.driver_id()) {
            record.set_driver_id(id);
            repo.insert(&record).await?;
            updated += 1;
        }
    }
    Ok(updated)
}

/// Aggregation over the ledger collections.
#[derive(Clone)]
pub struct Ledger {
    trips: Repository<Trip>,
    expenses: Repository<Expense>,
    goals: Repository<Goal>,
    reports: Repository<Report>,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            trips: Repository::new(Arc::clone(&store)),
            expenses: Repository::new(Arc::clone(&store)),
            goals: Repository::new(Arc::clone(&store)),
            reports: Repository::new(store),
        }
    }

    /// Sum earnings and expenses for a driver over a period, compute goal
    /// progress, and persist the report.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn generate_report(
        &self,
        user_id: &str,
        period: &ReportPeriod,
    ) -> Result<Report, LedgerError> {
        let driver_id = period.driver_id.as_str();

        let total_earnings: f64 = self
            .trips
            .find(|t| t.driver_id == driver_id && period.contains(t.date))
            .await?
            .iter()
            .map(|t| t.earnings)
            .sum();

        let total_expenses: f64 = self
            .expenses
            .find(|e| e.driver_id == driver_id && period.contains(e.date))
            .await?
            .iter()
            .map(|e| e.amount)
            .sum();

        let net_profit = total_earnings - total_expenses;

        let goals_progress = self
            .goals
            .find(|g| g.driver_id == driver_id)
            .await?
            .into_iter()
            .map(|g| {
                let progress = g.progress_for(net_profit);
                (
                    g.id,
                    GoalProgress {
                        name: g.name,
                        progress,
                    },
                )
            })
            .collect();

        let report = Report {
            id: new_id(),
            user_id: user_id.to_string(),
            driver_id: driver_id.to_string(),
            period_start: period.start,
            period_end: period.end,
            total_earnings,
            total_expenses,
            net_profit,
            goals_progress,
        };
        self.reports.insert(&report).await?;

        tracing::info!(
            report = %report.id,
            driver = %driver_id,
            total_earnings,
            total_expenses,
            net_profit,
            "report generated"
        );
        Ok(report)
    }

    /// Count a driver's trips and expenses in a period.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn check_period_data(&self, period: &ReportPeriod) -> Result<PeriodData, LedgerError> {
        let driver_id = period.driver_id.as_str();
        let trips_count = self
            .trips
            .find(|t| t.driver_id == driver_id && period.contains(t.date))
            .await?
            .len();
        let expenses_count = self
            .expenses
            .find(|e| e.driver_id == driver_id && period.contains(e.date))
            .await?
            .len();

        Ok(PeriodData {
            has_data: trips_count > 0 || expenses_count > 0,
            trips_count,
            expenses_count,
            driver_id: driver_id.to_string(),
            period: PeriodBounds {
                start: period.start,
                end: period.end,
            },
        })
    }

    /// Recompute a goal's `current_amount` from the driver's lifetime net
    /// profit. Driver ids are compared ignoring case and whitespace.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the goal does not exist.
    pub async fn refresh_goal_progress(&self, goal_id: &str) -> Result<Goal, LedgerError> {
        let mut goal = self
            .goals
            .get(goal_id)
            .await?
            .ok_or(LedgerError::NotFound("goal"))?;

        let driver_id = goal.driver_id.clone();
        let earnings: f64 = self
            .trips
            .find(|t| same_driver(&t.driver_id, &driver_id))
            .await?
            .iter()
            .map(|t| t.earnings)
            .sum();
        let spent: f64 = self
            .expenses
            .find(|e| same_driver(&e.driver_id, &driver_id))
            .await?
            .iter()
            .map(|e| e.amount)
            .sum();

        goal.current_amount = earnings - spent;
        self.goals.insert(&goal).await?;

        tracing::debug!(goal = %goal.id, current = goal.current_amount, "goal progress refreshed");
        Ok(goal)
    }

    /// Expenses for a driver. Falls back to substring matching on normalized
    /// ids when nothing matches directly.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn expenses_for_driver(&self, driver_id: &str) -> Result<Vec<Expense>, LedgerError> {
        let all = self.expenses.list().await?;

        let direct: Vec<Expense> = all
            .iter()
            .filter(|e| same_driver(&e.driver_id, driver_id))
            .cloned()
            .collect();
        if !direct.is_empty() {
            return Ok(direct);
        }

        let wanted = normalize_driver_id(driver_id);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let loose: Vec<Expense> = all
            .into_iter()
            .filter(|e| {
                let stored = normalize_driver_id(&e.driver_id);
                !stored.is_empty() && (stored.contains(&wanted) || wanted.contains(&stored))
            })
            .collect();
        tracing::debug!(driver = %driver_id, matches = loose.len(), "loose driver id match");
        Ok(loose)
    }

    /// Rewrite every expense whose driver id is a case or whitespace variant
    /// of `driver_id` to `driver_id` itself.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn normalize_expense_driver_ids(
        &self,
        driver_id: &str,
    ) -> Result<ExpenseNormalization, LedgerError> {
        let all = self.expenses.list().await?;

        let mut variants: Vec<String> = Vec::new();
        for expense in &all {
            if expense.driver_id != driver_id
                && same_driver(&expense.driver_id, driver_id)
                && !variants.contains(&expense.driver_id)
            {
                variants.push(expense.driver_id.clone());
            }
        }

        let mut results = Vec::with_capacity(variants.len());
        for variant in &variants {
            let mut updated = 0;
            for expense in all.iter().filter(|e| &e.driver_id == variant) {
                let mut expense = expense.clone();
                expense.driver_id = driver_id.to_string();
                self.expenses.insert(&expense).await?;
                updated += 1;
            }
            results.push(VariantRewrite {
                from: variant.clone(),
                to: driver_id.to_string(),
                updated,
            });
        }

        tracing::info!(driver = %driver_id, variants = variants.len(), "expense driver ids normalized");
        Ok(ExpenseNormalization {
            driver_id: driver_id.to_string(),
            variants,
            results,
        })
    }

    /// Trim surrounding whitespace from every stored driver id.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn normalize_driver_ids(&self) -> Result<RewriteCounts, LedgerError> {
        let trim = |id: &str| {
            let trimmed = id.trim();
            (trimmed != id).then(|| trimmed.to_string())
        };

        let counts = RewriteCounts {
            trips: rewrite_driver_ids(&self.trips, trim).await?,
            expenses: rewrite_driver_ids(&self.expenses, trim).await?,
            goals: rewrite_driver_ids(&self.goals, trim).await?,
            reports: rewrite_driver_ids(&self.reports, trim).await?,
        };
        tracing::info!(updated = counts.total(), "driver ids trimmed");
        Ok(counts)
    }

    /// Reassign every record of driver `source` to driver `target`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if either id is blank.
    pub async fn merge_driver_ids(
        &self,
        source: &str,
        target: &str,
    ) -> Result<RewriteCounts, LedgerError> {
        let source = source.trim();
        let target = target.trim();
        if source.is_empty() || target.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "source_id and target_id are required".to_string(),
            ));
        }

        let merge = |id: &str| (id == source).then(|| target.to_string());

        let counts = RewriteCounts {
            trips: rewrite_driver_ids(&self.trips, merge).await?,
            expenses: rewrite_driver_ids(&self.expenses, merge).await?,
            goals: rewrite_driver_ids(&self.goals, merge).await?,
            reports: rewrite_driver_ids(&self.reports, merge).await?,
        };
        tracing::info!(%source, %target, updated = counts.total(), "driver ids merged");
        Ok(counts)
    }
}
