//! This file defines the summary report over a user's transactions and its
//! API route.
//!
//! The summary totals expenses and income, breaks expenses down per category
//! and counts transactions of each kind. It can be computed over all of a
//! user's transactions or restricted to a single month.

use std::collections::HashMap;

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    extract::AppQuery,
    transaction::{Transaction, TransactionFilter, TransactionState, TransactionType,
        query_transactions},
    user::UserID,
};

/// Aggregated totals over a set of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// The sum of all expense amounts.
    pub total_expenses: f64,

    /// The sum of all income amounts.
    pub total_income: f64,

    /// Income minus expenses. Negative when more was spent than earned.
    pub balance: f64,

    /// Per-category sums of expense amounts. Income is not included.
    pub category_stats: HashMap<String, f64>,

    /// The number of expense transactions.
    pub expense_count: usize,

    /// The number of income transactions.
    pub income_count: usize,
}

/// Compute the summary of a set of transactions.
///
/// An empty slice produces a summary of all zeroes with no category stats.
pub fn compute_summary(transactions: &[Transaction]) -> Summary {
    let mut summary = Summary {
        total_expenses: 0.0,
        total_income: 0.0,
        balance: 0.0,
        category_stats: HashMap::new(),
        expense_count: 0,
        income_count: 0,
    };

    for transaction in transactions {
        match transaction.transaction_type {
            TransactionType::Expense => {
                summary.total_expenses += transaction.amount;
                summary.expense_count += 1;
                *summary
                    .category_stats
                    .entry(transaction.category.clone())
                    .or_insert(0.0) += transaction.amount;
            }
            TransactionType::Income => {
                summary.total_income += transaction.amount;
                summary.income_count += 1;
            }
        }
    }

    summary.balance = summary.total_income - summary.total_expenses;

    summary
}

/// The query parameters accepted by the summary endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    /// Restrict to this month (1-12). Only applied together with `year`.
    pub month: Option<u8>,
    /// Restrict to this year. Only applied together with `month`.
    pub year: Option<i32>,
}

/// A route handler for summarising the caller's transactions.
///
/// Uses the same month/year window as the transaction list endpoint, so the
/// summary for a month agrees with the list for that month.
pub async fn get_summary_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    AppQuery(params): AppQuery<SummaryParams>,
) -> Result<Json<Summary>, Error> {
    let filter = TransactionFilter {
        month: params.month,
        year: params.year,
        ..Default::default()
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions = query_transactions(&filter, user_id, &connection)?;

    Ok(Json(compute_summary(&transactions)))
}

#[cfg(test)]
mod compute_summary_tests {
    use time::macros::datetime;

    use crate::{
        transaction::{Transaction, TransactionType},
        user::UserID,
    };

    use super::compute_summary;

    fn test_transaction(
        title: &str,
        amount: f64,
        category: &str,
        transaction_type: TransactionType,
    ) -> Transaction {
        let timestamp = datetime!(2024-03-05 12:00:00 UTC);

        Transaction {
            id: 1,
            user_id: UserID::new(1),
            title: title.to_owned(),
            amount,
            category: category.to_owned(),
            date: timestamp,
            description: String::new(),
            transaction_type,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    #[test]
    fn empty_input_produces_all_zeroes() {
        let summary = compute_summary(&[]);

        assert_eq!(summary.total_expenses, 0.0);
        assert_eq!(summary.total_income, 0.0);
        assert_eq!(summary.balance, 0.0);
        assert!(summary.category_stats.is_empty());
        assert_eq!(summary.expense_count, 0);
        assert_eq!(summary.income_count, 0);
    }

    #[test]
    fn single_expense_and_income() {
        let transactions = vec![
            test_transaction("Lunch", 20.0, "Food", TransactionType::Expense),
            test_transaction("Salary", 1000.0, "Salary", TransactionType::Income),
        ];

        let summary = compute_summary(&transactions);

        assert_eq!(summary.total_expenses, 20.0);
        assert_eq!(summary.total_income, 1000.0);
        assert_eq!(summary.balance, 980.0);
        assert_eq!(summary.category_stats.len(), 1);
        assert_eq!(summary.category_stats.get("Food"), Some(&20.0));
        assert_eq!(summary.expense_count, 1);
        assert_eq!(summary.income_count, 1);
    }

    #[test]
    fn expenses_in_same_category_are_summed() {
        let transactions = vec![
            test_transaction("Lunch", 20.0, "Food", TransactionType::Expense),
            test_transaction("Dinner", 35.0, "Food", TransactionType::Expense),
            test_transaction("Bus", 3.5, "Transport", TransactionType::Expense),
        ];

        let summary = compute_summary(&transactions);

        assert_eq!(summary.category_stats.get("Food"), Some(&55.0));
        assert_eq!(summary.category_stats.get("Transport"), Some(&3.5));
        assert_eq!(summary.total_expenses, 58.5);
    }

    #[test]
    fn income_is_not_included_in_category_stats() {
        let transactions = vec![test_transaction(
            "Salary",
            1000.0,
            "Salary",
            TransactionType::Income,
        )];

        let summary = compute_summary(&transactions);

        assert!(summary.category_stats.is_empty());
    }

    #[test]
    fn category_stats_sum_to_total_expenses() {
        let transactions = vec![
            test_transaction("Lunch", 12.5, "Food", TransactionType::Expense),
            test_transaction("Groceries", 80.25, "Food", TransactionType::Expense),
            test_transaction("Bus", 3.5, "Transport", TransactionType::Expense),
            test_transaction("Salary", 1000.0, "Salary", TransactionType::Income),
        ];

        let summary = compute_summary(&transactions);

        let category_total: f64 = summary.category_stats.values().sum();
        assert_eq!(category_total, summary.total_expenses);
    }

    #[test]
    fn balance_can_be_negative() {
        let transactions = vec![
            test_transaction("Rent", 1500.0, "Housing", TransactionType::Expense),
            test_transaction("Salary", 1000.0, "Salary", TransactionType::Income),
        ];

        let summary = compute_summary(&transactions);

        assert_eq!(summary.balance, -500.0);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let summary = compute_summary(&[test_transaction(
            "Lunch",
            20.0,
            "Food",
            TransactionType::Expense,
        )]);

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["totalExpenses"], 20.0);
        assert_eq!(json["totalIncome"], 0.0);
        assert_eq!(json["balance"], -20.0);
        assert_eq!(json["categoryStats"]["Food"], 20.0);
        assert_eq!(json["expenseCount"], 1);
        assert_eq!(json["incomeCount"], 0);
    }
}
