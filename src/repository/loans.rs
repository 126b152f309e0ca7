//! Loans repository

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::collection::Collection;
use crate::{
    error::AppResult,
    models::Loan,
    store::{Filter, Update},
};

#[derive(Clone)]
pub struct LoansRepository {
    collection: Collection,
}

impl LoansRepository {
    pub fn new(collection: Collection) -> Self {
        Self { collection }
    }

    /// Create a new loan
    pub async fn create(&self, loan: &Loan) -> AppResult<()> {
        self.collection.insert(&loan.loan_id, loan).await
    }

    /// Open loan on a copy, if any
    pub async fn find_open_for_book(&self, book_id: &str) -> AppResult<Option<Loan>> {
        self.collection
            .find_one(&Filter::by("book_id", book_id).eq("returned_at", Value::Null))
            .await
    }

    /// Mark a loan returned. `None` if it was already closed.
    pub async fn close(&self, loan_id: &str, returned_at: DateTime<Utc>) -> AppResult<Option<Loan>> {
        self.collection
            .find_one_and_update(
                &Filter::by("loan_id", loan_id).eq("returned_at", Value::Null),
                &Update::new().set("returned_at", serde_json::to_value(returned_at)?),
            )
            .await
    }

    /// Undo `close`
    pub async fn reopen(&self, loan_id: &str) -> AppResult<bool> {
        let matched = self
            .collection
            .update_one(&Filter::by("loan_id", loan_id), &Update::new().set("returned_at", Value::Null))
            .await?;
        Ok(matched == 1)
    }

    /// Push the due date, provided nobody renewed or closed the loan since
    /// it was read with `seen_renews` renewals.
    pub async fn renew(
        &self,
        loan_id: &str,
        seen_renews: i16,
        due_date: DateTime<Utc>,
    ) -> AppResult<Option<Loan>> {
        self.collection
            .find_one_and_update(
                &Filter::by("loan_id", loan_id)
                    .eq("returned_at", Value::Null)
                    .eq("nb_renews", seen_renews),
                &Update::new()
                    .set("due_date", serde_json::to_value(due_date)?)
                    .inc("nb_renews", 1),
            )
            .await
    }

    /// Open loans of a student
    pub async fn open_for_student(&self, student_id: &str) -> AppResult<Vec<Loan>> {
        self.collection
            .find_many(&Filter::by("student_id", student_id).eq("returned_at", Value::Null))
            .await
    }

    pub async fn count_open_for_student(&self, student_id: &str) -> AppResult<u64> {
        self.collection
            .count(&Filter::by("student_id", student_id).eq("returned_at", Value::Null))
            .await
    }

    /// All open loans
    pub async fn list_active(&self) -> AppResult<Vec<Loan>> {
        self.collection
            .find_many(&Filter::by("returned_at", Value::Null))
            .await
    }

    pub async fn count_active(&self) -> AppResult<u64> {
        self.collection.count(&Filter::by("returned_at", Value::Null)).await
    }
}
