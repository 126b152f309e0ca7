//! Loan management service
//!
//! A loan records which student holds which copy. The copy's
//! `book_status` and the open loan change together; if the second write
//! fails the first one is undone.

use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{Loan, Student},
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    /// Lend a copy to a student
    pub async fn borrow(&self, book_id: &str, student: &Student) -> AppResult<Loan> {
        student.validate()?;

        let open = self
            .repository
            .loans
            .count_open_for_student(&student.student_id)
            .await?;
        if open >= self.config.max_loans {
            return Err(AppError::LimitReached(format!(
                "Maximum loans reached ({}/{})",
                open, self.config.max_loans
            )));
        }

        if !self.repository.books.switch_status(book_id, true, false).await? {
            return Err(match self.repository.books.find_by_id(book_id).await? {
                None => AppError::NotFound(format!("Book with id {} not found", book_id)),
                Some(_) => AppError::AlreadyBorrowed(format!("Book {} is already borrowed", book_id)),
            });
        }

        let now = Utc::now();
        let loan = Loan {
            loan_id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            student_id: student.student_id.clone(),
            student_name: student.name.clone(),
            borrowed_at: now,
            due_date: now + Duration::days(self.config.duration_days),
            returned_at: None,
            nb_renews: 0,
        };

        if let Err(e) = self.repository.loans.create(&loan).await {
            match self.repository.books.switch_status(book_id, false, true).await {
                Ok(_) => tracing::warn!("Loan of {} not recorded, book put back on the shelf", book_id),
                Err(undo) => tracing::error!(
                    "Loan of {} not recorded and book left marked borrowed: {}",
                    book_id, undo
                ),
            }
            return Err(e);
        }

        tracing::info!(
            "Book {} borrowed by student {} until {}",
            book_id, student.student_id, loan.due_date
        );
        Ok(loan)
    }

    /// Take a copy back from the student holding it
    pub async fn return_book(&self, book_id: &str, student: &Student) -> AppResult<Loan> {
        student.validate()?;

        let loan = self.open_loan_of(book_id, student).await?;

        let closed = self
            .repository
            .loans
            .close(&loan.loan_id, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::BusinessRule(format!("Loan {} was already returned", loan.loan_id))
            })?;

        match self.repository.books.switch_status(book_id, false, true).await {
            Ok(true) => {}
            Ok(false) => {
                let message = format!(
                    "Loan {} closed but book {} was not marked borrowed",
                    loan.loan_id, book_id
                );
                tracing::warn!("{}", message);
                return Err(AppError::ConsistencyViolation(message));
            }
            Err(e) => {
                match self.repository.loans.reopen(&loan.loan_id).await {
                    Ok(_) => tracing::warn!("Return of {} failed, loan {} reopened", book_id, loan.loan_id),
                    Err(undo) => tracing::error!(
                        "Return of {} failed and loan {} left closed: {}",
                        book_id, loan.loan_id, undo
                    ),
                }
                return Err(e);
            }
        }

        tracing::info!("Book {} returned by student {}", book_id, student.student_id);
        Ok(closed)
    }

    /// Extend a loan by another loan period from today
    pub async fn renew_loan(&self, book_id: &str, student: &Student) -> AppResult<Loan> {
        student.validate()?;

        let loan = self.open_loan_of(book_id, student).await?;
        if loan.nb_renews >= self.config.max_renewals {
            return Err(AppError::LimitReached(format!(
                "Maximum renewals reached ({}/{})",
                loan.nb_renews, self.config.max_renewals
            )));
        }

        let due_date = Utc::now() + Duration::days(self.config.duration_days);
        let renewed = self
            .repository
            .loans
            .renew(&loan.loan_id, loan.nb_renews, due_date)
            .await?
            .ok_or_else(|| {
                AppError::BusinessRule(format!("Loan {} changed while renewing", loan.loan_id))
            })?;

        tracing::info!("Loan {} renewed until {}", renewed.loan_id, renewed.due_date);
        Ok(renewed)
    }

    /// Open loans of a student
    pub async fn student_loans(&self, student_id: &str) -> AppResult<Vec<Loan>> {
        self.repository.loans.open_for_student(student_id).await
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<u64> {
        self.repository.loans.count_active().await
    }

    /// Open loans past their due date
    pub async fn overdue_loans(&self) -> AppResult<Vec<Loan>> {
        let now = Utc::now();
        Ok(self
            .repository
            .loans
            .list_active()
            .await?
            .into_iter()
            .filter(|loan| loan.is_overdue(now))
            .collect())
    }

    /// Count overdue loans
    pub async fn count_overdue(&self) -> AppResult<u64> {
        Ok(self.overdue_loans().await?.len() as u64)
    }

    async fn open_loan_of(&self, book_id: &str, student: &Student) -> AppResult<Loan> {
        let Some(loan) = self.repository.loans.find_open_for_book(book_id).await? else {
            return Err(match self.repository.books.find_by_id(book_id).await? {
                None => AppError::NotFound(format!("Book with id {} not found", book_id)),
                Some(book) if book.book_status => {
                    AppError::BusinessRule(format!("Book {} is not borrowed", book_id))
                }
                Some(_) => {
                    let message = format!("Book {} is marked borrowed but has no open loan", book_id);
                    tracing::warn!("{}", message);
                    AppError::ConsistencyViolation(message)
                }
            });
        };

        if loan.student_id != student.student_id {
            return Err(AppError::BusinessRule(format!(
                "Book {} is borrowed by another student",
                book_id
            )));
        }
        Ok(loan)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use serde_json::json;

    use super::*;
    use crate::store::{MockDocumentStore, StoreError};

    #[tokio::test]
    async fn test_failed_loan_insert_puts_book_back() {
        let mut store = MockDocumentStore::new();
        store.expect_count().times(1).returning(|_, _| Ok(0));
        store
            .expect_update_one()
            .withf(|_, filter, _| filter.clauses()[1].1 == crate::store::Condition::Eq(json!(true)))
            .times(1)
            .returning(|_, _, _| Ok(1));
        store
            .expect_insert_one()
            .times(1)
            .returning(|_, _, _| Err(StoreError::InvalidQuery("disk full".into())));
        store
            .expect_update_one()
            .withf(|_, filter, _| filter.clauses()[1].1 == crate::store::Condition::Eq(json!(false)))
            .times(1)
            .returning(|_, _, _| Ok(1));

        let service = LoansService::new(
            Repository::new(Arc::new(store), "SMLS", StdDuration::from_secs(1)),
            LoansConfig::default(),
        );
        let err = service
            .borrow("b1", &Student::new("s1", "Ada"))
            .await
            .unwrap_err();
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_blank_student_rejected_before_any_store_call() {
        let service = LoansService::new(
            Repository::new(Arc::new(MockDocumentStore::new()), "SMLS", StdDuration::from_secs(1)),
            LoansConfig::default(),
        );
        let err = service.borrow("b1", &Student::new(" ", "Ada")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
