//! Student reference used by loans

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Borrower. Students are owned elsewhere; loans only keep this reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Student {
    #[validate(
        length(min = 1, max = 64, message = "Student id must be 1 to 64 characters"),
        custom(function = "crate::models::not_blank", message = "Student id must not be blank")
    )]
    pub student_id: String,
    pub name: String,
}

impl Student {
    pub fn new(student_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
        }
    }
}
