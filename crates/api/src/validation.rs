use validator::Validate;

use crate::error::ApiError;

/// Runs derive-based validation and flattens the per-field failures into
/// the single `detail` string the error envelope carries.
pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value.validate().map_err(|errors| {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, failures)| {
                let codes: Vec<&str> = failures
                    .iter()
                    .map(|failure| failure.code.as_ref())
                    .collect();
                format!("{field}: {}", codes.join(", "))
            })
            .collect();
        fields.sort();
        ApiError::Validation(fields.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct ReviewLink {
        #[validate(length(min = 1, max = 128))]
        review_id: String,
    }

    #[test]
    fn names_the_failing_field_in_the_detail() {
        let err = validate(&ReviewLink {
            review_id: String::new(),
        })
        .expect_err("empty review id");
        match err {
            ApiError::Validation(detail) => {
                assert!(detail.contains("review_id"), "detail was: {detail}");
                assert!(detail.contains("length"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_valid_input() {
        let link = ReviewLink {
            review_id: "review-42".into(),
        };
        assert!(validate(&link).is_ok());
    }
}
