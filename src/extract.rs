use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// ValidatedJson
///
/// JSON body extractor that runs the payload's `validator` rules before the
/// handler sees it. Malformed JSON and constraint violations both become
/// `AppError::Validation`, i.e. a 400 with a `{field: message}` body.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation("body", &e.body_text()))?;

        data.validate()?;
        Ok(ValidatedJson(data))
    }
}
