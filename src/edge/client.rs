use reqwest::multipart;

use crate::core::error::AppError;

/// Thin proxy to the canonical Inference Gateway. Holds a connection-pooled
/// `reqwest::Client` so no request holds a lock across the network call
/// (§5).
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub async fn verify(
        &self,
        id_document: Vec<u8>,
        selfie_image: Vec<u8>,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), AppError> {
        let form = multipart::Form::new()
            .part("id_document", multipart::Part::bytes(id_document).file_name("id_document"))
            .part("selfie_image", multipart::Part::bytes(selfie_image).file_name("selfie_image"));

        let response = self
            .http
            .post(format!("{}/api/v1/kyc/verify", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::BackendFailure(format!("inference gateway unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AppError::BackendFailure(format!("invalid inference gateway response: {e}")))?;

        Ok((status, body))
    }
}
