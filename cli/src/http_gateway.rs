use communitree_core::gateway::{
    delete_path, join_base, list_path, parse_create_body, parse_list_body, parse_remove_body,
    ORNAMENTS_PATH,
};
use communitree_core::{
    CreateReceipt, Fingerprint, GatewayError, Ornament, OrnamentGateway, SaveOrnamentRequest,
};

/// `/api/ornaments` over reqwest, the same calls the browser client makes.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        join_base(&self.base_url, path)
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

impl OrnamentGateway for HttpGateway {
    async fn list(&self) -> Result<Vec<Ornament>, GatewayError> {
        let response = self
            .client
            .get(self.url(&list_path(crate::now_ms())))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }
        let body = response.text().await.map_err(transport)?;
        parse_list_body(&body)
    }

    async fn create(&self, request: &SaveOrnamentRequest) -> Result<CreateReceipt, GatewayError> {
        let payload =
            serde_json::to_string(request).map_err(|err| GatewayError::Malformed(err.to_string()))?;
        let response = self
            .client
            .post(self.url(ORNAMENTS_PATH))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(transport)?;
        let body = response.text().await.map_err(transport)?;
        parse_create_body(&body)
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(&delete_path(fingerprint)))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }
        let body = response.text().await.map_err(transport)?;
        parse_remove_body(&body)
    }
}
