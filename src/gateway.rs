use communitree_core::gateway::{
    delete_path, join_base, list_path, parse_create_body, parse_list_body, parse_remove_body,
    ORNAMENTS_PATH,
};
use communitree_core::{
    CreateReceipt, Fingerprint, GatewayError, Ornament, OrnamentGateway, SaveOrnamentRequest,
};
use gloo::net::http::Request;
use js_sys::Date;

/// Same-origin unless a base is baked in at build time.
pub(crate) fn default_api_base() -> String {
    option_env!("COMMUNITREE_API_BASE")
        .or(option_env!("TRUNK_PUBLIC_COMMUNITREE_API_BASE"))
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub(crate) struct BrowserGateway {
    base: String,
}

impl BrowserGateway {
    pub(crate) fn new(base: String) -> Self {
        Self { base }
    }

    fn url(&self, path: &str) -> String {
        join_base(&self.base, path)
    }
}

fn transport(err: gloo::net::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

impl OrnamentGateway for BrowserGateway {
    async fn list(&self) -> Result<Vec<Ornament>, GatewayError> {
        let response = Request::get(&self.url(&list_path(Date::now() as i64)))
            .send()
            .await
            .map_err(transport)?;
        if !response.ok() {
            return Err(GatewayError::Status(response.status()));
        }
        let body = response.text().await.map_err(transport)?;
        parse_list_body(&body)
    }

    async fn create(&self, request: &SaveOrnamentRequest) -> Result<CreateReceipt, GatewayError> {
        let response = Request::post(&self.url(ORNAMENTS_PATH))
            .json(request)
            .map_err(transport)?
            .send()
            .await
            .map_err(transport)?;
        let body = response.text().await.map_err(transport)?;
        parse_create_body(&body)
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), GatewayError> {
        let response = Request::delete(&self.url(&delete_path(fingerprint)))
            .send()
            .await
            .map_err(transport)?;
        if !response.ok() {
            return Err(GatewayError::Status(response.status()));
        }
        let body = response.text().await.map_err(transport)?;
        parse_remove_body(&body)
    }
}
